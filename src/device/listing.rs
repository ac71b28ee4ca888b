//! Parse `getevent -pl` output into device descriptors.
//!
//! ```text
//! add device 12: /dev/input/event2
//!   name:     "sec_touchscreen"
//!   events:
//!     KEY (0001): BTN_TOUCH             BTN_TOOL_FINGER
//!     ABS (0003): ABS_MT_SLOT           : value 0, min 0, max 9, ...
//!                 ABS_MT_TOUCH_MAJOR    : value 0, min 0, max 255, ...
//!   input props:
//!     INPUT_PROP_DIRECT
//! ```

use once_cell::sync::Lazy;
use regex::Regex;

use super::{DeviceDescriptor, EventTypeCode};
use crate::error::ParseError;

static HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^add device \d+: (.+?)\s*$").expect("Invalid regex pattern"));

static CAPABILITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s+([A-Z][A-Z0-9_]*)\s+\((?:0x)?([0-9a-fA-F]+)\):(.*)$")
        .expect("Invalid regex pattern")
});

static MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[A-Z][A-Z0-9]*(?:_[A-Z0-9]+)+\b").expect("Invalid regex pattern")
});

/// Split a listing into one descriptor per `add device` block, in listing
/// order. Blocks repeating an already seen path are merged into it.
pub fn parse_listing(listing: &str) -> Result<Vec<DeviceDescriptor>, ParseError> {
    let mut devices: Vec<DeviceDescriptor> = Vec::new();
    let mut current: Option<usize> = None;
    // Continuation lines only carry markers inside an event type section.
    let mut in_events = false;

    for (number, raw) in listing.lines().enumerate() {
        let line = raw.trim_end_matches('\r');

        if let Some(caps) = HEADER.captures(line) {
            let path = &caps[1];
            let index = match devices.iter().position(|d| d.path == path) {
                Some(index) => index,
                None => {
                    devices.push(DeviceDescriptor::new(path));
                    devices.len() - 1
                }
            };
            current = Some(index);
            in_events = false;
            continue;
        }

        if let Some(caps) = CAPABILITY.captures(line) {
            let Some(index) = current else {
                return Err(ParseError {
                    line: number + 1,
                    text: line.to_string(),
                });
            };
            let device = &mut devices[index];
            // Codes wider than u16 are not event types; treat as noise.
            if let Ok(code) = EventTypeCode::from_str_radix(&caps[2], 16) {
                device.event_types.insert(code, caps[1].to_string());
            }
            collect_markers(device, &caps[3]);
            in_events = true;
            continue;
        }

        let Some(index) = current else {
            continue;
        };
        if !line.starts_with(char::is_whitespace) || line.trim().ends_with(':') {
            in_events = false;
            continue;
        }
        if in_events {
            collect_markers(&mut devices[index], line);
        }
    }

    Ok(devices)
}

fn collect_markers(device: &mut DeviceDescriptor, text: &str) {
    for marker in MARKER.find_iter(text) {
        device.markers.insert(marker.as_str().to_string());
    }
}
