//! Decode the live `getevent` stream into input events.
//!
//! `getevent` prints one event per line, prefixed with the source device
//! when it watches every device:
//!
//! ```text
//! /dev/input/event2: 0003 0039 00000001
//! ```
//!
//! and without the prefix when started for a single device.

use std::fmt;
use std::io::BufRead;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::device::EventTypeCode;

pub const EV_SYN: EventTypeCode = 0x00;
pub const EV_KEY: EventTypeCode = 0x01;
pub const EV_ABS: EventTypeCode = 0x03;

static EVENT_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:(/dev/input/[^:]+): )?([0-9a-f]{1,4}) ([0-9a-f]{1,4}) ([0-9a-f]{1,8})$")
        .expect("Invalid regex pattern")
});

/// One raw input event as seen on the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputEvent {
    /// Host-side source device path.
    pub device: String,
    pub event_type: EventTypeCode,
    pub code: u16,
    pub value: i32,
}

impl fmt::Display for InputEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.device, self.event_type, self.code, self.value
        )
    }
}

/// Decode one line. `None` for banners, blank lines and anything else that
/// is not a complete event.
pub fn parse_event_line(line: &str, implicit_source: Option<&str>) -> Option<InputEvent> {
    let caps = EVENT_LINE.captures(line.trim_end_matches(['\r', '\n']))?;
    let device = match caps.get(1) {
        Some(m) => m.as_str().to_string(),
        None => implicit_source?.to_string(),
    };
    let event_type = u16::from_str_radix(&caps[2], 16).ok()?;
    let code = u16::from_str_radix(&caps[3], 16).ok()?;
    // Values are printed as the two's-complement bit pattern (ffffffff = -1).
    let value = u32::from_str_radix(&caps[4], 16).ok()? as i32;
    Some(InputEvent {
        device,
        event_type,
        code,
        value,
    })
}

/// Lazy, ordered sequence of events read line by line from a live stream.
/// Ends when the stream does; cannot be restarted.
pub struct EventStream<R> {
    reader: R,
    label: String,
    implicit_source: Option<String>,
    buf: Vec<u8>,
    lines_read: u64,
}

impl<R: BufRead> EventStream<R> {
    pub fn new(reader: R, label: impl Into<String>) -> Self {
        Self {
            reader,
            label: label.into(),
            implicit_source: None,
            buf: Vec::new(),
            lines_read: 0,
        }
    }

    /// Source attributed to lines without a device prefix.
    pub fn with_implicit_source(mut self, device: impl Into<String>) -> Self {
        self.implicit_source = Some(device.into());
        self
    }

    pub fn lines_read(&self) -> u64 {
        self.lines_read
    }
}

impl<R: BufRead> Iterator for EventStream<R> {
    type Item = InputEvent;

    fn next(&mut self) -> Option<InputEvent> {
        loop {
            self.buf.clear();
            // Hot-plug banners may carry device names that are not UTF-8.
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => {
                    log::error!("[{}] event stream read failed: {}", self.label, e);
                    return None;
                }
            }
            self.lines_read += 1;
            let line = String::from_utf8_lossy(&self.buf);
            let line = line.trim_end_matches(['\r', '\n']);
            log::debug!("[{}] {}", self.label, line);

            if let Some(event) = parse_event_line(line, self.implicit_source.as_deref()) {
                return Some(event);
            }
        }
    }
}
