//! Pick one canonical device per semantic class or event type code.

use std::collections::BTreeSet;

use super::{path_order_key, CanonicalDeviceMap, DeviceDescriptor, EventTypeCode, SemanticClass};
use crate::error::MirrorError;

/// Index reserved for the virtual/aggregate device, never a candidate for
/// event type resolution.
const RESERVED_INDEX: u32 = 0;

/// Resolve the touch and key devices of `target`. Every class must be found;
/// among several candidates the lowest device index wins.
pub fn resolve_markers(
    target: &str,
    listing: &str,
    devices: &[DeviceDescriptor],
) -> Result<CanonicalDeviceMap<SemanticClass>, MirrorError> {
    SemanticClass::ALL
        .iter()
        .map(|&class| {
            devices
                .iter()
                .filter(|d| d.has_marker(class.marker()))
                .min_by(|a, b| path_order_key(&a.path).cmp(&path_order_key(&b.path)))
                .map(|d| (class, d.path.clone()))
                .ok_or_else(|| MirrorError::AmbiguousOrMissingDevice {
                    target: target.to_string(),
                    class: class.to_string(),
                    listing: listing.to_string(),
                })
        })
        .collect()
}

/// The device that should receive events of type `code`, if any.
pub fn select_for_type(devices: &[DeviceDescriptor], code: EventTypeCode) -> Option<&DeviceDescriptor> {
    devices
        .iter()
        .filter(|d| d.reports(code) && d.index() != Some(RESERVED_INDEX))
        .min_by(|a, b| path_order_key(&a.path).cmp(&path_order_key(&b.path)))
}

/// Resolve every event type code declared anywhere in the listing.
pub fn resolve_event_types(devices: &[DeviceDescriptor]) -> CanonicalDeviceMap<EventTypeCode> {
    let codes: BTreeSet<EventTypeCode> = devices
        .iter()
        .flat_map(|d| d.event_types.keys().copied())
        .collect();

    codes
        .into_iter()
        .filter_map(|code| select_for_type(devices, code).map(|d| (code, d.path.clone())))
        .collect()
}

/// Event type codes events from the host device `path` are translated
/// through: the codes it is canonical for, then the other codes it declares,
/// each ascending. `None` when the host listing does not know the device.
pub fn host_event_types(
    canonical: &CanonicalDeviceMap<EventTypeCode>,
    devices: &[DeviceDescriptor],
    path: &str,
) -> Option<Vec<EventTypeCode>> {
    let mut codes: Vec<EventTypeCode> = canonical.keys_for(path).collect();
    let declared = devices.iter().find(|d| d.path == path);
    if declared.is_none() && codes.is_empty() {
        return None;
    }
    for &code in declared.into_iter().flat_map(|d| d.event_types.keys()) {
        if !codes.contains(&code) {
            codes.push(code);
        }
    }
    Some(codes)
}
