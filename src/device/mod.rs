//! Input device discovery: listing parser, identity resolvers and the
//! canonical per-machine device maps they produce.

mod listing;
mod resolve;

pub use listing::parse_listing;
pub use resolve::{host_event_types, resolve_event_types, resolve_markers, select_for_type};

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Event type code as printed in parentheses by `getevent -p` (`KEY (0001)`).
pub type EventTypeCode = u16;

/// One `add device` block of a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub path: String,
    /// Declared event types, code -> name (`1 -> "KEY"`).
    pub event_types: BTreeMap<EventTypeCode, String>,
    /// Capability markers found in the block (`KEY_ESC`, `ABS_MT_TOUCH_MAJOR`, ...).
    pub markers: BTreeSet<String>,
}

impl DeviceDescriptor {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            event_types: BTreeMap::new(),
            markers: BTreeSet::new(),
        }
    }

    pub fn index(&self) -> Option<u32> {
        device_index(&self.path)
    }

    pub fn reports(&self, code: EventTypeCode) -> bool {
        self.event_types.contains_key(&code)
    }

    /// Substring match, so `ABS_MT_TOUCH` matches `ABS_MT_TOUCH_MAJOR`.
    pub fn has_marker(&self, needle: &str) -> bool {
        self.markers.iter().any(|m| m.contains(needle))
    }
}

/// Numeric suffix of a device path (`/dev/input/event10` -> 10).
pub fn device_index(path: &str) -> Option<u32> {
    let stem = path.trim_end_matches(|c: char| c.is_ascii_digit());
    path[stem.len()..].parse().ok()
}

/// Ordering used for every tie-break: numbered paths by index, then
/// unnumbered paths by string.
pub(crate) fn path_order_key(path: &str) -> (bool, u32, &str) {
    match device_index(path) {
        Some(index) => (false, index, path),
        None => (true, 0, path),
    }
}

/// Logical device role for the marker policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SemanticClass {
    Touch,
    Key,
}

impl SemanticClass {
    pub const ALL: [SemanticClass; 2] = [SemanticClass::Touch, SemanticClass::Key];

    pub fn marker(&self) -> &'static str {
        match self {
            SemanticClass::Touch => "ABS_MT_TOUCH",
            SemanticClass::Key => "KEY_ESC",
        }
    }
}

impl fmt::Display for SemanticClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SemanticClass::Touch => write!(f, "touch"),
            SemanticClass::Key => write!(f, "key"),
        }
    }
}

/// One device path per key, built once per machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalDeviceMap<K: Ord> {
    devices: BTreeMap<K, String>,
}

impl<K: Ord + Copy> CanonicalDeviceMap<K> {
    pub fn get(&self, key: &K) -> Option<&str> {
        self.devices.get(key).map(String::as_str)
    }

    /// Keys mapped to `path`, ascending.
    pub fn keys_for<'a>(&'a self, path: &'a str) -> impl Iterator<Item = K> + 'a {
        self.devices
            .iter()
            .filter(move |(_, p)| p.as_str() == path)
            .map(|(k, _)| *k)
    }

    pub fn iter(&self) -> impl Iterator<Item = (K, &str)> {
        self.devices.iter().map(|(k, p)| (*k, p.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

impl<K: Ord> FromIterator<(K, String)> for CanonicalDeviceMap<K> {
    fn from_iter<I: IntoIterator<Item = (K, String)>>(iter: I) -> Self {
        Self {
            devices: iter.into_iter().collect(),
        }
    }
}

impl<K: Ord + fmt::Debug> fmt::Display for CanonicalDeviceMap<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.devices.iter()).finish()
    }
}

/// How host devices are matched to mirror devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolvePolicy {
    /// Match by raw event type code, lowest device index wins.
    #[default]
    EventTypes,
    /// Match the touch (`ABS_MT_TOUCH*`) and key (`KEY_ESC`) devices.
    Markers,
}

impl fmt::Display for ResolvePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvePolicy::EventTypes => write!(f, "event-types"),
            ResolvePolicy::Markers => write!(f, "markers"),
        }
    }
}

impl FromStr for ResolvePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "event-types" | "event_types" | "types" => Ok(ResolvePolicy::EventTypes),
            "markers" | "marker" => Ok(ResolvePolicy::Markers),
            _ => Err(format!(
                "Invalid policy '{}'. Valid values: event-types, markers",
                s
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_index() {
        assert_eq!(device_index("/dev/input/event0"), Some(0));
        assert_eq!(device_index("/dev/input/event13"), Some(13));
        assert_eq!(device_index("/dev/input/mice"), None);
    }

    #[test]
    fn test_path_order_is_numeric() {
        let mut paths = vec!["/dev/input/event10", "/dev/input/mice", "/dev/input/event2"];
        paths.sort_by_key(|p| path_order_key(*p));
        assert_eq!(paths, ["/dev/input/event2", "/dev/input/event10", "/dev/input/mice"]);
    }

    #[test]
    fn test_keys_for() {
        let map: CanonicalDeviceMap<EventTypeCode> = [
            (4, "/dev/input/event1".to_string()),
            (1, "/dev/input/event1".to_string()),
            (3, "/dev/input/event2".to_string()),
        ]
        .into_iter()
        .collect();
        assert_eq!(map.keys_for("/dev/input/event1").collect::<Vec<_>>(), [1, 4]);
        assert_eq!(map.keys_for("/dev/input/event9").count(), 0);
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!("event-types".parse::<ResolvePolicy>().unwrap(), ResolvePolicy::EventTypes);
        assert_eq!("Markers".parse::<ResolvePolicy>().unwrap(), ResolvePolicy::Markers);
        assert!("lexicographic".parse::<ResolvePolicy>().is_err());
    }
}
