//! Error taxonomy for discovery, resolution and forwarding.

use thiserror::Error;

use crate::transport::ChannelError;

/// A listing whose structure cannot be attributed to any device.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("line {line}: capability listed before any `add device` header: {text:?}")]
pub struct ParseError {
    pub line: usize,
    pub text: String,
}

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Marker policy: no device on the target carries the class marker.
    #[error("[{target}] unable to find a {class} input device")]
    AmbiguousOrMissingDevice {
        target: String,
        class: String,
        listing: String,
    },

    /// Type-code policy: no eligible device on the target reports the code.
    #[error("[{target}] no input device reports event type {code:#06x}")]
    UnknownEventType { target: String, code: u16 },

    /// A live event came from a host device that has no identity.
    #[error("[{target}] no mapping for host device {device}")]
    UnresolvedDevice { target: String, device: String },

    #[error(transparent)]
    Channel(#[from] ChannelError),
}

impl MirrorError {
    /// Raw listing attached to the error, if any, for diagnosis.
    pub fn listing(&self) -> Option<&str> {
        match self {
            MirrorError::AmbiguousOrMissingDevice { listing, .. } => Some(listing),
            _ => None,
        }
    }
}
