//! Remote shell transports: one-shot commands, live output streams and
//! interactive command channels on a target.

mod adb;
#[cfg(test)]
pub mod mock;
mod ssh;

pub use adb::AdbTransport;
pub use ssh::SshTransport;

use std::fmt;
use std::io::{self, BufRead};
use std::str::FromStr;
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;

use crate::config::Config;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("SSH error: {0}")]
    Ssh(#[from] ssh2::Error),

    #[error("could not resolve host address {0}")]
    Resolve(String),

    #[error("SSH authentication failed")]
    Auth,

    #[error("`{command}` exited with status {status}")]
    Exit { command: String, status: i32 },

    #[error("command channel closed")]
    Closed,
}

/// Forcefully ends a remote process or connection. Safe to call after the
/// process already exited.
pub type Terminator = Box<dyn FnOnce() + Send>;

/// Live output of a long-running remote command.
pub struct RemoteStream {
    pub reader: Box<dyn BufRead + Send>,
    pub terminator: Terminator,
}

/// Newline-terminated commands written in order into a remote shell. No
/// replies are read.
pub trait CommandChannel: Send {
    fn send(&mut self, command: &str) -> Result<(), ChannelError>;

    /// Close the input side and block until the remote process exits.
    fn close(self: Box<Self>) -> Result<(), ChannelError>;

    fn terminator(&self) -> Terminator;
}

pub trait Transport: Send + Sync {
    /// Run `command` on `target` and collect its standard output.
    fn exec(&self, target: &str, command: &str) -> Result<String, ChannelError>;

    /// Start `command` on `target` and stream its standard output.
    fn stream(&self, target: &str, command: &str) -> Result<RemoteStream, ChannelError>;

    /// Open an interactive shell on `target`.
    fn shell(&self, target: &str) -> Result<Box<dyn CommandChannel>, ChannelError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
    /// Targets are adb serials.
    #[default]
    Adb,
    /// Targets are `[user@]host` reachable over SSH.
    Ssh,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Adb => write!(f, "adb"),
            TransportKind::Ssh => write!(f, "ssh"),
        }
    }
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "adb" => Ok(TransportKind::Adb),
            "ssh" => Ok(TransportKind::Ssh),
            _ => Err(format!("Invalid transport '{}'. Valid values: adb, ssh", s)),
        }
    }
}

pub fn connect(config: &Config) -> Arc<dyn Transport> {
    match config.transport {
        TransportKind::Adb => Arc::new(AdbTransport::new(&config.adb)),
        TransportKind::Ssh => Arc::new(SshTransport::new(
            &config.ssh_user,
            config.ssh_port,
            config.auth(),
        )),
    }
}
