mod cli;
mod file;

pub use cli::{Cli, Command};

use std::path::PathBuf;

use crate::device::ResolvePolicy;
use crate::transport::TransportKind;

use file::FileConfig;

const DEFAULT_ADB: &str = "adb";

/// Authentication method for SSH connection.
#[derive(Clone)]
pub enum Auth {
    Key(PathBuf),
    Password(String),
}

/// Merged configuration from CLI args and TOML file.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: Option<String>,
    /// Mirror targets in command-line order, without duplicates.
    pub mirrors: Vec<String>,
    pub transport: TransportKind,
    pub policy: ResolvePolicy,
    pub host_device: Option<String>,
    /// `None` when mirror shells are not elevated.
    pub elevate_command: Option<String>,
    pub show_touches: bool,
    pub debug: bool,
    pub adb: PathBuf,
    pub ssh_user: String,
    pub ssh_port: u16,
    pub key_path: Option<String>,
    pub password: Option<String>,
}

impl Config {
    /// Load configuration by merging TOML file with CLI overrides.
    pub fn load(cli: &Cli) -> Self {
        let file_config = cli
            .config
            .as_ref()
            .and_then(|p| file::load_from_path(p))
            .or_else(file::load_from_default_paths)
            .unwrap_or_default();

        Self::merge(cli, file_config)
    }

    fn merge(cli: &Cli, file_config: FileConfig) -> Self {
        let mirrors = if cli.mirrors.is_empty() {
            file_config.mirrors
        } else {
            cli.mirrors.clone()
        };

        Self {
            host: cli.host.clone().or(file_config.host),
            mirrors: dedup(mirrors),
            transport: cli.transport.unwrap_or(file_config.transport),
            policy: cli.policy.unwrap_or(file_config.policy),
            host_device: cli.host_device.clone().or(file_config.host_device),
            elevate_command: if cli.no_su || !file_config.elevate {
                None
            } else {
                Some(file_config.elevate_command)
            },
            show_touches: cli.show_touches || file_config.show_touches,
            debug: cli.debug || file_config.debug,
            adb: cli
                .adb
                .clone()
                .or(file_config.adb)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_ADB)),
            ssh_user: cli.ssh_user.clone().unwrap_or(file_config.ssh_user),
            ssh_port: cli.ssh_port.unwrap_or(file_config.ssh_port),
            key_path: cli.key_path.clone().or(file_config.key_path),
            password: cli.password.clone().or(file_config.password),
        }
    }

    pub fn auth(&self) -> Auth {
        if let Some(ref password) = self.password {
            return Auth::Password(password.clone());
        }
        let path = self.key_path.as_deref().unwrap_or("~/.ssh/id_ed25519");
        Auth::Key(expand_home(path))
    }

    pub fn validate(&self) -> Result<(), String> {
        let Some(host) = self.host.as_deref() else {
            return Err("No host device given".into());
        };
        if self.mirrors.is_empty() {
            return Err("No mirror devices given".into());
        }
        if self.mirrors.iter().any(|m| m == host) {
            return Err(format!("Host {} cannot also be a mirror", host));
        }
        Ok(())
    }
}

fn dedup(targets: Vec<String>) -> Vec<String> {
    let mut unique: Vec<String> = Vec::with_capacity(targets.len());
    for target in targets {
        if !unique.contains(&target) {
            unique.push(target);
        }
    }
    unique
}

fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => PathBuf::from(home).join(rest),
        _ => PathBuf::from(path),
    }
}
