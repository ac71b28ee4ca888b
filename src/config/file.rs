use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::device::ResolvePolicy;
use crate::transport::TransportKind;

const DEFAULT_ELEVATE_COMMAND: &str = "su";
const DEFAULT_SSH_USER: &str = "root";
const DEFAULT_SSH_PORT: u16 = 22;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub host: Option<String>,
    #[serde(default)]
    pub mirrors: Vec<String>,
    #[serde(default)]
    pub transport: TransportKind,
    #[serde(default)]
    pub policy: ResolvePolicy,
    pub host_device: Option<String>,
    #[serde(default = "default_true")]
    pub elevate: bool,
    #[serde(default = "default_elevate_command")]
    pub elevate_command: String,
    #[serde(default)]
    pub show_touches: bool,
    #[serde(default)]
    pub debug: bool,
    pub adb: Option<PathBuf>,
    #[serde(default = "default_ssh_user")]
    pub ssh_user: String,
    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,
    pub key_path: Option<String>,
    pub password: Option<String>,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            host: None,
            mirrors: Vec::new(),
            transport: TransportKind::default(),
            policy: ResolvePolicy::default(),
            host_device: None,
            elevate: true,
            elevate_command: DEFAULT_ELEVATE_COMMAND.into(),
            show_touches: false,
            debug: false,
            adb: None,
            ssh_user: DEFAULT_SSH_USER.into(),
            ssh_port: DEFAULT_SSH_PORT,
            key_path: None,
            password: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_elevate_command() -> String {
    DEFAULT_ELEVATE_COMMAND.into()
}

fn default_ssh_user() -> String {
    DEFAULT_SSH_USER.into()
}

fn default_ssh_port() -> u16 {
    DEFAULT_SSH_PORT
}

// The logger is not set up yet when this runs (it depends on `debug`), so
// problems go straight to stderr.
pub fn load_from_path(path: &Path) -> Option<FileConfig> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            eprintln!("Failed to parse {}: {}", path.display(), e);
            None
        }
    }
}

pub fn load_from_default_paths() -> Option<FileConfig> {
    for path in default_config_paths() {
        if path.exists() {
            if let Some(config) = load_from_path(&path) {
                return Some(config);
            }
        }
    }
    None
}

fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    paths.push(PathBuf::from("input-mirror.toml"));

    if let Ok(home) = std::env::var("HOME") {
        paths.push(PathBuf::from(home).join(".config").join("input-mirror.toml"));
    }

    paths
}
