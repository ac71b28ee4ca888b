use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::device::ResolvePolicy;
use crate::transport::TransportKind;

#[derive(Parser)]
#[command(name = "input-mirror")]
#[command(about = "Mirror touch and key input from one device onto others")]
#[command(version)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Device whose input is captured (adb serial or SSH host)
    #[arg(value_name = "HOST_SERIAL")]
    pub host: Option<String>,

    /// Devices receiving the mirrored input
    #[arg(value_name = "MIRROR_SERIAL")]
    pub mirrors: Vec<String>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Remote shell transport (adb, ssh)
    #[arg(long, value_parser = clap::value_parser!(TransportKind))]
    pub transport: Option<TransportKind>,

    /// Device matching policy (event-types, markers)
    #[arg(long, value_parser = clap::value_parser!(ResolvePolicy))]
    pub policy: Option<ResolvePolicy>,

    /// Capture a single host input device instead of all of them
    #[arg(long)]
    pub host_device: Option<String>,

    /// Do not elevate mirror shells with `su`
    #[arg(long)]
    pub no_su: bool,

    /// Turn on the "show touches" setting on mirrors while running
    #[arg(long)]
    pub show_touches: bool,

    /// Path to the adb executable
    #[arg(long, env = "ADB")]
    pub adb: Option<PathBuf>,

    /// SSH user (ssh transport)
    #[arg(long)]
    pub ssh_user: Option<String>,

    /// SSH port (ssh transport)
    #[arg(long)]
    pub ssh_port: Option<u16>,

    /// SSH key path for authentication
    #[arg(long)]
    pub key_path: Option<String>,

    /// SSH password (if set, key_path is ignored)
    #[arg(long, env = "MIRROR_SSH_PASSWORD")]
    pub password: Option<String>,

    /// Path to config file
    #[arg(long, env = "MIRROR_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print the input devices found on a target and how they resolve
    Dump {
        /// adb serial or SSH host
        target: String,
    },
    /// Print decoded input events from a target
    Events {
        /// adb serial or SSH host
        target: String,

        /// Only watch this input device
        #[arg(long)]
        device: Option<String>,
    },
}
