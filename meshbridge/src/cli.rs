use std::path::PathBuf;

use clap::{ArgAction, Parser};

#[derive(Parser, Debug, Clone)]
#[command(name = "meshbridge")]
#[command(
    author,
    version,
    about = "Discover Meshtastic radios on USB and expose each one as a TCP socket"
)]
pub struct Cli {
    /// Bridge the first identified device on the base port, then wait for Ctrl+C
    #[arg(long, alias = "unattended")]
    pub yolo: bool,

    /// First TCP port to hand out
    #[arg(short = 'p', long = "base-port", value_name = "PORT")]
    pub base_port: Option<u16>,

    /// Serial baud rate
    #[arg(short = 'b', long)]
    pub baud: Option<u32>,

    /// Seconds to wait for a device to identify itself
    #[arg(long = "probe-timeout", value_name = "SECS")]
    pub probe_timeout: Option<u64>,

    /// Don't query devices for their node ID
    #[arg(long)]
    pub no_probe: bool,

    /// Don't announce bridges over mDNS
    #[arg(long)]
    pub no_mdns: bool,

    /// Extra regex of device paths to ignore (repeatable)
    #[arg(short = 'x', long, value_name = "REGEX")]
    pub exclude: Vec<String>,

    /// Settings file (default: ~/.config/meshbridge/settings.json)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Default tracing filter for the verbosity level
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "meshbridge=warn,mesh_detect=warn,mesh_bridge=warn",
            1 => "meshbridge=info,mesh_detect=info,mesh_bridge=info",
            _ => "meshbridge=debug,mesh_detect=debug,mesh_bridge=debug",
        }
    }
}
