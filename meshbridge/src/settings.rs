//! Application settings

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use mesh_bridge::{BridgeConfig, DEFAULT_BASE_PORT};
use mesh_detect::{ProbeConfig, ScanPolicy};
use serde::{Deserialize, Serialize};

use crate::cli::Cli;

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// First TCP port to hand out
    pub base_port: u16,
    /// Serial baud rate for bridged devices
    pub baud_rate: u32,
    /// Probe devices for their node ID
    pub probe_enabled: bool,
    /// Give up identifying a device after this long (ms)
    pub probe_timeout_ms: u64,
    /// How often a probe checks for new fields (ms)
    pub probe_poll_ms: u64,
    /// Settle for a bare node ID after this long without an owner (ms)
    pub owner_grace_ms: u64,
    /// SIGTERM-to-SIGKILL grace when stopping a bridge (ms)
    pub stop_grace_ms: u64,
    /// Announce identified bridges over mDNS
    pub mdns_enabled: bool,
    /// Forwarding program
    pub socat_program: String,
    /// Identification program
    pub meshtastic_program: String,
    /// Replace the platform's device globs
    pub scan_patterns: Option<Vec<String>>,
    /// Additional exclusion regexes on top of the platform defaults
    pub exclude_patterns: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        let probe = ProbeConfig::default();
        let bridge = BridgeConfig::default();
        Self {
            base_port: DEFAULT_BASE_PORT,
            baud_rate: bridge.baud_rate,
            probe_enabled: true,
            probe_timeout_ms: probe.timeout.as_millis() as u64,
            probe_poll_ms: probe.poll_interval.as_millis() as u64,
            owner_grace_ms: probe.owner_grace.as_millis() as u64,
            stop_grace_ms: bridge.stop_grace.as_millis() as u64,
            mdns_enabled: true,
            socat_program: "socat".to_string(),
            meshtastic_program: "meshtastic".to_string(),
            scan_patterns: None,
            exclude_patterns: Vec::new(),
        }
    }
}

impl Settings {
    /// Get the XDG config directory for meshbridge
    /// Uses $XDG_CONFIG_HOME/meshbridge on Linux/macOS, falls back to ~/.config/meshbridge
    fn config_dir() -> Option<PathBuf> {
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_config);
            if path.is_absolute() {
                return Some(path.join("meshbridge"));
            }
        }

        dirs::home_dir().map(|h| h.join(".config").join("meshbridge"))
    }

    /// Get the default settings file path
    pub fn settings_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("settings.json"))
    }

    /// Load settings from an explicit file, or the default location
    ///
    /// A missing default file means defaults; a missing explicit file or
    /// one that does not parse is an error.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        match explicit {
            Some(path) => Self::load_from(path),
            None => match Self::settings_path() {
                Some(path) if path.exists() => Self::load_from(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    /// Load settings from a specific file
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse settings in {}", path.display()))
    }

    /// Command-line flags win over the settings file
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(port) = cli.base_port {
            self.base_port = port;
        }
        if let Some(baud) = cli.baud {
            self.baud_rate = baud;
        }
        if let Some(secs) = cli.probe_timeout {
            self.probe_timeout_ms = secs.saturating_mul(1000);
        }
        if cli.no_probe {
            self.probe_enabled = false;
        }
        if cli.no_mdns {
            self.mdns_enabled = false;
        }
        self.exclude_patterns.extend(cli.exclude.iter().cloned());
    }

    pub fn probe_config(&self) -> ProbeConfig {
        ProbeConfig {
            timeout: Duration::from_millis(self.probe_timeout_ms),
            poll_interval: Duration::from_millis(self.probe_poll_ms),
            owner_grace: Duration::from_millis(self.owner_grace_ms),
        }
    }

    pub fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig {
            baud_rate: self.baud_rate,
            stop_grace: Duration::from_millis(self.stop_grace_ms),
        }
    }

    /// Host scan policy with the configured overrides applied
    pub fn scan_policy(&self) -> ScanPolicy {
        let mut policy = ScanPolicy::for_host();
        if let Some(patterns) = &self.scan_patterns {
            policy.patterns = patterns.clone();
        }
        policy.exclude.extend(self.exclude_patterns.iter().cloned());
        policy
    }
}
