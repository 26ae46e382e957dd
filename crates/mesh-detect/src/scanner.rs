//! Serial device scanner
//!
//! This module enumerates candidate device paths, filters out the ones
//! already bridged or known not to be radios, and hands the rest to the
//! prober.

use std::collections::HashSet;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::device::Device;
use crate::error::DetectError;
use crate::identify::IdentifyClient;
use crate::probe::DeviceProber;

/// Substring -> description lookup, checked in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptionRule {
    pub contains: String,
    pub description: String,
}

impl DescriptionRule {
    fn new(contains: &str, description: &str) -> Self {
        Self {
            contains: contains.to_string(),
            description: description.to_string(),
        }
    }
}

/// Where to look for devices and what to ignore
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanPolicy {
    /// Glob patterns expanded in order
    pub patterns: Vec<String>,
    /// Regexes for paths that are never radios
    pub exclude: Vec<String>,
    /// If non-empty, only paths starting with one of these are offered
    pub keep_prefixes: Vec<String>,
    /// Description rules
    pub descriptions: Vec<DescriptionRule>,
    /// Description when no rule matches
    pub fallback_description: String,
}

impl ScanPolicy {
    /// Policy for the platform this binary was built for
    pub fn for_host() -> Self {
        if cfg!(target_os = "macos") {
            Self::macos()
        } else {
            Self::linux()
        }
    }

    /// macOS: both tty.* and cu.* nodes exist; only the callout (cu.*)
    /// devices are offered
    pub fn macos() -> Self {
        Self {
            patterns: vec![
                "/dev/tty.usb*".to_string(),
                "/dev/cu.usb*".to_string(),
                "/dev/tty.SLAB*".to_string(),
                "/dev/cu.SLAB*".to_string(),
            ],
            // Composite USB modems with long serial suffixes (e.g.
            // cu.usbmodemM4AE1CAEMD6) are not Meshtastic boards
            exclude: vec![r"^/dev/cu\.usbmodem[A-Z0-9]{10,}".to_string()],
            keep_prefixes: vec!["/dev/cu.".to_string()],
            descriptions: Self::default_descriptions(),
            fallback_description: "USB Serial".to_string(),
        }
    }

    pub fn linux() -> Self {
        Self {
            patterns: vec!["/dev/ttyUSB*".to_string(), "/dev/ttyACM*".to_string()],
            exclude: Vec::new(),
            keep_prefixes: Vec::new(),
            descriptions: Self::default_descriptions(),
            fallback_description: "USB Serial".to_string(),
        }
    }

    fn default_descriptions() -> Vec<DescriptionRule> {
        vec![
            DescriptionRule::new("SLAB", "CP210x USB-Serial"),
            DescriptionRule::new("usbmodem", "Native USB"),
            DescriptionRule::new("usbserial", "USB Serial (CH340/FTDI)"),
            DescriptionRule::new("ACM", "Native USB (ACM)"),
            DescriptionRule::new("USB", "USB Serial Adapter"),
        ]
    }

    /// Description for a path; informational only
    pub fn describe(&self, path: &str) -> &str {
        self.descriptions
            .iter()
            .find(|rule| path.contains(&rule.contains))
            .map(|rule| rule.description.as_str())
            .unwrap_or(&self.fallback_description)
    }
}

impl Default for ScanPolicy {
    fn default() -> Self {
        Self::for_host()
    }
}

/// Why a path was not offered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// A live bridge already owns the device
    Bridged,
    /// The path matched an exclusion pattern
    Excluded,
    /// The path is the non-preferred twin of another node (macOS tty.*)
    NotPreferred,
}

/// Outcome of enumerating one path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEntry {
    Found(Device),
    Skipped { path: String, reason: SkipReason },
}

/// Per-device progress reported by [`DeviceScanner::identify_all`]
#[derive(Debug, Clone, Copy)]
pub enum ProbeProgress<'a> {
    /// About to probe this device
    Started(&'a Device),
    /// Probe finished; the identity (if any) is attached
    Finished(&'a Device),
}

/// Device scanner
pub struct DeviceScanner<C> {
    policy: ScanPolicy,
    exclude: Vec<Regex>,
    prober: DeviceProber<C>,
}

impl<C: IdentifyClient> DeviceScanner<C> {
    /// Create a scanner with the host's default policy
    pub fn new(prober: DeviceProber<C>) -> Result<Self, DetectError> {
        Self::with_policy(ScanPolicy::for_host(), prober)
    }

    /// Create a scanner with a custom policy
    pub fn with_policy(policy: ScanPolicy, prober: DeviceProber<C>) -> Result<Self, DetectError> {
        for pattern in &policy.patterns {
            glob::Pattern::new(pattern).map_err(|e| DetectError::InvalidGlob {
                pattern: pattern.clone(),
                reason: e.to_string(),
            })?;
        }

        let exclude = policy
            .exclude
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| DetectError::InvalidExclusion {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            policy,
            exclude,
            prober,
        })
    }

    pub fn prober(&self) -> &DeviceProber<C> {
        &self.prober
    }

    /// Enumerate candidate paths without probing
    ///
    /// Entries come back in discovery order, skipped paths included so
    /// callers can report why a device was not offered.
    pub fn enumerate(&self, exclude_paths: &HashSet<String>) -> Vec<ScanEntry> {
        let mut entries = Vec::new();

        for pattern in &self.policy.patterns {
            let paths = match glob::glob(pattern) {
                Ok(paths) => paths,
                Err(e) => {
                    warn!("Skipping device pattern {}: {}", pattern, e);
                    continue;
                }
            };

            for path in paths {
                let path = match path {
                    Ok(path) => path.to_string_lossy().into_owned(),
                    Err(e) => {
                        debug!("Unreadable path while scanning {}: {}", pattern, e);
                        continue;
                    }
                };
                entries.push(self.classify(path, exclude_paths));
            }
        }

        entries
    }

    fn classify(&self, path: String, exclude_paths: &HashSet<String>) -> ScanEntry {
        let reason = if exclude_paths.contains(&path) {
            Some(SkipReason::Bridged)
        } else if self.exclude.iter().any(|re| re.is_match(&path)) {
            Some(SkipReason::Excluded)
        } else if !self.policy.keep_prefixes.is_empty()
            && !self
                .policy
                .keep_prefixes
                .iter()
                .any(|prefix| path.starts_with(prefix))
        {
            Some(SkipReason::NotPreferred)
        } else {
            None
        };

        match reason {
            Some(reason) => {
                debug!("Skipping {} ({:?})", path, reason);
                ScanEntry::Skipped { path, reason }
            }
            None => {
                let description = self.policy.describe(&path).to_string();
                ScanEntry::Found(Device::new(path, description))
            }
        }
    }

    /// Enumerate devices and probe each one for its node identity
    pub async fn scan(&self, exclude_paths: &HashSet<String>) -> Vec<Device> {
        info!("Searching for serial devices...");

        let mut devices: Vec<Device> = self
            .enumerate(exclude_paths)
            .into_iter()
            .filter_map(|entry| match entry {
                ScanEntry::Found(device) => Some(device),
                ScanEntry::Skipped { .. } => None,
            })
            .collect();

        self.identify_all(&mut devices, |_| {}).await;

        if devices.is_empty() {
            info!("No serial devices found");
        } else {
            info!("Found {} device(s)", devices.len());
            for device in &devices {
                info!("  {}", device);
            }
        }

        devices
    }

    /// Probe each device in turn, attaching whatever identity is found
    ///
    /// `progress` sees every device before and after its probe. Nothing is
    /// reported when identification is disabled.
    pub async fn identify_all(
        &self,
        devices: &mut [Device],
        mut progress: impl FnMut(ProbeProgress<'_>),
    ) {
        if !self.prober.is_enabled() {
            return;
        }
        for device in devices.iter_mut() {
            progress(ProbeProgress::Started(&*device));
            device.identity = self.prober.probe(&device.path).await;
            progress(ProbeProgress::Finished(&*device));
        }
    }
}
