//! Meshtastic Device Detection Library
//!
//! This crate provides serial device enumeration and best-effort node
//! identification for USB-attached Meshtastic radios.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::collections::HashSet;
//!
//! use mesh_detect::{DeviceProber, DeviceScanner, MeshtasticCli};
//!
//! # async fn run() -> Result<(), mesh_detect::DetectError> {
//! let prober = DeviceProber::new(Some(MeshtasticCli::new()));
//! let scanner = DeviceScanner::new(prober)?;
//!
//! for device in scanner.scan(&HashSet::new()).await {
//!     println!("Found device: {}", device);
//! }
//! # Ok(())
//! # }
//! ```

pub mod device;
pub mod error;
pub mod identify;
pub mod probe;
pub mod scanner;

pub use device::{format_node_id, Device, NodeIdentity};
pub use error::DetectError;
pub use identify::{IdentifyClient, IdentifySession, MeshtasticCli, NodeReport};
pub use probe::{DeviceProber, ProbeConfig};
pub use scanner::{
    DescriptionRule, DeviceScanner, ProbeProgress, ScanEntry, ScanPolicy, SkipReason,
};
