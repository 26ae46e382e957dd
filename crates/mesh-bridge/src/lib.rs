//! Meshtastic Bridge Manager
//!
//! This crate manages serial-to-TCP bridges for Meshtastic radios: each
//! bridge is an external forwarding process (`socat`) listening on a TCP
//! port, optionally announced over mDNS as `_meshtastic._tcp`.
//!
//! # Architecture
//!
//! - [`Bridge`] owns one forwarding process and its announcement
//! - [`BridgeRegistry`] tracks every bridge in the run and enforces that a
//!   device or port is held by at most one live bridge
//! - [`next_available_port`] picks ports from a base (4403 by default)
//!
//! Liveness is always derived by polling the forwarding process, never
//! cached.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use mesh_bridge::{BridgeRegistry, Socat};
//! use mesh_detect::Device;
//!
//! # async fn run() -> Result<(), mesh_bridge::BridgeError> {
//! let mut registry = BridgeRegistry::new(Arc::new(Socat::new()), None);
//!
//! let device = Device::new("/dev/ttyACM0", "Native USB (ACM)");
//! if let Some(port) = registry.next_port() {
//!     registry.create_and_start(&device, port)?;
//! }
//!
//! registry.stop_all().await;
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub mod capabilities;
pub mod error;
pub mod forwarder;
pub mod ports;
pub mod registrar;
pub mod registry;

pub use bridge::{Bridge, BridgeConfig};
pub use capabilities::{require_forwarder, tool_available, Capabilities};
pub use error::BridgeError;
pub use forwarder::{Forwarder, Socat};
pub use ports::{next_available_port, DEFAULT_BASE_PORT};
pub use registrar::{MdnsRegistrar, Registrar, Registration, ServiceRecord, SERVICE_TYPE};
pub use registry::BridgeRegistry;
