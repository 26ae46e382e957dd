//! Error types for bridge management

use thiserror::Error;

/// Errors that can occur while managing bridges
#[derive(Debug, Error)]
pub enum BridgeError {
    /// A required external tool is not installed
    #[error("{tool} is not installed (install with: {hint})")]
    MissingDependency { tool: String, hint: String },

    /// The device already has a live bridge
    #[error("bridge already running for {device} on port {port}")]
    AlreadyBridged { device: String, port: u16 },

    /// Another live bridge holds the port
    #[error("port {0} is already in use by another bridge")]
    PortInUse(u16),

    /// Serial line configuration failed
    #[error("failed to configure {device}: {reason}")]
    LineConfig { device: String, reason: String },

    /// The forwarding process could not be started
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Service announcement failed
    #[error("mDNS registration failed: {0}")]
    Registration(String),
}

impl From<mdns_sd::Error> for BridgeError {
    fn from(e: mdns_sd::Error) -> Self {
        BridgeError::Registration(e.to_string())
    }
}
