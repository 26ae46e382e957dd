//! Startup checks for external tools
//!
//! The forwarder is required. Identification and mDNS announcement are
//! optional: when unavailable they are switched off once here, and the
//! rest of the program branches on the flags instead of failing later.

use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info};

use crate::error::BridgeError;

/// Optional subsystems available on this host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Devices can be probed for their node identity
    pub identification: bool,
    /// Bridges can be announced over mDNS
    pub registrar: bool,
}

impl Capabilities {
    /// Nothing optional available
    pub fn none() -> Self {
        Self {
            identification: false,
            registrar: false,
        }
    }
}

/// Whether `program arg` runs and exits successfully
pub async fn tool_available(program: &str, arg: &str) -> bool {
    let result = Command::new(program)
        .arg(arg)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;

    match result {
        Ok(status) => status.success(),
        Err(e) => {
            debug!("{} not usable: {}", program, e);
            false
        }
    }
}

/// Fail unless the forwarding tool is installed
pub async fn require_forwarder(program: &str) -> Result<(), BridgeError> {
    if tool_available(program, "-V").await {
        info!("Found {}", program);
        return Ok(());
    }

    let hint = if cfg!(target_os = "macos") {
        format!("brew install {}", program)
    } else {
        format!("apt-get install {}", program)
    };
    Err(BridgeError::MissingDependency {
        tool: program.to_string(),
        hint,
    })
}
