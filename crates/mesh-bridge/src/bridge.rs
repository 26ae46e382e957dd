//! A single serial-to-TCP bridge
//!
//! A bridge owns one forwarding process and, when the node is known and
//! announcement is available, one mDNS registration. Liveness is never
//! stored: the forwarder can exit at any time (device unplugged, crash),
//! so every check polls the process.

use std::time::Duration;

use mesh_detect::NodeIdentity;
use tokio::process::Child;
use tracing::{debug, info, warn};

use crate::error::BridgeError;
use crate::forwarder::{drain_output, shutdown_child, Forwarder};
use crate::registrar::{instance_name, Registrar, Registration, ServiceRecord};

/// Per-bridge settings
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    /// Serial baud rate
    pub baud_rate: u32,
    /// How long `stop` waits after SIGTERM before killing the forwarder
    pub stop_grace: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            stop_grace: Duration::from_secs(3),
        }
    }
}

/// One forwarding session between a serial device and a TCP port
pub struct Bridge {
    device_path: String,
    tcp_port: u16,
    identity: Option<NodeIdentity>,
    config: BridgeConfig,
    child: Option<Child>,
    registration: Option<Box<dyn Registration>>,
}

impl Bridge {
    pub fn new(
        device_path: impl Into<String>,
        tcp_port: u16,
        identity: Option<NodeIdentity>,
        config: BridgeConfig,
    ) -> Self {
        Self {
            device_path: device_path.into(),
            tcp_port,
            identity,
            config,
            child: None,
            registration: None,
        }
    }

    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    pub fn tcp_port(&self) -> u16 {
        self.tcp_port
    }

    pub fn identity(&self) -> Option<&NodeIdentity> {
        self.identity.as_ref()
    }

    /// OS process ID of the forwarder, while it has one
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(Child::id)
    }

    /// Whether an mDNS record is currently published
    pub fn is_announced(&self) -> bool {
        self.registration.is_some()
    }

    /// `meshtastic_xxxx.local` for identified nodes
    pub fn mdns_hostname(&self) -> Option<String> {
        self.identity
            .as_ref()
            .map(|identity| format!("{}.local", instance_name(identity)))
    }

    /// Configure the line, start the forwarder, then announce
    ///
    /// Only line configuration and spawn failures are errors; a failed
    /// announcement is logged and the bridge still counts as started.
    pub fn start(
        &mut self,
        forwarder: &dyn Forwarder,
        registrar: Option<&dyn Registrar>,
    ) -> Result<(), BridgeError> {
        forwarder.configure_line(&self.device_path, self.config.baud_rate)?;

        let mut child = forwarder.spawn(&self.device_path, self.tcp_port)?;
        drain_output(&mut child, self.tcp_port);
        self.child = Some(child);

        info!(
            "Bridge started: {} -> TCP port {}",
            self.device_path, self.tcp_port
        );

        if let (Some(identity), Some(registrar)) = (&self.identity, registrar) {
            match registrar.local_address().and_then(|address| {
                let record =
                    ServiceRecord::for_bridge(identity, &self.device_path, address, self.tcp_port);
                registrar.register(&record)
            }) {
                Ok(registration) => self.registration = Some(registration),
                Err(e) => warn!("mDNS announcement failed for {}: {}", self.device_path, e),
            }
        }

        Ok(())
    }

    /// Withdraw the announcement and stop the forwarder
    ///
    /// Safe to call repeatedly; later calls do nothing.
    pub async fn stop(&mut self) {
        if let Some(registration) = self.registration.take() {
            // unregistering may block waiting for the responder
            match tokio::task::spawn_blocking(move || registration.unregister()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    debug!("Ignoring unregister failure for {}: {}", self.device_path, e)
                }
                Err(e) => warn!("Unregister task for {} failed: {}", self.device_path, e),
            }
        }

        if let Some(mut child) = self.child.take() {
            shutdown_child(&mut child, self.config.stop_grace).await;
            info!(
                "Bridge stopped: {} (port {})",
                self.device_path, self.tcp_port
            );
        }
    }

    /// Poll the forwarder; true while it has not exited
    pub fn is_running(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => match child.try_wait() {
                Ok(None) => true,
                Ok(Some(status)) => {
                    debug!(
                        "Forwarder for {} exited: {}",
                        self.device_path, status
                    );
                    false
                }
                Err(e) => {
                    warn!("Cannot poll forwarder for {}: {}", self.device_path, e);
                    false
                }
            },
            None => false,
        }
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("device_path", &self.device_path)
            .field("tcp_port", &self.tcp_port)
            .field("identity", &self.identity)
            .field("pid", &self.pid())
            .field("announced", &self.is_announced())
            .finish()
    }
}
