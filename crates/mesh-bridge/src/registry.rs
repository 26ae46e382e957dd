//! Registry of every bridge created in this run
//!
//! The registry is the single source of truth for which ports and devices
//! are taken. All views are recomputed from live process state on each
//! call; nothing is cached because a forwarder can exit between calls.
//!
//! The registry is owned by one task. Creation reads live state, decides
//! and constructs without yielding, so two creations cannot interleave.

use std::collections::HashSet;
use std::sync::Arc;

use mesh_detect::Device;
use tracing::info;

use crate::bridge::{Bridge, BridgeConfig};
use crate::error::BridgeError;
use crate::forwarder::Forwarder;
use crate::ports::{next_available_port, DEFAULT_BASE_PORT};
use crate::registrar::Registrar;

/// Ordered collection of bridges
pub struct BridgeRegistry {
    bridges: Vec<Bridge>,
    forwarder: Arc<dyn Forwarder>,
    registrar: Option<Arc<dyn Registrar>>,
    config: BridgeConfig,
    base_port: u16,
}

impl BridgeRegistry {
    /// Create a registry; pass `None` as registrar when announcement is
    /// unavailable
    pub fn new(forwarder: Arc<dyn Forwarder>, registrar: Option<Arc<dyn Registrar>>) -> Self {
        Self {
            bridges: Vec::new(),
            forwarder,
            registrar,
            config: BridgeConfig::default(),
            base_port: DEFAULT_BASE_PORT,
        }
    }

    pub fn with_config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_base_port(mut self, base_port: u16) -> Self {
        self.base_port = base_port;
        self
    }

    pub fn base_port(&self) -> u16 {
        self.base_port
    }

    /// Whether new bridges will be announced
    pub fn announces(&self) -> bool {
        self.registrar.is_some()
    }

    /// Every bridge ever created and not yet cleared, in creation order
    pub fn len(&self) -> usize {
        self.bridges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bridges.is_empty()
    }

    /// Bridges whose forwarder is currently running, in creation order
    pub fn live_bridges(&mut self) -> Vec<&Bridge> {
        self.bridges
            .iter_mut()
            .filter_map(|bridge| {
                if bridge.is_running() {
                    Some(&*bridge)
                } else {
                    None
                }
            })
            .collect()
    }

    /// Ports held by live bridges
    pub fn occupied_ports(&mut self) -> HashSet<u16> {
        self.live_bridges()
            .into_iter()
            .map(Bridge::tcp_port)
            .collect()
    }

    /// Device paths held by live bridges
    pub fn occupied_device_paths(&mut self) -> HashSet<String> {
        self.live_bridges()
            .into_iter()
            .map(|bridge| bridge.device_path().to_string())
            .collect()
    }

    /// The live bridge serving `device_path`, if any
    pub fn bridge_for_device(&mut self, device_path: &str) -> Option<&Bridge> {
        self.live_bridges()
            .into_iter()
            .find(|bridge| bridge.device_path() == device_path)
    }

    /// Next free port from the configured base, if any is left
    pub fn next_port(&mut self) -> Option<u16> {
        let base = self.base_port;
        next_available_port(base, self.occupied_ports())
    }

    /// Bridge `device` on `port`
    ///
    /// Rejected if a live bridge already holds the device or the port.
    /// A bridge that fails to start is not kept.
    pub fn create_and_start(&mut self, device: &Device, port: u16) -> Result<&Bridge, BridgeError> {
        if let Some(existing_port) = self.bridge_for_device(&device.path).map(Bridge::tcp_port) {
            return Err(BridgeError::AlreadyBridged {
                device: device.path.clone(),
                port: existing_port,
            });
        }
        if self.occupied_ports().contains(&port) {
            return Err(BridgeError::PortInUse(port));
        }

        let mut bridge = Bridge::new(
            device.path.clone(),
            port,
            device.identity.clone(),
            self.config.clone(),
        );
        bridge.start(self.forwarder.as_ref(), self.registrar.as_deref())?;

        self.bridges.push(bridge);
        Ok(&self.bridges[self.bridges.len() - 1])
    }

    /// Stop every bridge, live or not, and forget them all
    pub async fn stop_all(&mut self) {
        if !self.bridges.is_empty() {
            info!("Stopping {} bridge(s)", self.bridges.len());
        }
        for bridge in &mut self.bridges {
            bridge.stop().await;
        }
        self.bridges.clear();
    }
}

impl std::fmt::Debug for BridgeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeRegistry")
            .field("bridges", &self.bridges)
            .field("forwarder", &self.forwarder.program())
            .field("announces", &self.announces())
            .field("base_port", &self.base_port)
            .finish()
    }
}
