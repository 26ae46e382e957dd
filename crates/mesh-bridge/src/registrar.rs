//! mDNS service announcement for bridges

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;

use mdns_sd::{ServiceDaemon, ServiceInfo};
use mesh_detect::NodeIdentity;
use tracing::{debug, info};

use crate::error::BridgeError;

/// Service type Meshtastic clients browse for
pub const SERVICE_TYPE: &str = "_meshtastic._tcp.local.";

/// A service record to publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRecord {
    pub service_type: String,
    pub instance_name: String,
    /// Fully qualified host name, ending in `.local.`
    pub host_name: String,
    pub address: IpAddr,
    pub port: u16,
    pub properties: Vec<(String, String)>,
}

impl ServiceRecord {
    /// Record for a bridge to a known node
    pub fn for_bridge(
        identity: &NodeIdentity,
        device_path: &str,
        address: IpAddr,
        port: u16,
    ) -> Self {
        let instance_name = instance_name(identity);
        Self {
            service_type: SERVICE_TYPE.to_string(),
            host_name: format!("{}.local.", instance_name),
            instance_name,
            address,
            port,
            properties: vec![
                ("node_id".to_string(), identity.node_id.clone()),
                ("device".to_string(), device_path.to_string()),
            ],
        }
    }
}

/// `meshtastic_<last 4 hex digits>`
pub fn instance_name(identity: &NodeIdentity) -> String {
    format!("meshtastic_{}", identity.short_id())
}

/// Publishes service records on the local network
pub trait Registrar: Send + Sync {
    /// Address to advertise for this host
    fn local_address(&self) -> Result<IpAddr, BridgeError> {
        local_ip_address::local_ip().map_err(|e| BridgeError::Registration(e.to_string()))
    }

    fn register(&self, record: &ServiceRecord) -> Result<Box<dyn Registration>, BridgeError>;
}

/// A published record; dropping it without unregistering leaves it up
/// until the registrar shuts down
///
/// `unregister` may block, so async callers run it on the blocking pool.
pub trait Registration: Send {
    fn unregister(self: Box<Self>) -> Result<(), BridgeError>;
}

/// Registrar backed by an in-process mDNS responder
#[derive(Clone)]
pub struct MdnsRegistrar {
    daemon: ServiceDaemon,
}

impl MdnsRegistrar {
    /// Start the responder
    pub fn new() -> Result<Self, BridgeError> {
        Ok(Self {
            daemon: ServiceDaemon::new()?,
        })
    }

    /// Stop the responder thread
    pub fn shutdown(&self) {
        if let Err(e) = self.daemon.shutdown() {
            debug!("mDNS daemon shutdown: {}", e);
        }
    }
}

impl Registrar for MdnsRegistrar {
    fn register(&self, record: &ServiceRecord) -> Result<Box<dyn Registration>, BridgeError> {
        let properties: HashMap<String, String> = record.properties.iter().cloned().collect();
        let info = ServiceInfo::new(
            &record.service_type,
            &record.instance_name,
            &record.host_name,
            record.address,
            record.port,
            properties,
        )?;
        let fullname = info.get_fullname().to_string();

        self.daemon.register(info)?;
        info!(
            "Announced {} at {}:{}",
            fullname, record.address, record.port
        );

        Ok(Box::new(MdnsRegistration {
            daemon: self.daemon.clone(),
            fullname,
        }))
    }
}

struct MdnsRegistration {
    daemon: ServiceDaemon,
    fullname: String,
}

impl Registration for MdnsRegistration {
    fn unregister(self: Box<Self>) -> Result<(), BridgeError> {
        let receiver = self.daemon.unregister(&self.fullname)?;
        // wait briefly for the goodbye packet so peers drop the record
        match receiver.recv_timeout(Duration::from_secs(1)) {
            Ok(status) => debug!("Unregistered {}: {:?}", self.fullname, status),
            Err(e) => debug!("No unregister confirmation for {}: {}", self.fullname, e),
        }
        Ok(())
    }
}
