//! Bounded-time identification of serial devices
//!
//! Identification is advisory: a device that cannot be identified is still
//! offered for bridging, just without a name. Every failure therefore ends
//! up as `None` rather than an error.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::device::NodeIdentity;
use crate::identify::{IdentifyClient, IdentifySession};

/// Configuration for probing
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeConfig {
    /// Give up on a device after this long
    pub timeout: Duration,
    /// How often to check the session for new fields
    pub poll_interval: Duration,
    /// Once the node ID is known, wait at most this long (from session
    /// start) for an owner name before settling for the bare ID
    pub owner_grace: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(200),
            owner_grace: Duration::from_secs(5),
        }
    }
}

/// Node prober
///
/// Without a client, identification is unavailable and every probe returns
/// `None` immediately without touching the device.
pub struct DeviceProber<C> {
    config: ProbeConfig,
    client: Option<C>,
}

impl<C: IdentifyClient> DeviceProber<C> {
    /// Create a prober with default configuration
    pub fn new(client: Option<C>) -> Self {
        Self::with_config(client, ProbeConfig::default())
    }

    /// Create a prober with custom configuration
    pub fn with_config(client: Option<C>, config: ProbeConfig) -> Self {
        Self { config, client }
    }

    /// Prober that never attempts identification
    pub fn disabled() -> Self {
        Self::new(None)
    }

    /// Whether probes will actually talk to devices
    pub fn is_enabled(&self) -> bool {
        self.client.is_some()
    }

    /// Try to learn the node identity behind `device_path`
    pub async fn probe(&self, device_path: &str) -> Option<NodeIdentity> {
        let client = self.client.as_ref()?;

        let mut session = match client.open(device_path) {
            Ok(session) => session,
            Err(e) => {
                warn!("Could not probe {}: {}", device_path, e);
                return None;
            }
        };

        let result = self.wait_for_identity(device_path, &mut session).await;

        // the bridge subprocess needs the line next, so always release it
        session.close().await;

        match &result {
            Some(identity) => info!("Identified {} as {}", device_path, identity),
            None => debug!("No identity for {}", device_path),
        }
        result
    }

    async fn wait_for_identity<S: IdentifySession>(
        &self,
        device_path: &str,
        session: &mut S,
    ) -> Option<NodeIdentity> {
        let started = Instant::now();

        loop {
            match session.poll() {
                Ok(report) => {
                    if let Some(node_num) = report.node_num {
                        if let Some(owner) = report.owner() {
                            return Some(NodeIdentity::from_node_num(
                                node_num,
                                Some(owner.to_string()),
                            ));
                        }
                        if started.elapsed() > self.config.owner_grace {
                            debug!("No owner from {} within grace window", device_path);
                            return Some(NodeIdentity::from_node_num(node_num, None));
                        }
                    }
                }
                Err(e) => {
                    debug!("Probe of {} failed: {}", device_path, e);
                    return None;
                }
            }

            if started.elapsed() >= self.config.timeout {
                debug!("Probe of {} timed out", device_path);
                return None;
            }

            tokio::time::sleep(self.config.poll_interval).await;
        }
    }
}
