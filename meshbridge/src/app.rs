//! Wiring between the scanner, the bridge registry and the optional
//! subsystems

use std::sync::Arc;

use mesh_bridge::{
    require_forwarder, tool_available, BridgeRegistry, Capabilities, MdnsRegistrar, Registrar,
    Socat,
};
use mesh_detect::{DeviceProber, DeviceScanner, MeshtasticCli};
use tracing::info;

use crate::display;
use crate::settings::Settings;

/// Everything the command loops operate on
pub struct App {
    pub scanner: DeviceScanner<MeshtasticCli>,
    pub registry: BridgeRegistry,
    pub capabilities: Capabilities,
    mdns: Option<MdnsRegistrar>,
}

impl App {
    /// Check external tools and build the scanner and registry
    ///
    /// Fails only when the forwarder is missing or the scan policy is
    /// invalid; optional subsystems are switched off with a note.
    pub async fn setup(settings: &Settings) -> anyhow::Result<Self> {
        require_forwarder(&settings.socat_program).await?;

        let mut capabilities = Capabilities::none();

        if settings.probe_enabled {
            capabilities.identification =
                tool_available(&settings.meshtastic_program, "--version").await;
            if !capabilities.identification {
                display::note(
                    "meshtastic CLI not found - device names will not be shown",
                    "pip install meshtastic",
                );
            }
        }

        let mdns = if settings.mdns_enabled {
            match MdnsRegistrar::new() {
                Ok(registrar) => Some(registrar),
                Err(e) => {
                    display::note(
                        &format!("mDNS unavailable ({}) - announcements disabled", e),
                        "check that multicast is permitted on this host",
                    );
                    None
                }
            }
        } else {
            None
        };
        capabilities.registrar = mdns.is_some();

        info!("Capabilities: {:?}", capabilities);

        let client = capabilities
            .identification
            .then(|| MeshtasticCli::with_program(&settings.meshtastic_program));
        let prober = DeviceProber::with_config(client, settings.probe_config());
        let scanner = DeviceScanner::with_policy(settings.scan_policy(), prober)?;

        let registrar = mdns
            .clone()
            .map(|registrar| Arc::new(registrar) as Arc<dyn Registrar>);
        let registry = BridgeRegistry::new(
            Arc::new(Socat::with_program(&settings.socat_program)),
            registrar,
        )
        .with_config(settings.bridge_config())
        .with_base_port(settings.base_port);

        Ok(Self {
            scanner,
            registry,
            capabilities,
            mdns,
        })
    }

    /// Stop every bridge and the mDNS responder
    pub async fn shutdown(&mut self) {
        self.registry.stop_all().await;
        if let Some(mdns) = self.mdns.take() {
            mdns.shutdown();
        }
    }
}
