//! Unattended mode: bridge the first identified device and keep it up
//! until interrupted.

use std::process::ExitCode;
use std::time::Duration;

use colored::Colorize;
use mesh_detect::Device;
use thiserror::Error;
use tracing::warn;

use crate::app::App;
use crate::display;

/// Why unattended mode found nothing to bridge
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NoDevice {
    #[error("No serial devices found.")]
    NoneFound,
    #[error("No devices with valid node IDs found.")]
    NoneIdentified,
}

/// The first identified device, in scan order
pub fn select_device(devices: &[Device]) -> Result<&Device, NoDevice> {
    if devices.is_empty() {
        return Err(NoDevice::NoneFound);
    }
    devices
        .iter()
        .find(|device| device.is_identified())
        .ok_or(NoDevice::NoneIdentified)
}

pub async fn run(app: &mut App) -> ExitCode {
    println!("{}\n", "🚀 YOLO MODE ACTIVE 🚀".cyan().bold());

    let bridged = app.registry.occupied_device_paths();
    let devices = app.scanner.scan(&bridged).await;

    let device = match select_device(&devices) {
        Ok(device) => device,
        Err(e) => {
            display::error(&e.to_string());
            if e == NoDevice::NoneIdentified && !app.capabilities.identification {
                println!("Identification needs the meshtastic CLI: pip install meshtastic");
            }
            return ExitCode::FAILURE;
        }
    };

    let port = app.registry.base_port();
    display::success(&format!(
        "\nAuto-bridging device: {}",
        display::device_label(device)
    ));
    display::progress(&format!("Starting bridge on port {}...", port));
    match app.registry.create_and_start(device, port) {
        Ok(bridge) => {
            display::success("\n✓ Bridge started successfully!");
            display::connection_details(device, bridge);
        }
        Err(e) => {
            display::error(&format!("Failed to start bridge: {}", e));
            return ExitCode::FAILURE;
        }
    }

    println!("\n{}", "Bridge running. Press Ctrl+C to stop.".cyan());

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    let mut reported = false;
    loop {
        ticker.tick().await;
        if app.registry.live_bridges().is_empty() && !reported {
            warn!("Bridge for {} exited", device.path);
            display::error("Bridge process exited. Press Ctrl+C to quit.");
            reported = true;
        }
    }
}
