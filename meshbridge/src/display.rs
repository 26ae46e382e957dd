//! Terminal output for the menu and unattended mode

use colored::Colorize;
use mesh_bridge::{Bridge, BridgeRegistry};
use mesh_detect::Device;

pub fn header() {
    println!();
    println!("{}", "╔════════════════════════════════════════╗".cyan().bold());
    println!("{}", "║    Meshtastic Serial Bridge Manager    ║".cyan().bold());
    println!("{}", "╚════════════════════════════════════════╝".cyan().bold());
    println!();
}

/// A missing optional subsystem, with how to get it
pub fn note(message: &str, hint: &str) {
    println!("{}", format!("Note: {}", message).yellow());
    println!("Install with: {}", hint);
    println!();
}

pub fn error(message: &str) {
    println!("{}", message.red());
}

pub fn progress(message: &str) {
    println!("{}", message.yellow());
}

pub fn success(message: &str) {
    println!("{}", message.green());
}

/// Device as shown in lists: path, then node identity and description
pub fn device_label(device: &Device) -> String {
    let mut extras = Vec::new();
    if let Some(identity) = &device.identity {
        extras.push(identity.to_string().green().to_string());
    }
    if !device.description.is_empty() {
        extras.push(device.description.clone());
    }

    if extras.is_empty() {
        device.path.clone()
    } else {
        format!("{} ({})", device.path, extras.join(", "))
    }
}

/// Numbered list entry for a device, flagged if already bridged
pub fn device_entry(index: usize, device: &Device, bridged_port: Option<u16>) {
    let number = format!("[{}]", index).cyan();
    match bridged_port {
        Some(port) => println!(
            "  {} {} {}",
            number,
            device_label(device),
            format!("[Bridge active on port {}]", port).green()
        ),
        None => println!("  {} {}", number, device_label(device)),
    }
}

/// Bridges currently running, in creation order
pub fn bridges(registry: &mut BridgeRegistry) {
    let live = registry.live_bridges();
    if live.is_empty() {
        return;
    }

    println!("{}", "Active Bridges:".bold());
    for (i, bridge) in live.iter().enumerate() {
        let node = bridge
            .identity()
            .map(|identity| format!(" ({})", identity.to_string().green()))
            .unwrap_or_default();
        println!(
            "  {} {}{} → TCP port {}",
            format!("[{}]", i + 1).green(),
            bridge.device_path(),
            node,
            bridge.tcp_port()
        );
    }
    println!();
}

/// Where to connect to a freshly started bridge
pub fn connection_details(device: &Device, bridge: &Bridge) {
    println!();
    println!("{}", "Connection details:".bold());
    println!("  Device: {}", device_label(device));
    println!("  TCP Port: {}", bridge.tcp_port());
    println!("  Connect to: localhost:{}", bridge.tcp_port());

    if bridge.is_announced() {
        if let Some(hostname) = bridge.mdns_hostname() {
            println!("  mDNS: {}:{}", hostname, bridge.tcp_port());
        }
    }
}

pub fn option(key: &str, label: &str) {
    println!("  {} {}", format!("[{}]", key).cyan(), label);
}
