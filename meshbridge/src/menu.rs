//! Interactive menu
//!
//! A plain request/response loop over stdin. Bridges are created and
//! stopped from here; shutdown on quit or Ctrl+C is handled by the caller.

use std::io::{BufRead, Write};

use colored::Colorize;
use mesh_bridge::Bridge;
use mesh_detect::{Device, ProbeProgress, ScanEntry, SkipReason};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::app::App;
use crate::display;

/// A menu selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice {
    Quit,
    Refresh,
    StopAll,
    /// Zero-based index into the device list
    Device(usize),
}

/// Rejected user input; nothing is changed and the menu re-prompts
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("Invalid option")]
    InvalidOption,
    #[error("Invalid device number")]
    InvalidDevice,
    #[error("Invalid port number")]
    InvalidPort,
}

pub fn parse_choice(input: &str, device_count: usize, can_stop: bool) -> Result<Choice, InputError> {
    let input = input.trim().to_lowercase();
    match input.as_str() {
        "q" => Ok(Choice::Quit),
        "r" => Ok(Choice::Refresh),
        "s" if can_stop => Ok(Choice::StopAll),
        s if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) => match s.parse::<usize>() {
            Ok(n) if (1..=device_count).contains(&n) => Ok(Choice::Device(n - 1)),
            _ => Err(InputError::InvalidDevice),
        },
        _ => Err(InputError::InvalidOption),
    }
}

/// Empty input takes the suggested port
pub fn parse_port(input: &str, default: u16) -> Result<u16, InputError> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(default);
    }
    match input.parse::<u16>() {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(InputError::InvalidPort),
    }
}

/// Line-oriented stdin
///
/// Lines are read on a dedicated thread so a pending read never holds up
/// runtime shutdown after Ctrl+C.
struct Input {
    lines: mpsc::UnboundedReceiver<String>,
}

impl Input {
    fn new() -> Self {
        let (tx, lines) = mpsc::unbounded_channel();
        std::thread::spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
        Self { lines }
    }

    /// Prompt and read one trimmed line; `None` on end of input
    async fn ask(&mut self, prompt: &str) -> anyhow::Result<Option<String>> {
        print!("{} ", prompt.bold());
        std::io::stdout().flush()?;
        Ok(self.lines.recv().await.map(|line| line.trim().to_string()))
    }

    async fn pause(&mut self) -> anyhow::Result<()> {
        self.ask("\nPress Enter to continue...").await?;
        Ok(())
    }
}

/// Enumerate and probe devices, reporting progress as it goes
async fn scan_with_progress(app: &mut App) -> anyhow::Result<Vec<Device>> {
    let bridged = app.registry.occupied_device_paths();

    println!("{}", "Searching for serial devices...".bold());
    let mut devices = Vec::new();
    for entry in app.scanner.enumerate(&bridged) {
        match entry {
            ScanEntry::Found(device) => devices.push(device),
            ScanEntry::Skipped { path, reason } => match reason {
                SkipReason::Bridged => {
                    println!("  {}... {}", path, "skipped (bridge already active)".green())
                }
                SkipReason::Excluded => println!(
                    "  {}... {}",
                    path,
                    "skipped due to excluded pattern match".yellow()
                ),
                SkipReason::NotPreferred => {}
            },
        }
    }

    if app.scanner.prober().is_enabled() && !devices.is_empty() {
        display::progress("\nQuerying devices for node IDs...");
        app.scanner
            .identify_all(&mut devices, |event| match event {
                ProbeProgress::Started(device) => {
                    print!("  {}... ", device.path);
                    let _ = std::io::stdout().flush();
                }
                ProbeProgress::Finished(device) => match &device.identity {
                    Some(identity) => println!("{}", identity.to_string().green()),
                    None => println!("{}", "timeout".yellow()),
                },
            })
            .await;
        println!();
    }

    Ok(devices)
}

/// Run the menu until the user quits or stdin closes
pub async fn run(app: &mut App) -> anyhow::Result<()> {
    let mut input = Input::new();
    let mut devices = Vec::new();
    let mut need_scan = true;

    loop {
        display::header();
        display::bridges(&mut app.registry);

        if need_scan {
            devices = scan_with_progress(app).await?;
            need_scan = false;
        }

        if devices.is_empty() {
            display::progress("No serial devices found.");
            println!("\nMake sure your Meshtastic device is connected via USB.");
            println!("\n{}", "Options:".bold());
            display::option("r", "Refresh / search again");
            display::option("q", "Quit");

            let Some(answer) = input.ask("\nChoose an option:").await? else {
                return Ok(());
            };
            match parse_choice(&answer, 0, false) {
                Ok(Choice::Quit) => return Ok(()),
                Ok(Choice::Refresh) => need_scan = true,
                _ => display::error(&InputError::InvalidOption.to_string()),
            }
            continue;
        }

        println!("\n{}", format!("Found {} device(s):", devices.len()).bold());
        for (i, device) in devices.iter().enumerate() {
            let bridged_port = app
                .registry
                .bridge_for_device(&device.path)
                .map(Bridge::tcp_port);
            display::device_entry(i + 1, device, bridged_port);
        }

        let can_stop = !app.registry.is_empty();
        println!("\n{}", "Options:".bold());
        display::option(
            &format!("1-{}", devices.len()),
            "Create bridge for device",
        );
        if can_stop {
            display::option("s", "Stop all bridges");
        }
        display::option("r", "Refresh / search again");
        display::option("q", "Quit");

        let Some(answer) = input.ask("\nChoose an option:").await? else {
            return Ok(());
        };

        match parse_choice(&answer, devices.len(), can_stop) {
            Ok(Choice::Quit) => return Ok(()),
            Ok(Choice::Refresh) => need_scan = true,
            Ok(Choice::StopAll) => {
                display::progress("\nStopping all bridges...");
                app.registry.stop_all().await;
                need_scan = true;
                display::success("All bridges stopped.");
            }
            Ok(Choice::Device(index)) => {
                let device = devices[index].clone();
                if !bridge_device(app, &mut input, &device).await? {
                    return Ok(());
                }
            }
            Err(e) => display::error(&e.to_string()),
        }
    }
}

/// Ask for a port and start a bridge; false when input ended
async fn bridge_device(app: &mut App, input: &mut Input, device: &Device) -> anyhow::Result<bool> {
    if let Some(port) = app
        .registry
        .bridge_for_device(&device.path)
        .map(Bridge::tcp_port)
    {
        display::progress(&format!(
            "\nBridge already running for this device on port {}",
            port
        ));
        input.pause().await?;
        return Ok(true);
    }

    let Some(default_port) = app.registry.next_port() else {
        display::error("No free TCP port left above the base port");
        input.pause().await?;
        return Ok(true);
    };
    let Some(answer) = input
        .ask(&format!("\nTCP Port [{}]:", default_port))
        .await?
    else {
        return Ok(false);
    };

    let port = match parse_port(&answer, default_port) {
        Ok(port) => port,
        Err(e) => {
            display::error(&e.to_string());
            input.pause().await?;
            return Ok(true);
        }
    };

    display::progress("\nStarting bridge...");
    match app.registry.create_and_start(device, port) {
        Ok(bridge) => {
            display::success("\n✓ Bridge started successfully!");
            display::connection_details(device, bridge);
            println!(
                "\n{}",
                "Bridge is now active. Returning to menu...".cyan()
            );
        }
        Err(e) => {
            display::error(&format!("Failed to start bridge: {}", e));
            input.pause().await?;
        }
    }

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_choice("q", 2, true), Ok(Choice::Quit));
        assert_eq!(parse_choice(" R ", 2, true), Ok(Choice::Refresh));
        assert_eq!(parse_choice("s", 2, true), Ok(Choice::StopAll));
    }

    #[test]
    fn test_stop_needs_bridges() {
        assert_eq!(parse_choice("s", 2, false), Err(InputError::InvalidOption));
    }

    #[test]
    fn test_parse_device_numbers() {
        assert_eq!(parse_choice("1", 2, false), Ok(Choice::Device(0)));
        assert_eq!(parse_choice("2", 2, false), Ok(Choice::Device(1)));
        assert_eq!(parse_choice("0", 2, false), Err(InputError::InvalidDevice));
        assert_eq!(parse_choice("3", 2, false), Err(InputError::InvalidDevice));
        assert_eq!(parse_choice("x", 2, false), Err(InputError::InvalidOption));
        assert_eq!(parse_choice("", 2, false), Err(InputError::InvalidOption));
    }

    #[test]
    fn test_parse_port() {
        assert_eq!(parse_port("", 4403), Ok(4403));
        assert_eq!(parse_port(" 4500 ", 4403), Ok(4500));
        assert_eq!(parse_port("0", 4403), Err(InputError::InvalidPort));
        assert_eq!(parse_port("70000", 4403), Err(InputError::InvalidPort));
        assert_eq!(parse_port("abc", 4403), Err(InputError::InvalidPort));
    }
}
