//! meshbridge - expose USB-attached Meshtastic radios as TCP sockets
//!
//! Finds serial devices, asks each one for its node ID, and runs one
//! socat forwarder per chosen device. Identified bridges are announced
//! over mDNS so clients on the LAN can find them by node.
//!
//! Two modes:
//! - interactive menu (default)
//! - `--yolo` / `--unattended`: bridge the first identified device on the
//!   base port and run until interrupted

mod app;
mod cli;
mod display;
mod menu;
mod settings;
mod unattended;

use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::App;
use crate::cli::Cli;
use crate::settings::Settings;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr so they don't interleave with the menu on stdout
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_filter().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut settings = match Settings::load(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            display::error(&format!("{:#}", e));
            return ExitCode::FAILURE;
        }
    };
    settings.apply_cli(&cli);
    info!("Settings: {:?}", settings);

    let mut app = match App::setup(&settings).await {
        Ok(app) => app,
        Err(e) => {
            display::error(&format!("Error: {:#}", e));
            return ExitCode::FAILURE;
        }
    };

    let code = tokio::select! {
        code = run_mode(&mut app, cli.yolo) => code,
        _ = tokio::signal::ctrl_c() => {
            println!("\n\n{}", "Shutting down bridges...".yellow());
            ExitCode::SUCCESS
        }
    };

    app.shutdown().await;
    display::success("Done.");
    code
}

async fn run_mode(app: &mut App, unattended: bool) -> ExitCode {
    if unattended {
        return unattended::run(app).await;
    }

    match menu::run(app).await {
        Ok(()) => {
            println!("\n{}", "Shutting down bridges...".yellow());
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Menu failed: {:#}", e);
            display::error(&format!("Error: {:#}", e));
            ExitCode::FAILURE
        }
    }
}
