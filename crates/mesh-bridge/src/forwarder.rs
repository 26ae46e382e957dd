//! Serial-to-TCP forwarding processes
//!
//! The forwarding itself is done by an external tool; this module knows how
//! to prepare the serial line, launch the tool, and shut it down.

use std::process::Stdio;
use std::time::Duration;

use serialport::{DataBits, FlowControl, Parity, StopBits};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, trace, warn};

use crate::error::BridgeError;

/// Launches the process that forwards a TCP listener to a serial device
pub trait Forwarder: Send + Sync {
    /// Program name, for log and error messages
    fn program(&self) -> &str;

    /// Put the serial line into the state the forwarder expects
    fn configure_line(&self, device_path: &str, baud_rate: u32) -> Result<(), BridgeError>;

    /// Start forwarding `tcp_port` to `device_path`
    ///
    /// The child should be spawned with piped output and `kill_on_drop`.
    fn spawn(&self, device_path: &str, tcp_port: u16) -> Result<Child, BridgeError>;
}

/// Forwarder backed by `socat`
#[derive(Debug, Clone)]
pub struct Socat {
    program: String,
}

impl Socat {
    pub fn new() -> Self {
        Self::with_program("socat")
    }

    /// Use a different socat binary
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Arguments for a `TCP-LISTEN` <-> device bridge
    pub fn args(device_path: &str, tcp_port: u16) -> Vec<String> {
        vec![
            "-d".to_string(),
            "-d".to_string(),
            format!("TCP-LISTEN:{},reuseaddr,fork", tcp_port),
            format!("OPEN:{},nonblock=1", device_path),
        ]
    }
}

impl Default for Socat {
    fn default() -> Self {
        Self::new()
    }
}

impl Forwarder for Socat {
    fn program(&self) -> &str {
        &self.program
    }

    fn configure_line(&self, device_path: &str, baud_rate: u32) -> Result<(), BridgeError> {
        // Opening the port applies raw mode with echo off; the settings stay
        // on the tty after the handle is dropped
        serialport::new(device_path, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(Duration::from_millis(100))
            .open()
            .map(drop)
            .map_err(|e| BridgeError::LineConfig {
                device: device_path.to_string(),
                reason: e.to_string(),
            })
    }

    fn spawn(&self, device_path: &str, tcp_port: u16) -> Result<Child, BridgeError> {
        debug!(
            "Spawning {} for {} on port {}",
            self.program, device_path, tcp_port
        );

        Command::new(&self.program)
            .args(Self::args(device_path, tcp_port))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| BridgeError::Spawn {
                program: self.program.clone(),
                source,
            })
    }
}

/// Forward a child's output into the log so the pipes never fill up
pub fn drain_output(child: &mut Child, tcp_port: u16) {
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(log_lines(stdout, tcp_port));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(log_lines(stderr, tcp_port));
    }
}

async fn log_lines<R: AsyncRead + Unpin>(stream: R, tcp_port: u16) {
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(port = tcp_port, "{}", line);
    }
    trace!(port = tcp_port, "forwarder output closed");
}

/// Ask a child to exit, give it `grace` to do so, then kill it
pub async fn shutdown_child(child: &mut Child, grace: Duration) {
    if !matches!(child.try_wait(), Ok(None)) {
        return;
    }

    request_termination(child).await;

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => debug!("Forwarder exited: {}", status),
        Ok(Err(e)) => warn!("Failed waiting for forwarder: {}", e),
        Err(_) => {
            warn!("Forwarder did not exit within {:?}, killing", grace);
            if let Err(e) = child.kill().await {
                warn!("Failed to kill forwarder: {}", e);
            }
        }
    }
}

/// SIGTERM via `kill`, falling back to a hard kill where that fails
async fn request_termination(child: &mut Child) {
    let Some(pid) = child.id() else {
        return;
    };

    let sent = Command::new("kill")
        .args(["-TERM", &pid.to_string()])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|status| status.success())
        .unwrap_or(false);

    if !sent {
        warn!("SIGTERM to {} failed, killing", pid);
        if let Err(e) = child.start_kill() {
            warn!("Failed to kill {}: {}", pid, e);
        }
    }
}
