//! Identification sessions against Meshtastic nodes
//!
//! An identification client opens a session on a serial device and reports
//! whatever it has learned so far about the node on the other end. The
//! [`DeviceProber`](crate::probe::DeviceProber) drives the polling policy;
//! this module only deals with getting fields out of the client.
//!
//! The bundled client shells out to the `meshtastic` Python CLI, which
//! performs the firmware handshake and prints the node's owner and
//! `myInfo` record.

use std::future::Future;
use std::process::Stdio;

use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::error::DetectError;

/// Fields a node has reported so far. Every field may still be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeReport {
    /// Numeric node number from `myInfo`
    pub node_num: Option<u32>,
    /// Owner long name
    pub long_name: Option<String>,
    /// Owner short name
    pub short_name: Option<String>,
}

impl NodeReport {
    /// Best available owner name: long name first, then short name
    pub fn owner(&self) -> Option<&str> {
        fn non_empty(s: &Option<String>) -> Option<&str> {
            s.as_deref().filter(|s| !s.is_empty())
        }
        non_empty(&self.long_name).or_else(|| non_empty(&self.short_name))
    }
}

/// Opens identification sessions on serial devices
pub trait IdentifyClient: Send + Sync {
    type Session: IdentifySession;

    /// Start a session on the device. Must not block waiting for the node.
    fn open(&self, device_path: &str) -> Result<Self::Session, DetectError>;
}

/// A running identification session
pub trait IdentifySession: Send {
    /// Snapshot of what has been learned so far
    ///
    /// Returns an error once the session can no longer produce a node number.
    fn poll(&mut self) -> Result<NodeReport, DetectError>;

    /// Tear the session down and release the serial line
    fn close(self) -> impl Future<Output = ()> + Send;
}

/// Identification client backed by the `meshtastic` CLI
#[derive(Debug, Clone)]
pub struct MeshtasticCli {
    program: String,
}

impl MeshtasticCli {
    pub fn new() -> Self {
        Self::with_program("meshtastic")
    }

    /// Use a different executable (e.g. a virtualenv path)
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for MeshtasticCli {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentifyClient for MeshtasticCli {
    type Session = CliSession;

    fn open(&self, device_path: &str) -> Result<CliSession, DetectError> {
        debug!("Starting {} --info on {}", self.program, device_path);

        let mut child = Command::new(&self.program)
            .args(["--port", device_path, "--info"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DetectError::SessionOpen {
                path: device_path.to_string(),
                reason: e.to_string(),
            })?;

        let stdout = child.stdout.take().ok_or_else(|| DetectError::SessionOpen {
            path: device_path.to_string(),
            reason: "stdout not captured".to_string(),
        })?;

        let (tx, report) = watch::channel(NodeReport::default());
        let reader = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                trace!("meshtastic: {}", line);
                tx.send_modify(|r| apply_info_line(r, &line));
            }
        });

        Ok(CliSession {
            path: device_path.to_string(),
            child,
            reader,
            report,
        })
    }
}

/// Session over a running `meshtastic --info` process
pub struct CliSession {
    path: String,
    child: Child,
    reader: JoinHandle<()>,
    report: watch::Receiver<NodeReport>,
}

impl IdentifySession for CliSession {
    fn poll(&mut self) -> Result<NodeReport, DetectError> {
        // check for end of output first so fields sent just before EOF are
        // still in the snapshot
        let finished = self.reader.is_finished();
        let report = self.report.borrow().clone();

        if report.node_num.is_none() && finished {
            let reason = match self.child.try_wait() {
                Ok(Some(status)) => format!("client exited ({})", status),
                _ => "client closed its output".to_string(),
            };
            return Err(DetectError::HandshakeFailed {
                path: self.path.clone(),
                reason,
            });
        }

        Ok(report)
    }

    async fn close(mut self) {
        self.reader.abort();
        if let Err(e) = self.child.kill().await {
            trace!("meshtastic client on {} already gone: {}", self.path, e);
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MyInfo {
    my_node_num: Option<u32>,
}

/// Fold one line of `meshtastic --info` output into the report
fn apply_info_line(report: &mut NodeReport, line: &str) {
    let line = line.trim();

    if let Some(rest) = line.strip_prefix("Owner:") {
        let (long, short) = split_owner(rest.trim());
        report.long_name = long;
        report.short_name = short;
    } else if let Some(rest) = line.strip_prefix("My info:") {
        match serde_json::from_str::<MyInfo>(rest.trim()) {
            // node number 0 means the radio hasn't been assigned one yet
            Ok(info) => report.node_num = info.my_node_num.filter(|n| *n != 0),
            Err(e) => trace!("Unparseable myInfo: {}", e),
        }
    }
}

/// Split `Long Name (SN)` into its parts
fn split_owner(owner: &str) -> (Option<String>, Option<String>) {
    let non_empty = |s: &str| {
        let s = s.trim();
        (!s.is_empty()).then(|| s.to_string())
    };

    match owner
        .strip_suffix(')')
        .and_then(|rest| rest.rsplit_once(" ("))
    {
        Some((long, short)) => (non_empty(long), non_empty(short)),
        None => (non_empty(owner), None),
    }
}
