//! Discovered devices and node identities

use std::fmt;

/// Identity reported by a Meshtastic node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIdentity {
    /// Node ID in the `!xxxxxxxx` form
    pub node_id: String,
    /// Owner / display name, if the node reported one
    pub owner: Option<String>,
}

impl NodeIdentity {
    /// Build an identity from the numeric node number
    pub fn from_node_num(node_num: u32, owner: Option<String>) -> Self {
        Self {
            node_id: format_node_id(node_num),
            owner,
        }
    }

    /// Last four hex digits of the node ID, used for hostnames
    ///
    /// `!3c7f9d4e` becomes `9d4e`.
    pub fn short_id(&self) -> &str {
        let bare = self.node_id.trim_start_matches('!');
        match bare.char_indices().rev().nth(3) {
            Some((start, _)) => &bare[start..],
            None => bare,
        }
    }
}

impl fmt::Display for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.owner {
            Some(owner) => write!(f, "{} ({})", self.node_id, owner),
            None => write!(f, "{}", self.node_id),
        }
    }
}

/// Render a node number the way Meshtastic does (`!` + 8 hex digits)
pub fn format_node_id(node_num: u32) -> String {
    format!("!{:08x}", node_num)
}

/// A candidate serial device found during a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    /// Device file path (e.g., /dev/ttyUSB0, /dev/cu.usbmodem1101)
    pub path: String,
    /// Transport class guessed from the path
    pub description: String,
    /// Identity learned by probing, if any
    pub identity: Option<NodeIdentity>,
}

impl Device {
    pub fn new(path: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            description: description.into(),
            identity: None,
        }
    }

    /// Whether a probe identified this device
    pub fn is_identified(&self) -> bool {
        self.identity.is_some()
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut extras = Vec::new();
        if let Some(identity) = &self.identity {
            extras.push(identity.to_string());
        }
        if !self.description.is_empty() {
            extras.push(self.description.clone());
        }

        if extras.is_empty() {
            write!(f, "{}", self.path)
        } else {
            write!(f, "{} ({})", self.path, extras.join(", "))
        }
    }
}
