//! Error types for device detection

use thiserror::Error;

/// Errors that can occur during detection
#[derive(Debug, Error)]
pub enum DetectError {
    /// A device glob pattern could not be parsed
    #[error("invalid device pattern {pattern}: {reason}")]
    InvalidGlob { pattern: String, reason: String },

    /// An exclusion regex could not be compiled
    #[error("invalid exclusion pattern {pattern}: {reason}")]
    InvalidExclusion { pattern: String, reason: String },

    /// The identification client could not be started
    #[error("failed to open identification session on {path}: {reason}")]
    SessionOpen { path: String, reason: String },

    /// The identification session ended without yielding a node number
    #[error("identification handshake failed on {path}: {reason}")]
    HandshakeFailed { path: String, reason: String },
}
