//! Error types for monitor persistence.

use std::path::PathBuf;

/// Errors that can occur while persisting monitor state.
///
/// Loading is fail-safe and does not use this type: unreadable state
/// degrades to an empty monitor with a rebuild owed, because the monitor can
/// always be reconstructed from a cold scan. Saving, in contrast, is part of
/// the session commit and its failure is escalated by the driver.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// An I/O error occurred while writing monitor state.
    #[error("monitor I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Monitor state could not be serialized.
    #[error("monitor serialization error: {reason}")]
    Serialization {
        /// Description of the failure.
        reason: String,
    },
}
