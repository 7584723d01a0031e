//! Error types for build orchestration.

use anvil_backend::RegistryError;
use anvil_cache::CacheError;
use anvil_monitor::MonitorError;

/// Errors surfaced by the build manager's entry points.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// A build session is already running in this workspace.
    ///
    /// The compilation-active flag is the mutual-exclusion gate for one
    /// workspace; a second `make`/`compile`/`rebuild` receives this
    /// deterministic signal instead of corrupting shared cache state.
    #[error("a build is already running in this workspace")]
    AlreadyRunning,

    /// A backend rejected the configuration before any file was touched.
    #[error("configuration rejected by backend `{backend}`: {reason}")]
    Configuration {
        /// The rejecting backend.
        backend: String,
        /// The rejection reason.
        reason: String,
    },

    /// Backend registration failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// A cache operation failed.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Monitor state could not be persisted.
    #[error(transparent)]
    Monitor(#[from] MonitorError),

    /// An I/O error outside the cache layer.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: std::path::PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },
}
