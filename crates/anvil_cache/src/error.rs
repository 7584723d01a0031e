//! Error types for cache operations.

use std::path::PathBuf;

/// Errors that can occur during cache operations.
///
/// The taxonomy deliberately separates [`Corrupted`](CacheError::Corrupted)
/// from [`Io`](CacheError::Io): corruption means the cached state cannot be
/// trusted and a full rebuild is mandatory, while an I/O error on read may be
/// transient. An I/O error during a commit is escalated to the same handling
/// as corruption by the driver, since a partially applied commit leaves the
/// on-disk state unknown.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// An I/O error occurred while reading or writing cache files.
    #[error("cache I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Persisted cache state failed validation and cannot be trusted.
    ///
    /// Raised for missing magic bytes, format version mismatches, checksum
    /// mismatches, truncation, and deserialization failures. The only safe
    /// reaction is to discard the cache and schedule a full rebuild.
    #[error("cache corrupted at {path}: {reason}")]
    Corrupted {
        /// The artifact file that failed validation.
        path: PathBuf,
        /// Description of the validation failure.
        reason: String,
    },

    /// A serialization error occurred while preparing state for disk.
    #[error("cache serialization error: {reason}")]
    Serialization {
        /// Description of the serialization failure.
        reason: String,
    },
}

impl CacheError {
    /// Returns `true` if this error means the cache cannot be trusted.
    pub fn is_corruption(&self) -> bool {
        matches!(self, CacheError::Corrupted { .. })
    }

    /// Convenience constructor for I/O errors.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CacheError::Io {
            path: path.into(),
            source,
        }
    }

    /// Convenience constructor for corruption errors.
    pub fn corrupted(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        CacheError::Corrupted {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
