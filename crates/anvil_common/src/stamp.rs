//! File modification stamps used for change detection.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::Metadata;
use std::io;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// A file modification timestamp in nanoseconds since the Unix epoch.
///
/// Stamps are compared to decide whether a source file changed since it was
/// last compiled. A file whose on-disk stamp is newer than the recorded stamp
/// is dirty even if the change was never observed live, which is what makes
/// change detection survive process restarts.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FileStamp(u64);

impl FileStamp {
    /// The zero stamp, older than any real file.
    pub const ZERO: FileStamp = FileStamp(0);

    /// Creates a stamp from raw nanoseconds since the epoch.
    pub fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Returns the raw nanoseconds since the epoch.
    pub fn as_nanos(self) -> u64 {
        self.0
    }

    /// Reads the modification stamp of a file from disk.
    pub fn of_path(path: &Path) -> io::Result<Self> {
        Ok(Self::of_metadata(&std::fs::metadata(path)?))
    }

    /// Extracts the modification stamp from already-read metadata.
    pub fn of_metadata(metadata: &Metadata) -> Self {
        let mtime = metadata.modified().unwrap_or(UNIX_EPOCH);
        Self::of_system_time(mtime)
    }

    /// The current wall-clock time as a stamp.
    ///
    /// Used as the session start stamp: files modified at or after it are
    /// treated as not yet compiled by the running session.
    pub fn now() -> Self {
        Self::of_system_time(SystemTime::now())
    }

    fn of_system_time(time: SystemTime) -> Self {
        let nanos = time
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        Self(nanos)
    }
}

impl fmt::Debug for FileStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileStamp({})", self.0)
    }
}
