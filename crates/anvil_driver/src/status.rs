//! On-disk engine directory layout and compile status files.
//!
//! Everything the engine persists for one workspace lives under `.anvil/`:
//!
//! - `caches/<backend>/` — per-backend dependency graph and validity state
//! - `generated/<backend>/` — backend-generated sources, never deleted
//!   automatically
//! - `monitor.json` — the file monitor's durable records
//! - `rebuild_required` — marker: the next build must be a full rebuild
//!   regardless of incremental state; created on corruption, deleted at the
//!   start of the next successful full rebuild's commit
//! - `version.dat` — cache format version of the last writer
//! - `in_progress` — lock present while a session runs; a leftover lock on
//!   open means the previous session crashed mid-build

use std::io;
use std::path::{Path, PathBuf};

/// Version of the persisted dependency format. Bump on breaking changes;
/// a mismatch forces a full rebuild.
pub const DEPENDENCY_FORMAT_VERSION: u32 = 1;

/// Name of the engine state directory under the workspace root.
const ENGINE_DIR: &str = ".anvil";
const CACHES_DIR: &str = "caches";
const GENERATED_DIR: &str = "generated";
const REBUILD_MARKER: &str = "rebuild_required";
const VERSION_FILE: &str = "version.dat";
const LOCK_FILE: &str = "in_progress";

/// Compile status read back from the engine directory on open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompileStatus {
    /// Format version recorded by the last writer; `None` when no version
    /// file exists yet (a fresh workspace).
    pub format_version: Option<u32>,
    /// Whether a session lock was left behind.
    pub in_progress: bool,
}

/// Paths of the engine's persistent state for one workspace.
#[derive(Debug, Clone)]
pub struct EngineDirs {
    root: PathBuf,
}

impl EngineDirs {
    /// The engine directory of a workspace.
    pub fn new(workspace_root: &Path) -> Self {
        Self {
            root: workspace_root.join(ENGINE_DIR),
        }
    }

    /// The engine state directory itself.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding per-backend cache stores.
    pub fn caches_dir(&self) -> PathBuf {
        self.root.join(CACHES_DIR)
    }

    /// Directory holding backend-generated sources.
    pub fn generated_dir(&self) -> PathBuf {
        self.root.join(GENERATED_DIR)
    }

    /// Generated-source directory of one backend.
    pub fn generated_dir_for(&self, backend: &str) -> PathBuf {
        self.generated_dir().join(backend)
    }

    /// Path of the rebuild marker file.
    pub fn rebuild_marker(&self) -> PathBuf {
        self.root.join(REBUILD_MARKER)
    }

    /// Returns `true` if a full rebuild is owed.
    pub fn rebuild_marker_exists(&self) -> bool {
        self.rebuild_marker().exists()
    }

    /// Persists the rebuild marker with the given reason.
    ///
    /// Written before any recovery work starts so that a crash before the
    /// rebuild completes still owes one on the next launch.
    pub fn write_rebuild_marker(&self, reason: &str) -> io::Result<()> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::write(self.rebuild_marker(), reason)
    }

    /// Reads the recorded rebuild reason, if a marker exists.
    pub fn rebuild_reason(&self) -> Option<String> {
        std::fs::read_to_string(self.rebuild_marker()).ok()
    }

    /// Removes the rebuild marker after a successful full rebuild.
    pub fn clear_rebuild_marker(&self) -> io::Result<()> {
        match std::fs::remove_file(self.rebuild_marker()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Reads the compile status left by the previous session.
    ///
    /// Returns `None` when the version file exists but cannot be read; that
    /// is treated like corruption by the driver.
    pub fn read_status(&self) -> Option<CompileStatus> {
        let in_progress = self.root.join(LOCK_FILE).exists();
        let version_path = self.root.join(VERSION_FILE);
        let format_version = match std::fs::read(&version_path) {
            Ok(bytes) => {
                let bytes: [u8; 4] = bytes.try_into().ok()?;
                Some(u32::from_le_bytes(bytes))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(_) => return None,
        };
        Some(CompileStatus {
            format_version,
            in_progress,
        })
    }

    /// Writes the compile status for the running session.
    ///
    /// The lock file is created while `in_progress` and removed otherwise;
    /// its presence on the next open means this session never completed.
    pub fn write_status(&self, in_progress: bool) -> io::Result<()> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::write(
            self.root.join(VERSION_FILE),
            DEPENDENCY_FORMAT_VERSION.to_le_bytes(),
        )?;
        let lock = self.root.join(LOCK_FILE);
        if in_progress {
            std::fs::write(lock, b"")
        } else {
            match std::fs::remove_file(lock) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e),
            }
        }
    }
}
