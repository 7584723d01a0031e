//! Per-file monitor records.

use anvil_common::{BackendId, FileId, FileStamp};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One output produced from a source file, with the output root it landed
/// in. The root enables reverse queries and bulk invalidation after an
/// output directory move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedOutput {
    /// The output root the file was produced under.
    pub output_root: PathBuf,
    /// The produced file.
    pub path: PathBuf,
}

/// Durable bookkeeping for one source file.
///
/// Created the first time a file is observed under a watched root, updated
/// on every successful compile, removed when the file is deleted or leaves
/// the watched roots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    /// Stable id of the file, allocated once and never reused while the
    /// cache is alive.
    pub id: FileId,

    /// The backend that owns this file.
    pub backend: BackendId,

    /// The file's modification stamp at its last successful compile.
    /// `None` means the file has never been compiled successfully.
    pub last_compiled: Option<FileStamp>,

    /// Whether the file was generated by an earlier backend in the chain.
    pub generated: bool,

    /// The module owning the file, if the scope resolved one.
    pub module: Option<String>,

    /// Outputs recorded at the last successful compile.
    pub outputs: Vec<RecordedOutput>,
}

impl FileRecord {
    /// A fresh record for a file that has never been compiled.
    pub fn new(id: FileId, backend: BackendId) -> Self {
        Self {
            id,
            backend,
            last_compiled: None,
            generated: false,
            module: None,
            outputs: Vec::new(),
        }
    }

    /// Returns `true` if the file must be recompiled given its current
    /// on-disk stamp.
    ///
    /// Never-compiled files are always dirty. A recorded stamp that differs
    /// from the on-disk stamp in either direction is dirty: a restored older
    /// file changed too. Files modified at or after the session start stamp
    /// are treated as not yet compiled.
    pub fn is_dirty(&self, on_disk: FileStamp, session_start: FileStamp) -> bool {
        match self.last_compiled {
            None => true,
            Some(compiled) => on_disk != compiled || on_disk >= session_start,
        }
    }
}
