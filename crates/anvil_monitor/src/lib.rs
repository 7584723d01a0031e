//! Durable file bookkeeping joining file-system state to backend ownership.
//!
//! The monitor tracks, across restarts, which source files belong to which
//! backend, their last-compiled stamps, and the outputs they produced. It is
//! the join key between "file changed on disk" and "which backend and which
//! cache entry owns it": a source is scheduled for recompilation when its
//! stamp changed, when it was never compiled, or when a build is forced; an
//! output is scheduled for deletion when its source is gone.

#![warn(missing_docs)]

pub mod error;
pub mod monitor;
pub mod record;

pub use error::MonitorError;
pub use monitor::{CollectedFiles, FileMonitor, InitGate, ObsoleteOutput, ScanRoot};
pub use record::{FileRecord, RecordedOutput};
