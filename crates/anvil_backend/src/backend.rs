//! Backend traits: the contracts the engine drives.

use anvil_common::BackendId;
use anvil_messages::{MessageSink, ProgressIndicator};
use anvil_scope::ResolvedScope;
use std::io;
use std::path::{Path, PathBuf};

use crate::validity::ValidityState;

/// The per-invocation environment handed to a backend.
///
/// A thin view of the session: backends report through the sink, poll the
/// progress indicator for cancellation at item granularity, and resolve
/// outputs against the given roots. They never see the raw scope.
pub struct BackendRun<'a> {
    /// Message sink of the running session.
    pub sink: &'a MessageSink,
    /// Progress and cancellation signal of the running session.
    pub progress: &'a ProgressIndicator,
    /// Root of the workspace being built.
    pub workspace_root: &'a Path,
    /// Directory this backend's outputs land in.
    pub output_root: &'a Path,
}

/// Behavior common to all backends.
pub trait Backend: Send + Sync {
    /// Stable identifier; names the backend's cache subdirectory.
    fn id(&self) -> &BackendId;

    /// Human-readable description for messages.
    fn description(&self) -> &str;

    /// Returns `true` if this backend compiles the given file.
    ///
    /// Classification must be unambiguous across registered backends; two
    /// backends accepting the same file is a configuration error.
    fn is_compilable_file(&self, path: &Path) -> bool;

    /// Validates the resolved scope before any file is touched.
    ///
    /// A rejection aborts the whole session and is reported once, not per
    /// file.
    fn validate_configuration(&self, scope: &ResolvedScope) -> Result<(), String> {
        let _ = scope;
        Ok(())
    }
}

/// One successfully translated source file.
#[derive(Debug, Clone)]
pub struct TranslatedItem {
    /// The source file that was compiled.
    pub source: PathBuf,
    /// The output root the produced file landed in.
    pub output_root: PathBuf,
    /// The produced output file.
    pub output: PathBuf,
    /// Qualified names this unit declares.
    pub declared: Vec<String>,
    /// Qualified names this unit references.
    pub referenced: Vec<String>,
}

/// Result of one translation batch.
#[derive(Debug, Default)]
pub struct TranslationOutcome {
    /// Items compiled successfully.
    pub successful: Vec<TranslatedItem>,
    /// Sources that failed; they stay dirty and are retried next build.
    pub failed: Vec<PathBuf>,
}

impl TranslationOutcome {
    /// An empty outcome.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// A backend compiling classified source files.
///
/// Receives only the file set the driver already filtered and expanded for
/// it. Within one batch, item processing has no ordering guarantee; the
/// backend may parallelize internally but must not mutate dependency-graph
/// state itself. Edges flow back through [`TranslatedItem`] and are
/// committed by the engine's single update per backend per session.
pub trait TranslatingBackend: Backend {
    /// Compiles the given files.
    ///
    /// Per-file failures are recorded in the outcome (and as messages via
    /// the run's sink); they do not abort the batch. Long loops must poll
    /// `run.progress` and stop early when cancelled.
    fn translate(&self, run: &BackendRun<'_>, files: &[PathBuf]) -> TranslationOutcome;
}

/// One unit of work of an item-processing backend.
pub trait ProcessingItem: Send {
    /// Identity of the item's source.
    fn source(&self) -> &Path;

    /// The output this item produces; keys the validity cache.
    fn output(&self) -> &Path;

    /// The item's current validity fingerprint.
    fn validity(&self) -> Box<dyn ValidityState>;
}

/// A backend doing simple source-to-output transformation, driven by
/// validity fingerprints.
///
/// The engine guarantees it only passes items whose fingerprint differs from
/// the last committed one, that have never been seen, or that are forced by
/// a rebuild; the backend need not re-check freshness.
pub trait ProcessingBackend: Backend {
    /// All items this backend would produce for the session.
    fn items_to_process(&self, run: &BackendRun<'_>) -> Vec<Box<dyn ProcessingItem>>;

    /// Processes the filtered items, returning the indices of those that
    /// succeeded. Failed items keep no fingerprint and retry next build.
    fn process(&self, run: &BackendRun<'_>, items: &[Box<dyn ProcessingItem>]) -> Vec<usize>;

    /// Deserializes a fingerprint previously written by one of this
    /// backend's items.
    fn read_validity_state(&self, bytes: &[u8]) -> io::Result<Box<dyn ValidityState>>;
}
