//! Per-session mutable state.

use anvil_common::{BackendId, FileStamp};
use anvil_messages::{BuildMessage, MessageSink, ProgressIndicator};
use anvil_scope::ResolvedScope;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Mutable state of one build session.
///
/// Created at the start of one driver invocation and destroyed at its end.
/// Every component receives the context by reference for the session's
/// lifetime; there is no ambient or global session state. The start stamp is
/// taken at construction and used to detect files modified during the build,
/// which are treated as not yet compiled.
pub struct BuildSessionContext {
    sink: Arc<MessageSink>,
    progress: Arc<ProgressIndicator>,
    scope: ResolvedScope,
    start_stamp: FileStamp,
    output_root: PathBuf,
    generated_root: PathBuf,
    rebuild_request: Mutex<Option<String>>,
}

impl BuildSessionContext {
    /// Creates the context for one session.
    pub fn new(
        sink: Arc<MessageSink>,
        progress: Arc<ProgressIndicator>,
        scope: ResolvedScope,
        output_root: PathBuf,
        generated_root: PathBuf,
    ) -> Self {
        Self {
            sink,
            progress,
            scope,
            start_stamp: FileStamp::now(),
            output_root,
            generated_root,
            rebuild_request: Mutex::new(None),
        }
    }

    /// The session's message sink.
    pub fn sink(&self) -> &MessageSink {
        &self.sink
    }

    /// Adds a message to the session.
    pub fn add_message(&self, message: BuildMessage) {
        self.sink.add(message);
    }

    /// The session's progress indicator and cancellation signal.
    pub fn progress(&self) -> &ProgressIndicator {
        &self.progress
    }

    /// The resolved scope of the session.
    pub fn scope(&self) -> &ResolvedScope {
        &self.scope
    }

    /// The session start stamp.
    pub fn start_stamp(&self) -> FileStamp {
        self.start_stamp
    }

    /// The workspace output root of this session.
    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// The output directory of one backend.
    pub fn output_root_for(&self, backend: &BackendId) -> PathBuf {
        self.output_root.join(backend.as_str())
    }

    /// The intermediate-output directory of one backend.
    pub fn generated_root_for(&self, backend: &BackendId) -> PathBuf {
        self.generated_root.join(backend.as_str())
    }

    /// Returns `true` if the file was generated by an earlier backend.
    pub fn is_generated(&self, path: &Path) -> bool {
        path.starts_with(&self.generated_root)
    }

    /// Returns `true` if the file lies under a test source root.
    pub fn is_test_source(&self, path: &Path) -> bool {
        self.scope.is_test_source(path)
    }

    /// Requests that the next build be a full rebuild.
    ///
    /// The first reason wins; later requests keep it.
    pub fn request_rebuild(&self, reason: impl Into<String>) {
        let mut request = self.rebuild_request.lock().unwrap();
        if request.is_none() {
            *request = Some(reason.into());
        }
    }

    /// Returns `true` if a rebuild has been requested during this session.
    pub fn is_rebuild_requested(&self) -> bool {
        self.rebuild_request.lock().unwrap().is_some()
    }

    /// The recorded rebuild reason, if any.
    pub fn rebuild_reason(&self) -> Option<String> {
        self.rebuild_request.lock().unwrap().clone()
    }
}

/// A context decorator overriding the scope while forwarding everything else
/// to the inner context.
///
/// Explicit composition: the wrapper holds the inner handle and only the
/// state it overrides. Used for running a task or backend against a
/// narrowed scope within the same session.
pub struct ScopedContext<'a> {
    inner: &'a BuildSessionContext,
    scope: ResolvedScope,
}

impl<'a> ScopedContext<'a> {
    /// Wraps a context with an overriding scope.
    pub fn new(inner: &'a BuildSessionContext, scope: ResolvedScope) -> Self {
        Self { inner, scope }
    }

    /// The overriding scope.
    pub fn scope(&self) -> &ResolvedScope {
        &self.scope
    }

    /// The inner session context.
    pub fn inner(&self) -> &BuildSessionContext {
        self.inner
    }

    /// Forwards to the inner sink.
    pub fn sink(&self) -> &MessageSink {
        self.inner.sink()
    }

    /// Forwards to the inner progress indicator.
    pub fn progress(&self) -> &ProgressIndicator {
        self.inner.progress()
    }

    /// Forwards to the inner start stamp.
    pub fn start_stamp(&self) -> FileStamp {
        self.inner.start_stamp()
    }
}
