//! The build manager: public entry point and session lifecycle.

use anvil_backend::BackendRegistry;
use anvil_config::WorkspaceConfig;
use anvil_messages::{BuildMessage, MessageSink, ProgressIndicator};
use anvil_monitor::FileMonitor;
use anvil_scope::{BuildScope, ResolvedScope};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crate::context::BuildSessionContext;
use crate::driver::{BuildDriver, BuildRequest, BuildTask, ExitStatus};
use crate::error::BuildError;
use crate::status::EngineDirs;

/// Aggregated outcome of one session, delivered to the caller's callback.
#[derive(Debug)]
pub struct BuildResult {
    /// Terminal status of the session.
    pub status: ExitStatus,
    /// Number of ERROR messages.
    pub error_count: usize,
    /// Number of WARNING messages.
    pub warning_count: usize,
    /// Whether the session was cancelled.
    pub cancelled: bool,
    /// All messages of the session, in emission order.
    pub messages: Vec<BuildMessage>,
}

/// A running session: cancellation handle and join point.
pub struct SessionHandle {
    progress: Arc<ProgressIndicator>,
    handle: JoinHandle<()>,
}

impl SessionHandle {
    /// Requests cancellation of the session.
    pub fn cancel(&self) {
        self.progress.cancel();
    }

    /// The session's progress indicator.
    pub fn progress(&self) -> &Arc<ProgressIndicator> {
        &self.progress
    }

    /// Blocks until the session (and its callback) finished.
    pub fn wait(self) {
        let _ = self.handle.join();
    }
}

struct ManagerShared {
    config: WorkspaceConfig,
    registry: BackendRegistry,
    workspace_root: PathBuf,
    /// The mutual-exclusion gate: one active session per workspace.
    active: AtomicBool,
    monitor: Mutex<FileMonitor>,
    pre_tasks: Mutex<Vec<Arc<dyn BuildTask>>>,
    post_tasks: Mutex<Vec<Arc<dyn BuildTask>>>,
}

/// Resets the compilation-active flag when a session ends, even on panic.
struct ActiveGuard(Arc<ManagerShared>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.active.store(false, Ordering::Release);
    }
}

/// Public facade of the build engine for one workspace.
///
/// A single session runs at a time; starting a second one returns the
/// deterministic [`BuildError::AlreadyRunning`] signal. Sessions run on a
/// dedicated worker thread; messages and progress are safe to consume from
/// other threads. The read-only [`is_up_to_date`](Self::is_up_to_date)
/// query mutates nothing.
pub struct BuildManager {
    shared: Arc<ManagerShared>,
}

impl BuildManager {
    /// Creates the manager for a workspace, loading persisted monitor state.
    ///
    /// Unreadable monitor state persists a rebuild marker immediately: the
    /// monitor restarts empty and the next session runs full.
    pub fn new(config: WorkspaceConfig, registry: BackendRegistry, workspace_root: &Path) -> Self {
        let dirs = EngineDirs::new(workspace_root);
        let monitor = FileMonitor::load(dirs.root());
        if monitor.state_was_unreadable() {
            let _ = dirs.write_rebuild_marker("monitor state is unreadable");
        }
        Self {
            shared: Arc::new(ManagerShared {
                config,
                registry,
                workspace_root: workspace_root.to_path_buf(),
                active: AtomicBool::new(false),
                monitor: Mutex::new(monitor),
                pre_tasks: Mutex::new(Vec::new()),
                post_tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Registers a task run before the first backend of every session.
    pub fn register_pre_task(&self, task: Arc<dyn BuildTask>) {
        self.shared.pre_tasks.lock().unwrap().push(task);
    }

    /// Registers a task run after the last backend of every session.
    pub fn register_post_task(&self, task: Arc<dyn BuildTask>) {
        self.shared.post_tasks.lock().unwrap().push(task);
    }

    /// Starts an incremental build of the scope.
    pub fn make<F>(&self, scope: BuildScope, callback: F) -> Result<SessionHandle, BuildError>
    where
        F: FnOnce(BuildResult) + Send + 'static,
    {
        self.start(BuildRequest::make(scope), callback)
    }

    /// Starts an incremental build restricted to the given backends.
    pub fn make_filtered<F>(
        &self,
        scope: BuildScope,
        backends: Vec<anvil_common::BackendId>,
        callback: F,
    ) -> Result<SessionHandle, BuildError>
    where
        F: FnOnce(BuildResult) + Send + 'static,
    {
        self.start(
            BuildRequest::make(scope).with_backend_filter(backends),
            callback,
        )
    }

    /// Starts a forced compile of the scope, without dependency expansion.
    pub fn compile<F>(&self, scope: BuildScope, callback: F) -> Result<SessionHandle, BuildError>
    where
        F: FnOnce(BuildResult) + Send + 'static,
    {
        self.start(BuildRequest::compile(scope), callback)
    }

    /// Starts a forced compile of an explicit file list.
    ///
    /// The list is trusted as-is: no dependency expansion, exclusion
    /// entries ignored.
    pub fn compile_files<F, I, P>(&self, files: I, callback: F) -> Result<SessionHandle, BuildError>
    where
        F: FnOnce(BuildResult) + Send + 'static,
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.start(BuildRequest::compile_files(files), callback)
    }

    /// Starts a forced full rebuild.
    pub fn rebuild<F>(&self, callback: F) -> Result<SessionHandle, BuildError>
    where
        F: FnOnce(BuildResult) + Send + 'static,
    {
        self.start(BuildRequest::rebuild(), callback)
    }

    /// Read-only query: is the scope up to date.
    ///
    /// Performs no cache mutation and takes no session slot; calling it
    /// twice with no intervening change or build returns the same answer.
    pub fn is_up_to_date(&self, scope: &BuildScope) -> bool {
        let monitor = self.shared.monitor.lock().unwrap();
        let driver = BuildDriver::new(
            &self.shared.config,
            &self.shared.registry,
            &self.shared.workspace_root,
        );
        driver.is_up_to_date(&monitor, scope)
    }

    /// Runs a single task in a session of its own, without backends.
    pub fn execute_task<F>(
        &self,
        task: Arc<dyn BuildTask>,
        scope: BuildScope,
        callback: F,
    ) -> Result<SessionHandle, BuildError>
    where
        F: FnOnce(BuildResult) + Send + 'static,
    {
        self.claim_session_slot()?;
        let shared = Arc::clone(&self.shared);
        let progress = Arc::new(ProgressIndicator::new());
        let thread_progress = Arc::clone(&progress);

        let handle = std::thread::spawn(move || {
            let _guard = ActiveGuard(Arc::clone(&shared));
            let sink = Arc::new(MessageSink::new());
            let dirs = EngineDirs::new(&shared.workspace_root);
            let resolved =
                ResolvedScope::resolve(&scope, &shared.config, &shared.workspace_root);
            let ctx = BuildSessionContext::new(
                Arc::clone(&sink),
                thread_progress,
                resolved,
                shared.workspace_root.join(&shared.config.project.output_dir),
                dirs.generated_dir(),
            );
            if let Err(reason) = task.run(&ctx) {
                ctx.add_message(BuildMessage::error(format!(
                    "task `{}` failed: {reason}",
                    task.name()
                )));
            }
            let status = if ctx.sink().has_errors() {
                ExitStatus::Errors
            } else {
                ExitStatus::Success
            };
            callback(finish(status, &sink));
        });

        Ok(SessionHandle { progress, handle })
    }

    fn start<F>(&self, request: BuildRequest, callback: F) -> Result<SessionHandle, BuildError>
    where
        F: FnOnce(BuildResult) + Send + 'static,
    {
        self.claim_session_slot()?;
        let shared = Arc::clone(&self.shared);
        let progress = Arc::new(ProgressIndicator::new());
        let thread_progress = Arc::clone(&progress);

        let handle = std::thread::spawn(move || {
            let _guard = ActiveGuard(Arc::clone(&shared));
            let sink = Arc::new(MessageSink::new());
            let pre_tasks = shared.pre_tasks.lock().unwrap().clone();
            let post_tasks = shared.post_tasks.lock().unwrap().clone();

            let status = {
                let mut monitor = shared.monitor.lock().unwrap();
                let mut driver = BuildDriver::new(
                    &shared.config,
                    &shared.registry,
                    &shared.workspace_root,
                )
                .with_tasks(&pre_tasks, &post_tasks);
                driver.run(
                    &mut monitor,
                    &request,
                    Arc::clone(&sink),
                    thread_progress,
                )
            };
            callback(finish(status, &sink));
        });

        Ok(SessionHandle { progress, handle })
    }

    fn claim_session_slot(&self) -> Result<(), BuildError> {
        self.shared
            .active
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| BuildError::AlreadyRunning)
    }
}

fn finish(status: ExitStatus, sink: &MessageSink) -> BuildResult {
    BuildResult {
        status,
        error_count: sink.error_count(),
        warning_count: sink.warning_count(),
        cancelled: status == ExitStatus::Cancelled,
        messages: sink.take_all(),
    }
}
