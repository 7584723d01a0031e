//! The build driver: one session from scope resolution to commit.

use anvil_backend::{
    BackendDescriptor, BackendRegistry, BackendRun, ProcessingBackend, RegisteredBackend,
};
use anvil_cache::CompositeDependencyCache;
use anvil_common::{BackendId, FileId, FileStamp, InternalError};
use anvil_config::WorkspaceConfig;
use anvil_messages::{BuildMessage, MessageSink, ProgressIndicator, SourceLocation};
use anvil_monitor::{FileMonitor, RecordedOutput, ScanRoot};
use anvil_scope::{AttachedOutputDir, BuildScope, OutputDirFilter, ResolvedScope};
use std::cell::RefCell;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::context::BuildSessionContext;
use crate::status::EngineDirs;

/// A pre- or post-build task run inside the session, before the first
/// backend or after the last one.
pub trait BuildTask: Send + Sync {
    /// Name used in messages.
    fn name(&self) -> &str;

    /// Runs the task. An error aborts the session with an ERROR message.
    fn run(&self, ctx: &BuildSessionContext) -> Result<(), String>;
}

/// Terminal result of one build session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// The session compiled or deleted something and ended without errors.
    Success,
    /// Nothing to do: zero changes and zero errors. Reported distinctly
    /// from [`Success`](ExitStatus::Success) to avoid misleading "build
    /// succeeded" noise on no-op invocations.
    UpToDate,
    /// The session ended with errors.
    Errors,
    /// The session was cancelled; caches remain at their last commit.
    Cancelled,
    /// Cache corruption was detected; a full rebuild is owed (and the
    /// marker is already persisted).
    RebuildRequested,
}

/// What kind of build was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestKind {
    /// Incremental build: change detection plus transitive dependency
    /// expansion, honoring excludes.
    Make,
    /// Forced compile of the requested scope. Explicit file lists are
    /// trusted as-is: no dependency expansion, excludes ignored.
    ForceCompile,
    /// Forced full rebuild: all caches wiped, everything recompiled.
    Rebuild,
}

/// A build request handed to the driver.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    kind: RequestKind,
    scope: BuildScope,
    backend_filter: Option<Vec<BackendId>>,
}

impl BuildRequest {
    /// An incremental build of the given scope.
    pub fn make(scope: BuildScope) -> Self {
        Self {
            kind: RequestKind::Make,
            scope,
            backend_filter: None,
        }
    }

    /// A forced compile of the given scope.
    pub fn compile(scope: BuildScope) -> Self {
        Self {
            kind: RequestKind::ForceCompile,
            scope,
            backend_filter: None,
        }
    }

    /// A forced compile of an explicit file list.
    pub fn compile_files<I, P>(files: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self::compile(BuildScope::files(files))
    }

    /// A forced full rebuild of the workspace.
    pub fn rebuild() -> Self {
        Self {
            kind: RequestKind::Rebuild,
            scope: BuildScope::workspace(true),
            backend_filter: None,
        }
    }

    /// Restricts the session to the given backends.
    pub fn with_backend_filter(mut self, backends: Vec<BackendId>) -> Self {
        self.backend_filter = Some(backends);
        self
    }
}

/// Observable state of the driver's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    /// No session running.
    Idle,
    /// The scope has been resolved and validated.
    ScopeResolved,
    /// The changed set has been expanded through the dependency cache.
    DependencyExpanded,
    /// Backend `i` (in execution order) is running.
    BackendRunning(usize),
    /// Cache and monitor updates are being committed.
    Committing,
    /// Terminal: see the returned [`ExitStatus`].
    Finished,
}

/// Orchestrates one build session over a workspace.
pub struct BuildDriver<'a> {
    config: &'a WorkspaceConfig,
    registry: &'a BackendRegistry,
    workspace_root: PathBuf,
    dirs: EngineDirs,
    state: DriverState,
    pre_tasks: &'a [Arc<dyn BuildTask>],
    post_tasks: &'a [Arc<dyn BuildTask>],
}

impl<'a> BuildDriver<'a> {
    /// Creates a driver for one workspace.
    pub fn new(
        config: &'a WorkspaceConfig,
        registry: &'a BackendRegistry,
        workspace_root: &Path,
    ) -> Self {
        Self {
            config,
            registry,
            workspace_root: workspace_root.to_path_buf(),
            dirs: EngineDirs::new(workspace_root),
            state: DriverState::Idle,
            pre_tasks: &[],
            post_tasks: &[],
        }
    }

    /// Attaches pre- and post-build tasks to run inside sessions.
    pub fn with_tasks(
        mut self,
        pre_tasks: &'a [Arc<dyn BuildTask>],
        post_tasks: &'a [Arc<dyn BuildTask>],
    ) -> Self {
        self.pre_tasks = pre_tasks;
        self.post_tasks = post_tasks;
        self
    }

    /// The engine directory layout of this workspace.
    pub fn dirs(&self) -> &EngineDirs {
        &self.dirs
    }

    /// The current state-machine state, for observation in tests.
    pub fn state(&self) -> DriverState {
        self.state
    }

    /// Runs one build session to completion.
    ///
    /// A `make` that detects corruption (or an owed rebuild marker) is
    /// re-run as a full rebuild within the same call, so callers observe a
    /// single terminal status.
    pub fn run(
        &mut self,
        monitor: &mut FileMonitor,
        request: &BuildRequest,
        sink: Arc<MessageSink>,
        progress: Arc<ProgressIndicator>,
    ) -> ExitStatus {
        let mut kind = request.kind;

        if kind != RequestKind::Rebuild {
            if let Some(reason) = self.owed_rebuild_reason() {
                sink.add(BuildMessage::info(format!(
                    "full rebuild required: {reason}"
                )));
                kind = RequestKind::Rebuild;
            }
        }

        let status = self.run_session(monitor, request, kind, &sink, &progress);
        let status = match status {
            ExitStatus::RebuildRequested if kind != RequestKind::Rebuild => {
                // Corruption surfaced mid-session; the marker is persisted.
                // Recover immediately with a full rebuild.
                self.run_session(monitor, request, RequestKind::Rebuild, &sink, &progress)
            }
            other => other,
        };
        self.state = DriverState::Finished;
        status
    }

    /// Checks the persisted compile status for an owed full rebuild.
    ///
    /// A rebuild is owed when the marker file exists, when the version file
    /// is unreadable or from another format version, when the previous
    /// session left its in-progress lock behind (it crashed mid-build), or
    /// when the monitor state could not be read.
    fn owed_rebuild_reason(&self) -> Option<String> {
        if self.dirs.rebuild_marker_exists() {
            return Some(
                self.dirs
                    .rebuild_reason()
                    .unwrap_or_else(|| "rebuild marker present".to_string()),
            );
        }
        match self.dirs.read_status() {
            None => Some("compile status is unreadable".to_string()),
            Some(status) => {
                if status.in_progress {
                    Some("previous build did not complete".to_string())
                } else if status
                    .format_version
                    .is_some_and(|v| v != crate::status::DEPENDENCY_FORMAT_VERSION)
                {
                    Some("caches were written by another format version".to_string())
                } else {
                    None
                }
            }
        }
    }

    fn run_session(
        &mut self,
        monitor: &mut FileMonitor,
        request: &BuildRequest,
        kind: RequestKind,
        sink: &Arc<MessageSink>,
        progress: &Arc<ProgressIndicator>,
    ) -> ExitStatus {
        let started = Instant::now();
        self.state = DriverState::Idle;

        // Idle -> ScopeResolved
        let scope = match kind {
            RequestKind::Rebuild => BuildScope::workspace(true),
            _ => request.scope.clone(),
        };
        let mut resolved = ResolvedScope::resolve(&scope, self.config, &self.workspace_root);
        self.attach_intermediate_outputs(&mut resolved);

        let ctx = BuildSessionContext::new(
            Arc::clone(sink),
            Arc::clone(progress),
            resolved,
            self.workspace_root.join(&self.config.project.output_dir),
            self.dirs.generated_dir(),
        );

        for descriptor in self.backends(request) {
            let backend = descriptor.backend.as_backend();
            if let Err(reason) = backend.validate_configuration(ctx.scope()) {
                ctx.add_message(BuildMessage::error(format!(
                    "configuration rejected by {}: {reason}",
                    backend.description()
                )));
                return ExitStatus::Errors;
            }
        }
        self.state = DriverState::ScopeResolved;

        for task in self.pre_tasks {
            if let Err(reason) = task.run(&ctx) {
                ctx.add_message(BuildMessage::error(format!(
                    "pre-build task `{}` failed: {reason}",
                    task.name()
                )));
                return ExitStatus::Errors;
            }
        }
        if ctx.progress().is_cancelled() {
            return ExitStatus::Cancelled;
        }

        if self.dirs.write_status(true).is_err() {
            ctx.add_message(BuildMessage::error(
                "cannot write compile status to the engine directory",
            ));
            return ExitStatus::Errors;
        }

        let mut composite = match self.open_composite(&ctx, kind) {
            Ok(composite) => composite,
            Err(status) => return status,
        };

        if kind == RequestKind::Rebuild {
            if composite.wipe_all().is_err() {
                ctx.add_message(BuildMessage::error("cannot discard cache state"));
                return ExitStatus::Errors;
            }
            monitor.mark_all_dirty();
        }

        if !self.scan(monitor, &ctx) {
            return self.cancelled(&mut composite);
        }
        if ctx.sink().has_errors() {
            // Configuration errors (e.g. ambiguous file classification)
            // abort the session before any backend runs.
            let _ = self.dirs.write_status(false);
            return ExitStatus::Errors;
        }

        let excludes = self.excluded_paths();

        // ScopeResolved -> DependencyExpanded. Explicit compile trusts the
        // caller's file list and skips expansion; make never does.
        let mut expanded_extra: HashSet<PathBuf> = HashSet::new();
        if kind == RequestKind::Make {
            let mut changed: HashSet<FileId> = HashSet::new();
            for descriptor in self.backends(request) {
                let candidates = self.candidates(monitor, &ctx, descriptor, kind, &excludes);
                let collected = monitor.collect_files(
                    descriptor.id(),
                    &candidates,
                    false,
                    false,
                    ctx.start_stamp(),
                );
                for path in &collected.to_compile {
                    if let Some(id) = monitor.file_id(path) {
                        changed.insert(id);
                    }
                }
            }
            let closure = composite.find_dependents(&changed, &|_| true);
            for id in closure.difference(&changed) {
                if let Some(path) = monitor.path_of(*id) {
                    if ctx.scope().contains(path) {
                        expanded_extra.insert(path.to_path_buf());
                    }
                }
            }
        }
        self.state = DriverState::DependencyExpanded;

        // DependencyExpanded -> BackendRunning(i), in declared dependency
        // order. A backend's failures do not abort its siblings.
        let mut did_something = false;
        let descriptors: Vec<BackendDescriptor> = self.backends(request).cloned().collect();
        for (index, descriptor) in descriptors.iter().enumerate() {
            self.state = DriverState::BackendRunning(index);
            if ctx.progress().is_cancelled() {
                return self.cancelled(&mut composite);
            }

            let backend_id = descriptor.id().clone();
            let candidates = self.candidates(monitor, &ctx, descriptor, kind, &excludes);
            let mut collected = monitor.collect_files(
                &backend_id,
                &candidates,
                kind != RequestKind::Make,
                kind == RequestKind::Rebuild,
                ctx.start_stamp(),
            );
            for path in &expanded_extra {
                if monitor
                    .record(path)
                    .is_some_and(|record| record.backend == backend_id)
                    && !collected.to_compile.contains(path)
                {
                    collected.to_compile.push(path.clone());
                }
            }
            collected.to_compile.sort();

            for obsolete in &collected.to_delete {
                match std::fs::remove_file(&obsolete.output) {
                    Ok(()) => {
                        did_something = true;
                        monitor.mark_output_deleted(&obsolete.output);
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        monitor.mark_output_deleted(&obsolete.output);
                    }
                    Err(e) => {
                        ctx.add_message(BuildMessage::warning(format!(
                            "cannot delete stale output {}: {e}",
                            obsolete.output.display()
                        )));
                        continue;
                    }
                }
                // The deleted source's unit leaves the graph with its output.
                if let Some(graph) = composite.graph(&backend_id) {
                    graph.remove_file(obsolete.source_id);
                }
            }

            match &descriptor.backend {
                RegisteredBackend::Translating(backend) => {
                    if collected.to_compile.is_empty() {
                        continue;
                    }
                    let output_root = if descriptor.intermediate_output {
                        ctx.generated_root_for(&backend_id)
                    } else {
                        ctx.output_root_for(&backend_id)
                    };
                    if let Err(e) = std::fs::create_dir_all(&output_root) {
                        ctx.add_message(BuildMessage::error(format!(
                            "cannot create output directory {}: {e}",
                            output_root.display()
                        )));
                        continue;
                    }

                    ctx.progress()
                        .set_text(format!("Compiling with {}", backend.description()));
                    let errors_before = ctx.sink().error_count();
                    let run = BackendRun {
                        sink: ctx.sink(),
                        progress: ctx.progress(),
                        workspace_root: &self.workspace_root,
                        output_root: &output_root,
                    };
                    let outcome = backend.translate(&run, &collected.to_compile);

                    // Every registered backend has a store; a missing one is
                    // an engine bug, and dropping its edges silently would
                    // break soundness.
                    let Some(graph) = composite.graph(&backend_id) else {
                        ctx.add_message(BuildMessage::error(
                            InternalError::new(format!(
                                "no dependency store registered for backend `{backend_id}`"
                            ))
                            .to_string(),
                        ));
                        continue;
                    };

                    for item in &outcome.successful {
                        did_something = true;
                        let id = monitor.observe(
                            &item.source,
                            backend_id.clone(),
                            ctx.is_generated(&item.source),
                            ctx.scope().module_of(&item.source).map(str::to_string),
                        );
                        graph.register_processed(
                            id,
                            item.declared.clone(),
                            item.referenced.clone(),
                        );
                        monitor.update_compiled(
                            &item.source,
                            vec![RecordedOutput {
                                output_root: item.output_root.clone(),
                                path: item.output.clone(),
                            }],
                            ctx.start_stamp(),
                        );
                    }
                    for path in &outcome.failed {
                        monitor.mark_failed(path);
                    }
                    // The backend reports failure details; if it stayed
                    // silent, record the errors so the session cannot
                    // misreport success.
                    if !outcome.failed.is_empty() && ctx.sink().error_count() == errors_before {
                        for path in &outcome.failed {
                            ctx.add_message(
                                BuildMessage::error("compilation failed")
                                    .with_location(SourceLocation::file(path.clone())),
                            );
                        }
                    }

                    // Sources generated into an intermediate output directory
                    // must become visible to downstream backends within this
                    // same session, without being told explicitly.
                    if descriptor.intermediate_output && !outcome.successful.is_empty() {
                        let classify = |path: &Path| match self.registry.classify(path) {
                            Ok(Some(found)) => Some(found.id().clone()),
                            _ => None,
                        };
                        let generated_root = ScanRoot {
                            path: output_root.clone(),
                            generated: true,
                            module: None,
                        };
                        if !monitor.scan_source_roots(
                            &[generated_root],
                            &classify,
                            ctx.progress(),
                        ) {
                            return self.cancelled(&mut composite);
                        }
                    }

                    if ctx.progress().is_cancelled() {
                        return self.cancelled(&mut composite);
                    }
                }
                RegisteredBackend::Processing(backend) => {
                    let processed = self.run_processing_backend(
                        backend.as_ref(),
                        descriptor,
                        &ctx,
                        &mut composite,
                        kind,
                    );
                    match processed {
                        Ok(count) => did_something |= count > 0,
                        Err(status) => return status,
                    }
                }
            }

            if ctx.is_rebuild_requested() {
                return self.corruption_detected(
                    &ctx,
                    &mut composite,
                    &ctx.rebuild_reason().unwrap_or_default(),
                );
            }
        }

        for task in self.post_tasks {
            if let Err(reason) = task.run(&ctx) {
                ctx.add_message(BuildMessage::error(format!(
                    "post-build task `{}` failed: {reason}",
                    task.name()
                )));
            }
        }

        // BackendRunning -> Committing. Cache and monitor commit together;
        // an interrupted or failed commit is treated like corruption because
        // the resulting on-disk state is unknown.
        self.state = DriverState::Committing;
        if let Err(e) = composite.update_all() {
            return self.corruption_detected(&ctx, &mut composite, &e.to_string());
        }
        if let Err(e) = monitor.save() {
            return self.corruption_detected(&ctx, &mut composite, &e.to_string());
        }
        composite.clear_traverse_roots();

        if self.dirs.write_status(false).is_err() {
            ctx.add_message(BuildMessage::warning(
                "cannot clear the in-progress lock; the next build will be full",
            ));
        }

        let errors = ctx.sink().error_count();
        if kind == RequestKind::Rebuild && errors == 0 {
            let _ = self.dirs.clear_rebuild_marker();
        }

        ctx.add_message(BuildMessage::statistics(format!(
            "build finished in {} ms",
            started.elapsed().as_millis()
        )));

        if errors > 0 {
            ExitStatus::Errors
        } else if did_something {
            ExitStatus::Success
        } else {
            ExitStatus::UpToDate
        }
    }

    /// Answers "is this scope up to date" without mutating any state.
    pub fn is_up_to_date(&self, monitor: &FileMonitor, scope: &BuildScope) -> bool {
        if self.owed_rebuild_reason().is_some() {
            return false;
        }
        let resolved = ResolvedScope::resolve(scope, self.config, &self.workspace_root);
        let excludes = self.excluded_paths();
        let session_start = FileStamp::now();

        // Any tombstone for a backend means stale outputs remain.
        for descriptor in self.registry.in_order() {
            let collected =
                monitor.collect_files(descriptor.id(), &[], false, false, session_start);
            if !collected.to_delete.is_empty() {
                return false;
            }
        }

        // Walk the scope read-only: a new, changed, or deleted file means
        // not up to date.
        for root in resolved.roots() {
            let mut files = Vec::new();
            collect_files_under(&root.path, &mut files);
            for path in files {
                if is_excluded(&path, &excludes) {
                    continue;
                }
                let classified = match self.registry.classify(&path) {
                    Ok(Some(_)) => true,
                    Ok(None) => false,
                    // Ambiguous classification is a configuration error;
                    // the workspace cannot be called up to date.
                    Err(_) => return false,
                };
                if !classified {
                    continue;
                }
                let Some(record) = monitor.record(&path) else {
                    return false;
                };
                let Ok(stamp) = FileStamp::of_path(&path) else {
                    return false;
                };
                if record.is_dirty(stamp, session_start) {
                    return false;
                }
            }
        }

        // Tracked files that disappeared from the scope owe deletions.
        for (path, _record) in monitor.tracked_files() {
            if resolved.contains(path) && !path.exists() {
                return false;
            }
        }

        true
    }

    fn backends<'r>(
        &'r self,
        request: &'r BuildRequest,
    ) -> impl Iterator<Item = &'r BackendDescriptor> {
        self.registry.in_order().filter(move |descriptor| {
            request
                .backend_filter
                .as_ref()
                .map_or(true, |filter| filter.contains(descriptor.id()))
        })
    }

    fn attach_intermediate_outputs(&self, resolved: &mut ResolvedScope) {
        for descriptor in self.registry.in_order() {
            if !descriptor.intermediate_output {
                continue;
            }
            let producer = descriptor.id().clone();
            let consumers: Vec<BackendId> = self
                .registry
                .in_order()
                .filter(|d| d.consumes.as_ref() == Some(&producer))
                .map(|d| d.id().clone())
                .collect();
            if consumers.is_empty() {
                continue;
            }
            resolved.attach_output_dir(AttachedOutputDir {
                dir: self.dirs.generated_dir_for(producer.as_str()),
                producer,
                filter: OutputDirFilter::Only(consumers),
            });
        }
    }

    fn open_composite(
        &self,
        ctx: &BuildSessionContext,
        kind: RequestKind,
    ) -> Result<CompositeDependencyCache, ExitStatus> {
        let factories = self.registry.store_factories();
        match CompositeDependencyCache::open(&factories, &self.dirs.caches_dir()) {
            Ok(composite) => Ok(composite),
            Err(e) if e.is_corruption() => {
                ctx.add_message(BuildMessage::warning(format!(
                    "dependency caches are corrupted: {e}"
                )));
                let _ = self.dirs.write_rebuild_marker(&e.to_string());
                // Drop every store so the reopen (or the escalated rebuild)
                // starts from nothing.
                let _ = std::fs::remove_dir_all(self.dirs.caches_dir());
                if kind == RequestKind::Rebuild {
                    CompositeDependencyCache::open(&factories, &self.dirs.caches_dir()).map_err(
                        |e| {
                            ctx.add_message(BuildMessage::error(format!(
                                "cannot reopen caches: {e}"
                            )));
                            ExitStatus::Errors
                        },
                    )
                } else {
                    Err(ExitStatus::RebuildRequested)
                }
            }
            Err(e) => {
                ctx.add_message(BuildMessage::error(format!("cannot open caches: {e}")));
                Err(ExitStatus::Errors)
            }
        }
    }

    /// Scans scope roots plus attached intermediate directories. Explicit
    /// file scopes observe their files directly instead of walking roots.
    /// Returns `false` on cancellation.
    fn scan(&self, monitor: &mut FileMonitor, ctx: &BuildSessionContext) -> bool {
        let ambiguity: RefCell<Option<String>> = RefCell::new(None);
        let classify = |path: &Path| match self.registry.classify(path) {
            Ok(Some(descriptor)) => Some(descriptor.id().clone()),
            Ok(None) => None,
            Err(e) => {
                ambiguity.borrow_mut().get_or_insert_with(|| e.to_string());
                None
            }
        };

        let mut roots: Vec<ScanRoot> = ctx
            .scope()
            .roots()
            .iter()
            .map(|root| ScanRoot {
                path: root.path.clone(),
                generated: false,
                module: Some(root.module.clone()),
            })
            .collect();
        for descriptor in self.registry.in_order() {
            for attached in ctx.scope().attached_dirs_for(descriptor.id()) {
                if roots.iter().all(|root| root.path != attached.dir) {
                    roots.push(ScanRoot {
                        path: attached.dir.clone(),
                        generated: true,
                        module: None,
                    });
                }
            }
        }

        ctx.progress().set_text("Scanning sources");
        if !monitor.scan_source_roots(&roots, &classify, ctx.progress()) {
            return false;
        }

        for path in ctx.scope().explicit_files() {
            if let Some(backend) = classify(path) {
                monitor.observe(
                    path,
                    backend,
                    ctx.is_generated(path),
                    ctx.scope().module_of(path).map(str::to_string),
                );
            }
        }

        if let Some(reason) = ambiguity.borrow().clone() {
            // Ambiguous classification is a configuration error, reported
            // once for the session, not resolved silently.
            ctx.add_message(BuildMessage::error(reason));
        }
        true
    }

    /// In-scope files owned by one backend: tracked sources under scope
    /// roots or admitted intermediate directories, plus explicit files.
    fn candidates(
        &self,
        monitor: &FileMonitor,
        ctx: &BuildSessionContext,
        descriptor: &BackendDescriptor,
        kind: RequestKind,
        excludes: &[PathBuf],
    ) -> Vec<PathBuf> {
        let backend_id = descriptor.id();
        let attached: Vec<&Path> = ctx
            .scope()
            .attached_dirs_for(backend_id)
            .map(|a| a.dir.as_path())
            .collect();

        monitor
            .tracked_files()
            .filter(|(path, record)| {
                if record.backend != *backend_id {
                    return false;
                }
                let in_scope = ctx.scope().contains(path)
                    || attached.iter().any(|dir| path.starts_with(dir));
                if !in_scope {
                    return false;
                }
                // Explicit compile ignores the exclusion list; make honors it.
                kind == RequestKind::ForceCompile || !is_excluded(path, excludes)
            })
            .map(|(path, _)| path.to_path_buf())
            .collect()
    }

    fn run_processing_backend(
        &self,
        backend: &dyn ProcessingBackend,
        descriptor: &BackendDescriptor,
        ctx: &BuildSessionContext,
        composite: &mut CompositeDependencyCache,
        kind: RequestKind,
    ) -> Result<usize, ExitStatus> {
        let backend_id = descriptor.id().clone();
        let output_root = ctx.output_root_for(&backend_id);
        let run = BackendRun {
            sink: ctx.sink(),
            progress: ctx.progress(),
            workspace_root: &self.workspace_root,
            output_root: &output_root,
        };

        let items = backend.items_to_process(&run);
        let force = kind != RequestKind::Make;

        // The at-most-one-build-per-unchanged-fingerprint guarantee: only
        // items whose fingerprint differs from the committed one, that were
        // never seen, or that are forced, reach `process`.
        let mut pending = Vec::new();
        for item in items {
            if ctx.progress().is_cancelled() {
                return Err(self.cancelled(composite));
            }
            let needs_processing = force
                || match composite
                    .state(&backend_id)
                    .and_then(|state| state.get(item.output()).map(|bytes| bytes.to_vec()))
                {
                    None => true,
                    Some(stored) => match backend.read_validity_state(&stored) {
                        Ok(previous) => !previous.matches(item.validity().as_ref()),
                        Err(_) => true,
                    },
                };
            if needs_processing {
                pending.push(item);
            }
        }
        if pending.is_empty() {
            return Ok(0);
        }

        if let Err(e) = std::fs::create_dir_all(&output_root) {
            ctx.add_message(BuildMessage::error(format!(
                "cannot create output directory {}: {e}",
                output_root.display()
            )));
            return Ok(0);
        }

        ctx.progress()
            .set_text(format!("Processing with {}", backend.description()));
        let succeeded = backend.process(&run, &pending);
        let succeeded: HashSet<usize> = succeeded.into_iter().collect();

        if let Some(state) = composite.state(&backend_id) {
            for (index, item) in pending.iter().enumerate() {
                if succeeded.contains(&index) {
                    let mut fingerprint = Vec::new();
                    item.validity().write_to(&mut fingerprint);
                    state.put(item.output().to_path_buf(), fingerprint);
                } else {
                    // Leave the fingerprint unset so the item retries.
                    state.remove(item.output());
                }
            }
        }

        Ok(succeeded.len())
    }

    fn excluded_paths(&self) -> Vec<PathBuf> {
        self.config
            .exclude
            .iter()
            .map(|path| {
                if path.is_absolute() {
                    path.clone()
                } else {
                    self.workspace_root.join(path)
                }
            })
            .collect()
    }

    fn cancelled(&self, composite: &mut CompositeDependencyCache) -> ExitStatus {
        // Cancellation behaves like "stop early": drop staged mutations so
        // the caches keep their last-committed state, never partial work.
        composite.reset_all();
        let _ = self.dirs.write_status(false);
        ExitStatus::Cancelled
    }

    fn corruption_detected(
        &self,
        ctx: &BuildSessionContext,
        composite: &mut CompositeDependencyCache,
        reason: &str,
    ) -> ExitStatus {
        ctx.add_message(BuildMessage::warning(format!(
            "dependency caches can no longer be trusted: {reason}"
        )));
        // Persist the marker first: even if the process dies before the
        // recovery rebuild finishes, the next launch starts owing one.
        let _ = self.dirs.write_rebuild_marker(reason);
        composite.reset_all();
        let _ = composite.wipe_all();
        ExitStatus::RebuildRequested
    }
}

fn is_excluded(path: &Path, excludes: &[PathBuf]) -> bool {
    excludes.iter().any(|ex| path.starts_with(ex))
}

fn collect_files_under(dir: &Path, files: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_files_under(&path, files);
        } else {
            files.push(path);
        }
    }
}
