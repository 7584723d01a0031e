//! The file monitor: change detection and output bookkeeping.

use anvil_common::{BackendId, FileId, FileStamp};
use anvil_messages::ProgressIndicator;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};

use crate::error::MonitorError;
use crate::record::{FileRecord, RecordedOutput};

/// Name of the persisted monitor state inside the engine directory.
const MONITOR_FILE: &str = "monitor.json";

/// One root handed to the initial scan.
#[derive(Debug, Clone)]
pub struct ScanRoot {
    /// Absolute directory to walk.
    pub path: PathBuf,
    /// Whether files under this root were generated by an earlier backend.
    pub generated: bool,
    /// The module owning this root, if any.
    pub module: Option<String>,
}

/// An output whose source is gone and which must be deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObsoleteOutput {
    /// The stale output file.
    pub output: PathBuf,
    /// The source that used to produce it.
    pub source: PathBuf,
    /// The stable id the source had, for pruning its dependency graph unit.
    pub source_id: FileId,
}

/// Result of [`FileMonitor::collect_files`]: the two disjoint work sets of
/// one backend.
#[derive(Debug, Default)]
pub struct CollectedFiles {
    /// Files to (re)compile: new, modified since the last successful
    /// compile, or forced.
    pub to_compile: Vec<PathBuf>,
    /// Outputs to delete: source removed but output remains.
    pub to_delete: Vec<ObsoleteOutput>,
}

/// Blocking join point for the initial source scan.
///
/// Callers that must not race the scan call [`wait`](Self::wait); the scan
/// calls [`complete`](Self::complete) when done. Completion is sticky.
pub struct InitGate {
    done: Mutex<bool>,
    cond: Condvar,
}

impl InitGate {
    /// A gate that has not completed yet.
    pub fn new() -> Self {
        Self {
            done: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    /// Marks initialization complete and wakes all waiters.
    pub fn complete(&self) {
        let mut done = self.done.lock().unwrap();
        *done = true;
        self.cond.notify_all();
    }

    /// Blocks until initialization completes.
    pub fn wait(&self) {
        let mut done = self.done.lock().unwrap();
        while !*done {
            done = self.cond.wait(done).unwrap();
        }
    }

    /// Returns `true` if initialization has completed.
    pub fn is_complete(&self) -> bool {
        *self.done.lock().unwrap()
    }
}

impl Default for InitGate {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OutputTombstone {
    source: PathBuf,
    source_id: FileId,
    backend: BackendId,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct MonitorState {
    /// Next file id to allocate. Ids are never reused while the cache lives.
    next_file_id: u32,
    /// Per-source records, keyed by absolute path.
    files: BTreeMap<PathBuf, FileRecord>,
    /// Outputs whose sources are gone, keyed by output path.
    outputs_to_delete: BTreeMap<PathBuf, OutputTombstone>,
}

/// Tracks source files, their backend ownership, last-compiled stamps, and
/// produced outputs across process restarts.
pub struct FileMonitor {
    state_path: PathBuf,
    state: MonitorState,
    /// In-memory reverse map, rebuilt from `state.files`.
    by_id: HashMap<FileId, PathBuf>,
    load_failed: bool,
    init: Arc<InitGate>,
}

impl FileMonitor {
    /// Loads monitor state from the engine directory, or starts empty.
    ///
    /// Loading is fail-safe: unreadable state yields an empty monitor with
    /// [`state_was_unreadable`](Self::state_was_unreadable) set, and the
    /// driver owes a full rebuild. The monitor can always be reconstructed
    /// from a cold scan, so a hard corruption error would gain nothing.
    pub fn load(engine_dir: &Path) -> Self {
        let state_path = engine_dir.join(MONITOR_FILE);
        let (state, load_failed) = match std::fs::read_to_string(&state_path) {
            Ok(content) => match serde_json::from_str::<MonitorState>(&content) {
                Ok(state) => (state, false),
                Err(_) => (MonitorState::default(), true),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                (MonitorState::default(), false)
            }
            Err(_) => (MonitorState::default(), true),
        };

        let by_id = state
            .files
            .iter()
            .map(|(path, record)| (record.id, path.clone()))
            .collect();

        Self {
            state_path,
            state,
            by_id,
            load_failed,
            init: Arc::new(InitGate::new()),
        }
    }

    /// Returns `true` if persisted state existed but could not be read.
    pub fn state_was_unreadable(&self) -> bool {
        self.load_failed
    }

    /// The scan join gate, shareable with callers on other threads.
    pub fn init_gate(&self) -> Arc<InitGate> {
        Arc::clone(&self.init)
    }

    /// Blocks until the initial scan has completed.
    pub fn ensure_initialization_completed(&self) {
        self.init.wait();
    }

    /// The stable id of a known file.
    pub fn file_id(&self, path: &Path) -> Option<FileId> {
        self.state.files.get(path).map(|record| record.id)
    }

    /// The path registered for a stable id.
    pub fn path_of(&self, id: FileId) -> Option<&Path> {
        self.by_id.get(&id).map(PathBuf::as_path)
    }

    /// The record of a known file.
    pub fn record(&self, path: &Path) -> Option<&FileRecord> {
        self.state.files.get(path)
    }

    /// Number of tracked files.
    pub fn file_count(&self) -> usize {
        self.state.files.len()
    }

    /// Iterates all tracked files with their records.
    pub fn tracked_files(&self) -> impl Iterator<Item = (&Path, &FileRecord)> {
        self.state
            .files
            .iter()
            .map(|(path, record)| (path.as_path(), record))
    }

    /// Performs the cold initial scan of the given roots.
    ///
    /// Walks each root, classifies every file to at most one backend via
    /// `classify`, creates records for newly observed files, and schedules
    /// output deletion for recorded files that disappeared from scanned
    /// roots. Stamps are gathered in parallel. The scan polls `progress` at
    /// root and file granularity and stops early on cancellation, leaving
    /// already-applied records in place; compilation decisions are deferred
    /// to [`collect_files`](Self::collect_files) either way.
    ///
    /// Completes the init gate unless cancelled.
    pub fn scan_source_roots(
        &mut self,
        roots: &[ScanRoot],
        classify: &dyn Fn(&Path) -> Option<BackendId>,
        progress: &ProgressIndicator,
    ) -> bool {
        let total = roots.len().max(1);
        let mut seen: HashSet<PathBuf> = HashSet::new();
        let mut scanned_roots: Vec<&ScanRoot> = Vec::new();

        for (index, root) in roots.iter().enumerate() {
            if progress.is_cancelled() {
                return false;
            }
            progress.set_text(format!("Scanning {}", root.path.display()));
            progress.set_fraction(index as f64 / total as f64);

            let mut files = Vec::new();
            collect_files_under(&root.path, &mut files);

            let stamped: Vec<(PathBuf, Option<FileStamp>)> = files
                .into_par_iter()
                .map(|path| {
                    let stamp = FileStamp::of_path(&path).ok();
                    (path, stamp)
                })
                .collect();

            for (path, stamp) in stamped {
                if progress.is_cancelled() {
                    return false;
                }
                if stamp.is_none() {
                    continue;
                }
                let Some(backend) = classify(&path) else {
                    continue;
                };
                seen.insert(path.clone());
                self.observe(&path, backend, root.generated, root.module.clone());
            }
            scanned_roots.push(root);
        }

        // Files recorded under a scanned root but no longer on disk are
        // deleted sources: drop the record, keep their outputs for deletion.
        let missing: Vec<PathBuf> = self
            .state
            .files
            .keys()
            .filter(|path| {
                scanned_roots.iter().any(|root| path.starts_with(&root.path))
                    && !seen.contains(*path)
            })
            .cloned()
            .collect();
        for path in missing {
            self.remove_source(&path);
        }

        progress.set_fraction(1.0);
        self.init.complete();
        true
    }

    /// Records a file observation, allocating a stable id on first sight.
    ///
    /// A file whose classification changed (config edit moved it to another
    /// backend) keeps its id but is marked never-compiled so the new backend
    /// picks it up.
    pub fn observe(
        &mut self,
        path: &Path,
        backend: BackendId,
        generated: bool,
        module: Option<String>,
    ) -> FileId {
        if let Some(record) = self.state.files.get_mut(path) {
            if record.backend != backend {
                record.backend = backend;
                record.last_compiled = None;
            }
            record.generated = generated;
            if module.is_some() {
                record.module = module;
            }
            return record.id;
        }

        let id = FileId(self.state.next_file_id);
        self.state.next_file_id += 1;
        let mut record = FileRecord::new(id, backend);
        record.generated = generated;
        record.module = module;
        self.state.files.insert(path.to_path_buf(), record);
        self.by_id.insert(id, path.to_path_buf());
        id
    }

    /// Produces the two disjoint work sets for one backend.
    ///
    /// `candidates` are the in-scope files already classified to `backend`.
    /// With `force` or `rebuild` every candidate is included; otherwise only
    /// files that are new, changed since their last successful compile, or
    /// modified at/after `session_start`. Output deletions are skipped on
    /// rebuild, where whole output directories are cleared instead.
    pub fn collect_files(
        &self,
        backend: &BackendId,
        candidates: &[PathBuf],
        force: bool,
        rebuild: bool,
        session_start: FileStamp,
    ) -> CollectedFiles {
        let force = force || rebuild;
        let mut collected = CollectedFiles::default();

        for path in candidates {
            let Ok(on_disk) = FileStamp::of_path(path) else {
                continue;
            };
            let dirty = match self.state.files.get(path) {
                Some(record) => {
                    record.backend == *backend && (force || record.is_dirty(on_disk, session_start))
                }
                None => true,
            };
            if dirty {
                collected.to_compile.push(path.clone());
            }
        }
        collected.to_compile.sort();

        if !rebuild {
            for (output, tombstone) in &self.state.outputs_to_delete {
                if tombstone.backend == *backend {
                    collected.to_delete.push(ObsoleteOutput {
                        output: output.clone(),
                        source: tombstone.source.clone(),
                        source_id: tombstone.source_id,
                    });
                }
            }
        }

        collected
    }

    /// Records a successful compile of `source` with its produced outputs.
    ///
    /// The recorded stamp is the file's current on-disk stamp, unless the
    /// file was modified at/after `session_start`, in which case it stays
    /// marked never-compiled: a file changed during the build is not
    /// considered compiled by it. Generated sources are exempt from the
    /// session-start guard, since the session itself produces them before
    /// their consumer runs. Re-produced outputs lose any pending deletion
    /// tombstone.
    pub fn update_compiled(
        &mut self,
        source: &Path,
        outputs: Vec<RecordedOutput>,
        session_start: FileStamp,
    ) {
        for output in &outputs {
            self.state.outputs_to_delete.remove(&output.path);
        }

        let Some(record) = self.state.files.get_mut(source) else {
            return;
        };
        record.last_compiled = match FileStamp::of_path(source) {
            Ok(stamp) if stamp < session_start || record.generated => Some(stamp),
            _ => None,
        };
        record.outputs = outputs;
    }

    /// Marks a file failed: it stays dirty and is retried next build.
    pub fn mark_failed(&mut self, source: &Path) {
        if let Some(record) = self.state.files.get_mut(source) {
            record.last_compiled = None;
        }
    }

    /// Marks every tracked file dirty; used before a full rebuild.
    pub fn mark_all_dirty(&mut self) {
        for record in self.state.files.values_mut() {
            record.last_compiled = None;
        }
    }

    /// Removes a deleted source, scheduling its recorded outputs for
    /// deletion.
    pub fn remove_source(&mut self, path: &Path) {
        let Some(record) = self.state.files.remove(path) else {
            return;
        };
        self.by_id.remove(&record.id);
        for output in record.outputs {
            self.state.outputs_to_delete.insert(
                output.path,
                OutputTombstone {
                    source: path.to_path_buf(),
                    source_id: record.id,
                    backend: record.backend.clone(),
                },
            );
        }
    }

    /// Acknowledges that a stale output has been deleted from disk.
    pub fn mark_output_deleted(&mut self, output: &Path) {
        self.state.outputs_to_delete.remove(output);
    }

    /// Reverse query: which source produced this output.
    pub fn source_of_output(&self, output: &Path) -> Option<&Path> {
        for (source, record) in &self.state.files {
            if record.outputs.iter().any(|o| o.path == output) {
                return Some(source.as_path());
            }
        }
        self.state
            .outputs_to_delete
            .get(output)
            .map(|tombstone| tombstone.source.as_path())
    }

    /// Persists monitor state atomically.
    pub fn save(&self) -> Result<(), MonitorError> {
        if let Some(parent) = self.state_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| MonitorError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let json = serde_json::to_string_pretty(&self.state).map_err(|e| {
            MonitorError::Serialization {
                reason: e.to_string(),
            }
        })?;
        let tmp = self.state_path.with_extension("tmp");
        std::fs::write(&tmp, json).map_err(|e| MonitorError::Io {
            path: tmp.clone(),
            source: e,
        })?;
        std::fs::rename(&tmp, &self.state_path).map_err(|e| MonitorError::Io {
            path: self.state_path.clone(),
            source: e,
        })
    }
}

/// Recursively collects regular files under `dir`. Unreadable directories
/// are skipped; their files will surface on a later scan.
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

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_backend() -> BackendId {
        BackendId::new("unit")
    }

    fn classify_u(path: &Path) -> Option<BackendId> {
        (path.extension().and_then(|e| e.to_str()) == Some("u")).then(unit_backend)
    }

    fn scan(monitor: &mut FileMonitor, root: &Path) -> bool {
        let roots = vec![ScanRoot {
            path: root.to_path_buf(),
            generated: false,
            module: Some("core".to_string()),
        }];
        monitor.scan_source_roots(&roots, &classify_u, &ProgressIndicator::new())
    }

    #[test]
    fn scan_observes_classified_files() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(src.join("a.u"), "unit a").unwrap();
        std::fs::write(src.join("skip.txt"), "not ours").unwrap();

        let mut monitor = FileMonitor::load(dir.path());
        assert!(scan(&mut monitor, &src));

        assert_eq!(monitor.file_count(), 1);
        let record = monitor.record(&src.join("a.u")).unwrap();
        assert_eq!(record.backend, unit_backend());
        assert_eq!(record.module.as_deref(), Some("core"));
        assert!(record.last_compiled.is_none());
        assert!(monitor.init_gate().is_complete());
    }

    #[test]
    fn ids_are_stable_across_scans() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(src.join("a.u"), "unit a").unwrap();

        let mut monitor = FileMonitor::load(dir.path());
        scan(&mut monitor, &src);
        let first = monitor.file_id(&src.join("a.u")).unwrap();

        scan(&mut monitor, &src);
        let second = monitor.file_id(&src.join("a.u")).unwrap();
        assert_eq!(first, second);
        assert_eq!(monitor.path_of(first), Some(src.join("a.u").as_path()));
    }

    #[test]
    fn collect_new_file_is_dirty() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        let file = src.join("a.u");
        std::fs::write(&file, "unit a").unwrap();

        let mut monitor = FileMonitor::load(dir.path());
        scan(&mut monitor, &src);

        let collected = monitor.collect_files(
            &unit_backend(),
            &[file.clone()],
            false,
            false,
            FileStamp::now(),
        );
        assert_eq!(collected.to_compile, vec![file]);
        assert!(collected.to_delete.is_empty());
    }

    #[test]
    fn compiled_file_becomes_clean_then_dirty_on_touch() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        let file = src.join("a.u");
        std::fs::write(&file, "unit a").unwrap();

        let mut monitor = FileMonitor::load(dir.path());
        scan(&mut monitor, &src);
        monitor.update_compiled(&file, vec![], FileStamp::now());

        let collected = monitor.collect_files(
            &unit_backend(),
            &[file.clone()],
            false,
            false,
            FileStamp::now(),
        );
        assert!(collected.to_compile.is_empty());

        // Touch with different content; mtime granularity can be coarse, so
        // bump the stamp explicitly via a rewrite after a short wait.
        std::thread::sleep(std::time::Duration::from_millis(20));
        std::fs::write(&file, "unit a changed").unwrap();

        let collected = monitor.collect_files(
            &unit_backend(),
            &[file.clone()],
            false,
            false,
            FileStamp::now(),
        );
        assert_eq!(collected.to_compile, vec![file]);
    }

    #[test]
    fn force_includes_clean_files() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        let file = src.join("a.u");
        std::fs::write(&file, "unit a").unwrap();

        let mut monitor = FileMonitor::load(dir.path());
        scan(&mut monitor, &src);
        monitor.update_compiled(&file, vec![], FileStamp::now());

        let collected = monitor.collect_files(
            &unit_backend(),
            &[file.clone()],
            true,
            false,
            FileStamp::now(),
        );
        assert_eq!(collected.to_compile, vec![file]);
    }

    #[test]
    fn modified_during_build_stays_dirty() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        let file = src.join("a.u");
        std::fs::write(&file, "unit a").unwrap();

        let mut monitor = FileMonitor::load(dir.path());
        scan(&mut monitor, &src);

        // Session started before the file's stamp: the compile is recorded
        // as not-yet-compiled.
        monitor.update_compiled(&file, vec![], FileStamp::ZERO);
        let record = monitor.record(&file).unwrap();
        assert!(record.last_compiled.is_none());
    }

    #[test]
    fn generated_file_compiled_mid_session_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let gen_dir = dir.path().join("generated");
        std::fs::create_dir_all(&gen_dir).unwrap();

        let mut monitor = FileMonitor::load(dir.path());
        let session_start = FileStamp::now();

        // The session itself produces the file after its start stamp.
        std::thread::sleep(std::time::Duration::from_millis(5));
        let file = gen_dir.join("g.u");
        std::fs::write(&file, "generated unit").unwrap();
        monitor.observe(&file, unit_backend(), true, None);

        monitor.update_compiled(&file, vec![], session_start);
        assert!(monitor.record(&file).unwrap().last_compiled.is_some());
    }

    #[test]
    fn deleted_source_schedules_output_deletion() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        let file = src.join("a.u");
        std::fs::write(&file, "unit a").unwrap();

        let mut monitor = FileMonitor::load(dir.path());
        scan(&mut monitor, &src);
        monitor.update_compiled(
            &file,
            vec![RecordedOutput {
                output_root: dir.path().join("build"),
                path: dir.path().join("build/a.obj"),
            }],
            FileStamp::now(),
        );

        std::fs::remove_file(&file).unwrap();
        scan(&mut monitor, &src);

        let collected =
            monitor.collect_files(&unit_backend(), &[], false, false, FileStamp::now());
        assert_eq!(collected.to_delete.len(), 1);
        assert_eq!(collected.to_delete[0].output, dir.path().join("build/a.obj"));
        assert_eq!(collected.to_delete[0].source, file);

        monitor.mark_output_deleted(&dir.path().join("build/a.obj"));
        let collected =
            monitor.collect_files(&unit_backend(), &[], false, false, FileStamp::now());
        assert!(collected.to_delete.is_empty());
    }

    #[test]
    fn rebuild_skips_output_deletion() {
        let dir = tempfile::tempdir().unwrap();
        let mut monitor = FileMonitor::load(dir.path());
        monitor.observe(Path::new("/ws/a.u"), unit_backend(), false, None);
        monitor.update_compiled(
            Path::new("/ws/a.u"),
            vec![RecordedOutput {
                output_root: PathBuf::from("/ws/build"),
                path: PathBuf::from("/ws/build/a.obj"),
            }],
            FileStamp::now(),
        );
        monitor.remove_source(Path::new("/ws/a.u"));

        let incremental =
            monitor.collect_files(&unit_backend(), &[], false, false, FileStamp::now());
        assert_eq!(incremental.to_delete.len(), 1);

        let rebuild = monitor.collect_files(&unit_backend(), &[], false, true, FileStamp::now());
        assert!(rebuild.to_delete.is_empty());
    }

    #[test]
    fn source_of_output_reverse_query() {
        let dir = tempfile::tempdir().unwrap();
        let mut monitor = FileMonitor::load(dir.path());
        monitor.observe(Path::new("/ws/a.u"), unit_backend(), false, None);
        monitor.update_compiled(
            Path::new("/ws/a.u"),
            vec![RecordedOutput {
                output_root: PathBuf::from("/ws/build"),
                path: PathBuf::from("/ws/build/a.obj"),
            }],
            FileStamp::now(),
        );

        assert_eq!(
            monitor.source_of_output(Path::new("/ws/build/a.obj")),
            Some(Path::new("/ws/a.u"))
        );
        assert_eq!(monitor.source_of_output(Path::new("/ws/build/b.obj")), None);
    }

    #[test]
    fn state_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        let file = src.join("a.u");
        std::fs::write(&file, "unit a").unwrap();

        let id;
        {
            let mut monitor = FileMonitor::load(dir.path());
            scan(&mut monitor, &src);
            monitor.update_compiled(&file, vec![], FileStamp::now());
            id = monitor.file_id(&file).unwrap();
            monitor.save().unwrap();
        }

        let monitor = FileMonitor::load(dir.path());
        assert!(!monitor.state_was_unreadable());
        assert_eq!(monitor.file_id(&file), Some(id));
        assert!(monitor.record(&file).unwrap().last_compiled.is_some());
    }

    #[test]
    fn change_while_not_running_detected_after_restart() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        let file = src.join("a.u");
        std::fs::write(&file, "unit a").unwrap();

        {
            let mut monitor = FileMonitor::load(dir.path());
            scan(&mut monitor, &src);
            monitor.update_compiled(&file, vec![], FileStamp::now());
            monitor.save().unwrap();
        }

        // Modify while no monitor is alive.
        std::thread::sleep(std::time::Duration::from_millis(20));
        std::fs::write(&file, "unit a, edited offline").unwrap();

        let monitor = FileMonitor::load(dir.path());
        let collected = monitor.collect_files(
            &unit_backend(),
            &[file.clone()],
            false,
            false,
            FileStamp::now(),
        );
        assert_eq!(collected.to_compile, vec![file]);
    }

    #[test]
    fn unreadable_state_degrades_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(MONITOR_FILE), "{{{ not json").unwrap();

        let monitor = FileMonitor::load(dir.path());
        assert!(monitor.state_was_unreadable());
        assert_eq!(monitor.file_count(), 0);
    }

    #[test]
    fn mark_failed_keeps_file_dirty() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        let file = src.join("a.u");
        std::fs::write(&file, "unit a").unwrap();

        let mut monitor = FileMonitor::load(dir.path());
        scan(&mut monitor, &src);
        monitor.update_compiled(&file, vec![], FileStamp::now());
        monitor.mark_failed(&file);

        let collected = monitor.collect_files(
            &unit_backend(),
            &[file.clone()],
            false,
            false,
            FileStamp::now(),
        );
        assert_eq!(collected.to_compile, vec![file]);
    }

    #[test]
    fn cancelled_scan_does_not_complete_gate() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(src.join("a.u"), "unit a").unwrap();

        let mut monitor = FileMonitor::load(dir.path());
        let progress = ProgressIndicator::new();
        progress.cancel();
        let roots = vec![ScanRoot {
            path: src,
            generated: false,
            module: None,
        }];
        assert!(!monitor.scan_source_roots(&roots, &classify_u, &progress));
        assert!(!monitor.init_gate().is_complete());
    }

    #[test]
    fn init_gate_blocks_until_complete() {
        let gate = Arc::new(InitGate::new());
        let waiter = Arc::clone(&gate);
        let handle = std::thread::spawn(move || {
            waiter.wait();
            true
        });
        std::thread::sleep(std::time::Duration::from_millis(10));
        gate.complete();
        assert!(handle.join().unwrap());
    }
}
