//! Per-backend dependency graph store.
//!
//! Maps each compiled unit to the set of qualified names it declares and the
//! set of external names it references, with a reverse index for "who
//! references name X". Qualified names are backend-defined opaque strings;
//! the store only indexes them.

use anvil_common::{BackendId, FileId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

use crate::envelope::{read_envelope, write_envelope};
use crate::error::CacheError;

/// File name of the persisted graph inside a backend's cache directory.
const GRAPH_FILE: &str = "deps.bin";

/// Factory producing a backend's graph store, opened from its cache directory.
///
/// Registered per backend descriptor; the default builds a
/// [`SymbolGraphStore`]. Opening must distinguish a fresh cache (empty store)
/// from a corrupted one ([`CacheError::Corrupted`]).
pub type GraphStoreFactory =
    fn(BackendId, &Path) -> Result<Box<dyn GraphStore>, CacheError>;

/// The per-backend dependency graph contract.
///
/// Graph mutations are staged during a session via
/// [`register_processed`](Self::register_processed) and committed by a single
/// [`update`](Self::update) call per backend per session; backends may
/// parallelize item processing but must not mutate graph state concurrently.
pub trait GraphStore: Send {
    /// The backend this store belongs to.
    fn backend(&self) -> &BackendId;

    /// Qualified names declared by a unit, according to committed state.
    fn declared_symbols(&self, file: FileId) -> Vec<String>;

    /// Units referencing the given qualified name, according to committed state.
    fn referencing_files(&self, symbol: &str) -> Vec<FileId>;

    /// Computes the closure of units that transitively reference any symbol
    /// declared by a changed unit.
    ///
    /// The result always includes `changed` itself. The closure repeats until
    /// fixpoint; a visited set keyed by unit identity guarantees termination
    /// on cyclic reference graphs. The caller-supplied `filter` can
    /// short-circuit expansion: a unit for which it returns `false` is still
    /// included in the result but its declarations are not expanded further.
    fn find_dependents(
        &self,
        changed: &HashSet<FileId>,
        filter: &dyn Fn(FileId) -> bool,
    ) -> HashSet<FileId>;

    /// Stages new declarations and references for a unit just compiled.
    fn register_processed(&mut self, file: FileId, declared: Vec<String>, referenced: Vec<String>);

    /// Removes a deleted unit from the graph (staged until [`update`](Self::update)).
    fn remove_file(&mut self, file: FileId);

    /// Commits staged edges and declarations to memory and disk.
    ///
    /// Orphan edges, i.e. reference entries of units no longer present in
    /// the store, are pruned. The write is atomic with respect to process
    /// crash: a torn write is observable on the next open as corruption,
    /// never as silently partial data.
    fn update(&mut self) -> Result<(), CacheError>;

    /// Drops all in-memory traversal bookkeeping and staged mutations.
    fn reset_state(&mut self);

    /// Clears the accumulated traverse roots.
    fn clear_traverse_roots(&mut self);

    /// Returns `true` if committed updates changed declarations that have
    /// not been traversed yet.
    fn has_unprocessed_traverse_roots(&self) -> bool;

    /// Discards the whole graph, in memory and on disk.
    ///
    /// Used on corruption and before a full rebuild, where the closure is
    /// "everything" and no previous state may be trusted.
    fn wipe(&mut self) -> Result<(), CacheError>;
}

/// Committed graph data as persisted to disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct GraphData {
    /// Units known to the store. Every edge's referencing unit must be in
    /// this set; others are pruned on update.
    units: BTreeSet<FileId>,
    /// Unit -> qualified names it declares.
    declarations: BTreeMap<FileId, BTreeSet<String>>,
    /// Unit -> qualified names it references.
    references: BTreeMap<FileId, BTreeSet<String>>,
}

#[derive(Debug, Default)]
struct StagedUnit {
    declared: Vec<String>,
    referenced: Vec<String>,
}

/// The standard symbol-indexed [`GraphStore`] implementation.
#[derive(Debug)]
pub struct SymbolGraphStore {
    backend: BackendId,
    path: PathBuf,
    data: GraphData,
    /// symbol -> referencing units, rebuilt from `data` on load and commit.
    reverse: HashMap<String, HashSet<FileId>>,
    staged: BTreeMap<FileId, StagedUnit>,
    staged_removals: BTreeSet<FileId>,
    traverse_roots: HashSet<FileId>,
}

impl SymbolGraphStore {
    /// Opens the store for a backend from the engine's cache directory.
    ///
    /// A missing artifact yields an empty store; an unreadable one is a
    /// corruption error, because silently starting empty would skip
    /// recompilations the stale graph still owes.
    pub fn open(backend: BackendId, cache_dir: &Path) -> Result<Self, CacheError> {
        let path = cache_dir.join(backend.as_str()).join(GRAPH_FILE);
        let data = match read_envelope(&path)? {
            Some(payload) => {
                bincode::serde::decode_from_slice(&payload, bincode::config::standard())
                    .map_err(|e| CacheError::corrupted(&path, format!("unreadable graph: {e}")))?
                    .0
            }
            None => GraphData::default(),
        };
        let reverse = build_reverse_index(&data);
        Ok(Self {
            backend,
            path,
            data,
            reverse,
            staged: BTreeMap::new(),
            staged_removals: BTreeSet::new(),
            traverse_roots: HashSet::new(),
        })
    }

    /// The default [`GraphStoreFactory`].
    pub fn factory(backend: BackendId, cache_dir: &Path) -> Result<Box<dyn GraphStore>, CacheError> {
        Ok(Box::new(Self::open(backend, cache_dir)?))
    }

    /// Number of units in committed state.
    pub fn unit_count(&self) -> usize {
        self.data.units.len()
    }
}

fn build_reverse_index(data: &GraphData) -> HashMap<String, HashSet<FileId>> {
    let mut reverse: HashMap<String, HashSet<FileId>> = HashMap::new();
    for (file, symbols) in &data.references {
        for symbol in symbols {
            reverse.entry(symbol.clone()).or_default().insert(*file);
        }
    }
    reverse
}

impl GraphStore for SymbolGraphStore {
    fn backend(&self) -> &BackendId {
        &self.backend
    }

    fn declared_symbols(&self, file: FileId) -> Vec<String> {
        self.data
            .declarations
            .get(&file)
            .map(|symbols| symbols.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn referencing_files(&self, symbol: &str) -> Vec<FileId> {
        self.reverse
            .get(symbol)
            .map(|files| files.iter().copied().collect())
            .unwrap_or_default()
    }

    fn find_dependents(
        &self,
        changed: &HashSet<FileId>,
        filter: &dyn Fn(FileId) -> bool,
    ) -> HashSet<FileId> {
        let mut visited: HashSet<FileId> = changed.iter().copied().collect();
        let mut queue: VecDeque<FileId> = changed.iter().copied().collect();

        while let Some(current) = queue.pop_front() {
            if !filter(current) {
                continue;
            }
            let Some(declared) = self.data.declarations.get(&current) else {
                continue;
            };
            for symbol in declared {
                if let Some(referencers) = self.reverse.get(symbol) {
                    for &referencer in referencers {
                        if visited.insert(referencer) {
                            queue.push_back(referencer);
                        }
                    }
                }
            }
        }

        visited
    }

    fn register_processed(&mut self, file: FileId, declared: Vec<String>, referenced: Vec<String>) {
        self.staged_removals.remove(&file);
        self.staged.insert(
            file,
            StagedUnit {
                declared,
                referenced,
            },
        );
    }

    fn remove_file(&mut self, file: FileId) {
        self.staged.remove(&file);
        self.staged_removals.insert(file);
    }

    fn update(&mut self) -> Result<(), CacheError> {
        for file in std::mem::take(&mut self.staged_removals) {
            self.data.units.remove(&file);
        }

        for (file, staged) in std::mem::take(&mut self.staged) {
            let declared: BTreeSet<String> = staged.declared.into_iter().collect();
            let referenced: BTreeSet<String> = staged.referenced.into_iter().collect();

            let declaration_changed = self.data.declarations.get(&file) != Some(&declared);
            if declaration_changed {
                self.traverse_roots.insert(file);
            }

            self.data.units.insert(file);
            self.data.declarations.insert(file, declared);
            self.data.references.insert(file, referenced);
        }

        // Prune orphan edges: entries for units no longer in the store.
        let units = &self.data.units;
        self.data.declarations.retain(|file, _| units.contains(file));
        self.data.references.retain(|file, _| units.contains(file));

        self.reverse = build_reverse_index(&self.data);

        let payload = bincode::serde::encode_to_vec(&self.data, bincode::config::standard())
            .map_err(|e| CacheError::Serialization {
                reason: e.to_string(),
            })?;
        write_envelope(&self.path, &payload)
    }

    fn reset_state(&mut self) {
        self.staged.clear();
        self.staged_removals.clear();
        self.traverse_roots.clear();
    }

    fn clear_traverse_roots(&mut self) {
        self.traverse_roots.clear();
    }

    fn has_unprocessed_traverse_roots(&self) -> bool {
        !self.traverse_roots.is_empty()
    }

    fn wipe(&mut self) -> Result<(), CacheError> {
        self.data = GraphData::default();
        self.reverse.clear();
        self.reset_state();
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::io(&self.path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_store(dir: &Path) -> SymbolGraphStore {
        SymbolGraphStore::open(BackendId::new("unit"), dir).unwrap()
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn ids(items: &[u32]) -> HashSet<FileId> {
        items.iter().map(|&n| FileId(n)).collect()
    }

    const NO_FILTER: fn(FileId) -> bool = |_| true;

    #[test]
    fn fresh_store_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        assert_eq!(store.unit_count(), 0);
        assert!(store.declared_symbols(FileId(1)).is_empty());
        assert!(store.referencing_files("top").is_empty());
    }

    #[test]
    fn direct_dependents() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_store(dir.path());
        // A declares `alpha`; B references `alpha`.
        store.register_processed(FileId(1), strings(&["alpha"]), vec![]);
        store.register_processed(FileId(2), vec![], strings(&["alpha"]));
        store.update().unwrap();

        let dependents = store.find_dependents(&ids(&[1]), &NO_FILTER);
        assert_eq!(dependents, ids(&[1, 2]));
    }

    #[test]
    fn transitive_dependents() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_store(dir.path());
        // A -> B -> C chain through declared names.
        store.register_processed(FileId(1), strings(&["a"]), vec![]);
        store.register_processed(FileId(2), strings(&["b"]), strings(&["a"]));
        store.register_processed(FileId(3), vec![], strings(&["b"]));
        store.update().unwrap();

        let dependents = store.find_dependents(&ids(&[1]), &NO_FILTER);
        assert_eq!(dependents, ids(&[1, 2, 3]));
    }

    #[test]
    fn no_edges_means_no_extra_units() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_store(dir.path());
        store.register_processed(FileId(1), strings(&["lonely"]), vec![]);
        store.register_processed(FileId(2), strings(&["other"]), vec![]);
        store.update().unwrap();

        // Minimality: nothing references `lonely`, so the closure is exactly
        // the changed set.
        let dependents = store.find_dependents(&ids(&[1]), &NO_FILTER);
        assert_eq!(dependents, ids(&[1]));
    }

    #[test]
    fn cyclic_references_terminate() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_store(dir.path());
        store.register_processed(FileId(1), strings(&["a"]), strings(&["b"]));
        store.register_processed(FileId(2), strings(&["b"]), strings(&["a"]));
        store.update().unwrap();

        let dependents = store.find_dependents(&ids(&[1]), &NO_FILTER);
        assert_eq!(dependents, ids(&[1, 2]));
    }

    #[test]
    fn filter_short_circuits_expansion() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_store(dir.path());
        store.register_processed(FileId(1), strings(&["a"]), vec![]);
        store.register_processed(FileId(2), strings(&["b"]), strings(&["a"]));
        store.register_processed(FileId(3), vec![], strings(&["b"]));
        store.update().unwrap();

        // Do not expand past unit 2: unit 3 must not be pulled in.
        let filter = |file: FileId| file != FileId(2);
        let dependents = store.find_dependents(&ids(&[1]), &filter);
        assert_eq!(dependents, ids(&[1, 2]));
    }

    #[test]
    fn update_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut store = open_store(dir.path());
            store.register_processed(FileId(1), strings(&["top"]), vec![]);
            store.register_processed(FileId(2), vec![], strings(&["top"]));
            store.update().unwrap();
        }

        let store = open_store(dir.path());
        assert_eq!(store.unit_count(), 2);
        assert_eq!(store.declared_symbols(FileId(1)), strings(&["top"]));
        assert_eq!(store.referencing_files("top"), vec![FileId(2)]);
    }

    #[test]
    fn remove_file_prunes_edges() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_store(dir.path());
        store.register_processed(FileId(1), strings(&["a"]), vec![]);
        store.register_processed(FileId(2), vec![], strings(&["a"]));
        store.update().unwrap();

        store.remove_file(FileId(2));
        store.update().unwrap();

        assert!(store.referencing_files("a").is_empty());
        let dependents = store.find_dependents(&ids(&[1]), &NO_FILTER);
        assert_eq!(dependents, ids(&[1]));
    }

    #[test]
    fn traverse_roots_follow_declaration_changes() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_store(dir.path());
        assert!(!store.has_unprocessed_traverse_roots());

        store.register_processed(FileId(1), strings(&["a"]), vec![]);
        store.update().unwrap();
        assert!(store.has_unprocessed_traverse_roots());

        store.clear_traverse_roots();
        assert!(!store.has_unprocessed_traverse_roots());

        // Same declarations again: no new traverse root.
        store.register_processed(FileId(1), strings(&["a"]), vec![]);
        store.update().unwrap();
        assert!(!store.has_unprocessed_traverse_roots());

        // Changed declarations: root again.
        store.register_processed(FileId(1), strings(&["a", "a2"]), vec![]);
        store.update().unwrap();
        assert!(store.has_unprocessed_traverse_roots());
    }

    #[test]
    fn reset_state_drops_staged_work() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_store(dir.path());
        store.register_processed(FileId(1), strings(&["a"]), vec![]);
        store.reset_state();
        store.update().unwrap();
        assert_eq!(store.unit_count(), 0);
    }

    #[test]
    fn wipe_clears_memory_and_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_store(dir.path());
        store.register_processed(FileId(1), strings(&["a"]), vec![]);
        store.update().unwrap();

        store.wipe().unwrap();
        assert_eq!(store.unit_count(), 0);

        let reopened = open_store(dir.path());
        assert_eq!(reopened.unit_count(), 0);
    }

    #[test]
    fn corrupt_artifact_fails_open() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut store = open_store(dir.path());
            store.register_processed(FileId(1), strings(&["a"]), vec![]);
            store.update().unwrap();
        }

        let graph_path = dir.path().join("unit").join(GRAPH_FILE);
        let raw = std::fs::read(&graph_path).unwrap();
        std::fs::write(&graph_path, &raw[..raw.len() / 2]).unwrap();

        let err = SymbolGraphStore::open(BackendId::new("unit"), dir.path()).unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn interrupted_commit_never_exposes_mixed_state() {
        // Simulates a crash that tore the artifact mid-write: the reopened
        // store must either see the pre-commit state or report corruption,
        // never a plausible mixture.
        let dir = tempfile::tempdir().unwrap();
        {
            let mut store = open_store(dir.path());
            store.register_processed(FileId(1), strings(&["a"]), vec![]);
            store.update().unwrap();
        }

        let graph_path = dir.path().join("unit").join(GRAPH_FILE);
        let committed = std::fs::read(&graph_path).unwrap();

        for cut in [4, committed.len() / 3, committed.len() - 1] {
            std::fs::write(&graph_path, &committed[..cut]).unwrap();
            let err = SymbolGraphStore::open(BackendId::new("unit"), dir.path()).unwrap_err();
            assert!(err.is_corruption(), "cut at {cut} must read as corruption");
        }

        // Restoring the full artifact recovers the committed state exactly.
        std::fs::write(&graph_path, &committed).unwrap();
        let store = open_store(dir.path());
        assert_eq!(store.declared_symbols(FileId(1)), strings(&["a"]));
    }

    /// Naive reference closure: repeatedly add any unit referencing a symbol
    /// declared by a unit already in the set, until nothing changes.
    fn naive_closure(
        edges: &[(u32, Vec<&str>, Vec<&str>)],
        changed: &HashSet<FileId>,
    ) -> HashSet<FileId> {
        let mut result = changed.clone();
        loop {
            let mut grew = false;
            for (file, _, referenced) in edges {
                if result.contains(&FileId(*file)) {
                    continue;
                }
                let references_changed = referenced.iter().any(|symbol| {
                    edges.iter().any(|(decl_file, declared, _)| {
                        result.contains(&FileId(*decl_file)) && declared.contains(symbol)
                    })
                });
                if references_changed {
                    result.insert(FileId(*file));
                    grew = true;
                }
            }
            if !grew {
                break;
            }
        }
        result
    }

    #[test]
    fn closure_matches_naive_reference_on_random_graphs() {
        // Deterministic LCG so failures are reproducible.
        let mut seed: u64 = 0x5eed;
        let mut next = move || {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (seed >> 33) as u32
        };

        let symbols = ["s0", "s1", "s2", "s3", "s4", "s5", "s6", "s7"];
        for _round in 0..50 {
            let unit_count = 2 + next() % 9;
            let mut edges: Vec<(u32, Vec<&str>, Vec<&str>)> = Vec::new();
            for file in 0..unit_count {
                let declared: Vec<&str> = symbols
                    .iter()
                    .filter(|_| next() % 4 == 0)
                    .copied()
                    .collect();
                let referenced: Vec<&str> = symbols
                    .iter()
                    .filter(|_| next() % 4 == 0)
                    .copied()
                    .collect();
                edges.push((file, declared, referenced));
            }

            let dir = tempfile::tempdir().unwrap();
            let mut store = open_store(dir.path());
            for (file, declared, referenced) in &edges {
                store.register_processed(
                    FileId(*file),
                    declared.iter().map(|s| s.to_string()).collect(),
                    referenced.iter().map(|s| s.to_string()).collect(),
                );
            }
            store.update().unwrap();

            let changed: HashSet<FileId> = (0..unit_count)
                .filter(|_| next() % 3 == 0)
                .map(FileId)
                .collect();
            if changed.is_empty() {
                continue;
            }

            let expected = naive_closure(&edges, &changed);
            let actual = store.find_dependents(&changed, &NO_FILTER);
            assert_eq!(actual, expected, "graph: {edges:?}, changed: {changed:?}");
        }
    }
}
