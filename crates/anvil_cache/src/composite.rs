//! Composite cache fanning out to every registered backend's stores.

use anvil_common::{BackendId, FileId};
use std::collections::HashSet;
use std::path::Path;

use crate::error::CacheError;
use crate::state_cache::StateCache;
use crate::store::{GraphStore, GraphStoreFactory};

/// The caches of one registered backend.
struct BackendCaches {
    backend: BackendId,
    graph: Box<dyn GraphStore>,
    state: StateCache,
}

/// Aggregates one dependency graph store and one validity cache per backend
/// behind a single interface.
///
/// Queries and commits fan out to all stores. Corruption is all-or-nothing:
/// if any store fails validation the whole composite is corrupt, because a
/// downstream backend may depend on symbols declared by an upstream one
/// whose graph is now suspect. Partial trust is not allowed.
pub struct CompositeDependencyCache {
    entries: Vec<BackendCaches>,
}

impl std::fmt::Debug for CompositeDependencyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeDependencyCache")
            .field(
                "backends",
                &self.entries.iter().map(|e| &e.backend).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl CompositeDependencyCache {
    /// Opens the composite from the factory list of registered backends.
    ///
    /// The first corruption encountered aborts the open and is propagated;
    /// the caller must then wipe all stores and schedule a full rebuild.
    pub fn open(
        backends: &[(BackendId, GraphStoreFactory)],
        cache_dir: &Path,
    ) -> Result<Self, CacheError> {
        let mut entries = Vec::with_capacity(backends.len());
        for (backend, factory) in backends {
            let graph = factory(backend.clone(), cache_dir)?;
            let state = StateCache::open(backend.clone(), cache_dir)?;
            entries.push(BackendCaches {
                backend: backend.clone(),
                graph,
                state,
            });
        }
        Ok(Self { entries })
    }

    /// The registered backends, in registration order.
    pub fn backends(&self) -> impl Iterator<Item = &BackendId> {
        self.entries.iter().map(|entry| &entry.backend)
    }

    /// The graph store of one backend.
    pub fn graph(&mut self, backend: &BackendId) -> Option<&mut (dyn GraphStore + 'static)> {
        self.entries
            .iter_mut()
            .find(|entry| &entry.backend == backend)
            .map(|entry| entry.graph.as_mut())
    }

    /// The validity cache of one backend.
    pub fn state(&mut self, backend: &BackendId) -> Option<&mut StateCache> {
        self.entries
            .iter_mut()
            .find(|entry| &entry.backend == backend)
            .map(|entry| &mut entry.state)
    }

    /// Computes the transitive recompilation closure across all backends.
    ///
    /// The closure runs at the composite level so that a reference in
    /// backend Y's graph to a symbol declared by backend X's unit is
    /// followed: each step collects the frontier's declared symbols from
    /// every store, then every store's referencers of those symbols. The
    /// result includes `changed`. A visited set terminates cycles; `filter`
    /// can short-circuit expansion from individual units.
    pub fn find_dependents(
        &self,
        changed: &HashSet<FileId>,
        filter: &dyn Fn(FileId) -> bool,
    ) -> HashSet<FileId> {
        let mut visited: HashSet<FileId> = changed.iter().copied().collect();
        let mut frontier: Vec<FileId> = changed.iter().copied().collect();

        while !frontier.is_empty() {
            let mut symbols: HashSet<String> = HashSet::new();
            for &file in &frontier {
                if !filter(file) {
                    continue;
                }
                for entry in &self.entries {
                    symbols.extend(entry.graph.declared_symbols(file));
                }
            }

            let mut next: Vec<FileId> = Vec::new();
            for symbol in &symbols {
                for entry in &self.entries {
                    for referencer in entry.graph.referencing_files(symbol) {
                        if visited.insert(referencer) {
                            next.push(referencer);
                        }
                    }
                }
            }
            frontier = next;
        }

        visited
    }

    /// Returns `true` if any store has unprocessed traverse roots.
    pub fn has_unprocessed_traverse_roots(&self) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.graph.has_unprocessed_traverse_roots())
    }

    /// Clears traverse roots in every store.
    pub fn clear_traverse_roots(&mut self) {
        for entry in &mut self.entries {
            entry.graph.clear_traverse_roots();
        }
    }

    /// Commits every store and validity cache.
    ///
    /// Stops at the first failure; the driver treats a failed commit like
    /// corruption because the resulting on-disk state is unknown.
    pub fn update_all(&mut self) -> Result<(), CacheError> {
        for entry in &mut self.entries {
            entry.graph.update()?;
            entry.state.commit()?;
        }
        Ok(())
    }

    /// Drops in-memory traversal bookkeeping in every store.
    pub fn reset_all(&mut self) {
        for entry in &mut self.entries {
            entry.graph.reset_state();
        }
    }

    /// Discards every store's graph and validity state, in memory and on disk.
    pub fn wipe_all(&mut self) -> Result<(), CacheError> {
        for entry in &mut self.entries {
            entry.graph.wipe()?;
            entry.state.wipe()?;
        }
        Ok(())
    }

    /// Pushes an output-directory move to every backend's validity cache so
    /// stale path references are rewritten rather than invalidated.
    pub fn sync_out_dir(&mut self, from: &Path, to: &Path) {
        for entry in &mut self.entries {
            entry.state.sync_out_dir(from, to);
        }
    }
}
