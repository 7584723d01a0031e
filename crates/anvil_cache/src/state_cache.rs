//! Per-backend validity fingerprint cache.
//!
//! Keyed by output path, holding the opaque fingerprint bytes a backend last
//! committed for each output item. The engine compares these against current
//! fingerprints to decide whether an item needs reprocessing; the byte
//! format is each backend's own contract, not the engine's.

use anvil_common::BackendId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::envelope::{read_envelope, write_envelope};
use crate::error::CacheError;

/// File name of the persisted validity state inside a backend's cache directory.
const STATE_FILE: &str = "state.bin";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StateData {
    /// Output path -> fingerprint bytes as of the last successful commit.
    items: BTreeMap<PathBuf, Vec<u8>>,
}

/// Validity fingerprint cache for one item-processing backend.
#[derive(Debug)]
pub struct StateCache {
    backend: BackendId,
    path: PathBuf,
    data: StateData,
}

impl StateCache {
    /// Opens the cache for a backend from the engine's cache directory.
    ///
    /// Missing state yields an empty cache; unreadable state is corruption.
    pub fn open(backend: BackendId, cache_dir: &Path) -> Result<Self, CacheError> {
        let path = cache_dir.join(backend.as_str()).join(STATE_FILE);
        let data = match read_envelope(&path)? {
            Some(payload) => {
                bincode::serde::decode_from_slice(&payload, bincode::config::standard())
                    .map_err(|e| CacheError::corrupted(&path, format!("unreadable state: {e}")))?
                    .0
            }
            None => StateData::default(),
        };
        Ok(Self {
            backend,
            path,
            data,
        })
    }

    /// The backend this cache belongs to.
    pub fn backend(&self) -> &BackendId {
        &self.backend
    }

    /// The stored fingerprint for an output item, if any.
    pub fn get(&self, output: &Path) -> Option<&[u8]> {
        self.data.items.get(output).map(Vec::as_slice)
    }

    /// Records the fingerprint of a successfully processed item.
    pub fn put(&mut self, output: PathBuf, fingerprint: Vec<u8>) {
        self.data.items.insert(output, fingerprint);
    }

    /// Forgets an item, forcing it to be reprocessed next build.
    ///
    /// Used for failed items: leaving the fingerprint unset is what makes
    /// the retry happen.
    pub fn remove(&mut self, output: &Path) {
        self.data.items.remove(output);
    }

    /// Number of items with stored fingerprints.
    pub fn len(&self) -> usize {
        self.data.items.len()
    }

    /// Returns `true` if no fingerprints are stored.
    pub fn is_empty(&self) -> bool {
        self.data.items.is_empty()
    }

    /// Rewrites stored output paths after an output directory move.
    ///
    /// Every key under `from` is re-rooted under `to`, keeping its
    /// fingerprint, so a directory move does not invalidate the items in it.
    pub fn sync_out_dir(&mut self, from: &Path, to: &Path) {
        let items = std::mem::take(&mut self.data.items);
        for (output, fingerprint) in items {
            let rewritten = match output.strip_prefix(from) {
                Ok(rest) => to.join(rest),
                Err(_) => output,
            };
            self.data.items.insert(rewritten, fingerprint);
        }
    }

    /// Commits the cache to disk atomically.
    pub fn commit(&self) -> Result<(), CacheError> {
        let payload = bincode::serde::encode_to_vec(&self.data, bincode::config::standard())
            .map_err(|e| CacheError::Serialization {
                reason: e.to_string(),
            })?;
        write_envelope(&self.path, &payload)
    }

    /// Discards all fingerprints, in memory and on disk.
    pub fn wipe(&mut self) -> Result<(), CacheError> {
        self.data = StateData::default();
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::io(&self.path, e)),
        }
    }
}
