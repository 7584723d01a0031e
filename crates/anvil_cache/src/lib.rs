//! Persistent dependency and validity caches for incremental builds.
//!
//! This crate holds the engine's durable state: one [`SymbolGraphStore`] per
//! backend mapping compiled units to the qualified names they declare and
//! reference (with reverse lookup for transitive invalidation), one
//! [`StateCache`] per backend mapping output items to validity fingerprints,
//! and the [`CompositeDependencyCache`] that fans queries and commits out to
//! every registered backend's stores.
//!
//! All persisted artifacts use a checksummed binary envelope; a torn write is
//! detected on the next open as [`CacheError::Corrupted`], which mandates a
//! full rebuild. Corruption is never silently degraded to a cache miss.

#![warn(missing_docs)]

pub mod composite;
pub mod envelope;
pub mod error;
pub mod state_cache;
pub mod store;

pub use composite::CompositeDependencyCache;
pub use error::CacheError;
pub use state_cache::StateCache;
pub use store::{GraphStore, GraphStoreFactory, SymbolGraphStore};
