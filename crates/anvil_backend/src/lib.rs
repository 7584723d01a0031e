//! Backend contracts and registration for the Anvil build engine.
//!
//! A backend is a pluggable unit that turns source files into build output
//! and contributes dependency edges. Two flavors exist:
//!
//! - [`TranslatingBackend`]: classified source files, driven by the file
//!   monitor's change detection; contributes declared/referenced qualified
//!   names to its dependency graph store.
//! - [`ProcessingBackend`]: the item/validity protocol for simple
//!   source-to-output transformation; the engine filters items by comparing
//!   [`ValidityState`] fingerprints against the per-backend validity cache.
//!
//! Backends register through [`BackendRegistry`] descriptors; execution
//! order is resolved once at registration time from the declared
//! produces/consumes intermediate-output relationships.

#![warn(missing_docs)]

pub mod backend;
pub mod registry;
pub mod validity;

pub use backend::{
    Backend, BackendRun, ProcessingBackend, ProcessingItem, TranslatedItem, TranslatingBackend,
    TranslationOutcome,
};
pub use registry::{BackendDescriptor, BackendRegistry, RegisteredBackend, RegistryError};
pub use validity::{TimestampValidity, ValidityState};
