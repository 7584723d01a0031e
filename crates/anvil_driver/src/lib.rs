//! Build orchestration: session context, driver state machine, and the
//! build manager facade.
//!
//! The [`BuildDriver`] runs one session: it resolves the requested scope,
//! runs pre-build tasks, expands the changed set transitively through the
//! composite dependency cache, invokes backends in dependency order, and
//! commits cache and monitor updates together. Cache corruption anywhere
//! degrades to a full rebuild, with a persisted marker so a crash before
//! that rebuild completes still owes one.
//!
//! The [`BuildManager`] is the public entry point: `compile` (explicit set,
//! no dependency expansion), `make` (incremental, always expanded),
//! `rebuild` (forced full), and the read-only `is_up_to_date` query. One
//! session runs per workspace at a time; sessions run on a worker thread and
//! report through thread-safe sinks.

#![warn(missing_docs)]

pub mod context;
pub mod driver;
pub mod error;
pub mod manager;
pub mod status;

pub use context::{BuildSessionContext, ScopedContext};
pub use driver::{BuildDriver, BuildRequest, BuildTask, DriverState, ExitStatus};
pub use error::BuildError;
pub use manager::{BuildManager, BuildResult, SessionHandle};
pub use status::EngineDirs;
