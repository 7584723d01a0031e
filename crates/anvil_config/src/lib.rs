//! Workspace configuration for the Anvil build engine.
//!
//! Loads and validates `anvil.toml`: the module layout (source roots, test
//! roots, inter-module dependencies), files excluded from compilation, and
//! the backend declarations the CLI turns into registered backends.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_config, load_config_from_str};
pub use types::{BackendConfig, ModuleConfig, ProjectConfig, WorkspaceConfig};
