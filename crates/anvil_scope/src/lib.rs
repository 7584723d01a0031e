//! Build scope values: what a build session is allowed to touch.
//!
//! A [`BuildScope`] is an immutable description of the requested build
//! surface: an explicit file set, a module set (optionally with transitive
//! dependents and test sources), or the whole workspace, composed with
//! [`BuildScope::add_scope`]. Scopes are resolved against the workspace
//! configuration into a [`ResolvedScope`] before the driver uses them;
//! backends never see scopes, only the file sets the driver filters for them.

#![warn(missing_docs)]

pub mod resolved;
pub mod scope;

pub use resolved::{ResolvedScope, SourceRoot};
pub use scope::{AttachedOutputDir, BuildScope, OutputDirFilter};
