//! The immutable build scope value type.

use anvil_common::BackendId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Which backends may see an attached intermediate output directory.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum OutputDirFilter {
    /// Every backend sees the directory.
    AllBackends,
    /// Only the listed backends see the directory.
    Only(Vec<BackendId>),
}

impl OutputDirFilter {
    /// Returns `true` if the given backend may see the guarded directory.
    pub fn admits(&self, backend: &BackendId) -> bool {
        match self {
            OutputDirFilter::AllBackends => true,
            OutputDirFilter::Only(backends) => backends.contains(backend),
        }
    }
}

/// An upstream backend's intermediate output directory layered into the
/// scope of downstream backends.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct AttachedOutputDir {
    /// The directory containing generated sources.
    pub dir: PathBuf,
    /// The backend that produced the directory.
    pub producer: BackendId,
    /// Which backends may consume the directory.
    pub filter: OutputDirFilter,
}

/// An immutable description of what to build.
///
/// Composition with [`add_scope`](Self::add_scope) supports layering "these
/// files changed" onto "these modules are affected". The scope is a pure
/// value; resolving it against a configuration happens separately, so two
/// scopes can be compared and composed without touching the file system.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum BuildScope {
    /// An explicit set of files. Dependency expansion is skipped for
    /// explicit sets: the caller's list is trusted as-is.
    Files(BTreeSet<PathBuf>),

    /// A set of modules by name.
    Modules {
        /// Module names included in the scope.
        names: BTreeSet<String>,
        /// Whether modules transitively depending on the named ones are
        /// included as well.
        with_dependents: bool,
        /// Whether test source roots are included.
        include_tests: bool,
    },

    /// Every module in the workspace.
    Workspace {
        /// Whether test source roots are included.
        include_tests: bool,
    },

    /// The union of several scopes.
    Union(Vec<BuildScope>),
}

impl BuildScope {
    /// Creates an explicit file-set scope.
    pub fn files<I, P>(files: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        BuildScope::Files(files.into_iter().map(Into::into).collect())
    }

    /// Creates a single-module scope.
    pub fn module(name: impl Into<String>, with_dependents: bool, include_tests: bool) -> Self {
        BuildScope::Modules {
            names: [name.into()].into_iter().collect(),
            with_dependents,
            include_tests,
        }
    }

    /// Creates a module-group scope.
    pub fn module_group<I, S>(names: I, with_dependents: bool, include_tests: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        BuildScope::Modules {
            names: names.into_iter().map(Into::into).collect(),
            with_dependents,
            include_tests,
        }
    }

    /// Creates a whole-workspace scope.
    pub fn workspace(include_tests: bool) -> Self {
        BuildScope::Workspace { include_tests }
    }

    /// Unions this scope with another.
    pub fn add_scope(self, other: BuildScope) -> Self {
        match (self, other) {
            (BuildScope::Union(mut a), BuildScope::Union(b)) => {
                a.extend(b);
                BuildScope::Union(a)
            }
            (BuildScope::Union(mut a), b) => {
                a.push(b);
                BuildScope::Union(a)
            }
            (a, BuildScope::Union(mut b)) => {
                b.insert(0, a);
                BuildScope::Union(b)
            }
            (a, b) => BuildScope::Union(vec![a, b]),
        }
    }

    /// Returns `true` if the scope consists solely of explicit file sets.
    ///
    /// Explicit scopes bypass dependency expansion: an explicit `compile`
    /// trusts the caller's file list, while `make` never does.
    pub fn is_explicit(&self) -> bool {
        match self {
            BuildScope::Files(_) => true,
            BuildScope::Union(scopes) => scopes.iter().all(BuildScope::is_explicit),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn files_scope_is_explicit() {
        let scope = BuildScope::files(["src/a.u", "src/b.u"]);
        assert!(scope.is_explicit());
    }

    #[test]
    fn module_scope_is_not_explicit() {
        let scope = BuildScope::module("core", false, false);
        assert!(!scope.is_explicit());
    }

    #[test]
    fn union_of_files_is_explicit() {
        let scope = BuildScope::files(["a.u"]).add_scope(BuildScope::files(["b.u"]));
        assert!(scope.is_explicit());
    }

    #[test]
    fn union_with_module_is_not_explicit() {
        let scope = BuildScope::files(["a.u"]).add_scope(BuildScope::module("core", false, false));
        assert!(!scope.is_explicit());
    }

    #[test]
    fn add_scope_flattens_unions() {
        let a = BuildScope::files(["a.u"]).add_scope(BuildScope::files(["b.u"]));
        let b = BuildScope::files(["c.u"]).add_scope(BuildScope::files(["d.u"]));
        match a.add_scope(b) {
            BuildScope::Union(scopes) => assert_eq!(scopes.len(), 4),
            other => panic!("expected union, got {other:?}"),
        }
    }

    #[test]
    fn output_dir_filter_admits() {
        let all = OutputDirFilter::AllBackends;
        assert!(all.admits(&BackendId::new("any")));

        let only = OutputDirFilter::Only(vec![BackendId::new("late")]);
        assert!(only.admits(&BackendId::new("late")));
        assert!(!only.admits(&BackendId::new("early")));
    }
}
