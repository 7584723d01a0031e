//! Scope resolution against the workspace configuration.

use crate::scope::{AttachedOutputDir, BuildScope};
use anvil_common::BackendId;
use anvil_config::WorkspaceConfig;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// One source root included in a resolved scope.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct SourceRoot {
    /// Absolute path of the root directory.
    pub path: PathBuf,
    /// The module the root belongs to.
    pub module: String,
    /// Whether the root holds test sources.
    pub is_test: bool,
}

/// A [`BuildScope`] resolved against a workspace configuration and root.
///
/// Resolution expands module names (including transitive dependents when
/// requested) into concrete source roots and absolutizes explicit file
/// paths. The resolved scope answers the two queries the driver needs:
/// "does this file belong" and "which roots do I iterate".
#[derive(Clone, Debug)]
pub struct ResolvedScope {
    explicit_files: BTreeSet<PathBuf>,
    roots: Vec<SourceRoot>,
    modules: BTreeSet<String>,
    attached: Vec<AttachedOutputDir>,
    explicit_only: bool,
}

impl ResolvedScope {
    /// Resolves a scope against the configuration and workspace root.
    pub fn resolve(scope: &BuildScope, config: &WorkspaceConfig, workspace_root: &Path) -> Self {
        let mut resolved = ResolvedScope {
            explicit_files: BTreeSet::new(),
            roots: Vec::new(),
            modules: BTreeSet::new(),
            attached: Vec::new(),
            explicit_only: scope.is_explicit(),
        };
        resolved.collect(scope, config, workspace_root);
        resolved
    }

    fn collect(&mut self, scope: &BuildScope, config: &WorkspaceConfig, workspace_root: &Path) {
        match scope {
            BuildScope::Files(files) => {
                for file in files {
                    self.explicit_files.insert(absolutize(workspace_root, file));
                }
            }
            BuildScope::Modules {
                names,
                with_dependents,
                include_tests,
            } => {
                let names: Vec<String> = names.iter().cloned().collect();
                let expanded = if *with_dependents {
                    config.with_transitive_dependents(&names)
                } else {
                    names
                };
                for name in expanded {
                    self.add_module(&name, config, workspace_root, *include_tests);
                }
            }
            BuildScope::Workspace { include_tests } => {
                for module in &config.modules {
                    self.add_module(&module.name, config, workspace_root, *include_tests);
                }
            }
            BuildScope::Union(scopes) => {
                for inner in scopes {
                    self.collect(inner, config, workspace_root);
                }
            }
        }
    }

    fn add_module(
        &mut self,
        name: &str,
        config: &WorkspaceConfig,
        workspace_root: &Path,
        include_tests: bool,
    ) {
        let Some(module) = config.module(name) else {
            return;
        };
        if !self.modules.insert(name.to_string()) {
            return;
        }
        for root in &module.source_roots {
            self.roots.push(SourceRoot {
                path: absolutize(workspace_root, root),
                module: name.to_string(),
                is_test: false,
            });
        }
        if include_tests {
            for root in &module.test_roots {
                self.roots.push(SourceRoot {
                    path: absolutize(workspace_root, root),
                    module: name.to_string(),
                    is_test: true,
                });
            }
        }
    }

    /// Attaches an upstream backend's intermediate output directory.
    pub fn attach_output_dir(&mut self, attached: AttachedOutputDir) {
        self.attached.push(attached);
    }

    /// Returns `true` if the file belongs to this scope.
    ///
    /// Attached intermediate directories are not consulted here; they are
    /// surfaced separately per backend via
    /// [`attached_dirs_for`](Self::attached_dirs_for).
    pub fn contains(&self, path: &Path) -> bool {
        if self.explicit_files.contains(path) {
            return true;
        }
        self.roots.iter().any(|root| path.starts_with(&root.path))
    }

    /// Iterates the source roots of this scope.
    pub fn roots(&self) -> &[SourceRoot] {
        &self.roots
    }

    /// The explicit files of this scope, absolutized.
    pub fn explicit_files(&self) -> impl Iterator<Item = &PathBuf> {
        self.explicit_files.iter()
    }

    /// The modules affected by this scope.
    pub fn affected_modules(&self) -> impl Iterator<Item = &str> {
        self.modules.iter().map(String::as_str)
    }

    /// Returns the module owning `path`, if any root of this scope covers it.
    pub fn module_of(&self, path: &Path) -> Option<&str> {
        self.roots
            .iter()
            .find(|root| path.starts_with(&root.path))
            .map(|root| root.module.as_str())
    }

    /// Returns `true` if `path` lies under a test root of this scope.
    pub fn is_test_source(&self, path: &Path) -> bool {
        self.roots
            .iter()
            .any(|root| root.is_test && path.starts_with(&root.path))
    }

    /// Intermediate output directories visible to the given backend.
    pub fn attached_dirs_for<'a>(
        &'a self,
        backend: &'a BackendId,
    ) -> impl Iterator<Item = &'a AttachedOutputDir> {
        self.attached
            .iter()
            .filter(move |attached| attached.filter.admits(backend))
    }

    /// Returns `true` if dependency expansion must be skipped because the
    /// scope is an explicit file list.
    pub fn is_explicit(&self) -> bool {
        self.explicit_only
    }
}

fn absolutize(workspace_root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        workspace_root.join(path)
    }
}
