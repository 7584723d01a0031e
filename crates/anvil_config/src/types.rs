//! Configuration data types deserialized from `anvil.toml`.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

/// Top-level workspace configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// The `[project]` section.
    pub project: ProjectConfig,

    /// The `[[modules]]` list. A workspace without modules is valid but
    /// builds nothing.
    #[serde(default)]
    pub modules: Vec<ModuleConfig>,

    /// Paths excluded from compilation, relative to the workspace root.
    /// Excluded files are skipped by `make` and ignored by explicit
    /// `compile` requests.
    #[serde(default)]
    pub exclude: Vec<PathBuf>,

    /// Backend declarations, keyed by backend name. Ordered so that
    /// classification ties are detected deterministically.
    #[serde(default)]
    pub backends: BTreeMap<String, BackendConfig>,
}

/// The `[project]` section of `anvil.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name; names the build and the default output directory.
    pub name: String,

    /// Project version string.
    #[serde(default)]
    pub version: String,

    /// Output directory for build products, relative to the workspace root.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("build")
}

/// One `[[modules]]` entry: a named group of source roots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleConfig {
    /// Module name, unique within the workspace.
    pub name: String,

    /// Production source roots, relative to the workspace root.
    pub source_roots: Vec<PathBuf>,

    /// Test source roots, relative to the workspace root.
    #[serde(default)]
    pub test_roots: Vec<PathBuf>,

    /// Names of modules this module depends on.
    #[serde(default)]
    pub deps: Vec<String>,
}

/// One `[backends.<name>]` entry describing a pluggable backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// File extensions (without dot) this backend compiles.
    pub extensions: Vec<String>,

    /// Extension of produced output files.
    pub output_extension: String,

    /// Command template run per file; `{in}` and `{out}` are substituted.
    /// When absent the backend copies the source to the output path, which
    /// is enough for transform-free pipelines and tests.
    #[serde(default)]
    pub command: Option<String>,

    /// Line prefix that marks a reference to another unit, e.g. `"use "`.
    /// Lines starting with the prefix contribute dependency edges; the
    /// referenced qualified name is the rest of the line, trimmed.
    #[serde(default)]
    pub import_prefix: Option<String>,

    /// Whether this backend's output directory is an intermediate output
    /// layered into downstream backends' scopes.
    #[serde(default)]
    pub intermediate: bool,

    /// Name of the backend whose intermediate output this backend consumes.
    /// Forces this backend to run after the producer.
    #[serde(default)]
    pub consumes: Option<String>,
}

impl WorkspaceConfig {
    /// Looks up a module by name.
    pub fn module(&self, name: &str) -> Option<&ModuleConfig> {
        self.modules.iter().find(|m| m.name == name)
    }

    /// Returns the names of modules that directly depend on `name`.
    pub fn direct_dependents(&self, name: &str) -> Vec<&str> {
        self.modules
            .iter()
            .filter(|m| m.deps.iter().any(|d| d == name))
            .map(|m| m.name.as_str())
            .collect()
    }

    /// Returns `names` plus every module transitively depending on one of
    /// them. Cyclic dependency declarations terminate via the visited set.
    pub fn with_transitive_dependents(&self, names: &[String]) -> Vec<String> {
        let mut visited: HashSet<String> = names.iter().cloned().collect();
        let mut queue: Vec<String> = names.to_vec();
        while let Some(current) = queue.pop() {
            for dependent in self.direct_dependents(&current) {
                if visited.insert(dependent.to_string()) {
                    queue.push(dependent.to_string());
                }
            }
        }
        let mut result: Vec<String> = visited.into_iter().collect();
        result.sort();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_module_config() -> WorkspaceConfig {
        WorkspaceConfig {
            project: ProjectConfig {
                name: "demo".to_string(),
                version: String::new(),
                output_dir: default_output_dir(),
            },
            modules: vec![
                ModuleConfig {
                    name: "core".to_string(),
                    source_roots: vec![PathBuf::from("src/core")],
                    test_roots: vec![],
                    deps: vec![],
                },
                ModuleConfig {
                    name: "mid".to_string(),
                    source_roots: vec![PathBuf::from("src/mid")],
                    test_roots: vec![],
                    deps: vec!["core".to_string()],
                },
                ModuleConfig {
                    name: "app".to_string(),
                    source_roots: vec![PathBuf::from("src/app")],
                    test_roots: vec![],
                    deps: vec!["mid".to_string()],
                },
            ],
            exclude: vec![],
            backends: BTreeMap::new(),
        }
    }

    #[test]
    fn module_lookup() {
        let config = three_module_config();
        assert!(config.module("core").is_some());
        assert!(config.module("missing").is_none());
    }

    #[test]
    fn direct_dependents() {
        let config = three_module_config();
        assert_eq!(config.direct_dependents("core"), vec!["mid"]);
        assert_eq!(config.direct_dependents("mid"), vec!["app"]);
        assert!(config.direct_dependents("app").is_empty());
    }

    #[test]
    fn transitive_dependents_closure() {
        let config = three_module_config();
        let closure = config.with_transitive_dependents(&["core".to_string()]);
        assert_eq!(closure, vec!["app", "core", "mid"]);
    }

    #[test]
    fn transitive_dependents_terminates_on_cycles() {
        let mut config = three_module_config();
        // core -> app closes a cycle: app -> mid -> core -> app
        config.modules[0].deps.push("app".to_string());
        let closure = config.with_transitive_dependents(&["core".to_string()]);
        assert_eq!(closure, vec!["app", "core", "mid"]);
    }

    #[test]
    fn default_output_dir_is_build() {
        assert_eq!(default_output_dir(), PathBuf::from("build"));
    }
}
