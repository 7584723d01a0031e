//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::WorkspaceConfig;
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Name of the configuration file within a workspace root.
pub const CONFIG_FILE: &str = "anvil.toml";

/// Loads and validates an `anvil.toml` configuration from a workspace directory.
pub fn load_config(workspace_dir: &Path) -> Result<WorkspaceConfig, ConfigError> {
    let config_path = workspace_dir.join(CONFIG_FILE);
    let content = std::fs::read_to_string(&config_path)?;
    load_config_from_str(&content)
}

/// Parses and validates an `anvil.toml` configuration from a string.
///
/// Useful for testing without filesystem dependencies.
pub fn load_config_from_str(content: &str) -> Result<WorkspaceConfig, ConfigError> {
    let config: WorkspaceConfig =
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Validates that required fields are present and declarations are consistent.
fn validate_config(config: &WorkspaceConfig) -> Result<(), ConfigError> {
    if config.project.name.is_empty() {
        return Err(ConfigError::MissingField("project.name".to_string()));
    }

    let mut module_names = HashSet::new();
    for module in &config.modules {
        if module.name.is_empty() {
            return Err(ConfigError::MissingField("modules.name".to_string()));
        }
        if !module_names.insert(module.name.as_str()) {
            return Err(ConfigError::DuplicateModule(module.name.clone()));
        }
        if module.source_roots.is_empty() {
            return Err(ConfigError::MissingField(format!(
                "modules.{}.source_roots",
                module.name
            )));
        }
    }
    for module in &config.modules {
        for dep in &module.deps {
            if !module_names.contains(dep.as_str()) {
                return Err(ConfigError::UnknownDependency {
                    module: module.name.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }

    let mut claimed: HashMap<&str, &str> = HashMap::new();
    for (name, backend) in &config.backends {
        if backend.extensions.is_empty() {
            return Err(ConfigError::MissingField(format!(
                "backends.{name}.extensions"
            )));
        }
        if backend.output_extension.is_empty() {
            return Err(ConfigError::MissingField(format!(
                "backends.{name}.output_extension"
            )));
        }
        for extension in &backend.extensions {
            if let Some(first) = claimed.insert(extension.as_str(), name.as_str()) {
                return Err(ConfigError::AmbiguousExtension {
                    extension: extension.clone(),
                    first: first.to_string(),
                    second: name.clone(),
                });
            }
        }
        if let Some(consumes) = &backend.consumes {
            if !config.backends.contains_key(consumes) {
                return Err(ConfigError::UnknownConsumedBackend {
                    backend: name.clone(),
                    consumes: consumes.clone(),
                });
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_config() {
        let toml = r#"
[project]
name = "demo"
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.project.name, "demo");
        assert_eq!(config.project.output_dir, std::path::PathBuf::from("build"));
        assert!(config.modules.is_empty());
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
[project]
name = "demo"
version = "0.2.0"
output_dir = "out"

exclude = ["src/app/legacy.u"]

[[modules]]
name = "core"
source_roots = ["src/core"]

[[modules]]
name = "app"
source_roots = ["src/app"]
test_roots = ["tests/app"]
deps = ["core"]

[backends.unit]
extensions = ["u"]
output_extension = "obj"
command = "unitc {in} -o {out}"
import_prefix = "use "

[backends.gen]
extensions = ["gen"]
output_extension = "u"
intermediate = true

[backends.late]
extensions = ["late"]
output_extension = "obj2"
consumes = "gen"
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.modules.len(), 2);
        assert_eq!(config.exclude.len(), 1);
        assert_eq!(config.backends.len(), 3);
        let unit = &config.backends["unit"];
        assert_eq!(unit.extensions, vec!["u"]);
        assert_eq!(unit.import_prefix.as_deref(), Some("use "));
        assert!(config.backends["gen"].intermediate);
        assert_eq!(config.backends["late"].consumes.as_deref(), Some("gen"));
    }

    #[test]
    fn missing_project_name_rejected() {
        let toml = r#"
[project]
name = ""
"#;
        assert!(matches!(
            load_config_from_str(toml),
            Err(ConfigError::MissingField(_))
        ));
    }

    #[test]
    fn duplicate_module_rejected() {
        let toml = r#"
[project]
name = "demo"

[[modules]]
name = "core"
source_roots = ["a"]

[[modules]]
name = "core"
source_roots = ["b"]
"#;
        assert!(matches!(
            load_config_from_str(toml),
            Err(ConfigError::DuplicateModule(name)) if name == "core"
        ));
    }

    #[test]
    fn unknown_dependency_rejected() {
        let toml = r#"
[project]
name = "demo"

[[modules]]
name = "app"
source_roots = ["src"]
deps = ["nope"]
"#;
        assert!(matches!(
            load_config_from_str(toml),
            Err(ConfigError::UnknownDependency { .. })
        ));
    }

    #[test]
    fn ambiguous_extension_rejected() {
        let toml = r#"
[project]
name = "demo"

[backends.a]
extensions = ["u"]
output_extension = "o"

[backends.b]
extensions = ["u"]
output_extension = "o"
"#;
        assert!(matches!(
            load_config_from_str(toml),
            Err(ConfigError::AmbiguousExtension { .. })
        ));
    }

    #[test]
    fn unknown_consumed_backend_rejected() {
        let toml = r#"
[project]
name = "demo"

[backends.late]
extensions = ["u"]
output_extension = "o"
consumes = "missing"
"#;
        assert!(matches!(
            load_config_from_str(toml),
            Err(ConfigError::UnknownConsumedBackend { .. })
        ));
    }

    #[test]
    fn invalid_toml_rejected() {
        assert!(matches!(
            load_config_from_str("not valid {{{"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "[project]\nname = \"demo\"\n",
        )
        .unwrap();
        let config = load_config(dir.path()).unwrap();
        assert_eq!(config.project.name, "demo");
    }

    #[test]
    fn load_missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(load_config(dir.path()), Err(ConfigError::Io(_))));
    }
}
