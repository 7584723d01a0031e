//! The configuration-driven command backend.
//!
//! Each `[backends.<name>]` table in `anvil.toml` becomes one translating
//! backend: it claims files by extension, produces one output per source by
//! running the configured command (or copying when no command is given),
//! and contributes dependency edges by scanning source lines for the
//! configured import prefix. The declared qualified name of a unit is its
//! file stem.

use anvil_backend::{Backend, BackendRun, TranslatedItem, TranslatingBackend, TranslationOutcome};
use anvil_common::BackendId;
use anvil_config::BackendConfig;
use anvil_messages::{BuildMessage, SourceLocation};
use std::path::{Path, PathBuf};
use std::process::Command;

/// A translating backend built from one `[backends.<name>]` table.
pub struct CommandBackend {
    id: BackendId,
    description: String,
    extensions: Vec<String>,
    output_extension: String,
    command: Option<String>,
    import_prefix: Option<String>,
}

impl CommandBackend {
    /// Builds the backend from its configuration table.
    pub fn new(name: &str, config: &BackendConfig) -> Self {
        Self {
            id: BackendId::new(name),
            description: format!("{name} backend"),
            extensions: config.extensions.clone(),
            output_extension: config.output_extension.clone(),
            command: config.command.clone(),
            import_prefix: config.import_prefix.clone(),
        }
    }

    fn output_path(&self, output_root: &Path, source: &Path) -> PathBuf {
        let stem = source
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown");
        output_root.join(format!("{stem}.{}", self.output_extension))
    }

    /// Scans a source for referenced qualified names.
    fn referenced_names(&self, content: &str) -> Vec<String> {
        let Some(prefix) = &self.import_prefix else {
            return Vec::new();
        };
        content
            .lines()
            .filter_map(|line| line.trim_start().strip_prefix(prefix.as_str()))
            .map(|rest| rest.trim().trim_end_matches(';').to_string())
            .filter(|name| !name.is_empty())
            .collect()
    }

    /// Runs the configured command with `{in}`/`{out}` substituted.
    ///
    /// The template is split on whitespace; the first token is the program.
    /// Returns the command's stderr on failure.
    fn run_command(&self, template: &str, source: &Path, output: &Path) -> Result<(), String> {
        let tokens: Vec<String> = template
            .split_whitespace()
            .map(|token| {
                token
                    .replace("{in}", &source.to_string_lossy())
                    .replace("{out}", &output.to_string_lossy())
            })
            .collect();
        let Some((program, args)) = tokens.split_first() else {
            return Err("empty command template".to_string());
        };

        let result = Command::new(program).args(args).output();
        match result {
            Ok(out) if out.status.success() => Ok(()),
            Ok(out) => {
                let stderr = String::from_utf8_lossy(&out.stderr);
                Err(format!(
                    "command exited with {}: {}",
                    out.status,
                    stderr.trim()
                ))
            }
            Err(e) => Err(format!("cannot run `{program}`: {e}")),
        }
    }
}

impl Backend for CommandBackend {
    fn id(&self) -> &BackendId {
        &self.id
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn is_compilable_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|known| known == ext))
    }
}

impl TranslatingBackend for CommandBackend {
    fn translate(&self, run: &BackendRun<'_>, files: &[PathBuf]) -> TranslationOutcome {
        let mut outcome = TranslationOutcome::empty();
        let total = files.len().max(1);

        for (index, source) in files.iter().enumerate() {
            if run.progress.is_cancelled() {
                break;
            }
            run.progress.set_fraction(index as f64 / total as f64);

            let content = match std::fs::read_to_string(source) {
                Ok(content) => content,
                Err(e) => {
                    run.sink.add(
                        BuildMessage::error(format!("cannot read source: {e}"))
                            .with_location(SourceLocation::file(source.clone())),
                    );
                    outcome.failed.push(source.clone());
                    continue;
                }
            };

            let output = self.output_path(run.output_root, source);
            let produced = match &self.command {
                Some(template) => self.run_command(template, source, &output),
                None => std::fs::copy(source, &output)
                    .map(|_| ())
                    .map_err(|e| format!("cannot copy to {}: {e}", output.display())),
            };

            if let Err(reason) = produced {
                run.sink.add(
                    BuildMessage::error(reason)
                        .with_location(SourceLocation::file(source.clone())),
                );
                outcome.failed.push(source.clone());
                continue;
            }

            let stem = source
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("unknown")
                .to_string();
            outcome.successful.push(TranslatedItem {
                source: source.clone(),
                output_root: run.output_root.to_path_buf(),
                output,
                declared: vec![stem],
                referenced: self.referenced_names(&content),
            });
        }

        run.progress.set_fraction(1.0);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anvil_messages::{MessageSink, ProgressIndicator};

    fn copy_backend() -> CommandBackend {
        CommandBackend::new(
            "unit",
            &BackendConfig {
                extensions: vec!["u".to_string()],
                output_extension: "obj".to_string(),
                command: None,
                import_prefix: Some("use ".to_string()),
                intermediate: false,
                consumes: None,
            },
        )
    }

    #[test]
    fn claims_configured_extensions() {
        let backend = copy_backend();
        assert!(backend.is_compilable_file(Path::new("src/a.u")));
        assert!(!backend.is_compilable_file(Path::new("src/a.txt")));
        assert!(!backend.is_compilable_file(Path::new("src/noext")));
    }

    #[test]
    fn reference_scanning() {
        let backend = copy_backend();
        let refs = backend.referenced_names("unit a\nuse core;\n  use util\nnot an import\n");
        assert_eq!(refs, vec!["core", "util"]);
    }

    #[test]
    fn no_prefix_means_no_references() {
        let mut backend = copy_backend();
        backend.import_prefix = None;
        assert!(backend.referenced_names("use core\n").is_empty());
    }

    #[test]
    fn copy_translation_produces_outputs_and_edges() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.u");
        std::fs::write(&src, "use core\n").unwrap();
        let out_root = dir.path().join("out");
        std::fs::create_dir_all(&out_root).unwrap();

        let sink = MessageSink::new();
        let progress = ProgressIndicator::new();
        let run = BackendRun {
            sink: &sink,
            progress: &progress,
            workspace_root: dir.path(),
            output_root: &out_root,
        };

        let backend = copy_backend();
        let outcome = backend.translate(&run, &[src.clone()]);

        assert_eq!(outcome.successful.len(), 1);
        assert!(outcome.failed.is_empty());
        let item = &outcome.successful[0];
        assert_eq!(item.declared, vec!["a"]);
        assert_eq!(item.referenced, vec!["core"]);
        assert!(out_root.join("a.obj").exists());
    }

    #[test]
    fn unreadable_source_fails_with_message() {
        let dir = tempfile::tempdir().unwrap();
        let out_root = dir.path().join("out");
        std::fs::create_dir_all(&out_root).unwrap();

        let sink = MessageSink::new();
        let progress = ProgressIndicator::new();
        let run = BackendRun {
            sink: &sink,
            progress: &progress,
            workspace_root: dir.path(),
            output_root: &out_root,
        };

        let backend = copy_backend();
        let missing = dir.path().join("missing.u");
        let outcome = backend.translate(&run, &[missing.clone()]);

        assert!(outcome.successful.is_empty());
        assert_eq!(outcome.failed, vec![missing]);
        assert_eq!(sink.error_count(), 1);
    }

    #[test]
    fn failing_command_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.u");
        std::fs::write(&src, "unit a\n").unwrap();
        let out_root = dir.path().join("out");
        std::fs::create_dir_all(&out_root).unwrap();

        let mut backend = copy_backend();
        backend.command = Some("/nonexistent/compiler {in} {out}".to_string());

        let sink = MessageSink::new();
        let progress = ProgressIndicator::new();
        let run = BackendRun {
            sink: &sink,
            progress: &progress,
            workspace_root: dir.path(),
            output_root: &out_root,
        };
        let outcome = backend.translate(&run, &[src.clone()]);

        assert_eq!(outcome.failed, vec![src]);
        assert_eq!(sink.error_count(), 1);
    }
}
