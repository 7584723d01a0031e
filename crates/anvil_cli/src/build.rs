//! Command dispatch: wiring configuration, backends, and the build manager.

use anvil_backend::{BackendDescriptor, BackendRegistry};
use anvil_common::BackendId;
use anvil_config::WorkspaceConfig;
use anvil_driver::{BuildManager, BuildResult, ExitStatus};
use anvil_messages::MessageCategory;
use anvil_scope::BuildScope;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;

use crate::backend::CommandBackend;
use crate::{BuildArgs, Cli, Command};

/// Runs the parsed CLI command. Returns the process exit code.
pub fn run(cli: &Cli) -> Result<i32, Box<dyn std::error::Error>> {
    let workspace_root = resolve_workspace_root(cli)?;
    let config = anvil_config::load_config(&workspace_root)?;
    let registry = build_registry(&config)?;
    let manager = BuildManager::new(config, registry, &workspace_root);

    match &cli.command {
        Command::Status => {
            let up_to_date = manager.is_up_to_date(&BuildScope::workspace(true));
            if up_to_date {
                println!("up to date");
                Ok(0)
            } else {
                println!("build required");
                Ok(1)
            }
        }
        Command::Build(args) => {
            let scope = build_scope(args);
            let result = if args.backend.is_empty() {
                wait_for(|cb| manager.make(scope, cb))?
            } else {
                let backends = args.backend.iter().map(BackendId::new).collect();
                wait_for(|cb| manager.make_filtered(scope, backends, cb))?
            };
            Ok(report(&result, cli.quiet))
        }
        Command::Compile(args) => {
            let files: Vec<PathBuf> = args
                .files
                .iter()
                .map(|file| absolutize(&workspace_root, Path::new(file)))
                .collect();
            let result = wait_for(|cb| manager.compile_files(files, cb))?;
            Ok(report(&result, cli.quiet))
        }
        Command::Rebuild => {
            let result = wait_for(|cb| manager.rebuild(cb))?;
            Ok(report(&result, cli.quiet))
        }
    }
}

/// Builds the backend registry from the `[backends.*]` tables.
fn build_registry(config: &WorkspaceConfig) -> Result<BackendRegistry, Box<dyn std::error::Error>> {
    let mut descriptors = Vec::new();
    for (name, backend_config) in &config.backends {
        let mut descriptor =
            BackendDescriptor::translating(Arc::new(CommandBackend::new(name, backend_config)));
        if backend_config.intermediate {
            descriptor = descriptor.with_intermediate_output();
        }
        if let Some(consumes) = &backend_config.consumes {
            descriptor = descriptor.consuming(BackendId::new(consumes));
        }
        descriptors.push(descriptor);
    }
    Ok(BackendRegistry::build(descriptors)?)
}

/// Starts a session and blocks until its callback delivers the result.
fn wait_for<F>(start: F) -> Result<BuildResult, Box<dyn std::error::Error>>
where
    F: FnOnce(
        Box<dyn FnOnce(BuildResult) + Send + 'static>,
    ) -> Result<anvil_driver::SessionHandle, anvil_driver::BuildError>,
{
    let (tx, rx) = mpsc::channel();
    let handle = start(Box::new(move |result| {
        let _ = tx.send(result);
    }))?;
    handle.wait();
    Ok(rx.recv()?)
}

fn build_scope(args: &BuildArgs) -> BuildScope {
    match &args.module {
        Some(module) => BuildScope::module(module.clone(), args.with_dependents, args.tests),
        None => BuildScope::workspace(args.tests),
    }
}

/// Renders session messages and maps the status to an exit code.
fn report(result: &BuildResult, quiet: bool) -> i32 {
    for message in &result.messages {
        match message.category {
            MessageCategory::Error | MessageCategory::Warning => eprintln!("{message}"),
            _ if !quiet => eprintln!("{message}"),
            _ => {}
        }
    }

    if !quiet {
        match result.status {
            ExitStatus::UpToDate => eprintln!("Nothing to do: all files are up to date."),
            ExitStatus::Success => eprintln!(
                "Build finished: {} error(s), {} warning(s).",
                result.error_count, result.warning_count
            ),
            ExitStatus::Errors => eprintln!(
                "Build failed: {} error(s), {} warning(s).",
                result.error_count, result.warning_count
            ),
            ExitStatus::Cancelled => eprintln!("Build cancelled."),
            ExitStatus::RebuildRequested => {
                eprintln!("Build aborted: a full rebuild is required.")
            }
        }
    }

    match result.status {
        ExitStatus::Success | ExitStatus::UpToDate => 0,
        _ => 1,
    }
}

/// Resolves the workspace root: `--workspace` if given, otherwise the
/// nearest ancestor of the current directory containing `anvil.toml`.
fn resolve_workspace_root(cli: &Cli) -> Result<PathBuf, Box<dyn std::error::Error>> {
    match &cli.workspace {
        Some(workspace) => Ok(PathBuf::from(workspace)),
        None => find_workspace_root(&std::env::current_dir()?),
    }
}

/// Walks up from `start` looking for the nearest directory containing
/// `anvil.toml`.
fn find_workspace_root(start: &Path) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let mut current = start.to_path_buf();
    loop {
        if current.join(anvil_config::loader::CONFIG_FILE).exists() {
            return Ok(current);
        }
        if !current.pop() {
            return Err(format!(
                "could not find anvil.toml in {} or any parent directory",
                start.display()
            )
            .into());
        }
    }
}

fn absolutize(workspace_root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        workspace_root.join(path)
    }
}
