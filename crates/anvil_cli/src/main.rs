//! Anvil CLI — the command-line interface for the Anvil build engine.
//!
//! Provides `anvil build` for incremental builds, `anvil compile` for
//! explicit file lists, `anvil rebuild` for forced full rebuilds, and
//! `anvil status` for the read-only up-to-date check.

#![warn(missing_docs)]

mod backend;
mod build;

use std::process;

use clap::{Parser, Subcommand};

/// Anvil — an incremental build orchestrator.
#[derive(Parser, Debug)]
#[command(name = "anvil", version, about = "Anvil build orchestrator")]
pub struct Cli {
    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the workspace directory containing `anvil.toml`.
    #[arg(long, global = true)]
    pub workspace: Option<String>,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Incrementally build the workspace (changed files plus dependents).
    Build(BuildArgs),
    /// Force-compile an explicit list of files, without dependency
    /// expansion.
    Compile(CompileArgs),
    /// Discard all caches and rebuild everything.
    Rebuild,
    /// Report whether the workspace is up to date.
    Status,
}

/// Arguments for `anvil build`.
#[derive(Parser, Debug)]
pub struct BuildArgs {
    /// Module to build instead of the whole workspace.
    #[arg(short, long)]
    pub module: Option<String>,

    /// Also build modules that transitively depend on the selected module.
    #[arg(long, requires = "module")]
    pub with_dependents: bool,

    /// Include test source roots.
    #[arg(long)]
    pub tests: bool,

    /// Restrict the build to the named backends.
    #[arg(long, num_args = 1..)]
    pub backend: Vec<String>,
}

/// Arguments for `anvil compile`.
#[derive(Parser, Debug)]
pub struct CompileArgs {
    /// Files to compile.
    #[arg(required = true)]
    pub files: Vec<String>,
}

fn main() {
    let cli = Cli::parse();
    let code = match build::run(&cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            1
        }
    };
    process::exit(code);
}
