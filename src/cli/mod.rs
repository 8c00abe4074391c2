//! cli
//!
//! Command-line interface layer for `revfs-admin`.
//!
//! # Responsibilities
//!
//! - Parse command-line arguments and global flags
//! - Delegate to command handlers
//! - Does NOT touch storage directly; every handler goes through
//!   [`crate::fs::Repository`]
//!
//! # Output
//!
//! Inspection output goes to stdout and is a stable format. Logging goes to
//! stderr, so scripts can parse stdout regardless of `--debug`.

pub mod args;
pub mod commands;

pub use args::Cli;

use anyhow::Result;

/// Execution context shared by every command handler.
#[derive(Debug, Clone, Default)]
pub struct Context {
    /// Debug logging enabled
    pub debug: bool,
    /// Suppress informational messages
    pub quiet: bool,
}

/// Run the CLI application.
///
/// This is the main entry point called from `main.rs`.
pub fn run(cli: Cli) -> Result<()> {
    let ctx = Context {
        debug: cli.debug,
        quiet: cli.quiet,
    };
    commands::dispatch(cli.command, &ctx)
}
