//! cli::commands
//!
//! Command dispatch and handlers.
//!
//! # Architecture
//!
//! Each command handler:
//! 1. Validates command-specific arguments
//! 2. Opens the repository and calls into [`crate::fs`]
//! 3. Formats and displays output
//!
//! Handlers close the repository before returning so the shared lock is
//! never held longer than the command.

mod create;
mod lsrevs;
mod lstxns;
mod recovery;
mod revprop;
mod txns;
mod youngest;

pub use create::create;
pub use lsrevs::lsrevs;
pub use lstxns::lstxns;
pub use recovery::recover;
pub use revprop::{revprop_delete, revprop_get, revprop_set};
pub use txns::{createtxn, rmtxn};
pub use youngest::youngest;

use crate::cli::args::{Command, RevpropAction};
use crate::cli::Context;
use crate::core::types::Revnum;
use anyhow::{Context as _, Result};

/// Dispatch a command to its handler.
pub fn dispatch(command: Command, ctx: &Context) -> Result<()> {
    match command {
        Command::Create { path } => create(ctx, &path),
        Command::Youngest { path } => youngest(ctx, &path),
        Command::Lstxns { path } => lstxns(ctx, &path),
        Command::Lsrevs { path, lower, upper } => {
            lsrevs(ctx, &path, lower.as_deref(), upper.as_deref())
        }
        Command::Rmtxn { path, name } => rmtxn(ctx, &path, &name),
        Command::Createtxn { path, base } => createtxn(ctx, &path, &base),
        Command::Recover { path } => recover(ctx, &path),
        Command::Revprop { action } => match action {
            RevpropAction::Get { path, rev, name } => revprop_get(ctx, &path, &rev, &name),
            RevpropAction::Set {
                path,
                rev,
                name,
                value,
            } => revprop_set(ctx, &path, &rev, &name, &value),
            RevpropAction::Delete { path, rev, name } => revprop_delete(ctx, &path, &rev, &name),
        },
    }
}

/// Parse a revision argument.
pub(crate) fn parse_rev(arg: &str) -> Result<Revnum> {
    Revnum::parse(arg).with_context(|| format!("Invalid revision '{}'", arg))
}
