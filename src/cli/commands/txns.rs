//! createtxn and rmtxn commands - Begin or remove transactions

use super::parse_rev;
use crate::cli::Context;
use crate::fs::Repository;
use anyhow::{Context as _, Result};
use std::path::Path;

/// Begin a transaction on `base` and print its name.
///
/// The transaction stays open after the command exits; `lstxns` shows it
/// and `rmtxn` removes it.
pub fn createtxn(_ctx: &Context, path: &Path, base: &str) -> Result<()> {
    let base = parse_rev(base)?;
    let mut repo = Repository::open(path)
        .with_context(|| format!("Failed to open repository at {}", path.display()))?;
    let name = repo
        .begin_transaction(base)
        .with_context(|| format!("Failed to begin a transaction on revision {}", base))?
        .name();
    repo.close()?;

    println!("{}", name);
    Ok(())
}

/// Remove the open transaction `name`.
pub fn rmtxn(ctx: &Context, path: &Path, name: &str) -> Result<()> {
    let mut repo = Repository::open(path)
        .with_context(|| format!("Failed to open repository at {}", path.display()))?;
    repo.purge_transaction(name)
        .with_context(|| format!("Failed to remove transaction {}", name))?;
    repo.close()?;

    if !ctx.quiet {
        eprintln!("Transaction {} removed.", name);
    }
    Ok(())
}
