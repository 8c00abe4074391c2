//! recover command - Repair storage after a crash
//!
//! Recovery takes the exclusive repository lock, so it waits for every
//! other process to close the repository and keeps new ones out until it
//! finishes.

use crate::cli::Context;
use crate::fs::Repository;
use anyhow::{Context as _, Result};
use std::path::Path;

/// Run recovery on the repository at `path`.
pub fn recover(ctx: &Context, path: &Path) -> Result<()> {
    if !ctx.quiet {
        eprintln!("Acquiring exclusive lock on {}...", path.display());
    }
    let report = Repository::recover(path)
        .with_context(|| format!("Recovery failed for {}", path.display()))?;

    let mut repo = Repository::open(path)
        .with_context(|| format!("Failed to open repository at {}", path.display()))?;
    let youngest = repo.youngest()?;
    repo.close()?;

    if !ctx.quiet {
        println!("Recovery completed.");
        if ctx.debug {
            println!(
                "Replayed {} batch(es), discarded {}, removed {} temp file(s).",
                report.replayed, report.discarded, report.temp_files_removed
            );
        }
        println!("The latest revision is {}.", youngest);
    }
    Ok(())
}
