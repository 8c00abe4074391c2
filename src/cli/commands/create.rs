//! create command - Create a new, empty repository

use crate::cli::Context;
use crate::fs::Repository;
use anyhow::{Context as _, Result};
use std::path::Path;

/// Create a repository at `path`.
///
/// # Arguments
///
/// * `ctx` - Execution context
/// * `path` - Repository location; must be missing or empty
pub fn create(ctx: &Context, path: &Path) -> Result<()> {
    let mut repo = Repository::create(path)
        .with_context(|| format!("Failed to create repository at {}", path.display()))?;
    repo.close()?;

    if !ctx.quiet {
        eprintln!("Created repository at {}", path.display());
    }
    Ok(())
}
