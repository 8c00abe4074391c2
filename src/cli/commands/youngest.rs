//! youngest command - Print the youngest revision number

use crate::cli::Context;
use crate::fs::Repository;
use anyhow::{Context as _, Result};
use std::path::Path;

/// Print the youngest revision of the repository at `path`.
pub fn youngest(_ctx: &Context, path: &Path) -> Result<()> {
    let mut repo = Repository::open(path)
        .with_context(|| format!("Failed to open repository at {}", path.display()))?;
    let rev = repo.youngest()?;
    repo.close()?;

    println!("{}", rev);
    Ok(())
}
