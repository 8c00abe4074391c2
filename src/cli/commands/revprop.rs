//! revprop command - Read or edit revision properties
//!
//! Revision properties are the one thing about a committed revision that may
//! change. Editing them never touches the revision's tree.

use super::parse_rev;
use crate::cli::Context;
use crate::fs::Repository;
use anyhow::{bail, Context as _, Result};
use std::io::Write;
use std::path::Path;

fn open(path: &Path) -> Result<Repository> {
    Repository::open(path).with_context(|| format!("Failed to open repository at {}", path.display()))
}

/// Print property `name` of revision `rev`, raw, followed by a newline.
pub fn revprop_get(_ctx: &Context, path: &Path, rev: &str, name: &str) -> Result<()> {
    let rev = parse_rev(rev)?;
    let mut repo = open(path)?;
    let value = repo.revision_property(rev, name)?;
    repo.close()?;

    match value {
        Some(value) => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&value)?;
            stdout.write_all(b"\n")?;
            Ok(())
        }
        None => bail!("Property '{}' not set on revision {}", name, rev),
    }
}

/// Set property `name` of revision `rev`.
pub fn revprop_set(ctx: &Context, path: &Path, rev: &str, name: &str, value: &str) -> Result<()> {
    let rev = parse_rev(rev)?;
    let mut repo = open(path)?;
    repo.set_revision_property(rev, name, value.as_bytes())
        .with_context(|| format!("Failed to set '{}' on revision {}", name, rev))?;
    repo.close()?;

    if !ctx.quiet {
        eprintln!("Set property '{}' on revision {}", name, rev);
    }
    Ok(())
}

/// Remove property `name` from revision `rev`.
pub fn revprop_delete(ctx: &Context, path: &Path, rev: &str, name: &str) -> Result<()> {
    let rev = parse_rev(rev)?;
    let mut repo = open(path)?;
    repo.remove_revision_property(rev, name)
        .with_context(|| format!("Failed to remove '{}' from revision {}", name, rev))?;
    repo.close()?;

    if !ctx.quiet {
        eprintln!("Removed property '{}' from revision {}", name, rev);
    }
    Ok(())
}
