//! lsrevs command - List revisions with their trees

use super::parse_rev;
use crate::cli::Context;
use crate::core::types::Revnum;
use crate::fs::{render_block, Repository};
use anyhow::{bail, Context as _, Result};
use std::path::Path;

/// Print revisions `lower..=upper`.
///
/// # Arguments
///
/// * `lower` - First revision; all revisions when omitted
/// * `upper` - Last revision; just `lower` when omitted
pub fn lsrevs(_ctx: &Context, path: &Path, lower: Option<&str>, upper: Option<&str>) -> Result<()> {
    let mut repo = Repository::open(path)
        .with_context(|| format!("Failed to open repository at {}", path.display()))?;
    let youngest = repo.youngest()?;

    let (lower, upper) = match (lower, upper) {
        (None, _) => (Revnum::ZERO, youngest),
        (Some(lower), None) => {
            let rev = parse_rev(lower)?;
            (rev, rev)
        }
        (Some(lower), Some(upper)) => (parse_rev(lower)?, parse_rev(upper)?),
    };
    if upper > youngest {
        bail!("No such revision {} (youngest is {})", upper, youngest);
    }

    let mut out = String::new();
    let mut rev = lower;
    while rev <= upper {
        let root = repo.revision_root(rev)?;
        let props = repo.revision_proplist(rev)?;
        out.push_str(&render_block(&format!("Revision {}", rev), &props, &root)?);
        rev = rev.next();
    }
    repo.close()?;

    print!("{}", out);
    Ok(())
}
