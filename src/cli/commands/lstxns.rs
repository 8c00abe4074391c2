//! lstxns command - List open transactions with their trees

use crate::cli::Context;
use crate::fs::{render_block, Repository};
use anyhow::{Context as _, Result};
use std::path::Path;

/// Print every open transaction: header, separator and tree.
///
/// Transactions are listed in ascending name order.
pub fn lstxns(_ctx: &Context, path: &Path) -> Result<()> {
    let mut repo = Repository::open(path)
        .with_context(|| format!("Failed to open repository at {}", path.display()))?;

    let mut out = String::new();
    for name in repo.list_transactions()? {
        let txn = repo
            .open_transaction(&name)
            .with_context(|| format!("Failed to open transaction {}", name))?;
        let root = txn.root()?;
        let props = txn.txn_proplist()?;
        out.push_str(&render_block(&format!("Txn {}:", name), &props, &root)?);
    }
    repo.close()?;

    print!("{}", out);
    Ok(())
}
