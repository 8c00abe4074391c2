//! fs::dump
//!
//! Text rendering of trees for the admin tool.
//!
//! # Format
//!
//! One line per entry, pre-order, entries in byte order of name. Depth `d`
//! (root entries are depth 1) is indented by `d` spaces.
//!
//! ```text
//!  a.txt <1.0.1> [5]
//!  d/ <2.0.1>
//!   f <3.0.1> [0]
//! ```
//!
//! Directories end in `/` and carry no length. The layout is consumed by
//! scripts and must not change.

use super::node::DirEntry;
use super::props::{PropList, PROP_REVISION_AUTHOR, PROP_REVISION_DATE, PROP_REVISION_LOG};
use super::root::FsRoot;
use super::FsError;

/// Width of the separator line between a header and its tree.
const SEPARATOR_WIDTH: usize = 42;

/// Render the tree below `root`'s root directory.
pub fn render_tree<R: FsRoot + ?Sized>(root: &R) -> Result<String, FsError> {
    let mut out = String::new();
    let top = root.read_node(&root.root_node_id())?;

    let mut stack: Vec<(usize, String, DirEntry)> = Vec::new();
    push_children(&mut stack, 1, &top.entries);

    while let Some((depth, name, entry)) = stack.pop() {
        let node = root.read_node(&entry.id)?;
        let indent = " ".repeat(depth);
        if node.is_dir() {
            out.push_str(&format!("{}{}/ <{}>\n", indent, name, node.id));
            push_children(&mut stack, depth + 1, &node.entries);
        } else {
            out.push_str(&format!("{}{} <{}> [{}]\n", indent, name, node.id, node.size));
        }
    }

    Ok(out)
}

fn push_children(
    stack: &mut Vec<(usize, String, DirEntry)>,
    depth: usize,
    entries: &std::collections::BTreeMap<String, DirEntry>,
) {
    // reversed so the smallest name pops first
    for (name, entry) in entries.iter().rev() {
        stack.push((depth, name.clone(), *entry));
    }
}

/// Render a header, separator, tree and trailing blank line.
///
/// `title` is the first line, e.g. `Revision 3` or `Txn 7:`. The remaining
/// header lines come from the reserved date, author and log properties.
pub fn render_block<R: FsRoot + ?Sized>(
    title: &str,
    props: &PropList,
    root: &R,
) -> Result<String, FsError> {
    let date = props.get_string(PROP_REVISION_DATE).unwrap_or_default();
    let author = props.get_string(PROP_REVISION_AUTHOR).unwrap_or_default();
    let log = props.get(PROP_REVISION_LOG).unwrap_or_default();

    let mut out = String::new();
    out.push_str(&format!("{}\n", title));
    out.push_str(&format!("Created: {}\n", date));
    out.push_str(&format!("Author: {}\n", author));
    out.push_str(&format!("Log ({} bytes):\n", log.len()));
    out.push_str(&String::from_utf8_lossy(log));
    out.push('\n');
    out.push_str(&"=".repeat(SEPARATOR_WIDTH));
    out.push('\n');
    out.push_str(&render_tree(root)?);
    out.push('\n');
    Ok(out)
}
