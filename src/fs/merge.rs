//! fs::merge
//!
//! Three-way directory merge run at commit when other revisions landed
//! after the transaction's base.
//!
//! The inputs are the ancestor tree (the base revision root), the source
//! tree (the transaction root) and the target tree (the youngest revision
//! root). The result replaces the source tree in place: every entry the
//! transaction left alone takes the target's value, every entry only the
//! transaction touched keeps its own. Directories both sides changed are
//! merged recursively when they are still the same node. Anything else is a
//! conflict at the entry's path.

use std::collections::BTreeSet;

use super::node::{DirEntry, NodeKind};
use super::root::FsRoot;
use super::tree::TxnEdit;
use super::FsError;
use crate::core::types::{FsPath, NodeRevId};

struct Pending {
    path: FsPath,
    ancestor: NodeRevId,
    target: NodeRevId,
    source: NodeRevId,
}

/// Merge the changes between `ancestor` and `target` into the edit's tree.
///
/// The edit's root must already be owned by the transaction.
pub(crate) fn merge_into(
    edit: &mut TxnEdit<'_>,
    ancestor: NodeRevId,
    target: NodeRevId,
) -> Result<(), FsError> {
    let store = edit.store();
    let mut stack = vec![Pending {
        path: FsPath::root(),
        ancestor,
        target,
        source: edit.record.root,
    }];

    while let Some(job) = stack.pop() {
        if job.target == job.ancestor {
            continue;
        }

        let a = store.node(&job.ancestor, None)?;
        let t = store.node(&job.target, None)?;
        let mut s = edit.read_node(&job.source)?;
        if !(a.is_dir() && t.is_dir() && s.is_dir()) {
            return Err(FsError::Conflict(job.path.to_string()));
        }

        if t.prop_rep != a.prop_rep {
            if s.prop_rep != a.prop_rep {
                return Err(FsError::Conflict(job.path.to_string()));
            }
            s.prop_rep = t.prop_rep;
            s.system_props = t.system_props.clone();
        }

        let names: BTreeSet<&String> = a
            .entries
            .keys()
            .chain(t.entries.keys())
            .chain(s.entries.keys())
            .collect();
        let mut merged = s.entries.clone();

        for name in names {
            let ae = a.entries.get(name);
            let se = s.entries.get(name);
            let te = t.entries.get(name);

            if se == ae {
                match te {
                    Some(entry) => merged.insert(name.clone(), *entry),
                    None => merged.remove(name),
                };
                continue;
            }
            if te == ae || se == te {
                continue;
            }

            let child_path = job.path.join(name)?;
            match (ae, se, te) {
                (Some(ae), Some(se), Some(te))
                    if same_dir(ae, se) && same_dir(ae, te) && edit.owns(&se.id) =>
                {
                    stack.push(Pending {
                        path: child_path,
                        ancestor: ae.id,
                        target: te.id,
                        source: se.id,
                    });
                }
                _ => return Err(FsError::Conflict(child_path.to_string())),
            }
        }

        s.entries = merged;
        s.predecessor = Some(t.id);
        s.predecessor_count = t.predecessor_count + 1;
        edit.put_node(s);
    }

    Ok(())
}

fn same_dir(a: &DirEntry, b: &DirEntry) -> bool {
    a.kind == NodeKind::Dir && b.kind == NodeKind::Dir && a.id.node_id() == b.id.node_id()
}
