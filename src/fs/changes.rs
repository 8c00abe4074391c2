//! fs::changes
//!
//! Changed-path and copy tables.
//!
//! A transaction records one folded [`PathChange`] per touched path. The
//! table travels with the transaction and is stored on the revision record
//! at commit, where conflict detection reads it back.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::types::{FsPath, NodeRevId, Revnum};

/// What happened to a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Created (possibly as a copy).
    Add,
    /// Removed.
    Delete,
    /// Removed, then created again.
    Replace,
    /// Contents or properties edited in place.
    Modify,
}

impl ChangeKind {
    /// Whether this change removes whatever was at the path before.
    pub fn removes_old(&self) -> bool {
        matches!(self, ChangeKind::Delete | ChangeKind::Replace)
    }
}

/// The net change to one path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathChange {
    pub kind: ChangeKind,
    #[serde(default)]
    pub text_mod: bool,
    #[serde(default)]
    pub prop_mod: bool,
    /// Source of a copy that created the path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copy_from: Option<CopySource>,
}

impl PathChange {
    fn new(kind: ChangeKind) -> Self {
        Self {
            kind,
            text_mod: false,
            prop_mod: false,
            copy_from: None,
        }
    }
}

/// Where a copy came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopySource {
    pub rev: Revnum,
    pub path: FsPath,
}

/// One copy performed in a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyRecord {
    pub dst: FsPath,
    pub src: CopySource,
    /// Node-revision placed at `dst`.
    pub node: NodeRevId,
}

/// Changed paths of a transaction or revision.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeTable {
    changes: BTreeMap<FsPath, PathChange>,
}

impl ChangeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &FsPath) -> Option<&PathChange> {
        self.changes.get(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FsPath, &PathChange)> {
        self.changes.iter()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Record a creation at `path`.
    ///
    /// A creation after a deletion in the same table becomes a replace.
    pub fn record_add(&mut self, path: &FsPath, copy_from: Option<CopySource>) {
        let kind = match self.changes.get(path).map(|c| c.kind) {
            Some(ChangeKind::Delete) | Some(ChangeKind::Replace) => ChangeKind::Replace,
            _ => ChangeKind::Add,
        };
        let mut change = PathChange::new(kind);
        change.copy_from = copy_from;
        self.changes.insert(path.clone(), change);
    }

    /// Record a deletion at `path`.
    ///
    /// Changes recorded beneath `path` are dropped. Deleting a path added
    /// in the same table leaves no trace of it.
    pub fn record_delete(&mut self, path: &FsPath) {
        self.changes
            .retain(|p, _| p == path || !path.is_ancestor_or_self(p));

        match self.changes.get(path).map(|c| c.kind) {
            Some(ChangeKind::Add) => {
                self.changes.remove(path);
            }
            _ => {
                self.changes
                    .insert(path.clone(), PathChange::new(ChangeKind::Delete));
            }
        }
    }

    /// Record a move of `src` to `dst`.
    ///
    /// Changes beneath `src` move along with it, and `dst` keeps any content
    /// or property edits made at `src`.
    pub fn record_move(&mut self, src: &FsPath, dst: &FsPath, copy_from: Option<CopySource>) {
        let own = self.changes.get(src).cloned();
        let carried: Vec<(FsPath, PathChange)> = self
            .changes
            .iter()
            .filter(|(path, _)| *path != src)
            .filter_map(|(path, change)| Some((path.rebase(src, dst)?, change.clone())))
            .collect();

        self.record_delete(src);
        self.record_add(dst, copy_from);
        if let (Some(own), Some(change)) = (own, self.changes.get_mut(dst)) {
            change.text_mod |= own.text_mod;
            change.prop_mod |= own.prop_mod;
        }
        self.changes.extend(carried);
    }

    /// Record an in-place edit at `path`.
    pub fn record_modify(&mut self, path: &FsPath, text: bool, props: bool) {
        let change = self
            .changes
            .entry(path.clone())
            .or_insert_with(|| PathChange::new(ChangeKind::Modify));
        change.text_mod |= text;
        change.prop_mod |= props;
    }

    /// First path in `self` that conflicts with a change in `other`.
    ///
    /// Two tables conflict at a path both touch, or where one side deleted
    /// or replaced an ancestor of a path the other side touched.
    pub fn first_conflict(&self, other: &ChangeTable) -> Option<FsPath> {
        for (path, change) in &self.changes {
            if other.changes.contains_key(path) {
                return Some(path.clone());
            }

            let mut ancestor = path.parent();
            while let Some(p) = ancestor {
                if other.changes.get(&p).is_some_and(|c| c.kind.removes_old()) {
                    return Some(path.clone());
                }
                ancestor = p.parent();
            }

            if change.kind.removes_old()
                && other
                    .changes
                    .keys()
                    .any(|p| p != path && path.is_ancestor_or_self(p))
            {
                return Some(path.clone());
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> FsPath {
        FsPath::new(s).unwrap()
    }

    mod folding {
        use super::*;

        #[test]
        fn add_then_modify_stays_add() {
            let mut t = ChangeTable::new();
            t.record_add(&p("/a"), None);
            t.record_modify(&p("/a"), true, false);
            let c = t.get(&p("/a")).unwrap();
            assert_eq!(c.kind, ChangeKind::Add);
            assert!(c.text_mod);
        }

        #[test]
        fn add_then_delete_leaves_nothing() {
            let mut t = ChangeTable::new();
            t.record_add(&p("/a"), None);
            t.record_delete(&p("/a"));
            assert!(t.is_empty());
        }

        #[test]
        fn delete_then_add_is_replace() {
            let mut t = ChangeTable::new();
            t.record_delete(&p("/a"));
            t.record_add(&p("/a"), None);
            assert_eq!(t.get(&p("/a")).unwrap().kind, ChangeKind::Replace);

            t.record_delete(&p("/a"));
            assert_eq!(t.get(&p("/a")).unwrap().kind, ChangeKind::Delete);
        }

        #[test]
        fn modify_flags_accumulate() {
            let mut t = ChangeTable::new();
            t.record_modify(&p("/a"), true, false);
            t.record_modify(&p("/a"), false, true);
            let c = t.get(&p("/a")).unwrap();
            assert_eq!(c.kind, ChangeKind::Modify);
            assert!(c.text_mod && c.prop_mod);
        }

        #[test]
        fn delete_drops_changes_beneath() {
            let mut t = ChangeTable::new();
            t.record_modify(&p("/d/x"), true, false);
            t.record_add(&p("/d/y"), None);
            t.record_modify(&p("/dz"), true, false);
            t.record_delete(&p("/d"));

            assert_eq!(t.len(), 2);
            assert_eq!(t.get(&p("/d")).unwrap().kind, ChangeKind::Delete);
            assert!(t.get(&p("/dz")).is_some());
        }
        #[test]
        fn move_carries_copy_and_nested_changes() {
            let from = CopySource { rev: Revnum::new(1), path: p("/a") };
            let inner = CopySource { rev: Revnum::new(1), path: p("/k") };
            let mut t = ChangeTable::new();
            t.record_add(&p("/b"), Some(from.clone()));
            t.record_modify(&p("/b"), true, false);
            t.record_add(&p("/b/k"), Some(inner.clone()));
            t.record_modify(&p("/bz"), true, false);

            t.record_move(&p("/b"), &p("/c"), Some(from.clone()));

            assert!(t.get(&p("/b")).is_none());
            assert!(t.get(&p("/b/k")).is_none());
            let moved = t.get(&p("/c")).unwrap();
            assert_eq!(moved.kind, ChangeKind::Add);
            assert_eq!(moved.copy_from, Some(from));
            assert!(moved.text_mod);
            assert_eq!(t.get(&p("/c/k")).unwrap().copy_from, Some(inner));
            assert!(t.get(&p("/bz")).is_some());
        }

        #[test]
        fn move_of_committed_path_leaves_delete() {
            let mut t = ChangeTable::new();
            t.record_modify(&p("/a/f"), true, false);
            let from = CopySource { rev: Revnum::new(2), path: p("/a") };
            t.record_move(&p("/a"), &p("/z"), Some(from.clone()));

            assert_eq!(t.get(&p("/a")).unwrap().kind, ChangeKind::Delete);
            assert_eq!(t.get(&p("/z")).unwrap().copy_from, Some(from));
            assert!(t.get(&p("/z/f")).unwrap().text_mod);
            assert_eq!(t.len(), 3);
        }
    }

    mod conflicts {
        use super::*;

        #[test]
        fn disjoint_paths_do_not_conflict() {
            let mut a = ChangeTable::new();
            a.record_add(&p("/b.txt"), None);
            let mut b = ChangeTable::new();
            b.record_add(&p("/c.txt"), None);
            assert_eq!(a.first_conflict(&b), None);
            assert_eq!(b.first_conflict(&a), None);
        }

        #[test]
        fn same_path_conflicts() {
            let mut a = ChangeTable::new();
            a.record_modify(&p("/a.txt"), true, false);
            let mut b = ChangeTable::new();
            b.record_modify(&p("/a.txt"), false, true);
            assert_eq!(a.first_conflict(&b), Some(p("/a.txt")));
        }

        #[test]
        fn deleted_ancestor_conflicts_both_ways() {
            let mut edits = ChangeTable::new();
            edits.record_modify(&p("/d/f"), true, false);
            let mut removal = ChangeTable::new();
            removal.record_delete(&p("/d"));

            assert_eq!(edits.first_conflict(&removal), Some(p("/d/f")));
            assert_eq!(removal.first_conflict(&edits), Some(p("/d")));
        }

        #[test]
        fn modified_ancestor_does_not_conflict() {
            let mut child = ChangeTable::new();
            child.record_add(&p("/d/new"), None);
            let mut parent = ChangeTable::new();
            parent.record_modify(&p("/d"), false, true);
            assert_eq!(child.first_conflict(&parent), None);
            assert_eq!(parent.first_conflict(&child), None);
        }

        #[test]
        fn sibling_prefix_is_not_ancestor() {
            let mut a = ChangeTable::new();
            a.record_delete(&p("/d"));
            let mut b = ChangeTable::new();
            b.record_modify(&p("/dz"), true, false);
            assert_eq!(a.first_conflict(&b), None);
        }

        #[test]
        fn descendant_found_past_sorted_siblings() {
            let mut a = ChangeTable::new();
            a.record_delete(&p("/d"));
            let mut b = ChangeTable::new();
            // "/d-x" sorts between "/d" and "/d/f"
            b.record_modify(&p("/d-x"), true, false);
            b.record_modify(&p("/d/f"), true, false);
            assert_eq!(a.first_conflict(&b), Some(p("/d")));
        }
    }

    #[test]
    fn table_serializes_as_map() {
        let mut t = ChangeTable::new();
        t.record_add(
            &p("/b"),
            Some(CopySource {
                rev: Revnum::new(1),
                path: p("/a"),
            }),
        );
        let json = serde_json::to_string(&t).unwrap();
        assert!(json.starts_with("{\"/b\":"));
        let back: ChangeTable = serde_json::from_str(&json).unwrap();
        assert_eq!(back, t);
    }
}
