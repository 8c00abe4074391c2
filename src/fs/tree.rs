//! fs::tree
//!
//! Copy-on-write editing of a transaction's tree.
//!
//! # Cloning
//!
//! To change a path, every directory from the root down to it must be owned
//! by the transaction. [`TxnEdit::make_mutable`] walks the path and clones
//! each node-revision the transaction does not own yet: the clone keeps the
//! node id, shares entries, properties and contents by reference, and
//! replaces the single parent entry that led to it. Nodes already owned are
//! edited in place, so each directory is cloned at most once per
//! transaction.
//!
//! A clone made at the path where its original was created keeps the
//! original's copy id, unless the transaction already holds a node-revision
//! under that id (the path was vacated and the node copied back in). Any
//! other clone gets a fresh copy id, which keeps two clones of one shared
//! node distinct.
//!
//! # Staging
//!
//! Every change is staged in the edit and becomes visible only when the
//! caller writes [`TxnEdit::into_batch`] as one atomic batch.

use std::collections::{BTreeMap, BTreeSet};

use super::changes::CopyRecord;
use super::node::{DirEntry, NodeRevision};
use super::props::PropList;
use super::root::FsRoot;
use super::store::{self, put_json, Store, TxnRecord};
use super::FsError;
use crate::backend::WriteBatch;
use crate::core::types::{FsPath, NodeRevId, RepKey, TxnId};

/// Staged edits to one transaction.
pub(crate) struct TxnEdit<'a> {
    store: Store<'a>,
    txn: TxnId,
    pub record: TxnRecord,
    nodes: BTreeMap<NodeRevId, NodeRevision>,
    reps: BTreeMap<RepKey, Vec<u8>>,
    dropped_reps: BTreeSet<RepKey>,
}

impl<'a> TxnEdit<'a> {
    pub fn new(store: Store<'a>, record: TxnRecord) -> Self {
        Self {
            store,
            txn: record.id,
            record,
            nodes: BTreeMap::new(),
            reps: BTreeMap::new(),
            dropped_reps: BTreeSet::new(),
        }
    }

    pub fn store(&self) -> Store<'a> {
        self.store
    }

    pub fn txn_id(&self) -> TxnId {
        self.txn
    }

    pub fn owns(&self, id: &NodeRevId) -> bool {
        id.is_owned_by(self.txn)
    }

    /// Whether `id` already names a node-revision of this transaction,
    /// staged or persisted. Such an id can never be handed out again.
    fn holds(&self, id: &NodeRevId) -> Result<bool, FsError> {
        if self.nodes.contains_key(id) {
            return Ok(true);
        }
        Ok(self
            .store
            .backend()
            .exists(&store::node_key(id, Some(self.txn)))?)
    }

    /// Stage a node-revision owned by this transaction.
    pub fn put_node(&mut self, node: NodeRevision) {
        self.nodes.insert(node.id, node);
    }

    /// Stage a new representation and return its key.
    pub fn new_rep(&mut self, bytes: Vec<u8>) -> RepKey {
        let key = RepKey::new(self.txn, self.record.next_rep);
        self.record.next_rep += 1;
        self.reps.insert(key, bytes);
        key
    }

    /// Forget a representation this transaction owns. Shared ones are kept.
    pub fn drop_rep(&mut self, key: RepKey) {
        if key.is_owned_by(self.txn) {
            self.reps.remove(&key);
            self.dropped_reps.insert(key);
        }
    }

    pub fn proplist(&self, node: &NodeRevision) -> Result<PropList, FsError> {
        match &node.prop_rep {
            Some(key) => match self.reps.get(key) {
                Some(bytes) => serde_json::from_slice(bytes).map_err(|e| {
                    FsError::corruption(format!("property list {} does not decode: {}", key, e))
                }),
                None => self.store.proplist(Some(key), Some(self.txn)),
            },
            None => Ok(PropList::new()),
        }
    }

    /// The root directory, cloned into the transaction if needed.
    pub fn mutable_root(&mut self) -> Result<NodeRevision, FsError> {
        let root_id = self.record.root;
        if self.owns(&root_id) {
            return self.read_node(&root_id);
        }
        let original = self.read_node(&root_id)?;
        let clone = original.successor(
            NodeRevId::new(original.id.node_id(), original.id.copy_id(), self.txn),
            FsPath::root(),
        );
        self.record.root = clone.id;
        self.put_node(clone.clone());
        Ok(clone)
    }

    /// The node at `path`, owned by this transaction.
    ///
    /// Clones every unowned node from the root down to `path`.
    ///
    /// # Errors
    ///
    /// - `NotFound` if a component is missing
    /// - `NotDirectory` if a non-final component is a file
    pub fn make_mutable(&mut self, path: &FsPath) -> Result<NodeRevision, FsError> {
        let mut current = self.mutable_root()?;
        let mut current_path = FsPath::root();

        for name in path.components() {
            if !current.is_dir() {
                return Err(FsError::NotDirectory(current_path.to_string()));
            }
            let child_path = current_path.join(name)?;
            let entry = *current
                .entries
                .get(name)
                .ok_or_else(|| FsError::NotFound(child_path.to_string()))?;

            let child = if self.owns(&entry.id) {
                self.read_node(&entry.id)?
            } else {
                let original = self.read_node(&entry.id)?;
                let native = NodeRevId::new(original.id.node_id(), original.id.copy_id(), self.txn);
                let copy_id = if original.created_path == child_path && !self.holds(&native)? {
                    original.id.copy_id()
                } else {
                    self.store.allocate_copy_id()?
                };
                let clone = original.successor(
                    NodeRevId::new(original.id.node_id(), copy_id, self.txn),
                    child_path.clone(),
                );
                current.entries.insert(
                    name.to_string(),
                    DirEntry {
                        kind: clone.kind,
                        id: clone.id,
                    },
                );
                self.put_node(current.clone());
                self.put_node(clone.clone());
                clone
            };

            current = child;
            current_path = child_path;
        }

        Ok(current)
    }

    /// Batch persisting the transaction record and everything staged.
    pub fn into_batch(self) -> Result<WriteBatch, FsError> {
        let mut batch = WriteBatch::new();
        let owner = Some(self.txn);

        for (id, node) in &self.nodes {
            put_json(&mut batch, store::node_key(id, owner), node)?;
        }
        for (key, bytes) in self.reps {
            batch.put(store::rep_key(&key, owner), bytes);
        }
        for key in &self.dropped_reps {
            batch.delete(store::rep_key(key, owner));
        }
        put_json(&mut batch, store::txn_key(self.txn), &self.record)?;

        Ok(batch)
    }
}

impl FsRoot for TxnEdit<'_> {
    fn root_node_id(&self) -> NodeRevId {
        self.record.root
    }

    fn read_node(&self, id: &NodeRevId) -> Result<NodeRevision, FsError> {
        match self.nodes.get(id) {
            Some(node) => Ok(node.clone()),
            None => self.store.node(id, Some(self.txn)),
        }
    }

    fn read_rep(&self, key: &RepKey) -> Result<Vec<u8>, FsError> {
        match self.reps.get(key) {
            Some(bytes) => Ok(bytes.clone()),
            None => self.store.rep(key, Some(self.txn)),
        }
    }

    fn copy_records(&self) -> Result<Vec<CopyRecord>, FsError> {
        Ok(self.record.copies.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryBackend, StorageBackend};
    use crate::core::types::{CopyId, NodeId, Revnum, UtcTimestamp};
    use crate::fs::changes::ChangeTable;
    use crate::fs::node::NodeKind;
    use crate::fs::store::NextIds;

    fn id(n: u64, c: u64, t: u64) -> NodeRevId {
        NodeRevId::new(NodeId::new(n), CopyId::new(c), TxnId::new(t))
    }

    fn p(s: &str) -> FsPath {
        FsPath::new(s).unwrap()
    }

    /// Committed tree: / -> d/ -> f, with ids 0.0.0, 1.0.0, 2.0.0.
    fn seeded_backend() -> MemoryBackend {
        let backend = MemoryBackend::new();
        let mut root = NodeRevision::new_dir(id(0, 0, 0), FsPath::root());
        let mut dir = NodeRevision::new_dir(id(1, 0, 0), p("/d"));
        let file = NodeRevision::new_file(id(2, 0, 0), p("/d/f"));
        dir.entries.insert("f".into(), DirEntry { kind: NodeKind::File, id: file.id });
        root.entries.insert("d".into(), DirEntry { kind: NodeKind::Dir, id: dir.id });

        let mut batch = WriteBatch::new();
        for node in [&root, &dir, &file] {
            put_json(&mut batch, store::node_key(&node.id, None), node).unwrap();
        }
        put_json(&mut batch, store::NEXT_IDS_KEY, &NextIds { node: 3, copy: 1, txn: 5 }).unwrap();
        backend.write_batch(batch).unwrap();
        backend
    }

    fn record(txn: u64) -> TxnRecord {
        TxnRecord {
            id: TxnId::new(txn),
            base_rev: Revnum::ZERO,
            root: id(0, 0, 0),
            created_at: UtcTimestamp::now(),
            props: PropList::new(),
            changes: ChangeTable::new(),
            copies: vec![],
            next_rep: 0,
        }
    }

    #[test]
    fn make_mutable_clones_each_directory_once() {
        let backend = seeded_backend();
        let mut edit = TxnEdit::new(Store::new(&backend), record(4));

        let file = edit.make_mutable(&p("/d/f")).unwrap();
        assert_eq!(file.id, id(2, 0, 4));
        assert_eq!(file.predecessor, Some(id(2, 0, 0)));
        assert_eq!(edit.record.root, id(0, 0, 4));

        let again = edit.make_mutable(&p("/d/f")).unwrap();
        assert_eq!(again.id, file.id);
        assert_eq!(edit.read_node(&id(1, 0, 4)).unwrap().entries["f"].id, file.id);
    }

    #[test]
    fn clone_through_copy_gets_fresh_copy_id() {
        let backend = seeded_backend();
        let mut edit = TxnEdit::new(Store::new(&backend), record(4));

        // share /d at /e, as a copy would
        let mut root = edit.mutable_root().unwrap();
        root.entries.insert("e".into(), DirEntry { kind: NodeKind::Dir, id: id(1, 0, 0) });
        edit.put_node(root);

        let native = edit.make_mutable(&p("/d/f")).unwrap();
        let copied = edit.make_mutable(&p("/e/f")).unwrap();
        assert_eq!(native.id, id(2, 0, 4));
        assert_eq!(copied.id.node_id(), NodeId::new(2));
        assert_ne!(copied.id, native.id);
        assert_eq!(copied.created_path, p("/e/f"));
    }

    #[test]
    fn second_clone_at_created_path_gets_fresh_copy_id() {
        let backend = seeded_backend();
        let mut edit = TxnEdit::new(Store::new(&backend), record(4));

        let first = edit.make_mutable(&p("/d/f")).unwrap();
        assert_eq!(first.id, id(2, 0, 4));

        // move the clone away and put the committed node back at /d/f
        let mut root = edit.mutable_root().unwrap();
        root.entries.insert("h".into(), DirEntry { kind: NodeKind::File, id: first.id });
        edit.put_node(root);
        let mut dir = edit.make_mutable(&p("/d")).unwrap();
        dir.entries.insert("f".into(), DirEntry { kind: NodeKind::File, id: id(2, 0, 0) });
        edit.put_node(dir);

        let second = edit.make_mutable(&p("/d/f")).unwrap();
        assert_eq!(second.id.node_id(), NodeId::new(2));
        assert_ne!(second.id, first.id);
        assert_eq!(second.predecessor, Some(id(2, 0, 0)));
        assert_eq!(edit.read_node(&first.id).unwrap().created_path, p("/d/f"));
        assert_eq!(edit.read_node(&id(0, 0, 4)).unwrap().entries["h"].id, first.id);
    }

    #[test]
    fn clone_id_already_persisted_is_not_reused() {
        let backend = seeded_backend();
        let mut edit = TxnEdit::new(Store::new(&backend), record(4));
        edit.make_mutable(&p("/d/f")).unwrap();
        let mut rec = edit.record.clone();
        backend.write_batch(edit.into_batch().unwrap()).unwrap();
        // point back at the committed root; the persisted clones stay
        rec.root = id(0, 0, 0);

        let mut edit = TxnEdit::new(Store::new(&backend), rec);
        let again = edit.make_mutable(&p("/d/f")).unwrap();
        assert_ne!(again.id, id(2, 0, 4));
        assert_eq!(again.id.node_id(), NodeId::new(2));
    }

    #[test]
    fn missing_and_file_components_fail() {
        let backend = seeded_backend();
        let mut edit = TxnEdit::new(Store::new(&backend), record(4));

        assert!(matches!(edit.make_mutable(&p("/nope")), Err(FsError::NotFound(_))));
        assert!(matches!(
            edit.make_mutable(&p("/d/f/g")),
            Err(FsError::NotDirectory(_))
        ));
    }

    #[test]
    fn nothing_visible_until_batch_written() {
        let backend = seeded_backend();
        let mut edit = TxnEdit::new(Store::new(&backend), record(4));
        edit.make_mutable(&p("/d/f")).unwrap();
        let key = edit.new_rep(b"hello".to_vec());
        assert_eq!(key, RepKey::new(TxnId::new(4), 0));

        assert!(backend.list("txn-nodes/4/").unwrap().is_empty());

        let batch = edit.into_batch().unwrap();
        backend.write_batch(batch).unwrap();
        assert_eq!(backend.list("txn-nodes/4/").unwrap().len(), 3);
        assert_eq!(backend.get("txn-reps/4/4-0").unwrap(), Some(b"hello".to_vec()));
        assert!(backend.get("txns/4").unwrap().is_some());
    }

    #[test]
    fn dropping_shared_rep_is_ignored() {
        let backend = seeded_backend();
        let mut edit = TxnEdit::new(Store::new(&backend), record(4));
        edit.drop_rep(RepKey::new(TxnId::new(1), 0));
        let owned = edit.new_rep(vec![1]);
        edit.drop_rep(owned);

        let batch = edit.into_batch().unwrap();
        let deletes: Vec<_> = batch
            .ops()
            .iter()
            .filter(|op| matches!(op, crate::backend::BatchOp::Delete { .. }))
            .map(|op| op.key().to_string())
            .collect();
        assert_eq!(deletes, vec!["txn-reps/4/4-0"]);
    }
}
