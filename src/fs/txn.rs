//! fs::txn
//!
//! Transactions: mutable, copy-on-write staging areas on a base revision.
//!
//! # Lifecycle
//!
//! A transaction is `Open` until it is committed or aborted. Every mutating
//! operation reloads the persisted transaction record, stages its edits and
//! writes them back as one backend batch, so a failed operation leaves the
//! transaction exactly as it was. Handles to the same transaction name are
//! independent; callers must not edit one transaction from two handles at
//! once.
//!
//! # Commit
//!
//! Commit takes the backend write lock, then:
//!
//! 1. checks the transaction's changed paths against every revision
//!    committed after its base (path-level conflicts),
//! 2. merges those revisions' trees into the transaction tree,
//! 3. writes the new revision, its properties, the promoted node-revisions
//!    and representations, the new youngest number, and the removal of the
//!    transaction's records, all in one batch.
//!
//! Until that batch lands nothing is visible. A failed commit leaves the
//! transaction open and unchanged.

use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use super::changes::{ChangeKind, ChangeTable, CopyRecord, CopySource, PathChange};
use super::merge::merge_into;
use super::node::{checksum, DirEntry, NodeKind, NodeRevision};
use super::props::{PropList, PROP_REVISION_AUTHOR, PROP_REVISION_DATE};
use super::root::{FsRoot, RevisionRoot, TxnRoot};
use super::store::{self, put_json, RevisionRecord, Store, TxnRecord};
use super::tree::TxnEdit;
use super::FsError;
use crate::backend::{StorageBackend, WriteBatch};
use crate::core::types::{CopyId, FsPath, NodeRevId, Revnum, TxnId, UtcTimestamp};

/// Lifecycle state of a transaction handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    Open,
    Committed(Revnum),
    Aborted,
}

/// A handle on an open transaction.
pub struct Transaction<'r> {
    backend: &'r dyn StorageBackend,
    id: TxnId,
    base_rev: Revnum,
    state: TxnState,
}

impl<'r> Transaction<'r> {
    pub(crate) fn new(backend: &'r dyn StorageBackend, id: TxnId, base_rev: Revnum) -> Self {
        Self {
            backend,
            id,
            base_rev,
            state: TxnState::Open,
        }
    }

    /// Persist a fresh transaction on `base_rev`.
    pub(crate) fn begin(
        backend: &'r dyn StorageBackend,
        base_rev: Revnum,
        author: Option<&str>,
    ) -> Result<Self, FsError> {
        let store = Store::new(backend);
        if base_rev > store.youngest()? {
            return Err(FsError::NotFound(format!("revision {}", base_rev)));
        }
        let base = store.revision(base_rev)?;
        let id = store.allocate_txn_id()?;

        let created_at = UtcTimestamp::now();
        let mut props = PropList::new();
        props.set(PROP_REVISION_DATE, created_at.to_string());
        if let Some(author) = author {
            props.set(PROP_REVISION_AUTHOR, author);
        }

        let record = TxnRecord {
            id,
            base_rev,
            root: base.root,
            created_at,
            props,
            changes: ChangeTable::new(),
            copies: Vec::new(),
            next_rep: 0,
        };
        let mut batch = WriteBatch::new();
        put_json(&mut batch, store::txn_key(id), &record)?;
        backend.write_batch(batch)?;

        info!(target: "revfs::txn", txn = %id, base = %base_rev, "began transaction");
        Ok(Self::new(backend, id, base_rev))
    }

    /// The transaction's name, as listed by `lstxns`.
    pub fn name(&self) -> String {
        self.id.to_string()
    }

    pub fn id(&self) -> TxnId {
        self.id
    }

    pub fn base_rev(&self) -> Revnum {
        self.base_rev
    }

    pub fn state(&self) -> TxnState {
        self.state
    }

    fn store(&self) -> Store<'r> {
        Store::new(self.backend)
    }

    fn ensure_open(&self) -> Result<(), FsError> {
        match self.state {
            TxnState::Open => Ok(()),
            TxnState::Committed(rev) => Err(FsError::IllegalState(format!(
                "transaction {} was committed as revision {}",
                self.id, rev
            ))),
            TxnState::Aborted => Err(FsError::IllegalState(format!(
                "transaction {} was aborted",
                self.id
            ))),
        }
    }

    fn load_record(&self) -> Result<TxnRecord, FsError> {
        self.store()
            .txn(self.id)?
            .ok_or_else(|| FsError::NotFound(format!("transaction {}", self.id)))
    }

    fn edit(&self) -> Result<TxnEdit<'r>, FsError> {
        self.ensure_open()?;
        Ok(TxnEdit::new(self.store(), self.load_record()?))
    }

    fn flush(&self, edit: TxnEdit<'_>) -> Result<(), FsError> {
        self.backend.write_batch(edit.into_batch()?)?;
        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// The transaction's tree as last persisted.
    pub fn root(&self) -> Result<TxnRoot<'r>, FsError> {
        self.ensure_open()?;
        let record = self.load_record()?;
        Ok(TxnRoot::new(self.store(), self.id, record.root, record.copies))
    }

    /// Paths changed so far.
    pub fn changed_paths(&self) -> Result<Vec<(FsPath, PathChange)>, FsError> {
        self.ensure_open()?;
        Ok(self
            .load_record()?
            .changes
            .iter()
            .map(|(p, c)| (p.clone(), c.clone()))
            .collect())
    }

    pub fn txn_property(&self, name: &str) -> Result<Option<Vec<u8>>, FsError> {
        self.ensure_open()?;
        Ok(self.load_record()?.props.get(name).map(<[u8]>::to_vec))
    }

    pub fn txn_proplist(&self) -> Result<PropList, FsError> {
        self.ensure_open()?;
        Ok(self.load_record()?.props)
    }

    // =========================================================================
    // Tree edits
    // =========================================================================

    /// Create an empty file at `path`.
    ///
    /// # Errors
    ///
    /// - `AlreadyExists` if something is already at `path`
    /// - `NotFound` / `NotDirectory` if the parent is missing or a file
    pub fn make_file(&mut self, path: &str) -> Result<(), FsError> {
        self.make_node(path, NodeKind::File)
    }

    /// Create an empty directory at `path`.
    pub fn make_dir(&mut self, path: &str) -> Result<(), FsError> {
        self.make_node(path, NodeKind::Dir)
    }

    fn make_node(&mut self, path: &str, kind: NodeKind) -> Result<(), FsError> {
        let path = FsPath::new(path)?;
        let mut edit = self.edit()?;
        let (parent_path, name) = split(&path)?;

        let mut parent = mutable_dir(&mut edit, &parent_path)?;
        if parent.entries.contains_key(name) {
            return Err(FsError::AlreadyExists(path.to_string()));
        }

        let node_id = edit.store().allocate_node_id()?;
        let id = NodeRevId::new(node_id, CopyId::new(0), self.id);
        let node = match kind {
            NodeKind::File => NodeRevision::new_file(id, path.clone()),
            NodeKind::Dir => NodeRevision::new_dir(id, path.clone()),
        };
        parent.entries.insert(name.to_string(), DirEntry { kind, id });
        edit.put_node(parent);
        edit.put_node(node);
        edit.record.changes.record_add(&path, None);

        debug!(target: "revfs::txn", txn = %self.id, path = %path, kind = %kind, "created node");
        self.flush(edit)
    }

    /// Remove the entry at `path`.
    ///
    /// The removed node-revision is untouched; earlier revisions still
    /// reach it.
    pub fn delete(&mut self, path: &str) -> Result<(), FsError> {
        let path = FsPath::new(path)?;
        if path.is_root() {
            return Err(FsError::IllegalState("cannot delete the root directory".into()));
        }
        let mut edit = self.edit()?;
        let (parent_path, name) = split(&path)?;

        let mut parent = mutable_dir(&mut edit, &parent_path)?;
        if parent.entries.remove(name).is_none() {
            return Err(FsError::NotFound(path.to_string()));
        }
        edit.put_node(parent);
        edit.record.changes.record_delete(&path);
        edit.record.copies.retain(|c| !path.is_ancestor_or_self(&c.dst));

        debug!(target: "revfs::txn", txn = %self.id, path = %path, "deleted node");
        self.flush(edit)
    }

    /// Replace the contents of the file at `path`.
    pub fn set_contents(&mut self, path: &str, contents: &[u8]) -> Result<(), FsError> {
        let path = FsPath::new(path)?;
        let mut edit = self.edit()?;

        let mut node = edit.make_mutable(&path)?;
        if !node.is_file() {
            return Err(FsError::NotFile(path.to_string()));
        }
        if let Some(old) = node.data_rep.take() {
            edit.drop_rep(old);
        }
        if !contents.is_empty() {
            node.data_rep = Some(edit.new_rep(contents.to_vec()));
        }
        node.size = contents.len() as u64;
        node.checksum = Some(checksum(contents));
        edit.put_node(node);
        edit.record.changes.record_modify(&path, true, false);

        self.flush(edit)
    }

    /// Set property `name` on the node at `path`.
    pub fn set_node_property(&mut self, path: &str, name: &str, value: &[u8]) -> Result<(), FsError> {
        self.change_node_property(path, name, Some(value))
    }

    /// Remove property `name` from the node at `path`. Removing an absent
    /// property still records a property change.
    pub fn remove_node_property(&mut self, path: &str, name: &str) -> Result<(), FsError> {
        self.change_node_property(path, name, None)
    }

    fn change_node_property(&mut self, path: &str, name: &str, value: Option<&[u8]>) -> Result<(), FsError> {
        if name.is_empty() {
            return Err(FsError::IllegalState("property name cannot be empty".into()));
        }
        let path = FsPath::new(path)?;
        let mut edit = self.edit()?;

        let mut node = edit.make_mutable(&path)?;
        let mut props = edit.proplist(&node)?;
        match value {
            Some(value) => {
                props.set(name, value);
            }
            None => {
                props.remove(name);
            }
        }

        if let Some(old) = node.prop_rep.take() {
            edit.drop_rep(old);
        }
        if !props.is_empty() {
            let bytes = serde_json::to_vec(&props)
                .map_err(|e| FsError::corruption(format!("property list does not encode: {}", e)))?;
            node.prop_rep = Some(edit.new_rep(bytes));
        }
        node.system_props = props.system_props();
        edit.put_node(node);
        edit.record.changes.record_modify(&path, false, true);

        self.flush(edit)
    }

    /// Place the node at `src_path` in `src_rev` at `dst_path`.
    ///
    /// The new entry shares the source node-revision; nothing is duplicated.
    pub fn copy(&mut self, src_path: &str, src_rev: Revnum, dst_path: &str) -> Result<(), FsError> {
        let src_path = FsPath::new(src_path)?;
        let dst_path = FsPath::new(dst_path)?;
        let mut edit = self.edit()?;
        let store = edit.store();

        if src_rev > store.youngest()? {
            return Err(FsError::NotFound(format!("revision {}", src_rev)));
        }
        let src_root = RevisionRoot::new(store, src_rev, store.revision(src_rev)?);
        let source = src_root
            .lookup(&src_path)?
            .ok_or_else(|| FsError::NotFound(format!("{}@{}", src_path, src_rev)))?;

        let (parent_path, name) = split(&dst_path)?;
        let mut parent = mutable_dir(&mut edit, &parent_path)?;
        if parent.entries.contains_key(name) {
            return Err(FsError::AlreadyExists(dst_path.to_string()));
        }
        parent.entries.insert(
            name.to_string(),
            DirEntry {
                kind: source.kind,
                id: source.id,
            },
        );
        edit.put_node(parent);

        let from = CopySource {
            rev: src_rev,
            path: src_path,
        };
        edit.record.changes.record_add(&dst_path, Some(from.clone()));
        edit.record.copies.push(CopyRecord {
            dst: dst_path.clone(),
            src: from,
            node: source.id,
        });

        debug!(target: "revfs::txn", txn = %self.id, dst = %dst_path, node = %source.id, "copied node");
        self.flush(edit)
    }

    /// Move `src` to `dst` within the transaction.
    pub fn rename(&mut self, src: &str, dst: &str) -> Result<(), FsError> {
        let src = FsPath::new(src)?;
        let dst = FsPath::new(dst)?;
        if src.is_root() {
            return Err(FsError::IllegalState("cannot move the root directory".into()));
        }
        if src.is_ancestor_or_self(&dst) {
            return Err(FsError::IllegalState(format!(
                "cannot move {} into itself ({})",
                src, dst
            )));
        }
        let mut edit = self.edit()?;

        let (src_parent_path, src_name) = split(&src)?;
        let mut src_parent = mutable_dir(&mut edit, &src_parent_path)?;
        let entry = src_parent
            .entries
            .remove(src_name)
            .ok_or_else(|| FsError::NotFound(src.to_string()))?;
        edit.put_node(src_parent);

        let (dst_parent_path, dst_name) = split(&dst)?;
        let mut dst_parent = mutable_dir(&mut edit, &dst_parent_path)?;
        if dst_parent.entries.contains_key(dst_name) {
            return Err(FsError::AlreadyExists(dst.to_string()));
        }
        dst_parent.entries.insert(dst_name.to_string(), entry);
        edit.put_node(dst_parent);

        let from = move_source(&edit, self.base_rev, &src)?;
        edit.record.changes.record_move(&src, &dst, from.clone());

        let mut carried = Vec::new();
        edit.record.copies.retain(|c| {
            if !src.is_ancestor_or_self(&c.dst) {
                return true;
            }
            if let Some(moved) = c.dst.rebase(&src, &dst).filter(|_| c.dst != src) {
                carried.push(CopyRecord {
                    dst: moved,
                    ..c.clone()
                });
            }
            false
        });
        if let Some(from) = from {
            edit.record.copies.push(CopyRecord {
                dst: dst.clone(),
                src: from,
                node: entry.id,
            });
        }
        edit.record.copies.extend(carried);

        debug!(target: "revfs::txn", txn = %self.id, src = %src, dst = %dst, "moved node");
        self.flush(edit)
    }

    // =========================================================================
    // Transaction properties
    // =========================================================================

    pub fn set_txn_property(&mut self, name: &str, value: &[u8]) -> Result<(), FsError> {
        let mut edit = self.edit()?;
        edit.record.props.set(name, value);
        self.flush(edit)
    }

    pub fn remove_txn_property(&mut self, name: &str) -> Result<(), FsError> {
        let mut edit = self.edit()?;
        edit.record.props.remove(name);
        self.flush(edit)
    }

    // =========================================================================
    // Commit and abort
    // =========================================================================

    /// Publish the transaction as the next revision.
    ///
    /// # Errors
    ///
    /// - `Conflict` if a revision committed after the base touched an
    ///   overlapping path or changed the tree incompatibly
    /// - `IllegalState` if the transaction is not open
    ///
    /// On any error the transaction stays open and no revision is created.
    pub fn commit(&mut self) -> Result<Revnum, FsError> {
        self.ensure_open()?;
        let backend = self.backend;
        let store = self.store();
        let _guard = backend.write_lock()?;

        let record = self.load_record()?;
        let youngest = store.youngest()?;
        let mut edit = TxnEdit::new(store, record);
        edit.mutable_root()?;

        if youngest != self.base_rev {
            let mut rev = self.base_rev.next();
            while rev <= youngest {
                let intervening = store.revision(rev)?;
                if let Some(path) = edit.record.changes.first_conflict(&intervening.changes) {
                    warn!(target: "revfs::txn", txn = %self.id, rev = %rev, path = %path, "commit conflict");
                    return Err(FsError::Conflict(path.to_string()));
                }
                rev = rev.next();
            }

            let ancestor = store.revision(self.base_rev)?.root;
            let target = store.revision(youngest)?.root;
            if let Err(e) = merge_into(&mut edit, ancestor, target) {
                if let FsError::Conflict(path) = &e {
                    warn!(target: "revfs::txn", txn = %self.id, path = %path, "merge conflict");
                }
                return Err(e);
            }
        }

        let new_rev = youngest.next();
        let batch = commit_batch(&edit, new_rev)?;
        backend.write_batch(batch)?;

        self.state = TxnState::Committed(new_rev);
        info!(target: "revfs::txn", txn = %self.id, rev = %new_rev, "committed transaction");
        Ok(new_rev)
    }

    /// Discard the transaction and everything it owns.
    ///
    /// Aborting twice is fine; aborting a committed transaction is not.
    pub fn abort(&mut self) -> Result<(), FsError> {
        match self.state {
            TxnState::Aborted => return Ok(()),
            TxnState::Committed(_) => return self.ensure_open(),
            TxnState::Open => {}
        }
        purge(self.backend, self.id)?;
        self.state = TxnState::Aborted;
        info!(target: "revfs::txn", txn = %self.id, "aborted transaction");
        Ok(())
    }
}

/// Split a non-root path into its parent and final name.
fn split(path: &FsPath) -> Result<(FsPath, &str), FsError> {
    match (path.parent(), path.basename()) {
        (Some(parent), Some(name)) => Ok((parent, name)),
        _ => Err(FsError::IllegalState("cannot replace the root directory".into())),
    }
}

/// Where the node at `path` came from, for recording a move of it.
///
/// The nearest ancestor-or-self created in this transaction decides: a copy
/// carries its source down to `path`, a plain creation has none. Paths not
/// created here come from the base revision.
fn move_source(edit: &TxnEdit<'_>, base_rev: Revnum, path: &FsPath) -> Result<Option<CopySource>, FsError> {
    let mut at = Some(path.clone());
    while let Some(current) = at {
        if let Some(change) = edit.record.changes.get(&current) {
            if matches!(change.kind, ChangeKind::Add | ChangeKind::Replace) {
                return Ok(change.copy_from.as_ref().and_then(|from| {
                    Some(CopySource {
                        rev: from.rev,
                        path: path.rebase(&current, &from.path)?,
                    })
                }));
            }
        }
        at = current.parent();
    }

    let store = edit.store();
    let base_root = RevisionRoot::new(store, base_rev, store.revision(base_rev)?);
    Ok(base_root.lookup(path)?.map(|_| CopySource {
        rev: base_rev,
        path: path.clone(),
    }))
}

fn mutable_dir(edit: &mut TxnEdit<'_>, path: &FsPath) -> Result<NodeRevision, FsError> {
    let node = edit.make_mutable(path)?;
    if !node.is_dir() {
        return Err(FsError::NotDirectory(path.to_string()));
    }
    Ok(node)
}

/// Build the batch that publishes `edit` as revision `rev`.
///
/// Only node-revisions and representations reachable from the transaction
/// root are promoted; the rest are dropped with the transaction.
fn commit_batch(edit: &TxnEdit<'_>, rev: Revnum) -> Result<WriteBatch, FsError> {
    let txn = edit.txn_id();
    let store = edit.store();
    let mut batch = WriteBatch::new();
    let mut promoted_reps = BTreeSet::new();

    let mut stack = vec![edit.record.root];
    while let Some(id) = stack.pop() {
        let node = edit.read_node(&id)?;
        for key in node.data_rep.iter().chain(node.prop_rep.iter()) {
            if key.is_owned_by(txn) && promoted_reps.insert(*key) {
                batch.put(store::rep_key(key, None), edit.read_rep(key)?);
            }
        }
        stack.extend(
            node.entries
                .values()
                .map(|e| e.id)
                .filter(|child| edit.owns(child)),
        );
        put_json(&mut batch, store::node_key(&id, None), &node)?;
    }

    let revision = RevisionRecord {
        root: edit.record.root,
        txn,
        changes: edit.record.changes.clone(),
        copies: edit.record.copies.clone(),
    };
    put_json(&mut batch, store::rev_key(rev), &revision)?;

    let mut props = edit.record.props.clone();
    props.set(PROP_REVISION_DATE, UtcTimestamp::now().to_string());
    put_json(&mut batch, store::revprops_key(rev), &props)?;
    put_json(&mut batch, store::YOUNGEST_KEY, &rev)?;

    for key in txn_keys(store.backend(), txn)? {
        batch.delete(key);
    }
    Ok(batch)
}

fn txn_keys(backend: &dyn StorageBackend, txn: TxnId) -> Result<Vec<String>, FsError> {
    let mut keys = backend.list(&store::txn_nodes_prefix(txn))?;
    keys.extend(backend.list(&store::txn_reps_prefix(txn))?);
    keys.push(store::txn_key(txn));
    Ok(keys)
}

/// Delete every record of transaction `txn` in one batch.
pub(crate) fn purge(backend: &dyn StorageBackend, txn: TxnId) -> Result<(), FsError> {
    let mut batch = WriteBatch::new();
    for key in txn_keys(backend, txn)? {
        batch.delete(key);
    }
    backend.write_batch(batch)?;
    Ok(())
}
