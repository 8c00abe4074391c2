//! fs::root
//!
//! Read-only views of a tree: a committed revision or an open transaction.
//!
//! # Architecture
//!
//! [`FsRoot`] needs four primitives from an implementor (root id, node and
//! representation loading, the copy table) and provides every path query on
//! top of them. [`RevisionRoot`] reads only committed records.
//! [`TxnRoot`] reads the transaction's own records first and falls through
//! to committed ones for everything it shares.
//!
//! # Example
//!
//! ```
//! use revfs::fs::{FsRoot, Repository};
//! use revfs::core::types::Revnum;
//!
//! let repo = Repository::create_in_memory().unwrap();
//! let root = repo.revision_root(Revnum::ZERO).unwrap();
//! assert!(root.is_dir("/").unwrap());
//! assert!(root.dir_entries("/").unwrap().is_empty());
//! ```

use std::collections::BTreeMap;

use super::changes::{CopyRecord, CopySource};
use super::node::{checksum, DirEntry, NodeKind, NodeRevision};
use super::props::{PropList, SystemProps};
use super::store::{RevisionRecord, Store};
use super::FsError;
use crate::core::types::{FsPath, NodeRevId, RepKey, Revnum, TxnId};

/// One step of a node's history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub id: NodeRevId,
    pub created_path: FsPath,
}

/// Read queries over one tree.
pub trait FsRoot {
    /// Id of the root directory.
    fn root_node_id(&self) -> NodeRevId;

    /// Load a node-revision reachable from this root.
    fn read_node(&self, id: &NodeRevId) -> Result<NodeRevision, FsError>;

    /// Load a representation reachable from this root.
    fn read_rep(&self, key: &RepKey) -> Result<Vec<u8>, FsError>;

    /// Copies made by the change this root belongs to.
    fn copy_records(&self) -> Result<Vec<CopyRecord>, FsError>;

    /// Walk to `path`. `Ok(None)` if any component is missing or a file.
    fn lookup(&self, path: &FsPath) -> Result<Option<NodeRevision>, FsError> {
        let mut node = self.read_node(&self.root_node_id())?;
        for name in path.components() {
            if !node.is_dir() {
                return Ok(None);
            }
            let Some(entry) = node.entries.get(name) else {
                return Ok(None);
            };
            let child = self.read_node(&entry.id)?;
            if child.kind != entry.kind {
                return Err(FsError::corruption(format!(
                    "entry '{}' says {} but node {} is a {}",
                    name, entry.kind, child.id, child.kind
                )));
            }
            node = child;
        }
        Ok(Some(node))
    }

    /// The node at `path`, or `NotFound`.
    fn node_at(&self, path: &str) -> Result<NodeRevision, FsError> {
        let path = FsPath::new(path)?;
        self.lookup(&path)?
            .ok_or_else(|| FsError::NotFound(path.to_string()))
    }

    /// Kind of the node at `path`, `None` if nothing is there.
    fn check_path(&self, path: &str) -> Result<Option<NodeKind>, FsError> {
        Ok(self.lookup(&FsPath::new(path)?)?.map(|n| n.kind))
    }

    fn is_dir(&self, path: &str) -> Result<bool, FsError> {
        Ok(self.check_path(path)? == Some(NodeKind::Dir))
    }

    fn is_file(&self, path: &str) -> Result<bool, FsError> {
        Ok(self.check_path(path)? == Some(NodeKind::File))
    }

    /// Entries of the directory at `path`, in byte order of name.
    fn dir_entries(&self, path: &str) -> Result<BTreeMap<String, DirEntry>, FsError> {
        let node = self.node_at(path)?;
        if !node.is_dir() {
            return Err(FsError::NotDirectory(path.to_string()));
        }
        Ok(node.entries)
    }

    fn file_length(&self, path: &str) -> Result<u64, FsError> {
        Ok(file_node(self, path)?.size)
    }

    /// Full contents of the file at `path`, verified against its checksum.
    fn file_contents(&self, path: &str) -> Result<Vec<u8>, FsError> {
        let node = file_node(self, path)?;
        let bytes = match &node.data_rep {
            Some(key) => self.read_rep(key)?,
            None => Vec::new(),
        };
        if let Some(expected) = &node.checksum {
            let actual = checksum(&bytes);
            if &actual != expected {
                return Err(FsError::corruption(format!(
                    "checksum mismatch for {} (node {}): expected {}, got {}",
                    path, node.id, expected, actual
                )));
            }
        }
        if bytes.len() as u64 != node.size {
            return Err(FsError::corruption(format!(
                "length mismatch for {} (node {}): recorded {}, stored {}",
                path,
                node.id,
                node.size,
                bytes.len()
            )));
        }
        Ok(bytes)
    }

    /// Hex SHA-256 of the file at `path`.
    fn file_checksum(&self, path: &str) -> Result<Option<String>, FsError> {
        Ok(file_node(self, path)?.checksum)
    }

    fn node_rev_id(&self, path: &str) -> Result<NodeRevId, FsError> {
        Ok(self.node_at(path)?.id)
    }

    fn node_proplist(&self, path: &str) -> Result<PropList, FsError> {
        let node = self.node_at(path)?;
        match &node.prop_rep {
            Some(key) => {
                let bytes = self.read_rep(key)?;
                serde_json::from_slice(&bytes).map_err(|e| {
                    FsError::corruption(format!("property list {} does not decode: {}", key, e))
                })
            }
            None => Ok(PropList::new()),
        }
    }

    fn node_property(&self, path: &str, name: &str) -> Result<Option<Vec<u8>>, FsError> {
        Ok(self.node_proplist(path)?.get(name).map(<[u8]>::to_vec))
    }

    /// Reserved properties of the node at `path`, without loading its list.
    fn system_props(&self, path: &str) -> Result<SystemProps, FsError> {
        Ok(self.node_at(path)?.system_props)
    }

    fn node_created_path(&self, path: &str) -> Result<FsPath, FsError> {
        Ok(self.node_at(path)?.created_path)
    }

    /// The node at `path` and its predecessors, newest first.
    fn node_history(&self, path: &str) -> Result<Vec<HistoryEntry>, FsError> {
        let mut node = self.node_at(path)?;
        let mut history = vec![HistoryEntry {
            id: node.id,
            created_path: node.created_path.clone(),
        }];
        while let Some(pred) = node.predecessor {
            node = self.read_node(&pred)?;
            history.push(HistoryEntry {
                id: node.id,
                created_path: node.created_path.clone(),
            });
        }
        Ok(history)
    }

    /// Copy source of `path`, if this root's change copied it there.
    fn copied_from(&self, path: &str) -> Result<Option<CopySource>, FsError> {
        let path = FsPath::new(path)?;
        Ok(self
            .copy_records()?
            .into_iter()
            .rev()
            .find(|c| c.dst == path)
            .map(|c| c.src))
    }
}

fn file_node<R: FsRoot + ?Sized>(root: &R, path: &str) -> Result<NodeRevision, FsError> {
    let node = root.node_at(path)?;
    if !node.is_file() {
        return Err(FsError::NotFile(path.to_string()));
    }
    Ok(node)
}

/// The tree of a committed revision.
pub struct RevisionRoot<'r> {
    store: Store<'r>,
    rev: Revnum,
    record: RevisionRecord,
}

impl<'r> RevisionRoot<'r> {
    pub(crate) fn new(store: Store<'r>, rev: Revnum, record: RevisionRecord) -> Self {
        Self { store, rev, record }
    }

    pub fn revision(&self) -> Revnum {
        self.rev
    }

    pub fn record(&self) -> &RevisionRecord {
        &self.record
    }
}

impl FsRoot for RevisionRoot<'_> {
    fn root_node_id(&self) -> NodeRevId {
        self.record.root
    }

    fn read_node(&self, id: &NodeRevId) -> Result<NodeRevision, FsError> {
        self.store.node(id, None)
    }

    fn read_rep(&self, key: &RepKey) -> Result<Vec<u8>, FsError> {
        self.store.rep(key, None)
    }

    fn copy_records(&self) -> Result<Vec<CopyRecord>, FsError> {
        Ok(self.record.copies.clone())
    }
}

/// The tree of an open transaction, as last persisted.
pub struct TxnRoot<'r> {
    store: Store<'r>,
    txn: TxnId,
    root: NodeRevId,
    copies: Vec<CopyRecord>,
}

impl<'r> TxnRoot<'r> {
    pub(crate) fn new(store: Store<'r>, txn: TxnId, root: NodeRevId, copies: Vec<CopyRecord>) -> Self {
        Self {
            store,
            txn,
            root,
            copies,
        }
    }

    pub fn txn_id(&self) -> TxnId {
        self.txn
    }
}

impl FsRoot for TxnRoot<'_> {
    fn root_node_id(&self) -> NodeRevId {
        self.root
    }

    fn read_node(&self, id: &NodeRevId) -> Result<NodeRevision, FsError> {
        self.store.node(id, Some(self.txn))
    }

    fn read_rep(&self, key: &RepKey) -> Result<Vec<u8>, FsError> {
        self.store.rep(key, Some(self.txn))
    }

    fn copy_records(&self) -> Result<Vec<CopyRecord>, FsError> {
        Ok(self.copies.clone())
    }
}
