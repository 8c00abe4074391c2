//! fs::store
//!
//! Typed access to engine records in a [`StorageBackend`].
//!
//! # Keys
//!
//! | Key | Value |
//! |-----|-------|
//! | `format` | format number |
//! | `next-ids` | [`NextIds`] |
//! | `youngest` | youngest revision number |
//! | `revs/<rev>` | [`RevisionRecord`] |
//! | `revprops/<rev>` | revision [`PropList`] |
//! | `nodes/<id>` | committed [`NodeRevision`] |
//! | `reps/<key>` | committed representation bytes |
//! | `txns/<txn>` | [`TxnRecord`] |
//! | `txn-nodes/<txn>/<id>` | node-revision owned by an open transaction |
//! | `txn-reps/<txn>/<key>` | representation owned by an open transaction |
//!
//! Everything except representations is JSON. A record that exists but does
//! not decode is corruption.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::changes::{ChangeTable, CopyRecord};
use super::node::NodeRevision;
use super::props::PropList;
use super::FsError;
use crate::backend::{StorageBackend, WriteBatch};
use crate::core::types::{CopyId, NodeId, NodeRevId, RepKey, Revnum, TxnId, UtcTimestamp};

pub(crate) const FORMAT_KEY: &str = "format";
pub(crate) const NEXT_IDS_KEY: &str = "next-ids";
pub(crate) const YOUNGEST_KEY: &str = "youngest";

pub(crate) fn rev_key(rev: Revnum) -> String {
    format!("revs/{}", rev)
}

pub(crate) fn revprops_key(rev: Revnum) -> String {
    format!("revprops/{}", rev)
}

pub(crate) fn txn_key(txn: TxnId) -> String {
    format!("txns/{}", txn)
}

pub(crate) fn txn_nodes_prefix(txn: TxnId) -> String {
    format!("txn-nodes/{}/", txn)
}

pub(crate) fn txn_reps_prefix(txn: TxnId) -> String {
    format!("txn-reps/{}/", txn)
}

/// Key of a node-revision as seen from `owner` (an open transaction).
pub(crate) fn node_key(id: &NodeRevId, owner: Option<TxnId>) -> String {
    match owner {
        Some(txn) if id.is_owned_by(txn) => format!("{}{}", txn_nodes_prefix(txn), id),
        _ => format!("nodes/{}", id),
    }
}

/// Key of a representation as seen from `owner`.
pub(crate) fn rep_key(key: &RepKey, owner: Option<TxnId>) -> String {
    match owner {
        Some(txn) if key.is_owned_by(txn) => format!("{}{}", txn_reps_prefix(txn), key),
        _ => format!("reps/{}", key),
    }
}

/// Next unallocated id of each kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct NextIds {
    pub node: u64,
    pub copy: u64,
    pub txn: u64,
}

impl NextIds {
    /// Counters after revision 0, which uses id 0 of each kind.
    pub fn initial() -> Self {
        Self {
            node: 1,
            copy: 1,
            txn: 1,
        }
    }
}

/// A committed revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionRecord {
    pub root: NodeRevId,
    /// Transaction that produced this revision.
    pub txn: TxnId,
    #[serde(default)]
    pub changes: ChangeTable,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub copies: Vec<CopyRecord>,
}

/// A persisted open transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxnRecord {
    pub id: TxnId,
    pub base_rev: Revnum,
    pub root: NodeRevId,
    pub created_at: UtcTimestamp,
    #[serde(default)]
    pub props: PropList,
    #[serde(default)]
    pub changes: ChangeTable,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub copies: Vec<CopyRecord>,
    /// Next representation sequence number.
    pub next_rep: u64,
}

/// Typed view of a backend.
#[derive(Clone, Copy)]
pub(crate) struct Store<'a> {
    backend: &'a dyn StorageBackend,
}

impl<'a> Store<'a> {
    pub fn new(backend: &'a dyn StorageBackend) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &'a dyn StorageBackend {
        self.backend
    }

    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, FsError> {
        match self.backend.get(key)? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| FsError::corruption(format!("record '{}' does not decode: {}", key, e))),
            None => Ok(None),
        }
    }

    fn require_json<T: DeserializeOwned>(&self, key: &str) -> Result<T, FsError> {
        self.get_json(key)?
            .ok_or_else(|| FsError::corruption(format!("record '{}' is missing", key)))
    }

    pub fn format(&self) -> Result<Option<u32>, FsError> {
        self.get_json(FORMAT_KEY)
    }

    pub fn youngest(&self) -> Result<Revnum, FsError> {
        self.get_json(YOUNGEST_KEY)?
            .ok_or_else(|| FsError::IllegalState("repository has not been created".into()))
    }

    pub fn revision(&self, rev: Revnum) -> Result<RevisionRecord, FsError> {
        self.require_json(&rev_key(rev))
    }

    pub fn revprops(&self, rev: Revnum) -> Result<PropList, FsError> {
        Ok(self.get_json(&revprops_key(rev))?.unwrap_or_default())
    }

    pub fn txn(&self, txn: TxnId) -> Result<Option<TxnRecord>, FsError> {
        self.get_json(&txn_key(txn))
    }

    pub fn node(&self, id: &NodeRevId, owner: Option<TxnId>) -> Result<NodeRevision, FsError> {
        let node: NodeRevision = self.require_json(&node_key(id, owner))?;
        if node.id != *id {
            return Err(FsError::corruption(format!(
                "node-revision record {} holds id {}",
                id, node.id
            )));
        }
        Ok(node)
    }

    pub fn rep(&self, key: &RepKey, owner: Option<TxnId>) -> Result<Vec<u8>, FsError> {
        let record_key = rep_key(key, owner);
        self.backend
            .get(&record_key)?
            .ok_or_else(|| FsError::corruption(format!("representation '{}' is missing", record_key)))
    }

    pub fn proplist(&self, key: Option<&RepKey>, owner: Option<TxnId>) -> Result<PropList, FsError> {
        match key {
            Some(key) => {
                let bytes = self.rep(key, owner)?;
                serde_json::from_slice(&bytes)
                    .map_err(|e| FsError::corruption(format!("property list {} does not decode: {}", key, e)))
            }
            None => Ok(PropList::new()),
        }
    }

    /// Ids of every open transaction, ascending.
    pub fn txn_ids(&self) -> Result<Vec<TxnId>, FsError> {
        let mut ids = self
            .backend
            .list("txns/")?
            .iter()
            .map(|key| {
                key.trim_start_matches("txns/")
                    .parse::<TxnId>()
                    .map_err(|_| FsError::corruption(format!("bad transaction key '{}'", key)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        ids.sort();
        Ok(ids)
    }

    /// Allocate ids under the backend write lock.
    ///
    /// Allocated ids are never handed out again, even if the caller fails.
    pub fn allocate(&self, nodes: u64, copies: u64, txns: u64) -> Result<NextIds, FsError> {
        let _guard = self.backend.write_lock()?;
        self.allocate_locked(nodes, copies, txns)
    }

    /// [`Store::allocate`] for callers already holding the write lock.
    pub fn allocate_locked(&self, nodes: u64, copies: u64, txns: u64) -> Result<NextIds, FsError> {
        let current: NextIds = self.require_json(NEXT_IDS_KEY)?;
        let next = NextIds {
            node: current.node + nodes,
            copy: current.copy + copies,
            txn: current.txn + txns,
        };
        let mut batch = WriteBatch::new();
        put_json(&mut batch, NEXT_IDS_KEY, &next)?;
        self.backend.write_batch(batch)?;
        Ok(current)
    }

    pub fn allocate_node_id(&self) -> Result<NodeId, FsError> {
        Ok(NodeId::new(self.allocate(1, 0, 0)?.node))
    }

    pub fn allocate_copy_id(&self) -> Result<CopyId, FsError> {
        Ok(CopyId::new(self.allocate(0, 1, 0)?.copy))
    }

    pub fn allocate_txn_id(&self) -> Result<TxnId, FsError> {
        Ok(TxnId::new(self.allocate(0, 0, 1)?.txn))
    }
}

/// Queue a JSON record write.
pub(crate) fn put_json<T: Serialize>(batch: &mut WriteBatch, key: impl Into<String>, value: &T) -> Result<(), FsError> {
    let key = key.into();
    let bytes = serde_json::to_vec(value)
        .map_err(|e| FsError::corruption(format!("record '{}' does not encode: {}", key, e)))?;
    batch.put(key, bytes);
    Ok(())
}
