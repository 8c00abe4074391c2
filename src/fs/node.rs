//! fs::node
//!
//! Node-revision records.
//!
//! # Model
//!
//! A node-revision is one immutable version of a file or directory. Its id
//! is `node.copy.txn`: the persistent node identity, the copy lineage it
//! belongs to, and the transaction that created it. Directories map entry
//! names to child ids; files point at a content representation.
//!
//! Records are shared, never deep-copied. A child reachable from two trees
//! is the same record in both.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::props::SystemProps;
use crate::core::types::{FsPath, NodeRevId, RepKey};

/// File or directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    File,
    Dir,
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeKind::File => write!(f, "file"),
            NodeKind::Dir => write!(f, "dir"),
        }
    }
}

/// One directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub kind: NodeKind,
    pub id: NodeRevId,
}

/// An immutable node-revision.
///
/// Records owned by an open transaction may still be rewritten by that
/// transaction; committed records never change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRevision {
    pub id: NodeRevId,
    pub kind: NodeKind,

    /// Directory entries, by exact name. Empty for files.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub entries: BTreeMap<String, DirEntry>,

    /// The node-revision this one supersedes.
    pub predecessor: Option<NodeRevId>,

    /// Length of the predecessor chain.
    pub predecessor_count: u64,

    /// Path at which this node-revision was created.
    pub created_path: FsPath,

    /// Representation holding the property list, if any properties are set.
    pub prop_rep: Option<RepKey>,

    /// Cached reserved properties.
    #[serde(default, skip_serializing_if = "SystemProps::is_empty")]
    pub system_props: SystemProps,

    /// Representation holding file contents. `None` for empty files and
    /// directories.
    pub data_rep: Option<RepKey>,

    /// File length in bytes.
    #[serde(default)]
    pub size: u64,

    /// Lowercase hex SHA-256 of the file contents.
    pub checksum: Option<String>,
}

impl NodeRevision {
    /// A fresh, empty directory.
    pub fn new_dir(id: NodeRevId, created_path: FsPath) -> Self {
        Self::fresh(id, NodeKind::Dir, created_path)
    }

    /// A fresh, empty file.
    pub fn new_file(id: NodeRevId, created_path: FsPath) -> Self {
        let mut node = Self::fresh(id, NodeKind::File, created_path);
        node.checksum = Some(checksum(&[]));
        node
    }

    fn fresh(id: NodeRevId, kind: NodeKind, created_path: FsPath) -> Self {
        Self {
            id,
            kind,
            entries: BTreeMap::new(),
            predecessor: None,
            predecessor_count: 0,
            created_path,
            prop_rep: None,
            system_props: SystemProps::default(),
            data_rep: None,
            size: 0,
            checksum: None,
        }
    }

    /// A successor of this node-revision with a new id.
    ///
    /// Entries, properties and contents are shared by reference.
    pub fn successor(&self, id: NodeRevId, created_path: FsPath) -> Self {
        Self {
            id,
            predecessor: Some(self.id),
            predecessor_count: self.predecessor_count + 1,
            created_path,
            ..self.clone()
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == NodeKind::Dir
    }

    pub fn is_file(&self) -> bool {
        self.kind == NodeKind::File
    }
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn checksum(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{CopyId, NodeId, TxnId};

    fn id(n: u64, c: u64, t: u64) -> NodeRevId {
        NodeRevId::new(NodeId::new(n), CopyId::new(c), TxnId::new(t))
    }

    #[test]
    fn new_file_has_empty_checksum() {
        let node = NodeRevision::new_file(id(1, 0, 1), FsPath::new("/a").unwrap());
        assert!(node.is_file());
        assert_eq!(node.size, 0);
        assert_eq!(
            node.checksum.as_deref(),
            Some("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855")
        );
    }

    #[test]
    fn successor_links_predecessor_and_shares_entries() {
        let mut dir = NodeRevision::new_dir(id(0, 0, 0), FsPath::root());
        dir.entries.insert(
            "a".into(),
            DirEntry {
                kind: NodeKind::File,
                id: id(1, 0, 1),
            },
        );

        let next = dir.successor(id(0, 0, 2), FsPath::root());
        assert_eq!(next.predecessor, Some(id(0, 0, 0)));
        assert_eq!(next.predecessor_count, 1);
        assert_eq!(next.entries, dir.entries);
        assert_ne!(next.id, dir.id);
    }

    #[test]
    fn record_json_omits_empty_fields() {
        let node = NodeRevision::new_dir(id(0, 0, 0), FsPath::root());
        let json = serde_json::to_string(&node).unwrap();
        assert!(!json.contains("entries"));
        assert!(json.contains("\"id\":\"0.0.0\""));
        let back: NodeRevision = serde_json::from_str(&json).unwrap();
        assert_eq!(back, node);
    }
}
