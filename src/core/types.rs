//! core::types
//!
//! Strong types for core domain concepts.
//!
//! # Types
//!
//! - [`Revnum`] - Revision number (non-negative, decimal rendering)
//! - [`NodeId`] - Persistent identity of a logical file or directory
//! - [`CopyId`] - Identity of a copy operation (distinguishes lazy copies)
//! - [`TxnId`] - Transaction identifier
//! - [`NodeRevId`] - Opaque identity of one node-revision
//! - [`RepKey`] - Key of a stored representation (contents or property list)
//! - [`FsPath`] - Validated, normalized repository path
//! - [`UtcTimestamp`] - RFC3339 timestamp
//!
//! # Validation
//!
//! These types enforce validity at construction time. Malformed paths and
//! ids cannot be represented, so the engine never normalizes silently.
//!
//! # Examples
//!
//! ```
//! use revfs::core::types::{FsPath, NodeRevId, Revnum};
//!
//! let path = FsPath::new("/trunk/README").unwrap();
//! assert_eq!(path.basename(), Some("README"));
//!
//! let id: NodeRevId = "3.0.7".parse().unwrap();
//! assert_eq!(id.to_string(), "3.0.7");
//!
//! assert_eq!(Revnum::parse("12").unwrap(), Revnum::new(12));
//! assert!(Revnum::parse("-1").is_err());
//! assert!(FsPath::new("/a/../b").is_err());
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from type validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("invalid revision number: {0}")]
    InvalidRevnum(String),

    #[error("invalid id: {0}")]
    InvalidId(String),
}

/// A revision number.
///
/// Revisions are numbered from 0 (the empty repository) and increase by one
/// per commit. They render as plain decimal integers.
///
/// # Example
///
/// ```
/// use revfs::core::types::Revnum;
///
/// let rev = Revnum::new(4);
/// assert_eq!(rev.next(), Revnum::new(5));
/// assert_eq!(rev.to_string(), "4");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revnum(u64);

impl Revnum {
    /// Revision 0, the empty repository state.
    pub const ZERO: Revnum = Revnum(0);

    pub fn new(n: u64) -> Self {
        Self(n)
    }

    /// Parse a decimal revision number.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidRevnum` for negative or non-numeric input.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        let trimmed = s.trim();
        if trimmed.starts_with('-') {
            return Err(TypeError::InvalidRevnum(format!(
                "'{}' is negative",
                trimmed
            )));
        }
        trimmed
            .parse::<u64>()
            .map(Self)
            .map_err(|_| TypeError::InvalidRevnum(format!("'{}' is not a number", trimmed)))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// The revision that follows this one.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Revnum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

macro_rules! counter_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            pub fn new(n: u64) -> Self {
                Self(n)
            }

            pub fn as_u64(&self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = TypeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.parse::<u64>()
                    .map(Self)
                    .map_err(|_| TypeError::InvalidId(format!(
                        "'{}' is not a valid {}",
                        s,
                        stringify!($name)
                    )))
            }
        }
    };
}

counter_id!(
    /// Persistent identity of a logical file or directory.
    ///
    /// A node keeps its `NodeId` across every revision that modifies it.
    /// Creating a file or directory allocates a fresh one.
    NodeId
);

counter_id!(
    /// Identity of a copy operation.
    ///
    /// Node-revisions cloned beneath a copied path carry the copy's id, which
    /// keeps them distinct from clones of the same node at the copy source.
    CopyId
);

counter_id!(
    /// Transaction identifier. Also used as the transaction's name.
    ///
    /// Id 0 is reserved for the transaction that produced revision 0.
    TxnId
);

/// Opaque identity of a single node-revision.
///
/// Rendered as `node.copy.txn`. Ids are equality-comparable only; the
/// derived ordering exists for deterministic map iteration and carries no
/// history meaning.
///
/// # Example
///
/// ```
/// use revfs::core::types::{CopyId, NodeId, NodeRevId, TxnId};
///
/// let id = NodeRevId::new(NodeId::new(2), CopyId::new(0), TxnId::new(9));
/// assert_eq!(id.to_string(), "2.0.9");
/// assert!(id.is_owned_by(TxnId::new(9)));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeRevId {
    node: NodeId,
    copy: CopyId,
    txn: TxnId,
}

impl NodeRevId {
    pub fn new(node: NodeId, copy: CopyId, txn: TxnId) -> Self {
        Self { node, copy, txn }
    }

    /// Root directory of revision 0, `0.0.0`.
    pub fn initial_root() -> Self {
        Self::new(NodeId::new(0), CopyId::new(0), TxnId::new(0))
    }

    pub fn node_id(&self) -> NodeId {
        self.node
    }

    pub fn copy_id(&self) -> CopyId {
        self.copy
    }

    /// The transaction that created this node-revision.
    pub fn txn_id(&self) -> TxnId {
        self.txn
    }

    /// Whether this node-revision was created by (and, while the transaction
    /// is open, is exclusively owned by) `txn`.
    pub fn is_owned_by(&self, txn: TxnId) -> bool {
        self.txn == txn
    }
}

impl fmt::Display for NodeRevId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.node, self.copy, self.txn)
    }
}

impl FromStr for NodeRevId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() != 3 {
            return Err(TypeError::InvalidId(format!(
                "node-revision id '{}' must have three dot-separated parts",
                s
            )));
        }
        Ok(Self {
            node: parts[0].parse()?,
            copy: parts[1].parse()?,
            txn: parts[2].parse()?,
        })
    }
}

impl TryFrom<String> for NodeRevId {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<NodeRevId> for String {
    fn from(id: NodeRevId) -> Self {
        id.to_string()
    }
}

/// Key of a stored representation.
///
/// Representation keys are scoped by the transaction that wrote them, so a
/// transaction can allocate keys without coordinating with anyone else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepKey {
    txn: TxnId,
    seq: u64,
}

impl RepKey {
    pub fn new(txn: TxnId, seq: u64) -> Self {
        Self { txn, seq }
    }

    pub fn txn_id(&self) -> TxnId {
        self.txn
    }

    pub fn is_owned_by(&self, txn: TxnId) -> bool {
        self.txn == txn
    }
}

impl fmt::Display for RepKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.txn, self.seq)
    }
}

impl FromStr for RepKey {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (txn, seq) = s
            .split_once('-')
            .ok_or_else(|| TypeError::InvalidId(format!("representation key '{}'", s)))?;
        let seq = seq
            .parse::<u64>()
            .map_err(|_| TypeError::InvalidId(format!("representation key '{}'", s)))?;
        Ok(Self {
            txn: txn.parse()?,
            seq,
        })
    }
}

impl TryFrom<String> for RepKey {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<RepKey> for String {
    fn from(key: RepKey) -> Self {
        key.to_string()
    }
}

/// A validated repository path.
///
/// Paths are slash-separated sequences of non-empty components. A single
/// leading slash is optional on input; the canonical form always has one.
/// The root is `/`.
///
/// Rejected (never normalized):
/// - The empty string
/// - Empty components (`a//b`) and trailing slashes (`a/`)
/// - `.` and `..` components
/// - NUL characters
///
/// # Example
///
/// ```
/// use revfs::core::types::FsPath;
///
/// let p = FsPath::new("a/b/c").unwrap();
/// assert_eq!(p.as_str(), "/a/b/c");
/// assert_eq!(p.parent().unwrap().as_str(), "/a/b");
/// assert_eq!(p.components().collect::<Vec<_>>(), vec!["a", "b", "c"]);
///
/// assert!(FsPath::root().is_root());
/// assert!(FsPath::new("a//b").is_err());
/// assert!(FsPath::new("a/").is_err());
/// assert!(FsPath::new("./a").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FsPath(String);

impl FsPath {
    /// Create a validated path.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidPath` if the path is malformed.
    pub fn new(path: impl AsRef<str>) -> Result<Self, TypeError> {
        let raw = path.as_ref();
        let invalid = |reason: &str| TypeError::InvalidPath {
            path: raw.to_string(),
            reason: reason.to_string(),
        };

        if raw.is_empty() {
            return Err(invalid("empty path"));
        }
        if raw == "/" {
            return Ok(Self::root());
        }
        if raw.contains('\0') {
            return Err(invalid("contains a NUL character"));
        }

        let body = raw.strip_prefix('/').unwrap_or(raw);
        if body.ends_with('/') {
            return Err(invalid("trailing slash"));
        }
        for component in body.split('/') {
            match component {
                "" => return Err(invalid("empty component")),
                "." | ".." => return Err(invalid("'.' and '..' components are not allowed")),
                _ => {}
            }
        }

        Ok(Self(format!("/{}", body)))
    }

    /// The root path `/`.
    pub fn root() -> Self {
        Self("/".to_string())
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Iterate over the path components, outermost first.
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|c| !c.is_empty())
    }

    /// Number of components (0 for the root).
    pub fn depth(&self) -> usize {
        self.components().count()
    }

    /// The parent path, or `None` for the root.
    pub fn parent(&self) -> Option<FsPath> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(0) => Some(Self::root()),
            Some(idx) => Some(Self(self.0[..idx].to_string())),
            None => None,
        }
    }

    /// The final component, or `None` for the root.
    pub fn basename(&self) -> Option<&str> {
        if self.is_root() {
            return None;
        }
        self.0.rsplit('/').next()
    }

    /// Append a single entry name.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidPath` if `name` is not a valid component.
    pub fn join(&self, name: &str) -> Result<FsPath, TypeError> {
        if name.contains('/') {
            return Err(TypeError::InvalidPath {
                path: name.to_string(),
                reason: "entry names cannot contain '/'".into(),
            });
        }
        if self.is_root() {
            Self::new(name)
        } else {
            Self::new(format!("{}/{}", self.0, name))
        }
    }

    /// Whether `self` is `other` or one of its ancestors.
    ///
    /// # Example
    ///
    /// ```
    /// use revfs::core::types::FsPath;
    ///
    /// let a = FsPath::new("/a").unwrap();
    /// assert!(a.is_ancestor_or_self(&FsPath::new("/a/b").unwrap()));
    /// assert!(a.is_ancestor_or_self(&a));
    /// assert!(!a.is_ancestor_or_self(&FsPath::new("/ab").unwrap()));
    /// ```
    pub fn is_ancestor_or_self(&self, other: &FsPath) -> bool {
        if self.is_root() || self == other {
            return true;
        }
        other
            .0
            .strip_prefix(&self.0)
            .map(|rest| rest.starts_with('/'))
            .unwrap_or(false)
    }

    /// Move `self` from under `from` to the same place under `to`.
    ///
    /// Returns `None` if `from` is not an ancestor of `self`.
    pub fn rebase(&self, from: &FsPath, to: &FsPath) -> Option<FsPath> {
        if !from.is_ancestor_or_self(self) {
            return None;
        }
        let mut path = to.clone();
        for name in self.components().skip(from.depth()) {
            path = path.join(name).ok()?;
        }
        Some(path)
    }
}

impl TryFrom<String> for FsPath {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<FsPath> for String {
    fn from(path: FsPath) -> Self {
        path.0
    }
}

impl AsRef<str> for FsPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A UTC timestamp, rendered as RFC3339.
///
/// # Example
///
/// ```
/// use revfs::core::types::UtcTimestamp;
///
/// let now = UtcTimestamp::now();
/// println!("Current time: {}", now);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtcTimestamp(chrono::DateTime<chrono::Utc>);

impl UtcTimestamp {
    /// Create a timestamp for the current moment.
    pub fn now() -> Self {
        Self(chrono::Utc::now())
    }

    /// Create a timestamp from a chrono DateTime.
    pub fn from_datetime(dt: chrono::DateTime<chrono::Utc>) -> Self {
        Self(dt)
    }

    /// Get the underlying datetime.
    pub fn as_datetime(&self) -> &chrono::DateTime<chrono::Utc> {
        &self.0
    }
}

impl fmt::Display for UtcTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod revnum {
        use super::*;

        #[test]
        fn parse_accepts_decimal() {
            assert_eq!(Revnum::parse("0").unwrap(), Revnum::ZERO);
            assert_eq!(Revnum::parse(" 42 ").unwrap(), Revnum::new(42));
        }

        #[test]
        fn parse_rejects_negative_and_garbage() {
            assert!(matches!(
                Revnum::parse("-3"),
                Err(TypeError::InvalidRevnum(_))
            ));
            assert!(Revnum::parse("HEAD").is_err());
            assert!(Revnum::parse("").is_err());
        }

        #[test]
        fn serializes_as_plain_number() {
            let json = serde_json::to_string(&Revnum::new(7)).unwrap();
            assert_eq!(json, "7");
        }
    }

    mod node_rev_id {
        use super::*;

        #[test]
        fn parse_and_display() {
            let id: NodeRevId = "10.2.33".parse().unwrap();
            assert_eq!(id.node_id(), NodeId::new(10));
            assert_eq!(id.copy_id(), CopyId::new(2));
            assert_eq!(id.txn_id(), TxnId::new(33));
            assert_eq!(id.to_string(), "10.2.33");
        }

        #[test]
        fn rejects_malformed() {
            assert!("1.2".parse::<NodeRevId>().is_err());
            assert!("1.2.3.4".parse::<NodeRevId>().is_err());
            assert!("a.b.c".parse::<NodeRevId>().is_err());
        }

        #[test]
        fn serializes_as_string() {
            let id = NodeRevId::new(NodeId::new(1), CopyId::new(0), TxnId::new(4));
            let json = serde_json::to_string(&id).unwrap();
            assert_eq!(json, "\"1.0.4\"");
            let back: NodeRevId = serde_json::from_str(&json).unwrap();
            assert_eq!(back, id);
        }

        #[test]
        fn ownership_follows_txn() {
            let id = NodeRevId::new(NodeId::new(1), CopyId::new(0), TxnId::new(4));
            assert!(id.is_owned_by(TxnId::new(4)));
            assert!(!id.is_owned_by(TxnId::new(5)));
        }
    }

    mod rep_key {
        use super::*;

        #[test]
        fn parse_and_display() {
            let key: RepKey = "12-3".parse().unwrap();
            assert_eq!(key.txn_id(), TxnId::new(12));
            assert_eq!(key.to_string(), "12-3");
            assert!("12".parse::<RepKey>().is_err());
        }
    }

    mod fs_path {
        use super::*;

        #[test]
        fn canonicalizes_leading_slash() {
            assert_eq!(FsPath::new("a/b").unwrap(), FsPath::new("/a/b").unwrap());
            assert_eq!(FsPath::new("/").unwrap(), FsPath::root());
        }

        #[test]
        fn rejects_malformed_paths() {
            for bad in ["", "a//b", "/a/", "//a", ".", "a/./b", "a/..", "..", "a\0b"] {
                assert!(FsPath::new(bad).is_err(), "{:?} should be rejected", bad);
            }
        }

        #[test]
        fn parent_and_basename() {
            let p = FsPath::new("/a").unwrap();
            assert_eq!(p.parent(), Some(FsPath::root()));
            assert_eq!(p.basename(), Some("a"));
            assert_eq!(FsPath::root().parent(), None);
            assert_eq!(FsPath::root().basename(), None);
        }

        #[test]
        fn empty_path_is_not_root() {
            let err = FsPath::new("").unwrap_err();
            assert!(matches!(err, TypeError::InvalidPath { ref reason, .. } if reason == "empty path"));
            assert!(FsPath::root().join("").is_err());
        }

        #[test]
        fn rebase_moves_descendants() {
            let from = FsPath::new("/b").unwrap();
            let to = FsPath::new("/x/c").unwrap();
            assert_eq!(
                FsPath::new("/b/k/f").unwrap().rebase(&from, &to),
                Some(FsPath::new("/x/c/k/f").unwrap())
            );
            assert_eq!(from.rebase(&from, &to), Some(to.clone()));
            assert_eq!(FsPath::new("/bb").unwrap().rebase(&from, &to), None);
        }

        #[test]
        fn join_builds_child_paths() {
            let root = FsPath::root();
            let a = root.join("a").unwrap();
            assert_eq!(a.as_str(), "/a");
            assert_eq!(a.join("b.txt").unwrap().as_str(), "/a/b.txt");
            assert!(a.join("x/y").is_err());
            assert!(a.join("..").is_err());
        }

        #[test]
        fn ancestry_respects_component_boundaries() {
            let a = FsPath::new("/a").unwrap();
            assert!(FsPath::root().is_ancestor_or_self(&a));
            assert!(a.is_ancestor_or_self(&FsPath::new("/a/b/c").unwrap()));
            assert!(!a.is_ancestor_or_self(&FsPath::new("/abc").unwrap()));
            assert!(!FsPath::new("/a/b").unwrap().is_ancestor_or_self(&a));
        }

        #[test]
        fn depth_counts_components() {
            assert_eq!(FsPath::root().depth(), 0);
            assert_eq!(FsPath::new("/x/y").unwrap().depth(), 2);
        }

        #[test]
        fn names_are_case_sensitive() {
            assert_ne!(FsPath::new("/A").unwrap(), FsPath::new("/a").unwrap());
        }
    }
}
