//! fs
//!
//! The versioned filesystem engine.
//!
//! # Modules
//!
//! - [`repo`] - Repository lifecycle and the revision store
//! - [`txn`] - Transactions and the commit protocol
//! - [`root`] - Read queries over revision and transaction trees
//! - [`node`] - Node-revision records
//! - [`props`] - Property lists and reserved properties
//! - [`changes`] - Changed-path and copy tables
//! - [`dump`] - Tree rendering for inspection
//!
//! Copy-on-write editing, the commit merge and record access are internal.
//!
//! # Model
//!
//! Revisions are immutable snapshots numbered from 0. A transaction starts
//! from one revision, edits a private copy-on-write tree, and either becomes
//! the next revision at commit or is discarded. Unchanged subtrees are
//! shared by id between every revision and transaction that reaches them.

pub mod changes;
pub mod dump;
mod error;
mod merge;
pub mod node;
pub mod props;
pub mod repo;
pub mod root;
mod store;
mod tree;
pub mod txn;

pub use changes::{ChangeKind, ChangeTable, CopyRecord, CopySource, PathChange};
pub use dump::{render_block, render_tree};
pub use error::FsError;
pub use node::{DirEntry, NodeKind, NodeRevision};
pub use props::{PropList, SystemProps};
pub use repo::{Repository, FORMAT};
pub use root::{FsRoot, HistoryEntry, RevisionRoot, TxnRoot};
pub use store::{RevisionRecord, TxnRecord};
pub use txn::{Transaction, TxnState};
