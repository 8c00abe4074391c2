//! core::ops
//!
//! Repository locking.
//!
//! # Modules
//!
//! - [`lock`] - Shared/exclusive repository lock
//!
//! # Architecture
//!
//! Normal access (reads, transactions, commits):
//! 1. Opening a repository takes the shared lock
//! 2. The lock is held until the repository is closed or dropped
//!
//! Recovery:
//! 1. Takes the exclusive lock, waiting out every open handle
//! 2. Runs backend repair
//! 3. Releases the lock on success or failure

pub mod lock;

pub use lock::{LockError, LockMode, RepoLock};
