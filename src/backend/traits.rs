//! backend::traits
//!
//! Storage backend trait definition.
//!
//! # Design
//!
//! The `StorageBackend` trait is the only persistence primitive the engine
//! uses: a durable, key-addressed record store. Keys are slash-separated
//! ASCII names (`nodes/3.0.7`, `txns/12`); values are opaque bytes.
//!
//! Implementations MUST:
//! - Apply a [`WriteBatch`] all-or-nothing, as seen by any later reader
//! - Serialize holders of [`StorageBackend::write_lock`] across every handle
//!   on the same storage, in this process or any other
//! - Be thread-safe (Send + Sync)
//!
//! Errors are returned, never retried here; a failed batch may be retried by
//! the caller because nothing from it is visible.
//!
//! # Example
//!
//! ```
//! use revfs::backend::{MemoryBackend, StorageBackend, WriteBatch};
//!
//! let backend = MemoryBackend::new();
//! let mut batch = WriteBatch::new();
//! batch.put("a/1", b"one".to_vec());
//! batch.put("a/2", b"two".to_vec());
//! backend.write_batch(batch).unwrap();
//!
//! assert_eq!(backend.get("a/1").unwrap(), Some(b"one".to_vec()));
//! assert_eq!(backend.list("a/").unwrap(), vec!["a/1", "a/2"]);
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::journal::JournalError;
use crate::core::ops::LockError;

/// Errors from storage backend operations.
#[derive(Debug, Error)]
pub enum BackendError {
    /// I/O failure reading or writing a record.
    #[error("backend i/o error on '{key}': {source}")]
    Io {
        key: String,
        source: std::io::Error,
    },

    /// The write-ahead journal could not be written or read.
    #[error("backend journal error: {0}")]
    Journal(#[from] JournalError),

    /// The write lock could not be taken.
    #[error("backend lock error: {0}")]
    Lock(#[from] LockError),

    /// Key is not a valid record name.
    #[error("invalid backend key '{0}'")]
    InvalidKey(String),

    /// Unapplied committed batches exist; `recover` must run first.
    #[error("storage needs recovery: {0}")]
    NeedsRecovery(String),

    /// Backend name is unknown or cannot be used here.
    #[error("storage backend not available: {0}")]
    NotAvailable(String),
}

/// One operation in a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum BatchOp {
    Put {
        key: String,
        #[serde(with = "crate::core::hex_bytes")]
        value: Vec<u8>,
    },
    Delete {
        key: String,
    },
}

impl BatchOp {
    pub fn key(&self) -> &str {
        match self {
            BatchOp::Put { key, .. } | BatchOp::Delete { key } => key,
        }
    }
}

/// An ordered set of writes applied atomically.
///
/// Later operations on the same key win.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: impl Into<String>, value: Vec<u8>) {
        self.ops.push(BatchOp::Put {
            key: key.into(),
            value,
        });
    }

    pub fn delete(&mut self, key: impl Into<String>) {
        self.ops.push(BatchOp::Delete { key: key.into() });
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<BatchOp> {
        self.ops
    }

    /// Check every key in the batch.
    pub fn validate(&self) -> Result<(), BackendError> {
        self.ops.iter().try_for_each(|op| validate_key(op.key()))
    }
}

/// What `recover` did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Committed batches that were re-applied.
    pub replayed: usize,
    /// Uncommitted batches that were thrown away.
    pub discarded: usize,
    /// Orphaned temporary files removed.
    pub temp_files_removed: usize,
}

/// Marker for RAII guards returned by [`StorageBackend::write_lock`].
pub trait WriteGuard {}

impl<T: ?Sized> WriteGuard for T {}

/// A held write lock. Released on drop.
pub type WriteLock<'a> = Box<dyn WriteGuard + 'a>;

/// Trait for storage backends.
pub trait StorageBackend: Send + Sync {
    /// Short backend name (`memory`, `file`).
    fn name(&self) -> &'static str;

    /// Read a record. `Ok(None)` if the key does not exist.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError>;

    /// List keys starting with `prefix`, in ascending byte order.
    fn list(&self, prefix: &str) -> Result<Vec<String>, BackendError>;

    /// Apply every operation in `batch`, or none of them.
    fn write_batch(&self, batch: WriteBatch) -> Result<(), BackendError>;

    /// Take the storage-wide write lock.
    ///
    /// Held briefly by the engine around id allocation and commit.
    fn write_lock(&self) -> Result<WriteLock<'_>, BackendError>;

    /// Repair storage structure after a crash.
    ///
    /// Callers must guarantee no concurrent access.
    fn recover(&self) -> Result<RecoveryReport, BackendError>;

    /// Write one record.
    fn put(&self, key: &str, value: &[u8]) -> Result<(), BackendError> {
        let mut batch = WriteBatch::new();
        batch.put(key, value.to_vec());
        self.write_batch(batch)
    }

    /// Remove one record. Removing a missing key is not an error.
    fn delete(&self, key: &str) -> Result<(), BackendError> {
        let mut batch = WriteBatch::new();
        batch.delete(key);
        self.write_batch(batch)
    }

    /// Check if a record exists.
    fn exists(&self, key: &str) -> Result<bool, BackendError> {
        Ok(self.get(key)?.is_some())
    }
}

/// Validate a record key.
///
/// Keys are non-empty `/`-separated segments of `[A-Za-z0-9._-]`, with no
/// `.` or `..` segments.
pub fn validate_key(key: &str) -> Result<(), BackendError> {
    let valid_segment = |s: &str| {
        !s.is_empty()
            && s != "."
            && s != ".."
            && s
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))
    };
    if key.split('/').all(valid_segment) {
        Ok(())
    } else {
        Err(BackendError::InvalidKey(key.to_string()))
    }
}
