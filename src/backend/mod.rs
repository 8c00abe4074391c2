//! backend
//!
//! Pluggable storage for repository records.
//!
//! # Architecture
//!
//! The filesystem engine never touches the disk directly. It reads and
//! writes named records through the [`StorageBackend`] trait, which has
//! two implementations:
//!
//! - [`FileBackend`]: one file per record under `<root>/db/`, with a
//!   write-ahead journal making each batch atomic across crashes
//! - [`MemoryBackend`]: a sorted map, for tests and scratch repositories
//!
//! # Backend Selection
//!
//! Use [`create_backend`] to build a backend by name:
//!
//! ```
//! use revfs::backend::create_backend;
//! use revfs::core::paths::RepoPaths;
//!
//! let paths = RepoPaths::new(std::env::temp_dir().join("unused"));
//! let backend = create_backend("memory", &paths, true).unwrap();
//! assert_eq!(backend.name(), "memory");
//! ```

mod file_store;
pub mod journal;
mod memory_store;
mod traits;

pub use file_store::FileBackend;
pub use memory_store::MemoryBackend;
pub use traits::{
    validate_key, BackendError, BatchOp, RecoveryReport, StorageBackend, WriteBatch, WriteGuard,
    WriteLock,
};

use crate::core::paths::RepoPaths;

/// Name of the on-disk backend.
pub const FILE_BACKEND: &str = "file";

/// Name of the in-memory backend.
pub const MEMORY_BACKEND: &str = "memory";

/// Create a storage backend by name, opening existing storage.
///
/// # Backends
///
/// - `"file"`: [`FileBackend`] rooted at `paths`
/// - `"memory"`: a fresh, empty [`MemoryBackend`]; `paths` is ignored
///
/// # Errors
///
/// - Unknown backend name
/// - [`BackendError::NeedsRecovery`] from the file backend
pub fn create_backend(
    name: &str,
    paths: &RepoPaths,
    fsync: bool,
) -> Result<Box<dyn StorageBackend>, BackendError> {
    match name {
        FILE_BACKEND => Ok(Box::new(FileBackend::open(paths.clone(), fsync)?)),
        MEMORY_BACKEND => Ok(Box::new(MemoryBackend::new())),
        other => Err(BackendError::NotAvailable(format!(
            "unknown storage backend: '{}' (valid: {}, {})",
            other, FILE_BACKEND, MEMORY_BACKEND
        ))),
    }
}
