//! core::ops::lock
//!
//! Repository locks backed by OS-level file locks.
//!
//! # Architecture
//!
//! Every open repository holds a **shared** lock on `<root>/lock` for as long
//! as it is open. `recover` takes the **exclusive** lock on the same file,
//! which waits for every open handle to close and keeps new ones out until
//! recovery finishes. Readers and writers never exclude each other through
//! this lock; commit serialization uses a separate, briefly held lock owned
//! by the storage backend.
//!
//! # Invariants
//!
//! - Locks are released on drop (RAII pattern)
//! - `acquire_*` blocks; `try_acquire_*` fails fast
//! - An exclusive holder excludes all shared holders, in any process
//!
//! # Example
//!
//! ```ignore
//! use revfs::core::ops::lock::RepoLock;
//! use revfs::core::paths::RepoPaths;
//!
//! let paths = RepoPaths::new("/srv/repo".into());
//! let lock = RepoLock::acquire_exclusive(&paths)?;
//! // ... run recovery ...
//! drop(lock);
//! ```

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error;

use crate::core::paths::RepoPaths;

/// Errors from locking operations.
#[derive(Debug, Error)]
pub enum LockError {
    /// Another holder has the lock in a conflicting mode.
    #[error("repository is locked by another process")]
    AlreadyLocked,

    /// Failed to create lock file or directory.
    #[error("failed to create lock: {0}")]
    CreateFailed(String),

    /// Failed to acquire the OS lock.
    #[error("failed to acquire lock: {0}")]
    AcquireFailed(String),

    /// Failed to release the lock.
    #[error("failed to release lock: {0}")]
    ReleaseFailed(String),

    /// I/O error during lock operations.
    #[error("lock i/o error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Lock mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Many holders at once; excluded by an exclusive holder.
    Shared,
    /// Single holder; excludes everyone else.
    Exclusive,
}

/// A held file lock.
///
/// The lock is automatically released when this guard is dropped.
#[derive(Debug)]
pub struct RepoLock {
    path: PathBuf,
    mode: LockMode,
    /// When this is Some, we hold the lock.
    file: Option<File>,
}

impl RepoLock {
    /// Take the shared repository lock, waiting for any exclusive holder.
    pub fn acquire_shared(paths: &RepoPaths) -> Result<Self, LockError> {
        Self::acquire_path(paths.lock_path(), LockMode::Shared)
    }

    /// Take the exclusive repository lock, waiting for every other holder.
    pub fn acquire_exclusive(paths: &RepoPaths) -> Result<Self, LockError> {
        Self::acquire_path(paths.lock_path(), LockMode::Exclusive)
    }

    /// Try to take the exclusive repository lock without waiting.
    ///
    /// Returns `Ok(None)` if anyone else holds the lock.
    pub fn try_acquire_exclusive(paths: &RepoPaths) -> Result<Option<Self>, LockError> {
        match Self::try_acquire_path(paths.lock_path(), LockMode::Exclusive) {
            Ok(lock) => Ok(Some(lock)),
            Err(LockError::AlreadyLocked) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Try to take the shared repository lock without waiting.
    ///
    /// Returns `Ok(None)` if an exclusive holder (recovery) is active.
    pub fn try_acquire_shared(paths: &RepoPaths) -> Result<Option<Self>, LockError> {
        match Self::try_acquire_path(paths.lock_path(), LockMode::Shared) {
            Ok(lock) => Ok(Some(lock)),
            Err(LockError::AlreadyLocked) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Lock an arbitrary lock file, blocking until it is available.
    pub fn acquire_path(path: PathBuf, mode: LockMode) -> Result<Self, LockError> {
        let file = open_lock_file(&path)?;

        // std::fs::File has inherent lock methods with different signatures,
        // so the fs2 calls are spelled out.
        let result = match mode {
            LockMode::Shared => FileExt::lock_shared(&file),
            LockMode::Exclusive => FileExt::lock_exclusive(&file),
        };
        result.map_err(|e| LockError::AcquireFailed(e.to_string()))?;

        Ok(Self {
            path,
            mode,
            file: Some(file),
        })
    }

    /// Lock an arbitrary lock file, failing fast if it is held.
    pub fn try_acquire_path(path: PathBuf, mode: LockMode) -> Result<Self, LockError> {
        let file = open_lock_file(&path)?;

        let result = match mode {
            LockMode::Shared => FileExt::try_lock_shared(&file),
            LockMode::Exclusive => FileExt::try_lock_exclusive(&file),
        };

        match result {
            Ok(()) => Ok(Self {
                path,
                mode,
                file: Some(file),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Err(LockError::AlreadyLocked),
            Err(e) => Err(LockError::AcquireFailed(e.to_string())),
        }
    }

    /// Check if the lock is currently held.
    pub fn is_held(&self) -> bool {
        self.file.is_some()
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }

    /// Get the path to the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the lock explicitly.
    ///
    /// This is called automatically on drop. Releasing twice is a no-op.
    pub fn release(&mut self) -> Result<(), LockError> {
        if let Some(file) = self.file.take() {
            FileExt::unlock(&file).map_err(|e| LockError::ReleaseFailed(e.to_string()))?;
        }
        Ok(())
    }
}

impl Drop for RepoLock {
    fn drop(&mut self) {
        // Best-effort release on drop - ignore errors since we're dropping
        if let Some(file) = self.file.take() {
            let _ = FileExt::unlock(&file);
        }
    }
}

fn open_lock_file(path: &Path) -> Result<File, LockError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            LockError::CreateFailed(format!("cannot create {}: {}", parent.display(), e))
        })?;
    }

    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(|e| LockError::CreateFailed(format!("cannot open {}: {}", path.display(), e)))
}
