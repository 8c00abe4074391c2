//! fs::error
//!
//! Engine error type.

use thiserror::Error;

use crate::backend::BackendError;
use crate::core::config::ConfigError;
use crate::core::types::TypeError;

/// Errors from filesystem operations.
///
/// Every error is returned to the caller; nothing here is retried or
/// repaired automatically.
#[derive(Debug, Error)]
pub enum FsError {
    /// Unknown revision, transaction, or path.
    #[error("not found: {0}")]
    NotFound(String),

    /// The repository or path already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// A commit overlaps a change made by an intervening revision.
    #[error("conflict at '{0}'")]
    Conflict(String),

    /// Operation not valid in the current state.
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// The stored format is newer than this build understands.
    #[error("unsupported repository format {found} (maximum supported: {max})")]
    FormatUnsupported { found: u32, max: u32 },

    /// A persisted invariant does not hold.
    #[error("repository corruption: {0}")]
    Corruption(String),

    /// Storage backend failure.
    #[error("backend error: {0}")]
    BackendIO(#[from] BackendError),

    /// Malformed path or id argument.
    #[error(transparent)]
    InvalidPath(#[from] TypeError),

    /// Path exists but is not a directory.
    #[error("not a directory: {0}")]
    NotDirectory(String),

    /// Path exists but is not a file.
    #[error("not a file: {0}")]
    NotFile(String),

    /// Repository configuration could not be loaded.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

impl FsError {
    pub(crate) fn corruption(what: impl std::fmt::Display) -> Self {
        FsError::Corruption(what.to_string())
    }

    /// Whether this is a commit conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, FsError::Conflict(_))
    }
}
