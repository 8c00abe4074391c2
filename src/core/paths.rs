//! core::paths
//!
//! Centralized path routing for repository storage locations.
//!
//! # Storage Layout
//!
//! All repository data lives under the repository root:
//! - `format` - Format number (decimal text)
//! - `config.toml` - Repository configuration
//! - `lock` - Repository lock (shared for normal access, exclusive for recover)
//! - `db/` - File backend storage
//! - `db/data/` - One file per record key
//! - `db/tmp/` - Staging area for record writes
//! - `db/journal/` - Write-ahead batch journals
//! - `db/write-lock` - Commit serialization lock
//!
//! **Hard rule:** No code outside this module computes `root.join(..)` paths
//! for repository storage. Everything goes through `RepoPaths`.
//!
//! # Example
//!
//! ```
//! use revfs::core::paths::RepoPaths;
//! use std::path::PathBuf;
//!
//! let paths = RepoPaths::new(PathBuf::from("/srv/repo"));
//!
//! assert_eq!(paths.config_path(), PathBuf::from("/srv/repo/config.toml"));
//! assert_eq!(paths.db_dir(), PathBuf::from("/srv/repo/db"));
//! ```

use std::path::{Path, PathBuf};

/// Centralized path routing for repository storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoPaths {
    /// The repository root directory.
    pub root: PathBuf,
}

impl RepoPaths {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Get the root as a Path reference.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path to the format file.
    ///
    /// This is `<root>/format`.
    pub fn format_path(&self) -> PathBuf {
        self.root.join("format")
    }

    /// Path to the repository configuration file.
    ///
    /// This is `<root>/config.toml`.
    pub fn config_path(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    /// Path to the repository lock file.
    ///
    /// This is `<root>/lock`.
    pub fn lock_path(&self) -> PathBuf {
        self.root.join("lock")
    }

    /// Directory holding file backend records.
    ///
    /// This is `<root>/db/`.
    pub fn db_dir(&self) -> PathBuf {
        self.root.join("db")
    }

    /// Directory holding write-ahead batch journals.
    ///
    /// This is `<root>/db/journal/`.
    pub fn journal_dir(&self) -> PathBuf {
        self.db_dir().join("journal")
    }

    /// Path to a specific batch journal.
    ///
    /// This is `<root>/db/journal/<batch_id>.json`.
    pub fn journal_path(&self, batch_id: &str) -> PathBuf {
        self.journal_dir().join(format!("{}.json", batch_id))
    }

    /// Path to the commit serialization lock.
    ///
    /// This is `<root>/db/write-lock`.
    pub fn write_lock_path(&self) -> PathBuf {
        self.db_dir().join("write-lock")
    }

    /// Directory holding record files.
    ///
    /// This is `<root>/db/data/`. Keys map onto nested files below it.
    pub fn data_dir(&self) -> PathBuf {
        self.db_dir().join("data")
    }

    /// Staging directory for record writes.
    ///
    /// This is `<root>/db/tmp/`. Files here are renamed into `data/`; any left
    /// behind after a crash are removed by recovery.
    pub fn tmp_dir(&self) -> PathBuf {
        self.db_dir().join("tmp")
    }

    /// Path of the file holding the record for `key`.
    ///
    /// Key segments separated by `/` become nested directories.
    pub fn record_path(&self, key: &str) -> PathBuf {
        let mut path = self.data_dir();
        for segment in key.split('/') {
            path.push(segment);
        }
        path
    }

    /// Whether the repository root holds anything at all.
    ///
    /// A missing root counts as empty.
    pub fn is_empty(&self) -> std::io::Result<bool> {
        match std::fs::read_dir(&self.root) {
            Ok(mut entries) => Ok(entries.next().is_none()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(true),
            Err(e) => Err(e),
        }
    }
}
