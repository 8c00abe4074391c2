//! backend::journal
//!
//! Write-ahead journal for file backend batches.
//!
//! # Crash Safety Contract
//!
//! A batch moves through two durable phases before any record file changes:
//!
//! 1. **Prepared:** the full operation list is on disk. A crash here means
//!    the batch never happened; recovery discards the journal.
//! 2. **Committed:** the batch is logically applied. A crash after this point
//!    is repaired by recovery replaying every operation, which is idempotent.
//!
//! Once every operation is applied the journal file is deleted.
//!
//! Journal files are themselves written through a temp file and rename, so a
//! torn journal write leaves either the previous phase or nothing.
//!
//! # Storage
//!
//! - `<root>/db/journal/<batch_id>.json`

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::traits::BatchOp;
use crate::core::paths::RepoPaths;
use crate::core::types::UtcTimestamp;

/// Errors from journal operations.
#[derive(Debug, Error)]
pub enum JournalError {
    /// I/O error reading or writing journal files.
    #[error("journal i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("journal json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Journal file not found.
    #[error("journal not found: {0}")]
    NotFound(String),
}

/// Unique identifier for a batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchId(String);

impl BatchId {
    /// Generate a new unique batch id.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create a BatchId from a journal file stem.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Durable phase of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchPhase {
    /// Operations recorded, not yet decided.
    Prepared,
    /// Decided; must be applied in full.
    Committed,
}

/// A journaled write batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchJournal {
    pub batch_id: BatchId,
    pub started_at: UtcTimestamp,
    pub phase: BatchPhase,
    pub ops: Vec<BatchOp>,
}

impl BatchJournal {
    /// Create a prepared journal for `ops`. Nothing is written yet.
    pub fn new(ops: Vec<BatchOp>) -> Self {
        Self {
            batch_id: BatchId::new(),
            started_at: UtcTimestamp::now(),
            phase: BatchPhase::Prepared,
            ops,
        }
    }

    /// Mark the batch as committed (in memory).
    pub fn commit(&mut self) {
        self.phase = BatchPhase::Committed;
    }

    pub fn is_committed(&self) -> bool {
        self.phase == BatchPhase::Committed
    }

    /// Write the journal to disk, replacing any earlier phase.
    ///
    /// # Fault Injection
    ///
    /// When compiled with `cfg(test)` or the `fault_injection` feature, this
    /// counts as one crash point. See [`fault_injection::set_crash_after`].
    pub fn write(&self, paths: &RepoPaths, fsync: bool) -> Result<(), JournalError> {
        crash_point()?;

        fs::create_dir_all(paths.journal_dir())?;

        let path = paths.journal_path(self.batch_id.as_str());
        let temp_path = path.with_extension("json.tmp");
        let content = serde_json::to_vec(self)?;

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)?;
        file.write_all(&content)?;
        if fsync {
            file.sync_all()?;
        }
        fs::rename(&temp_path, &path)?;

        Ok(())
    }

    /// Read a journal from disk.
    pub fn read(paths: &RepoPaths, batch_id: &BatchId) -> Result<Self, JournalError> {
        let path = paths.journal_path(batch_id.as_str());
        if !path.exists() {
            return Err(JournalError::NotFound(batch_id.to_string()));
        }
        read_file(&path)
    }

    /// List journal ids on disk in name order.
    ///
    /// Leftover `.json.tmp` files are not listed.
    pub fn list(paths: &RepoPaths) -> Result<Vec<BatchId>, JournalError> {
        let dir = paths.journal_dir();
        if !dir.exists() {
            return Ok(vec![]);
        }

        let mut ids: Vec<String> = fs::read_dir(&dir)?
            .filter_map(|entry| {
                let name = entry.ok()?.file_name().into_string().ok()?;
                name.strip_suffix(".json").map(str::to_string)
            })
            .collect();
        ids.sort();

        Ok(ids.into_iter().map(BatchId::from_string).collect())
    }

    /// Delete this journal from disk. Deleting twice is a no-op.
    pub fn delete(&self, paths: &RepoPaths) -> Result<(), JournalError> {
        match fs::remove_file(paths.journal_path(self.batch_id.as_str())) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Remove half-written journal temp files. Returns how many were removed.
pub fn remove_stale_temp_files(paths: &RepoPaths) -> Result<usize, JournalError> {
    let dir = paths.journal_dir();
    if !dir.exists() {
        return Ok(0);
    }

    let mut removed = 0;
    for entry in fs::read_dir(&dir)? {
        let entry = entry?;
        if entry.file_name().to_string_lossy().ends_with(".json.tmp") {
            fs::remove_file(entry.path())?;
            removed += 1;
        }
    }
    Ok(removed)
}

fn read_file(path: &Path) -> Result<BatchJournal, JournalError> {
    let content = fs::read(path)?;
    Ok(serde_json::from_slice(&content)?)
}

/// One step of the batch protocol at which a simulated crash may fire.
///
/// Without fault injection compiled in this always succeeds.
pub(crate) fn crash_point() -> Result<(), JournalError> {
    #[cfg(any(test, feature = "fault_injection"))]
    if fault_injection::should_crash() {
        return Err(JournalError::Io(std::io::Error::other(
            "simulated crash for fault injection testing",
        )));
    }
    Ok(())
}

/// Fault injection support for testing crash recovery.
///
/// Crash points are the two journal writes of a batch followed by each
/// record operation as it is applied.
///
/// ```ignore
/// use revfs::backend::journal::fault_injection;
///
/// // Prepare and commit succeed, first record write "crashes".
/// fault_injection::set_crash_after(3);
/// assert!(backend.write_batch(batch).is_err());
/// fault_injection::reset();
/// ```
#[cfg(any(test, feature = "fault_injection"))]
pub mod fault_injection {
    use std::cell::Cell;

    // Thread-local so parallel tests do not interfere.
    thread_local! {
        /// Crash on the Nth crash point. 0 disables.
        static CRASH_AFTER_STEPS: Cell<usize> = const { Cell::new(0) };

        static STEP_COUNT: Cell<usize> = const { Cell::new(0) };
    }

    /// Fail at the `n`th crash point from now. 0 disables.
    pub fn set_crash_after(n: usize) {
        CRASH_AFTER_STEPS.with(|c| c.set(n));
        STEP_COUNT.with(|c| c.set(0));
    }

    /// Count one crash point and report whether it should fail.
    pub fn should_crash() -> bool {
        CRASH_AFTER_STEPS.with(|threshold_cell| {
            let threshold = threshold_cell.get();
            if threshold == 0 {
                return false;
            }
            STEP_COUNT.with(|count_cell| {
                let count = count_cell.get() + 1;
                count_cell.set(count);
                count >= threshold
            })
        })
    }

    /// Reset fault injection state.
    pub fn reset() {
        CRASH_AFTER_STEPS.with(|c| c.set(0));
        STEP_COUNT.with(|c| c.set(0));
    }

    /// Crash points counted since the last `set_crash_after`.
    pub fn step_count() -> usize {
        STEP_COUNT.with(|c| c.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_paths(temp: &TempDir) -> RepoPaths {
        RepoPaths::new(temp.path().to_path_buf())
    }

    fn sample_ops() -> Vec<BatchOp> {
        vec![
            BatchOp::Put {
                key: "youngest".into(),
                value: b"3".to_vec(),
            },
            BatchOp::Delete {
                key: "txns/7".into(),
            },
        ]
    }

    mod batch_id {
        use super::*;

        #[test]
        fn new_generates_unique_ids() {
            assert_ne!(BatchId::new(), BatchId::new());
        }

        #[test]
        fn display_formatting() {
            assert_eq!(BatchId::from_string("b-1").to_string(), "b-1");
        }
    }

    mod journal {
        use super::*;

        #[test]
        fn new_is_prepared() {
            let journal = BatchJournal::new(sample_ops());
            assert_eq!(journal.phase, BatchPhase::Prepared);
            assert!(!journal.is_committed());
            assert_eq!(journal.ops.len(), 2);
        }

        #[test]
        fn write_and_read_roundtrip() {
            let temp = TempDir::new().unwrap();
            let paths = test_paths(&temp);

            let mut journal = BatchJournal::new(sample_ops());
            journal.write(&paths, true).expect("write prepared");
            journal.commit();
            journal.write(&paths, true).expect("write committed");

            let loaded = BatchJournal::read(&paths, &journal.batch_id).expect("read");
            assert!(loaded.is_committed());
            assert_eq!(loaded.ops, journal.ops);
            assert!(!paths
                .journal_path(journal.batch_id.as_str())
                .with_extension("json.tmp")
                .exists());
        }

        #[test]
        fn read_missing_is_not_found() {
            let temp = TempDir::new().unwrap();
            let paths = test_paths(&temp);
            let result = BatchJournal::read(&paths, &BatchId::from_string("nope"));
            assert!(matches!(result, Err(JournalError::NotFound(_))));
        }

        #[test]
        fn list_ignores_temp_files() {
            let temp = TempDir::new().unwrap();
            let paths = test_paths(&temp);

            let journal = BatchJournal::new(sample_ops());
            journal.write(&paths, false).unwrap();
            fs::write(paths.journal_dir().join("torn.json.tmp"), b"{").unwrap();

            let ids = BatchJournal::list(&paths).unwrap();
            assert_eq!(ids, vec![journal.batch_id.clone()]);

            assert_eq!(remove_stale_temp_files(&paths).unwrap(), 1);
            assert_eq!(remove_stale_temp_files(&paths).unwrap(), 0);
        }

        #[test]
        fn delete_is_idempotent() {
            let temp = TempDir::new().unwrap();
            let paths = test_paths(&temp);

            let journal = BatchJournal::new(sample_ops());
            journal.write(&paths, false).unwrap();
            journal.delete(&paths).unwrap();
            journal.delete(&paths).unwrap();
            assert!(BatchJournal::list(&paths).unwrap().is_empty());
        }

        #[test]
        fn list_on_missing_dir_is_empty() {
            let temp = TempDir::new().unwrap();
            let paths = test_paths(&temp);
            assert!(BatchJournal::list(&paths).unwrap().is_empty());
        }
    }

    mod fault_injection_tests {
        use super::*;

        #[test]
        fn crash_fires_at_threshold() {
            let temp = TempDir::new().unwrap();
            let paths = test_paths(&temp);
            let mut journal = BatchJournal::new(sample_ops());

            fault_injection::set_crash_after(2);
            journal.write(&paths, false).expect("first write succeeds");
            journal.commit();
            let result = journal.write(&paths, false);
            fault_injection::reset();

            assert!(result.is_err());
            let on_disk = BatchJournal::read(&paths, &journal.batch_id).unwrap();
            assert_eq!(on_disk.phase, BatchPhase::Prepared);
        }

        #[test]
        fn disabled_by_default() {
            fault_injection::reset();
            assert!(crash_point().is_ok());
            assert_eq!(fault_injection::step_count(), 0);
        }
    }
}
