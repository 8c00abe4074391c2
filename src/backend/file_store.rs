//! backend::file_store
//!
//! File-based storage backend.
//!
//! # Layout
//!
//! Each record is one file under `<root>/db/data/`, with key segments mapped
//! to nested directories (`txn-nodes/4/1.0.4` is `data/txn-nodes/4/1.0.4`).
//!
//! # Atomicity
//!
//! - Every record write goes to `db/tmp/` first, then is renamed into place
//! - A batch is journaled (see [`super::journal`]) before any record changes
//! - Opening storage with an unapplied committed journal fails with
//!   [`BackendError::NeedsRecovery`]; [`FileBackend::recover`] replays it
//! - A handle whose batch failed after its journal was committed refuses
//!   further writes with [`BackendError::NeedsRecovery`] until recovered
//!
//! # Locking
//!
//! [`StorageBackend::write_lock`] takes a process-local mutex, then an
//! exclusive OS lock on `db/write-lock`, so two handles on the same storage
//! exclude each other whether they live in one process or two.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, MutexGuard};
use uuid::Uuid;

use super::journal::{self, BatchJournal};
use super::traits::{BackendError, BatchOp, RecoveryReport, StorageBackend, WriteBatch, WriteLock};
use super::FILE_BACKEND;
use crate::core::ops::{LockMode, RepoLock};
use crate::core::paths::RepoPaths;

/// File-based storage backend.
#[derive(Debug)]
pub struct FileBackend {
    paths: RepoPaths,
    fsync: bool,
    process_lock: Mutex<()>,
    /// Set when a committed journal may be left unapplied.
    poisoned: AtomicBool,
}

/// Guard for [`FileBackend::write_lock`]. Field order is release order.
struct FileWriteGuard<'a> {
    _file: RepoLock,
    _process: MutexGuard<'a, ()>,
}

impl FileBackend {
    /// Create a backend over `paths` without checking for pending journals.
    ///
    /// Only recovery should use this directly; everything else goes through
    /// [`FileBackend::open`].
    pub fn new(paths: RepoPaths, fsync: bool) -> Self {
        Self {
            paths,
            fsync,
            process_lock: Mutex::new(()),
            poisoned: AtomicBool::new(false),
        }
    }

    /// Create the storage directories under `paths`.
    pub fn create(paths: RepoPaths, fsync: bool) -> Result<Self, BackendError> {
        for dir in [paths.data_dir(), paths.tmp_dir(), paths.journal_dir()] {
            fs::create_dir_all(&dir).map_err(|e| io_error(&dir, e))?;
        }
        Ok(Self::new(paths, fsync))
    }

    /// Open existing storage.
    ///
    /// # Errors
    ///
    /// - [`BackendError::NeedsRecovery`] if a committed batch was never
    ///   fully applied
    pub fn open(paths: RepoPaths, fsync: bool) -> Result<Self, BackendError> {
        let backend = Self::new(paths, fsync);
        let pending = backend.pending_batches()?;
        if pending > 0 {
            return Err(BackendError::NeedsRecovery(format!(
                "{} committed batch(es) not applied",
                pending
            )));
        }
        Ok(backend)
    }

    pub fn paths(&self) -> &RepoPaths {
        &self.paths
    }

    fn check_poisoned(&self) -> Result<(), BackendError> {
        if self.poisoned.load(Ordering::Acquire) {
            return Err(BackendError::NeedsRecovery(
                "an earlier batch failed after its journal was committed".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply a committed journal and remove it.
    fn finish(&self, journal: &BatchJournal) -> Result<(), BackendError> {
        self.apply(&journal.ops)?;
        Ok(journal.delete(&self.paths)?)
    }

    /// Count committed journals that have not been applied.
    pub fn pending_batches(&self) -> Result<usize, BackendError> {
        let mut pending = 0;
        for id in BatchJournal::list(&self.paths)? {
            match BatchJournal::read(&self.paths, &id) {
                Ok(j) if j.is_committed() => pending += 1,
                Ok(_) => {}
                // A journal that cannot be parsed never reached Committed.
                Err(journal::JournalError::Json(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(pending)
    }

    fn apply(&self, ops: &[BatchOp]) -> Result<(), BackendError> {
        for op in ops {
            journal::crash_point()?;
            match op {
                BatchOp::Put { key, value } => self.write_record(key, value)?,
                BatchOp::Delete { key } => self.remove_record(key)?,
            }
        }
        Ok(())
    }

    fn write_record(&self, key: &str, value: &[u8]) -> Result<(), BackendError> {
        let tmp_dir = self.paths.tmp_dir();
        fs::create_dir_all(&tmp_dir).map_err(|e| io_error(&tmp_dir, e))?;
        let temp_path = tmp_dir.join(Uuid::new_v4().to_string());

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)
            .map_err(|e| key_error(key, e))?;
        file.write_all(value).map_err(|e| key_error(key, e))?;
        if self.fsync {
            file.sync_all().map_err(|e| key_error(key, e))?;
        }
        drop(file);

        let path = self.paths.record_path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| key_error(key, e))?;
        }
        fs::rename(&temp_path, &path).map_err(|e| key_error(key, e))
    }

    fn remove_record(&self, key: &str) -> Result<(), BackendError> {
        let path = self.paths.record_path(key);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(key_error(key, e)),
        }
        self.prune_empty_parents(&path);
        Ok(())
    }

    /// Remove now-empty directories between `path` and the data dir.
    fn prune_empty_parents(&self, path: &Path) {
        let data_dir = self.paths.data_dir();
        let mut dir = path.parent();
        while let Some(d) = dir {
            if d == data_dir || !d.starts_with(&data_dir) {
                break;
            }
            // Fails on non-empty directories, which ends the walk.
            if fs::remove_dir(d).is_err() {
                break;
            }
            dir = d.parent();
        }
    }

    /// Collect keys of every record file below `dir`.
    fn collect_keys(&self, dir: &Path, prefix: &str, out: &mut Vec<String>) -> Result<(), BackendError> {
        let mut stack: Vec<(PathBuf, String)> = vec![(dir.to_path_buf(), prefix.to_string())];

        while let Some((dir, key_prefix)) = stack.pop() {
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(io_error(&dir, e)),
            };
            for entry in entries {
                let entry = entry.map_err(|e| io_error(&dir, e))?;
                let Ok(name) = entry.file_name().into_string() else {
                    continue;
                };
                let key = format!("{}{}", key_prefix, name);
                let file_type = entry.file_type().map_err(|e| io_error(&entry.path(), e))?;
                if file_type.is_dir() {
                    stack.push((entry.path(), format!("{}/", key)));
                } else {
                    out.push(key);
                }
            }
        }
        Ok(())
    }
}

impl StorageBackend for FileBackend {
    fn name(&self) -> &'static str {
        FILE_BACKEND
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        super::validate_key(key)?;
        match fs::read(self.paths.record_path(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(key_error(key, e)),
        }
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, BackendError> {
        // Walk only the deepest directory the prefix fully names.
        let (dir_part, _) = prefix.rsplit_once('/').unwrap_or(("", prefix));
        let (start, key_prefix) = if dir_part.is_empty() {
            (self.paths.data_dir(), String::new())
        } else {
            super::validate_key(dir_part)?;
            (self.paths.record_path(dir_part), format!("{}/", dir_part))
        };

        let mut keys = Vec::new();
        self.collect_keys(&start, &key_prefix, &mut keys)?;
        keys.retain(|k| k.starts_with(prefix));
        keys.sort();
        Ok(keys)
    }

    fn write_batch(&self, batch: WriteBatch) -> Result<(), BackendError> {
        self.check_poisoned()?;
        batch.validate()?;
        if batch.is_empty() {
            return Ok(());
        }

        let mut journal = BatchJournal::new(batch.into_ops());
        journal.write(&self.paths, self.fsync)?;
        journal.commit();
        journal.write(&self.paths, self.fsync)?;

        if let Err(e) = self.finish(&journal) {
            self.poisoned.store(true, Ordering::Release);
            tracing::error!(
                target: "revfs::backend",
                batch = %journal.batch_id,
                error = %e,
                "batch failed after commit; storage needs recovery"
            );
            return Err(e);
        }

        tracing::trace!(
            target: "revfs::backend",
            batch = %journal.batch_id,
            ops = journal.ops.len(),
            "batch applied"
        );
        Ok(())
    }

    fn write_lock(&self) -> Result<WriteLock<'_>, BackendError> {
        self.check_poisoned()?;
        let process = self.process_lock.lock();
        let file = RepoLock::acquire_path(self.paths.write_lock_path(), LockMode::Exclusive)?;
        Ok(Box::new(FileWriteGuard {
            _file: file,
            _process: process,
        }))
    }

    fn recover(&self) -> Result<RecoveryReport, BackendError> {
        let mut report = RecoveryReport::default();

        for id in BatchJournal::list(&self.paths)? {
            match BatchJournal::read(&self.paths, &id) {
                Ok(journal) if journal.is_committed() => {
                    tracing::info!(target: "revfs::backend", batch = %id, "replaying committed batch");
                    self.apply(&journal.ops)?;
                    journal.delete(&self.paths)?;
                    report.replayed += 1;
                }
                Ok(journal) => {
                    tracing::info!(target: "revfs::backend", batch = %id, "discarding uncommitted batch");
                    journal.delete(&self.paths)?;
                    report.discarded += 1;
                }
                Err(journal::JournalError::Json(e)) => {
                    tracing::warn!(target: "revfs::backend", batch = %id, error = %e, "discarding unreadable journal");
                    let path = self.paths.journal_path(id.as_str());
                    fs::remove_file(&path).map_err(|e| io_error(&path, e))?;
                    report.discarded += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }

        report.temp_files_removed += journal::remove_stale_temp_files(&self.paths)?;

        let tmp_dir = self.paths.tmp_dir();
        if tmp_dir.exists() {
            for entry in fs::read_dir(&tmp_dir).map_err(|e| io_error(&tmp_dir, e))? {
                let entry = entry.map_err(|e| io_error(&tmp_dir, e))?;
                fs::remove_file(entry.path()).map_err(|e| io_error(&entry.path(), e))?;
                report.temp_files_removed += 1;
            }
        }

        self.poisoned.store(false, Ordering::Release);
        Ok(report)
    }
}

fn key_error(key: &str, source: io::Error) -> BackendError {
    BackendError::Io {
        key: key.to_string(),
        source,
    }
}

fn io_error(path: &Path, source: io::Error) -> BackendError {
    BackendError::Io {
        key: path.display().to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::journal::fault_injection;
    use tempfile::TempDir;

    fn create_backend(temp: &TempDir) -> FileBackend {
        FileBackend::create(RepoPaths::new(temp.path().to_path_buf()), false).expect("create")
    }

    fn two_key_batch() -> WriteBatch {
        let mut batch = WriteBatch::new();
        batch.put("revs/1", b"rev one".to_vec());
        batch.put("youngest", b"1".to_vec());
        batch
    }

    mod records {
        use super::*;

        #[test]
        fn put_get_roundtrip() {
            let temp = TempDir::new().unwrap();
            let backend = create_backend(&temp);

            backend.put("nodes/0.0.0", b"root").unwrap();
            assert_eq!(backend.get("nodes/0.0.0").unwrap(), Some(b"root".to_vec()));
            assert!(temp.path().join("db/data/nodes/0.0.0").exists());
        }

        #[test]
        fn get_missing_is_none() {
            let temp = TempDir::new().unwrap();
            let backend = create_backend(&temp);
            assert!(backend.get("nodes/9.9.9").unwrap().is_none());
        }

        #[test]
        fn get_rejects_bad_key() {
            let temp = TempDir::new().unwrap();
            let backend = create_backend(&temp);
            assert!(matches!(
                backend.get("../escape"),
                Err(BackendError::InvalidKey(_))
            ));
        }

        #[test]
        fn delete_prunes_empty_directories() {
            let temp = TempDir::new().unwrap();
            let backend = create_backend(&temp);

            backend.put("txn-nodes/5/1.0.5", b"n").unwrap();
            backend.delete("txn-nodes/5/1.0.5").unwrap();

            assert!(!temp.path().join("db/data/txn-nodes/5").exists());
            assert!(!temp.path().join("db/data/txn-nodes").exists());
            assert!(temp.path().join("db/data").exists());
        }

        #[test]
        fn list_walks_nested_keys() {
            let temp = TempDir::new().unwrap();
            let backend = create_backend(&temp);

            let mut batch = WriteBatch::new();
            batch.put("txn-nodes/5/1.0.5", vec![]);
            batch.put("txn-nodes/5/2.0.5", vec![]);
            batch.put("txn-nodes/6/3.0.6", vec![]);
            batch.put("txns/5", vec![]);
            backend.write_batch(batch).unwrap();

            assert_eq!(
                backend.list("txn-nodes/5/").unwrap(),
                vec!["txn-nodes/5/1.0.5", "txn-nodes/5/2.0.5"]
            );
            assert_eq!(
                backend.list("txn").unwrap(),
                vec![
                    "txn-nodes/5/1.0.5",
                    "txn-nodes/5/2.0.5",
                    "txn-nodes/6/3.0.6",
                    "txns/5"
                ]
            );
            assert!(backend.list("revs/").unwrap().is_empty());
        }

        #[test]
        fn batch_leaves_no_journal_or_temp_files() {
            let temp = TempDir::new().unwrap();
            let backend = create_backend(&temp);

            backend.write_batch(two_key_batch()).unwrap();

            let paths = backend.paths();
            assert!(BatchJournal::list(paths).unwrap().is_empty());
            assert_eq!(fs::read_dir(paths.tmp_dir()).unwrap().count(), 0);
        }
    }

    mod crash_recovery {
        use super::*;

        #[test]
        fn crash_before_commit_discards_batch() {
            let temp = TempDir::new().unwrap();
            let backend = create_backend(&temp);

            // prepare written, commit marker "crashes"
            fault_injection::set_crash_after(2);
            let result = backend.write_batch(two_key_batch());
            fault_injection::reset();
            assert!(result.is_err());

            let reopened = FileBackend::open(backend.paths().clone(), false).expect("no recovery needed");
            let report = reopened.recover().unwrap();
            assert_eq!(report.discarded, 1);
            assert_eq!(report.replayed, 0);
            assert!(reopened.get("youngest").unwrap().is_none());
        }

        #[test]
        fn crash_mid_apply_requires_recovery_then_replays() {
            let temp = TempDir::new().unwrap();
            let backend = create_backend(&temp);

            // prepare, commit, first record succeed; second record "crashes"
            fault_injection::set_crash_after(4);
            let result = backend.write_batch(two_key_batch());
            fault_injection::reset();
            assert!(result.is_err());
            assert!(backend.get("revs/1").unwrap().is_some());
            assert!(backend.get("youngest").unwrap().is_none());

            let paths = backend.paths().clone();
            assert!(matches!(
                FileBackend::open(paths.clone(), false),
                Err(BackendError::NeedsRecovery(_))
            ));

            let report = FileBackend::new(paths.clone(), false).recover().unwrap();
            assert_eq!(report.replayed, 1);

            let reopened = FileBackend::open(paths, false).expect("open after recovery");
            assert_eq!(reopened.get("youngest").unwrap(), Some(b"1".to_vec()));
            assert_eq!(reopened.get("revs/1").unwrap(), Some(b"rev one".to_vec()));
        }

        #[test]
        fn failed_apply_refuses_writes_until_recovered() {
            let temp = TempDir::new().unwrap();
            let backend = create_backend(&temp);

            fault_injection::set_crash_after(4);
            assert!(backend.write_batch(two_key_batch()).is_err());
            fault_injection::reset();

            let mut other = WriteBatch::new();
            other.put("revs/1", b"someone else".to_vec());
            other.put("youngest", b"1".to_vec());
            assert!(matches!(
                backend.write_batch(other),
                Err(BackendError::NeedsRecovery(_))
            ));
            assert!(matches!(backend.write_lock(), Err(BackendError::NeedsRecovery(_))));
            assert_eq!(backend.get("revs/1").unwrap(), Some(b"rev one".to_vec()));

            let report = backend.recover().unwrap();
            assert_eq!(report.replayed, 1);
            assert_eq!(backend.get("youngest").unwrap(), Some(b"1".to_vec()));

            drop(backend.write_lock().expect("lock after recovery"));
            backend.put("revs/2", b"rev two").unwrap();
            assert_eq!(backend.get("revs/1").unwrap(), Some(b"rev one".to_vec()));
        }

        #[test]
        fn failure_before_commit_does_not_poison() {
            let temp = TempDir::new().unwrap();
            let backend = create_backend(&temp);

            fault_injection::set_crash_after(2);
            assert!(backend.write_batch(two_key_batch()).is_err());
            fault_injection::reset();

            backend.write_batch(two_key_batch()).expect("handle still usable");
            assert_eq!(backend.get("youngest").unwrap(), Some(b"1".to_vec()));
        }

        #[test]
        fn recover_removes_orphaned_temp_files() {
            let temp = TempDir::new().unwrap();
            let backend = create_backend(&temp);
            fs::write(backend.paths().tmp_dir().join("orphan"), b"x").unwrap();

            let report = backend.recover().unwrap();
            assert_eq!(report.temp_files_removed, 1);
            assert_eq!(fs::read_dir(backend.paths().tmp_dir()).unwrap().count(), 0);
        }

        #[test]
        fn recover_discards_unreadable_journal() {
            let temp = TempDir::new().unwrap();
            let backend = create_backend(&temp);
            fs::write(backend.paths().journal_path("torn"), b"{\"batch_id\":").unwrap();

            assert_eq!(backend.pending_batches().unwrap(), 0);
            let report = backend.recover().unwrap();
            assert_eq!(report.discarded, 1);
        }
    }

    mod locking {
        use super::*;
        use std::sync::Arc;
        use std::thread;

        #[test]
        fn write_lock_excludes_second_handle() {
            let temp = TempDir::new().unwrap();
            let backend = create_backend(&temp);

            let _guard = backend.write_lock().unwrap();
            let other = RepoLock::try_acquire_path(backend.paths().write_lock_path(), LockMode::Exclusive);
            assert!(other.is_err());
        }

        #[test]
        fn write_lock_released_on_drop() {
            let temp = TempDir::new().unwrap();
            let backend = create_backend(&temp);

            drop(backend.write_lock().unwrap());
            let again = backend.write_lock();
            assert!(again.is_ok());
        }

        #[test]
        fn write_lock_serializes_threads() {
            let temp = TempDir::new().unwrap();
            let backend = Arc::new(create_backend(&temp));
            backend.put("counter", b"0").unwrap();

            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let backend = Arc::clone(&backend);
                    thread::spawn(move || {
                        for _ in 0..10 {
                            let _guard = backend.write_lock().unwrap();
                            let raw = backend.get("counter").unwrap().unwrap();
                            let n: u64 = String::from_utf8(raw).unwrap().parse().unwrap();
                            backend.put("counter", (n + 1).to_string().as_bytes()).unwrap();
                        }
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }

            assert_eq!(backend.get("counter").unwrap(), Some(b"40".to_vec()));
        }
    }
}
