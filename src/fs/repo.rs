//! fs::repo
//!
//! Repository lifecycle and the revision store.
//!
//! # Architecture
//!
//! A [`Repository`] owns one storage backend and, when it lives on disk,
//! the shared repository lock for as long as it is open. Everything else
//! (revision roots, transactions) borrows the repository.
//!
//! ```text
//! <repo>/
//! ├── format        # written last by create
//! ├── config.toml
//! ├── lock          # shared while open, exclusive during recover
//! └── db/           # file backend storage
//! ```
//!
//! # Example
//!
//! ```
//! use revfs::core::types::Revnum;
//! use revfs::fs::{FsRoot, Repository};
//!
//! let repo = Repository::create_in_memory().unwrap();
//! let mut txn = repo.begin_transaction(Revnum::ZERO).unwrap();
//! txn.make_file("/a.txt").unwrap();
//! txn.set_contents("/a.txt", b"hello").unwrap();
//! let rev = txn.commit().unwrap();
//!
//! assert_eq!(repo.youngest().unwrap(), rev);
//! let root = repo.revision_root(rev).unwrap();
//! assert_eq!(root.file_contents("/a.txt").unwrap(), b"hello");
//! ```

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::changes::ChangeTable;
use super::node::NodeRevision;
use super::props::PropList;
use super::root::RevisionRoot;
use super::store::{self, put_json, NextIds, RevisionRecord, Store};
use super::txn::{self, Transaction};
use super::FsError;
use crate::backend::{
    create_backend, BackendError, FileBackend, MemoryBackend, RecoveryReport, StorageBackend,
    WriteBatch,
};
use crate::core::config::{Config, RepoConfig};
use crate::core::ops::RepoLock;
use crate::core::paths::RepoPaths;
use crate::core::types::{FsPath, NodeRevId, Revnum, TxnId};

/// Newest repository format this build reads and writes.
pub const FORMAT: u32 = 2;

/// An open repository.
pub struct Repository {
    paths: Option<RepoPaths>,
    config: Config,
    backend: Option<Box<dyn StorageBackend>>,
    lock: Option<RepoLock>,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("location", &self.location())
            .field("backend", &self.backend.as_ref().map(|b| b.name()))
            .finish()
    }
}

impl Repository {
    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Create a repository at `location` and open it.
    ///
    /// # Errors
    ///
    /// - `AlreadyExists` if `location` exists and is not empty
    pub fn create(location: &Path) -> Result<Self, FsError> {
        let paths = RepoPaths::new(location.to_path_buf());
        let empty = paths.is_empty().map_err(|e| io_error(location, e))?;
        if !empty {
            return Err(FsError::AlreadyExists(location.display().to_string()));
        }
        fs::create_dir_all(location).map_err(|e| io_error(location, e))?;

        let repo_config = RepoConfig::initial();
        Config::write_repo(location, &repo_config)?;
        let backend = FileBackend::create(paths.clone(), true)?;
        initialize(&backend)?;
        write_format_file(&paths.format_path())?;

        info!(target: "revfs::repo", path = %location.display(), "created repository");
        Self::open(location)
    }

    /// Open the repository at `location`.
    ///
    /// Waits while `recover` holds the repository.
    ///
    /// # Errors
    ///
    /// - `IllegalState` if there is no repository at `location`
    /// - `FormatUnsupported` if the format is newer than [`FORMAT`]
    /// - `BackendIO` if the storage needs recovery
    pub fn open(location: &Path) -> Result<Self, FsError> {
        let paths = RepoPaths::new(location.to_path_buf());
        check_format(read_format_file(&paths.format_path())?)?;

        let config = Config::load(Some(location))?.config;
        let lock = RepoLock::acquire_shared(&paths).map_err(BackendError::from)?;
        let backend = create_backend(config.storage_backend(), &paths, config.fsync())?;

        let repo = Self {
            paths: Some(paths),
            config,
            backend: Some(backend),
            lock: Some(lock),
        };
        if let Some(version) = repo.store()?.format()? {
            check_format(version)?;
        }

        debug!(target: "revfs::repo", path = %location.display(), "opened repository");
        Ok(repo)
    }

    /// A fresh repository that lives only in memory.
    pub fn create_in_memory() -> Result<Self, FsError> {
        Self::create_with_backend(Box::new(MemoryBackend::new()))
    }

    /// Create a repository in an empty `backend`.
    ///
    /// # Errors
    ///
    /// - `AlreadyExists` if the backend already holds a repository
    pub fn create_with_backend(backend: Box<dyn StorageBackend>) -> Result<Self, FsError> {
        if backend.exists(store::FORMAT_KEY)? || backend.exists(store::YOUNGEST_KEY)? {
            return Err(FsError::AlreadyExists(format!(
                "{} backend already holds a repository",
                backend.name()
            )));
        }
        initialize(backend.as_ref())?;
        Ok(Self::detached(backend))
    }

    /// Open a repository held in `backend`.
    pub fn open_with_backend(backend: Box<dyn StorageBackend>) -> Result<Self, FsError> {
        let version = Store::new(backend.as_ref()).format()?.ok_or_else(|| {
            FsError::IllegalState(format!("{} backend holds no repository", backend.name()))
        })?;
        check_format(version)?;
        Ok(Self::detached(backend))
    }

    fn detached(backend: Box<dyn StorageBackend>) -> Self {
        Self {
            paths: None,
            config: Config::default(),
            backend: Some(backend),
            lock: None,
        }
    }

    /// Release the backend and the repository lock. Closing twice is fine.
    pub fn close(&mut self) -> Result<(), FsError> {
        if self.backend.take().is_some() {
            debug!(target: "revfs::repo", "closed repository");
        }
        if let Some(mut lock) = self.lock.take() {
            lock.release().map_err(BackendError::from)?;
        }
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.backend.is_some()
    }

    /// Repair the storage at `location` after a crash.
    ///
    /// Takes the exclusive repository lock, waiting until every open handle
    /// is closed and keeping new ones out until repair finishes.
    pub fn recover(location: &Path) -> Result<RecoveryReport, FsError> {
        let paths = RepoPaths::new(location.to_path_buf());
        check_format(read_format_file(&paths.format_path())?)?;
        let config = Config::load(Some(location))?.config;

        let _lock = RepoLock::acquire_exclusive(&paths).map_err(BackendError::from)?;
        info!(target: "revfs::repo", path = %location.display(), "recovering repository");
        let report = FileBackend::new(paths, config.fsync()).recover()?;
        info!(
            target: "revfs::repo",
            replayed = report.replayed,
            discarded = report.discarded,
            temp_files = report.temp_files_removed,
            "recovery finished"
        );
        Ok(report)
    }

    /// Location on disk; `None` for repositories not backed by files.
    pub fn location(&self) -> Option<&Path> {
        self.paths.as_ref().map(RepoPaths::root)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The storage backend.
    ///
    /// # Errors
    ///
    /// - `IllegalState` after [`Repository::close`]
    pub fn backend(&self) -> Result<&dyn StorageBackend, FsError> {
        self.backend
            .as_deref()
            .ok_or_else(|| FsError::IllegalState("repository is closed".into()))
    }

    fn store(&self) -> Result<Store<'_>, FsError> {
        Ok(Store::new(self.backend()?))
    }

    // =========================================================================
    // Revisions
    // =========================================================================

    /// Highest committed revision.
    pub fn youngest(&self) -> Result<Revnum, FsError> {
        self.store()?.youngest()
    }

    fn revision_record(&self, rev: Revnum) -> Result<RevisionRecord, FsError> {
        let store = self.store()?;
        if rev > store.youngest()? {
            return Err(FsError::NotFound(format!("revision {}", rev)));
        }
        store.revision(rev)
    }

    /// Id of revision `rev`'s root directory.
    pub fn root(&self, rev: Revnum) -> Result<NodeRevId, FsError> {
        Ok(self.revision_record(rev)?.root)
    }

    /// Read access to revision `rev`'s tree.
    pub fn revision_root(&self, rev: Revnum) -> Result<RevisionRoot<'_>, FsError> {
        let record = self.revision_record(rev)?;
        Ok(RevisionRoot::new(self.store()?, rev, record))
    }

    /// Paths changed by revision `rev`.
    pub fn changed_paths(&self, rev: Revnum) -> Result<ChangeTable, FsError> {
        Ok(self.revision_record(rev)?.changes)
    }

    pub fn revision_proplist(&self, rev: Revnum) -> Result<PropList, FsError> {
        self.revision_record(rev)?;
        self.store()?.revprops(rev)
    }

    pub fn revision_property(&self, rev: Revnum, name: &str) -> Result<Option<Vec<u8>>, FsError> {
        Ok(self.revision_proplist(rev)?.get(name).map(<[u8]>::to_vec))
    }

    /// Set a revision property. The tree of `rev` is not affected.
    pub fn set_revision_property(&self, rev: Revnum, name: &str, value: &[u8]) -> Result<(), FsError> {
        self.change_revision_property(rev, name, Some(value))
    }

    pub fn remove_revision_property(&self, rev: Revnum, name: &str) -> Result<(), FsError> {
        self.change_revision_property(rev, name, None)
    }

    fn change_revision_property(&self, rev: Revnum, name: &str, value: Option<&[u8]>) -> Result<(), FsError> {
        if name.is_empty() {
            return Err(FsError::IllegalState("property name cannot be empty".into()));
        }
        let backend = self.backend()?;
        let _guard = backend.write_lock()?;

        let mut props = self.revision_proplist(rev)?;
        match value {
            Some(value) => {
                props.set(name, value);
            }
            None => {
                props.remove(name);
            }
        }
        let mut batch = WriteBatch::new();
        put_json(&mut batch, store::revprops_key(rev), &props)?;
        backend.write_batch(batch)?;

        debug!(target: "revfs::repo", rev = %rev, name, "changed revision property");
        Ok(())
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Begin a transaction on `base_rev`.
    ///
    /// The configured author, if any, becomes the transaction's author.
    ///
    /// # Errors
    ///
    /// - `NotFound` if `base_rev` is newer than the youngest revision
    pub fn begin_transaction(&self, base_rev: Revnum) -> Result<Transaction<'_>, FsError> {
        Transaction::begin(self.backend()?, base_rev, self.config.author())
    }

    /// Reopen the open transaction called `name`.
    pub fn open_transaction(&self, name: &str) -> Result<Transaction<'_>, FsError> {
        let id = parse_txn_name(name)?;
        let record = self
            .store()?
            .txn(id)?
            .ok_or_else(|| FsError::NotFound(format!("transaction {}", name)))?;
        Ok(Transaction::new(self.backend()?, id, record.base_rev))
    }

    /// Names of every open transaction, ascending.
    pub fn list_transactions(&self) -> Result<Vec<String>, FsError> {
        Ok(self
            .store()?
            .txn_ids()?
            .into_iter()
            .map(|id| id.to_string())
            .collect())
    }

    /// Remove the open transaction called `name` and everything it owns.
    pub fn purge_transaction(&self, name: &str) -> Result<(), FsError> {
        let id = parse_txn_name(name)?;
        let backend = self.backend()?;
        if self.store()?.txn(id)?.is_none() {
            return Err(FsError::NotFound(format!("transaction {}", name)));
        }
        txn::purge(backend, id)?;
        info!(target: "revfs::repo", txn = %id, "purged transaction");
        Ok(())
    }
}

impl Drop for Repository {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

fn parse_txn_name(name: &str) -> Result<TxnId, FsError> {
    name.parse()
        .map_err(|_| FsError::NotFound(format!("transaction {}", name)))
}

fn check_format(found: u32) -> Result<(), FsError> {
    if found > FORMAT {
        return Err(FsError::FormatUnsupported { found, max: FORMAT });
    }
    Ok(())
}

/// Write revision 0 and the id counters into an empty backend.
fn initialize(backend: &dyn StorageBackend) -> Result<(), FsError> {
    let root = NodeRevision::new_dir(NodeRevId::initial_root(), FsPath::root());
    let revision = RevisionRecord {
        root: root.id,
        txn: TxnId::new(0),
        changes: ChangeTable::new(),
        copies: Vec::new(),
    };

    let mut batch = WriteBatch::new();
    put_json(&mut batch, store::FORMAT_KEY, &FORMAT)?;
    put_json(&mut batch, store::NEXT_IDS_KEY, &NextIds::initial())?;
    put_json(&mut batch, store::node_key(&root.id, None), &root)?;
    put_json(&mut batch, store::rev_key(Revnum::ZERO), &revision)?;
    put_json(&mut batch, store::revprops_key(Revnum::ZERO), &PropList::new())?;
    put_json(&mut batch, store::YOUNGEST_KEY, &Revnum::ZERO)?;
    backend.write_batch(batch)?;
    Ok(())
}

fn read_format_file(path: &Path) -> Result<u32, FsError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(FsError::IllegalState(format!(
                "no repository at {}",
                path.parent().unwrap_or(path).display()
            )))
        }
        Err(e) => return Err(io_error(path, e)),
    };
    text.trim()
        .parse()
        .map_err(|_| FsError::corruption(format!("format file {} holds '{}'", path.display(), text.trim())))
}

fn write_format_file(path: &Path) -> Result<(), FsError> {
    let temp_path: PathBuf = path.with_extension("tmp");
    let mut file = fs::File::create(&temp_path).map_err(|e| io_error(&temp_path, e))?;
    writeln!(file, "{}", FORMAT).map_err(|e| io_error(&temp_path, e))?;
    file.sync_all().map_err(|e| io_error(&temp_path, e))?;
    fs::rename(&temp_path, path).map_err(|e| io_error(path, e))
}

fn io_error(path: &Path, source: std::io::Error) -> FsError {
    FsError::BackendIO(BackendError::Io {
        key: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::FsRoot;
    use tempfile::TempDir;

    mod lifecycle {
        use super::*;

        #[test]
        fn create_then_reopen() {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("repo");
            {
                let repo = Repository::create(&path).unwrap();
                assert_eq!(repo.youngest().unwrap(), Revnum::ZERO);
                assert_eq!(repo.location(), Some(path.as_path()));
            }
            let repo = Repository::open(&path).unwrap();
            assert_eq!(repo.youngest().unwrap(), Revnum::ZERO);
            assert!(path.join("format").exists());
            assert!(path.join("config.toml").exists());
        }

        #[test]
        fn create_refuses_non_empty_location() {
            let dir = TempDir::new().unwrap();
            fs::write(dir.path().join("stray"), b"x").unwrap();
            assert!(matches!(
                Repository::create(dir.path()),
                Err(FsError::AlreadyExists(_))
            ));
        }

        #[test]
        fn open_missing_repository_is_illegal_state() {
            let dir = TempDir::new().unwrap();
            assert!(matches!(
                Repository::open(dir.path()),
                Err(FsError::IllegalState(_))
            ));
        }

        #[test]
        fn newer_format_is_unsupported() {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("repo");
            drop(Repository::create(&path).unwrap());

            fs::write(path.join("format"), "3\n").unwrap();
            assert!(matches!(
                Repository::open(&path),
                Err(FsError::FormatUnsupported { found: 3, max: 2 })
            ));

            fs::write(path.join("format"), "1\n").unwrap();
            assert!(Repository::open(&path).is_ok());
        }

        #[test]
        fn closed_repository_rejects_operations() {
            let mut repo = Repository::create_in_memory().unwrap();
            repo.close().unwrap();
            repo.close().unwrap();
            assert!(!repo.is_open());
            assert!(matches!(repo.youngest(), Err(FsError::IllegalState(_))));
            assert!(matches!(
                repo.begin_transaction(Revnum::ZERO),
                Err(FsError::IllegalState(_))
            ));
        }

        #[test]
        fn backend_holding_repository_cannot_be_created_again() {
            let backend = MemoryBackend::new();
            initialize(&backend).unwrap();
            assert!(matches!(
                Repository::create_with_backend(Box::new(backend)),
                Err(FsError::AlreadyExists(_))
            ));
        }
    }

    mod revisions {
        use super::*;

        #[test]
        fn revision_zero_is_empty() {
            let repo = Repository::create_in_memory().unwrap();
            assert_eq!(repo.root(Revnum::ZERO).unwrap(), NodeRevId::initial_root());
            assert!(repo.revision_proplist(Revnum::ZERO).unwrap().is_empty());
            assert!(repo.changed_paths(Revnum::ZERO).unwrap().is_empty());
        }

        #[test]
        fn future_revision_not_found() {
            let repo = Repository::create_in_memory().unwrap();
            assert!(matches!(repo.root(Revnum::new(1)), Err(FsError::NotFound(_))));
            assert!(matches!(
                repo.revision_property(Revnum::new(1), "sys:log"),
                Err(FsError::NotFound(_))
            ));
            assert!(matches!(
                repo.begin_transaction(Revnum::new(1)),
                Err(FsError::NotFound(_))
            ));
        }

        #[test]
        fn revision_properties_are_editable() {
            let repo = Repository::create_in_memory().unwrap();
            let root_before = repo.root(Revnum::ZERO).unwrap();

            repo.set_revision_property(Revnum::ZERO, "sys:log", b"initial").unwrap();
            assert_eq!(
                repo.revision_property(Revnum::ZERO, "sys:log").unwrap(),
                Some(b"initial".to_vec())
            );
            repo.remove_revision_property(Revnum::ZERO, "sys:log").unwrap();
            assert_eq!(repo.revision_property(Revnum::ZERO, "sys:log").unwrap(), None);
            assert_eq!(repo.root(Revnum::ZERO).unwrap(), root_before);
        }
    }

    mod transactions {
        use super::*;

        #[test]
        fn transactions_are_listed_and_purged() {
            let repo = Repository::create_in_memory().unwrap();
            let a = repo.begin_transaction(Revnum::ZERO).unwrap().name();
            let b = repo.begin_transaction(Revnum::ZERO).unwrap().name();
            assert_eq!(repo.list_transactions().unwrap(), vec![a.clone(), b.clone()]);

            repo.purge_transaction(&a).unwrap();
            assert_eq!(repo.list_transactions().unwrap(), vec![b]);
            assert!(matches!(repo.purge_transaction(&a), Err(FsError::NotFound(_))));
            assert!(matches!(repo.open_transaction("bogus"), Err(FsError::NotFound(_))));
        }

        #[test]
        fn reopened_transaction_sees_earlier_edits() {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("repo");
            let name = {
                let repo = Repository::create(&path).unwrap();
                let mut txn = repo.begin_transaction(Revnum::ZERO).unwrap();
                txn.make_file("/kept.txt").unwrap();
                txn.set_contents("/kept.txt", b"later").unwrap();
                txn.name()
            };

            let repo = Repository::open(&path).unwrap();
            let mut txn = repo.open_transaction(&name).unwrap();
            assert_eq!(txn.root().unwrap().file_contents("/kept.txt").unwrap(), b"later");
            let rev = txn.commit().unwrap();
            assert_eq!(rev, Revnum::new(1));
        }
    }

    mod recovery {
        use super::*;
        use crate::backend::journal::fault_injection;

        #[test]
        fn failed_commit_blocks_other_commits_until_recovered() {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("repo");
            let (a_name, b_name) = {
                let repo = Repository::create(&path).unwrap();
                let mut a = repo.begin_transaction(Revnum::ZERO).unwrap();
                let mut b = repo.begin_transaction(Revnum::ZERO).unwrap();
                a.make_file("/from_a").unwrap();
                b.make_file("/from_b").unwrap();

                // journal written and committed, second record write fails
                fault_injection::set_crash_after(4);
                let failed = a.commit();
                fault_injection::reset();
                assert!(failed.is_err());

                assert!(matches!(
                    b.commit(),
                    Err(FsError::BackendIO(BackendError::NeedsRecovery(_)))
                ));
                assert!(matches!(
                    b.make_file("/late"),
                    Err(FsError::BackendIO(BackendError::NeedsRecovery(_)))
                ));
                (a.name(), b.name())
            };

            let report = Repository::recover(&path).unwrap();
            assert_eq!(report.replayed, 1);

            let repo = Repository::open(&path).unwrap();
            assert_eq!(repo.youngest().unwrap(), Revnum::new(1));
            let r1 = repo.revision_root(Revnum::new(1)).unwrap();
            assert!(r1.is_file("/from_a").unwrap());
            assert_eq!(r1.check_path("/from_b").unwrap(), None);
            assert_eq!(repo.list_transactions().unwrap(), vec![b_name.clone()]);
            assert!(matches!(repo.open_transaction(&a_name), Err(FsError::NotFound(_))));

            let mut b = repo.open_transaction(&b_name).unwrap();
            assert_eq!(b.commit().unwrap(), Revnum::new(2));
            let r2 = repo.revision_root(Revnum::new(2)).unwrap();
            assert!(r2.is_file("/from_a").unwrap());
            assert!(r2.is_file("/from_b").unwrap());
            assert!(repo.revision_root(Revnum::new(1)).unwrap().is_file("/from_a").unwrap());
        }
    }
}
