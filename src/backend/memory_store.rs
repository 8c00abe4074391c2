//! backend::memory_store
//!
//! In-memory storage backend. Used for tests and throwaway repositories.

use std::collections::BTreeMap;

use parking_lot::{Mutex, RwLock};

use super::traits::{BackendError, BatchOp, RecoveryReport, StorageBackend, WriteBatch, WriteLock};
use super::MEMORY_BACKEND;

/// Records held in a sorted map behind a lock.
///
/// A batch is applied under one write guard, so readers see all of it or
/// none of it.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    records: RwLock<BTreeMap<String, Vec<u8>>>,
    writer: Mutex<()>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl StorageBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        MEMORY_BACKEND
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        Ok(self.records.read().get(key).cloned())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, BackendError> {
        let records = self.records.read();
        Ok(records
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }

    fn write_batch(&self, batch: WriteBatch) -> Result<(), BackendError> {
        batch.validate()?;

        let mut records = self.records.write();
        for op in batch.into_ops() {
            match op {
                BatchOp::Put { key, value } => {
                    records.insert(key, value);
                }
                BatchOp::Delete { key } => {
                    records.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn write_lock(&self) -> Result<WriteLock<'_>, BackendError> {
        Ok(Box::new(self.writer.lock()))
    }

    fn recover(&self) -> Result<RecoveryReport, BackendError> {
        Ok(RecoveryReport::default())
    }
}
