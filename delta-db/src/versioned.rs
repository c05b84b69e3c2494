//! Versioned overlay database
//!
//! Writes land in an in-memory overlay and only reach the underlying store
//! on `commit`. `commit_batch` hands the overlay out as a `WriteBatch` so a
//! caller can make it durable together with other writes.

use crate::{ColumnFamily, DbResult, KeyValueDB, SharedDatabase, WriteBatch};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use tracing::{debug, trace};

type Overlay = BTreeMap<(ColumnFamily, Vec<u8>), Option<Vec<u8>>>;

pub struct VersionDb {
    base: SharedDatabase,
    pending: Mutex<Overlay>,
}

impl VersionDb {
    pub fn new(base: SharedDatabase) -> Self {
        Self {
            base,
            pending: Mutex::new(BTreeMap::new()),
        }
    }

    /// Underlying store
    pub fn base(&self) -> &SharedDatabase {
        &self.base
    }

    /// Pending writes as a batch, leaving the overlay in place
    pub fn commit_batch(&self) -> WriteBatch {
        let pending = self.pending.lock();
        let mut batch = WriteBatch::new();
        for ((cf, key), value) in pending.iter() {
            match value {
                Some(value) => batch.put(*cf, key, value),
                None => batch.delete(*cf, key),
            };
        }
        batch
    }

    /// Write the overlay to the underlying store and clear it
    pub fn commit(&self) -> DbResult<()> {
        let batch = self.commit_batch();
        let writes = batch.len();
        self.base.write(batch)?;
        self.pending.lock().clear();
        trace!(writes, "committed versioned overlay");
        Ok(())
    }

    /// Drop every pending write
    pub fn abort(&self) {
        let mut pending = self.pending.lock();
        if !pending.is_empty() {
            debug!(discarded = pending.len(), "aborted versioned overlay");
        }
        pending.clear();
    }

    /// Number of pending writes
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }
}

impl KeyValueDB for VersionDb {
    fn get(&self, cf: ColumnFamily, key: &[u8]) -> DbResult<Option<Vec<u8>>> {
        if let Some(value) = self.pending.lock().get(&(cf, key.to_vec())) {
            return Ok(value.clone());
        }
        self.base.get(cf, key)
    }

    fn put(&self, cf: ColumnFamily, key: &[u8], value: &[u8]) -> DbResult<()> {
        self.pending
            .lock()
            .insert((cf, key.to_vec()), Some(value.to_vec()));
        Ok(())
    }

    fn delete(&self, cf: ColumnFamily, key: &[u8]) -> DbResult<()> {
        self.pending.lock().insert((cf, key.to_vec()), None);
        Ok(())
    }

    fn write(&self, batch: WriteBatch) -> DbResult<()> {
        let mut pending = self.pending.lock();
        for operation in batch.into_operations() {
            match operation {
                crate::Operation::Put { cf, key, value } => {
                    pending.insert((cf, key), Some(value));
                }
                crate::Operation::Delete { cf, key } => {
                    pending.insert((cf, key), None);
                }
            }
        }
        Ok(())
    }

    fn iter_prefix(&self, cf: ColumnFamily, prefix: &[u8]) -> DbResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> =
            self.base.iter_prefix(cf, prefix)?.into_iter().collect();
        let pending = self.pending.lock();
        for ((pending_cf, key), value) in pending.range((cf, prefix.to_vec())..) {
            if *pending_cf != cf || !key.starts_with(prefix) {
                break;
            }
            match value {
                Some(value) => merged.insert(key.clone(), value.clone()),
                None => merged.remove(key),
            };
        }
        Ok(merged.into_iter().collect())
    }
}
