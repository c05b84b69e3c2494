//! In-memory key-value backend

use crate::{ColumnFamily, DbError, DbResult, KeyValueDB, Operation, WriteBatch};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

type Table = BTreeMap<Vec<u8>, Vec<u8>>;

/// Key-value store held entirely in memory. Batches are applied under a
/// single write lock.
#[derive(Debug, Default)]
pub struct MemoryDb {
    tables: RwLock<HashMap<ColumnFamily, Table>>,
    closed: RwLock<bool>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every later operation
    pub fn close(&self) {
        *self.closed.write() = true;
    }

    /// Number of keys stored in `cf`
    pub fn len(&self, cf: ColumnFamily) -> usize {
        self.tables.read().get(&cf).map_or(0, BTreeMap::len)
    }

    pub fn is_empty(&self, cf: ColumnFamily) -> bool {
        self.len(cf) == 0
    }

    fn check_open(&self) -> DbResult<()> {
        if *self.closed.read() {
            return Err(DbError::Closed);
        }
        Ok(())
    }
}

impl KeyValueDB for MemoryDb {
    fn get(&self, cf: ColumnFamily, key: &[u8]) -> DbResult<Option<Vec<u8>>> {
        self.check_open()?;
        Ok(self
            .tables
            .read()
            .get(&cf)
            .and_then(|table| table.get(key).cloned()))
    }

    fn put(&self, cf: ColumnFamily, key: &[u8], value: &[u8]) -> DbResult<()> {
        self.check_open()?;
        self.tables
            .write()
            .entry(cf)
            .or_default()
            .insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, cf: ColumnFamily, key: &[u8]) -> DbResult<()> {
        self.check_open()?;
        if let Some(table) = self.tables.write().get_mut(&cf) {
            table.remove(key);
        }
        Ok(())
    }

    fn write(&self, batch: WriteBatch) -> DbResult<()> {
        self.check_open()?;
        let mut tables = self.tables.write();
        for operation in batch.into_operations() {
            match operation {
                Operation::Put { cf, key, value } => {
                    tables.entry(cf).or_default().insert(key, value);
                }
                Operation::Delete { cf, key } => {
                    if let Some(table) = tables.get_mut(&cf) {
                        table.remove(&key);
                    }
                }
            }
        }
        Ok(())
    }

    fn iter_prefix(&self, cf: ColumnFamily, prefix: &[u8]) -> DbResult<Vec<(Vec<u8>, Vec<u8>)>> {
        self.check_open()?;
        let tables = self.tables.read();
        let Some(table) = tables.get(&cf) else {
            return Ok(Vec::new());
        };
        Ok(table
            .range(prefix.to_vec()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }
}
