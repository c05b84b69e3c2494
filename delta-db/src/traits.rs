//! Database traits and interfaces

use crate::{ColumnFamily, DbResult};
use std::sync::Arc;

/// Key-value database trait
pub trait KeyValueDB: Send + Sync {
    /// Get value by key from a column family
    fn get(&self, cf: ColumnFamily, key: &[u8]) -> DbResult<Option<Vec<u8>>>;

    /// Put key-value pair into a column family
    fn put(&self, cf: ColumnFamily, key: &[u8], value: &[u8]) -> DbResult<()>;

    /// Delete key from a column family
    fn delete(&self, cf: ColumnFamily, key: &[u8]) -> DbResult<()>;

    /// Check if key exists in a column family
    fn exists(&self, cf: ColumnFamily, key: &[u8]) -> DbResult<bool> {
        Ok(self.get(cf, key)?.is_some())
    }

    /// Apply every operation in `batch` atomically: either all of them are
    /// visible afterwards or none
    fn write(&self, batch: WriteBatch) -> DbResult<()>;

    /// All entries of a column family whose key starts with `prefix`, in
    /// ascending key order
    fn iter_prefix(&self, cf: ColumnFamily, prefix: &[u8]) -> DbResult<Vec<(Vec<u8>, Vec<u8>)>>;

    /// Flush pending writes to durable storage
    fn flush(&self) -> DbResult<()> {
        Ok(())
    }
}

/// Shared database reference
pub type SharedDatabase = Arc<dyn KeyValueDB>;

/// Database operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Put {
        cf: ColumnFamily,
        key: Vec<u8>,
        value: Vec<u8>,
    },
    Delete {
        cf: ColumnFamily,
        key: Vec<u8>,
    },
}

/// Ordered set of writes applied as one unit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    operations: Vec<Operation>,
}

impl WriteBatch {
    /// Create new empty batch
    pub fn new() -> Self {
        Self::default()
    }

    /// Add put operation
    pub fn put(&mut self, cf: ColumnFamily, key: &[u8], value: &[u8]) -> &mut Self {
        self.operations.push(Operation::Put {
            cf,
            key: key.to_vec(),
            value: value.to_vec(),
        });
        self
    }

    /// Add delete operation
    pub fn delete(&mut self, cf: ColumnFamily, key: &[u8]) -> &mut Self {
        self.operations.push(Operation::Delete {
            cf,
            key: key.to_vec(),
        });
        self
    }

    /// Append every operation of `other` after this batch's operations
    pub fn extend(&mut self, other: WriteBatch) -> &mut Self {
        self.operations.extend(other.operations);
        self
    }

    /// Write the batch to `db` atomically
    pub fn execute(self, db: &dyn KeyValueDB) -> DbResult<()> {
        db.write(self)
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn into_operations(self) -> Vec<Operation> {
        self.operations
    }

    /// Get number of operations
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Check if batch is empty
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}
