//! Sled-backed key-value store
//!
//! All column families share one sled tree; keys are prefixed with the
//! column family name and a `/` separator so a batch spanning several
//! families is still one atomic `apply_batch`.

use crate::{ColumnFamily, DbResult, KeyValueDB, Operation, WriteBatch};
use std::path::Path;

pub struct SledDb {
    db: sled::Db,
}

fn prefixed(cf: ColumnFamily, key: &[u8]) -> Vec<u8> {
    let name = cf.name().as_bytes();
    let mut full = Vec::with_capacity(name.len() + 1 + key.len());
    full.extend_from_slice(name);
    full.push(b'/');
    full.extend_from_slice(key);
    full
}

impl SledDb {
    /// Open (or create) a database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let db = sled::open(path)?;
        tracing::debug!(recovered = db.was_recovered(), "opened sled database");
        Ok(Self { db })
    }
}

impl KeyValueDB for SledDb {
    fn get(&self, cf: ColumnFamily, key: &[u8]) -> DbResult<Option<Vec<u8>>> {
        Ok(self.db.get(prefixed(cf, key))?.map(|v| v.to_vec()))
    }

    fn put(&self, cf: ColumnFamily, key: &[u8], value: &[u8]) -> DbResult<()> {
        self.db.insert(prefixed(cf, key), value)?;
        Ok(())
    }

    fn delete(&self, cf: ColumnFamily, key: &[u8]) -> DbResult<()> {
        self.db.remove(prefixed(cf, key))?;
        Ok(())
    }

    fn write(&self, batch: WriteBatch) -> DbResult<()> {
        let mut sled_batch = sled::Batch::default();
        for operation in batch.into_operations() {
            match operation {
                Operation::Put { cf, key, value } => sled_batch.insert(prefixed(cf, &key), value),
                Operation::Delete { cf, key } => sled_batch.remove(prefixed(cf, &key)),
            }
        }
        self.db.apply_batch(sled_batch)?;
        Ok(())
    }

    fn iter_prefix(&self, cf: ColumnFamily, prefix: &[u8]) -> DbResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let full = prefixed(cf, prefix);
        let strip = full.len() - prefix.len();
        self.db
            .scan_prefix(&full)
            .map(|entry| {
                let (key, value) = entry?;
                Ok((key[strip..].to_vec(), value.to_vec()))
            })
            .collect()
    }

    fn flush(&self) -> DbResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_batch_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let db = SledDb::open(dir.path()).unwrap();
            let mut batch = WriteBatch::new();
            batch
                .put(ColumnFamily::Metadata, b"last", b"7")
                .put(ColumnFamily::AtomicPending, &[0, 7], b"ops");
            db.write(batch).unwrap();
            db.flush().unwrap();
        }

        let db = SledDb::open(dir.path()).unwrap();
        assert_eq!(
            db.get(ColumnFamily::Metadata, b"last").unwrap(),
            Some(b"7".to_vec())
        );
        assert_eq!(
            db.iter_prefix(ColumnFamily::AtomicPending, &[]).unwrap(),
            vec![(vec![0, 7], b"ops".to_vec())]
        );
        assert!(db.iter_prefix(ColumnFamily::AtomicTxs, &[]).unwrap().is_empty());
    }
}
