//! Column family definitions
//!
//! This module defines the column families used to organize data in the
//! key-value store.

/// Column family names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ColumnFamily {
    /// Node metadata (last accepted block, bootstrap markers)
    Metadata,
    /// Accepted blocks (block_hash -> encoded block, height -> block_hash)
    Blocks,
    /// Accepted atomic transactions (tx_id -> height ++ signed tx)
    AtomicTxs,
    /// Atomic transactions per height (height -> encoded tx ids)
    AtomicHeights,
    /// Shared-memory requests recorded but not yet applied (height -> requests)
    AtomicPending,
    /// Cross-chain shared memory elements
    SharedMemory,
    /// Shared memory owner-trait index
    SharedIndex,
}

impl ColumnFamily {
    /// Get the string name for this column family
    pub fn name(&self) -> &'static str {
        match self {
            ColumnFamily::Metadata => "metadata",
            ColumnFamily::Blocks => "blocks",
            ColumnFamily::AtomicTxs => "atomic_txs",
            ColumnFamily::AtomicHeights => "atomic_heights",
            ColumnFamily::AtomicPending => "atomic_pending",
            ColumnFamily::SharedMemory => "shared_memory",
            ColumnFamily::SharedIndex => "shared_index",
        }
    }

    /// Get all column families
    pub fn all() -> &'static [ColumnFamily] {
        &[
            ColumnFamily::Metadata,
            ColumnFamily::Blocks,
            ColumnFamily::AtomicTxs,
            ColumnFamily::AtomicHeights,
            ColumnFamily::AtomicPending,
            ColumnFamily::SharedMemory,
            ColumnFamily::SharedIndex,
        ]
    }

    /// Get column family from name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::all().iter().copied().find(|cf| cf.name() == name)
    }
}

impl std::fmt::Display for ColumnFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_family_names() {
        assert_eq!(ColumnFamily::Metadata.name(), "metadata");
        assert_eq!(ColumnFamily::AtomicPending.name(), "atomic_pending");
        assert_eq!(ColumnFamily::SharedMemory.to_string(), "shared_memory");
    }

    #[test]
    fn test_column_family_from_name() {
        for cf in ColumnFamily::all() {
            assert_eq!(ColumnFamily::from_name(cf.name()), Some(*cf));
        }
        assert_eq!(ColumnFamily::from_name("invalid"), None);
    }
}
