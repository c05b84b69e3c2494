//! Storage layer for the Delta chain
//!
//! This crate provides the key-value contract the rest of the node is
//! written against, plus:
//! - an in-memory backend and a sled backend (`sled-backend` feature)
//! - atomic write batches
//! - a versioned overlay that buffers writes until commit or abort

pub mod column_families;
pub mod error;
pub mod memory;
#[cfg(feature = "sled-backend")]
pub mod sled_db;
pub mod traits;
pub mod versioned;

pub use column_families::ColumnFamily;
pub use error::{DbError, DbResult};
pub use memory::MemoryDb;
#[cfg(feature = "sled-backend")]
pub use sled_db::SledDb;
pub use traits::{KeyValueDB, Operation, SharedDatabase, WriteBatch};
pub use versioned::VersionDb;
