//! Database error types

use delta_core::CoreError;
use thiserror::Error;

/// Database error type
#[derive(Error, Debug)]
pub enum DbError {
    /// Sled error
    #[cfg(feature = "sled-backend")]
    #[error("Sled error: {0}")]
    Sled(#[from] sled::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Database was closed
    #[error("Database closed")]
    Closed,

    /// Other error
    #[error("Database error: {0}")]
    Other(String),
}

impl From<CoreError> for DbError {
    fn from(err: CoreError) -> Self {
        DbError::Serialization(err.to_string())
    }
}

/// Result type for database operations
pub type DbResult<T> = Result<T, DbError>;
