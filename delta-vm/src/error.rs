//! VM error types

use delta_core::{Address, CoreError};
use delta_db::DbError;
use thiserror::Error;

/// VM error type
#[derive(Error, Debug)]
pub enum VmError {
    /// Insufficient gas
    #[error("Out of gas: required {required}, available {available}")]
    OutOfGas { required: u64, available: u64 },

    /// Invalid transaction
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),

    /// Insufficient balance
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: u128, available: u128 },

    /// Invalid nonce
    #[error("Invalid nonce for {address}: expected {expected}, got {actual}")]
    InvalidNonce {
        address: Address,
        expected: u64,
        actual: u64,
    },

    #[error("base fee is required to price atomic gas")]
    MissingBaseFee,

    #[error("arithmetic overflow in {0}")]
    Overflow(&'static str),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for VM operations
pub type VmResult<T> = Result<T, VmError>;
