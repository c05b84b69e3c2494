//! Consensus error types

use delta_core::{CoreError, Wei};
use thiserror::Error;

/// Fee engine and header verification errors
#[derive(Error, Debug)]
pub enum ConsensusError {
    /// Header extra data is not a full consumption window
    #[error("expected length of parent extra data to be {expected}, but found {actual}")]
    WindowLength { expected: usize, actual: usize },

    #[error("cannot calculate base fee for timestamp ({child}) prior to parent timestamp ({parent})")]
    TimestampBeforeParent { parent: u64, child: u64 },

    #[error("base fee is nil")]
    MissingBaseFee,

    #[error("block gas cost is nil")]
    MissingBlockGasCost,

    #[error("ext data gas used is nil")]
    MissingExtDataGasUsed,

    /// A fee field is set before the upgrade that introduces it
    #[error("invalid {0} before fork: have a value, expected nil")]
    UnexpectedField(&'static str),

    #[error("expected rollup window {expected}, found {actual}")]
    WindowMismatch { expected: String, actual: String },

    #[error("expected base fee {expected}, found {actual}")]
    BaseFeeMismatch { expected: Wei, actual: Wei },

    #[error("invalid block gas cost: have {actual}, want {expected}")]
    BlockGasCostMismatch { expected: u128, actual: u128 },

    #[error("insufficient gas ({block_gas}) to cover the block cost ({required}) at base fee ({base_fee})")]
    InsufficientBlockFee {
        block_gas: Wei,
        required: u128,
        base_fee: Wei,
    },

    /// Arithmetic outside the representable range
    #[error("arithmetic overflow computing {0}")]
    Overflow(&'static str),

    #[error("Invalid block header: {0}")]
    InvalidBlock(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Result type for consensus operations
pub type ConsensusResult<T> = Result<T, ConsensusError>;
