//! Atomic transaction errors

use crate::VmError;
use delta_core::{Address, CoreError, Id};
use delta_db::DbError;
use thiserror::Error;

/// How a failure relates to the transaction's future
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Structurally invalid; never valid as-is
    Malformed,
    /// Value or authorization failure; the originator must rebuild the tx
    Value,
    /// Double spend against a pending ancestor or pooled tx; may become
    /// valid once the conflicting block or tx is gone
    Conflict,
    /// I/O or resource failure unrelated to the tx itself
    Transient,
}

#[derive(Error, Debug)]
pub enum AtomicTxError {
    #[error("import tx has no inputs")]
    NoImportInputs,

    #[error("export tx has no outputs")]
    NoExportOutputs,

    #[error("tx has no account outputs")]
    NoAccountOutputs,

    #[error("wrong network id: expected {expected}, got {actual}")]
    WrongNetworkId { expected: u32, actual: u32 },

    #[error("wrong blockchain id: expected {expected}, got {actual}")]
    WrongBlockchainId { expected: Id, actual: Id },

    #[error("peer chain {0} is not allowed")]
    WrongChainId(Id),

    #[error("{0} contains a non-native asset")]
    NonNativeAsset(&'static str),

    #[error("invalid {what}: {reason}")]
    InvalidEntry { what: &'static str, reason: String },

    #[error("inputs not sorted and unique")]
    InputsNotSortedUnique,

    #[error("outputs not sorted and unique")]
    OutputsNotSortedUnique,

    #[error("outputs not sorted")]
    OutputsNotSorted,

    #[error("flow check failed for asset {asset}: produced {produced}, consumed {consumed}")]
    FlowCheck {
        asset: Id,
        produced: u64,
        consumed: u64,
    },

    #[error("mismatched number of inputs/credentials ({inputs} vs. {credentials})")]
    CredentialCount { inputs: usize, credentials: usize },

    #[error("expected {expected} signatures, found {actual}")]
    SignatureCount { expected: usize, actual: usize },

    #[error("signature does not match the input owner")]
    SignatureMismatch,

    #[error("output is locked until {locktime}, now {now}")]
    Locked { locktime: u64, now: u64 },

    #[error("utxo asset {utxo} does not match input asset {input}")]
    AssetMismatch { utxo: Id, input: Id },

    #[error("shared memory has no entry {key} from chain {chain}")]
    MissingUtxo { chain: Id, key: String },

    #[error("insufficient funds for {address}: required {required}, available {available}")]
    InsufficientFunds {
        address: Address,
        required: u128,
        available: u128,
    },

    #[error("invalid nonce for {address}: expected {expected}, got {actual}")]
    InvalidNonce {
        address: Address,
        expected: u64,
        actual: u64,
    },

    #[error("insufficient funds to pay the atomic tx fee")]
    InsufficientFundsForFee,

    #[error("input {0} conflicts with a processing ancestor")]
    ConflictingAncestor(Id),

    #[error("input {input} conflicts with pooled tx {tx}")]
    ConflictingTx { input: Id, tx: Id },

    #[error("atomic mempool is full ({capacity} txs)")]
    MempoolFull { capacity: usize },

    #[error("block carries {count} atomic txs, at most one allowed")]
    TooManyTxs { count: usize },

    #[error("arithmetic overflow in {0}")]
    Overflow(&'static str),

    #[error(transparent)]
    Vm(#[from] VmError),

    #[error(transparent)]
    Codec(#[from] CoreError),

    #[error(transparent)]
    Db(#[from] DbError),
}

impl AtomicTxError {
    /// Classify this failure
    pub fn kind(&self) -> ErrorKind {
        use AtomicTxError::*;
        match self {
            NoImportInputs
            | NoExportOutputs
            | NoAccountOutputs
            | WrongNetworkId { .. }
            | WrongBlockchainId { .. }
            | WrongChainId(_)
            | NonNativeAsset(_)
            | InvalidEntry { .. }
            | InputsNotSortedUnique
            | OutputsNotSortedUnique
            | OutputsNotSorted
            | CredentialCount { .. }
            | SignatureCount { .. }
            | TooManyTxs { .. }
            | Overflow(_)
            | Codec(_) => ErrorKind::Malformed,

            FlowCheck { .. }
            | SignatureMismatch
            | Locked { .. }
            | AssetMismatch { .. }
            | MissingUtxo { .. }
            | InsufficientFunds { .. }
            | InvalidNonce { .. }
            | InsufficientFundsForFee => ErrorKind::Value,

            ConflictingAncestor(_) | ConflictingTx { .. } => ErrorKind::Conflict,

            MempoolFull { .. } | Db(_) => ErrorKind::Transient,

            Vm(err) => match err {
                VmError::InsufficientBalance { .. } | VmError::InvalidNonce { .. } => {
                    ErrorKind::Value
                }
                VmError::MissingBaseFee | VmError::Overflow(_) | VmError::Core(_) => {
                    ErrorKind::Malformed
                }
                _ => ErrorKind::Transient,
            },
        }
    }
}

/// Result type for atomic transaction operations
pub type AtomicResult<T> = Result<T, AtomicTxError>;
