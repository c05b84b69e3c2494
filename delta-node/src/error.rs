//! Node error types

use crate::atomic_backend::AtomicStatus;
use crate::block::BlockStatus;
use delta_consensus::ConsensusError;
use delta_core::{Address, CoreError, Gas, Hash, Wei};
use delta_db::DbError;
use delta_vm::atomic::AtomicTxError;
use delta_vm::VmError;
use thiserror::Error;

/// Block lifecycle and node errors
#[derive(Error, Debug)]
pub enum NodeError {
    #[error("config error: {reason}")]
    Config { reason: String },

    #[error("found block with unexpected missing extra data ({block}, {height}), expected extra data hash: {expected}")]
    MissingLegacyExtData {
        block: Hash,
        height: u64,
        expected: Hash,
    },

    #[error("extra data hash in block ({block}, {height}): {actual}, did not match the expected extra data hash: {expected}")]
    LegacyExtDataMismatch {
        block: Hash,
        height: u64,
        expected: Hash,
        actual: Hash,
    },

    #[error("extra data hash mismatch: have {have}, want {want}")]
    ExtDataHashMismatch { have: Hash, want: Hash },

    #[error("expected ExtDataHash to be empty but got {0}")]
    UnexpectedExtDataHash(Hash),

    #[error("invalid difficulty: {0}")]
    InvalidDifficulty(u64),

    #[error("invalid block nonce: {0}")]
    InvalidBlockNonce(u64),

    #[error("invalid mix digest: {0}")]
    InvalidMixDigest(Hash),

    #[error("expected gas limit to be {expected} but got {actual}")]
    InvalidGasLimit { expected: Gas, actual: Gas },

    #[error("invalid header extra data size {0}")]
    InvalidExtraSize(usize),

    #[error("invalid version: {0}")]
    InvalidVersion(u32),

    #[error("invalid txs hash {have} does not match calculated txs hash {want}")]
    TxHashMismatch { have: Hash, want: Hash },

    #[error("invalid uncle hash {have} does not match calculated uncle hash {want}")]
    UncleHashMismatch { have: Hash, want: Hash },

    #[error("invalid coinbase {0} does not match required blackhole address")]
    InvalidCoinbase(Address),

    #[error("uncles unsupported")]
    UnclesUnsupported,

    #[error("empty block")]
    EmptyBlock,

    #[error("block contains tx {tx} with gas price too low ({price} < {min})")]
    GasPriceTooLow { tx: Hash, price: Wei, min: Wei },

    #[error("block timestamp is too far in the future: {time} > allowed {max}")]
    FutureBlock { time: u64, max: u64 },

    #[error("nil base fee is invalid after phase 3")]
    MissingBaseFee,

    #[error("nil extDataGasUsed is invalid after phase 4")]
    MissingExtDataGasUsed,

    #[error("too large extDataGasUsed: {0}")]
    ExtDataGasTooLarge(Gas),

    #[error("invalid extDataGasUsed: have {have}, want {want}")]
    ExtDataGasMismatch { have: Gas, want: Gas },

    #[error("nil blockGasCost is invalid after phase 4")]
    MissingBlockGasCost,

    #[error("too large blockGasCost: {0}")]
    BlockGasCostTooLarge(u128),

    #[error("invalid block number: have {have}, want {want}")]
    InvalidNumber { have: u64, want: u64 },

    #[error("invalid gas used: have {have}, want {want}")]
    GasUsedMismatch { have: Gas, want: Gas },

    #[error("invalid state root: have {have}, want {want}")]
    StateRootMismatch { have: Hash, want: Hash },

    #[error("insufficient native asset burned by atomic tx ({burned} < {required})")]
    InsufficientAtomicFee { burned: Wei, required: Wei },

    #[error("arithmetic overflow in {0}")]
    Overflow(&'static str),

    #[error("missing UTXOs: {0}")]
    MissingUtxos(#[source] AtomicTxError),

    #[error("unknown block {0}")]
    UnknownBlock(Hash),

    #[error("unknown parent {0}")]
    UnknownParent(Hash),

    #[error("block {block} is {status}, cannot {op}")]
    InvalidStatus {
        block: Hash,
        status: BlockStatus,
        op: &'static str,
    },

    #[error("atomic state of block {block} is {status}")]
    AtomicStatus { block: Hash, status: AtomicStatus },

    #[error("accepted block {block} has atomic operations not applied to shared memory: {source}")]
    UnappliedAtomicOps {
        block: Hash,
        source: Box<NodeError>,
    },

    #[error("accepted atomic operations await replay")]
    ReplayRequired,

    #[error("block {block} does not extend last accepted block {last_accepted}")]
    NotLastAcceptedChild { block: Hash, last_accepted: Hash },

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Consensus(#[from] ConsensusError),

    #[error(transparent)]
    Vm(#[from] VmError),

    #[error(transparent)]
    Atomic(#[from] AtomicTxError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for NodeError {
    fn from(err: config::ConfigError) -> Self {
        NodeError::Config {
            reason: err.to_string(),
        }
    }
}

/// Result type for node operations
pub type NodeResult<T> = Result<T, NodeError>;
