//! Cross-chain atomic transactions
//!
//! Imports consume UTXOs a peer chain exported into shared memory and credit
//! local accounts; exports debit accounts and put new UTXOs into the peer's
//! keyspace. Shared-memory effects only happen when the including block is
//! accepted.

pub mod builder;
pub mod components;
pub mod context;
pub mod error;
pub mod export;
pub mod flow;
pub mod fx;
pub mod import;
pub mod mempool;
pub mod shared_memory;
pub mod tx;

#[cfg(test)]
pub(crate) mod fixtures;

pub use builder::AtomicTxBuilder;
pub use components::{
    AccountInput, AccountOutput, OutputOwners, TransferInput, TransferOutput, TransferableInput,
    TransferableOutput, Utxo, UtxoId,
};
pub use context::{ChainContext, ConflictChecker, SemanticContext, StaticSubnets, SubnetLookup};
pub use error::{AtomicResult, AtomicTxError, ErrorKind};
pub use export::UnsignedExportTx;
pub use flow::FlowChecker;
pub use fx::{Fx, SecpTransferFx};
pub use import::UnsignedImportTx;
pub use mempool::{AtomicMempool, AtomicTxPool};
pub use shared_memory::{
    AtomicRequests, Element, IndexCursor, IndexedPage, MemorySharedMemory, Requests, SharedMemory,
};
pub use tx::{encode_atomic_txs, extract_atomic_txs, Credential, Tx, UnsignedAtomicTx};
