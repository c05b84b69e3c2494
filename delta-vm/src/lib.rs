//! Execution and atomic transactions for the Delta chain
//!
//! This crate provides:
//! - The account model and the `StateDB` seam with an in-memory backend
//! - Transaction execution through the `TransactionExecutor` seam
//! - Atomic gas accounting and the dynamic atomic fee
//! - Import/export transactions, shared memory and the atomic mempool
//! - The Orion validator list read from contract storage

pub mod account;
pub mod atomic;
pub mod error;
pub mod executor;
pub mod gas;
pub mod orion;
pub mod state;

pub use account::Account;
pub use error::{VmError, VmResult};
pub use executor::{ExecutionContext, Receipt, TransactionExecutor, TransferExecutor};
pub use gas::{calculate_dynamic_fee, AtomicGasSchedule, GasMeter};
pub use orion::OrionNodesGetter;
pub use state::{MemoryStateDB, SharedStateDB, StateDB};
