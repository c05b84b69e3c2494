//! Block lifecycle and node services for the Delta chain
//!
//! This crate provides:
//! - Syntactic block verification and the verify/accept/reject lifecycle
//! - Chain state over processing blocks, with block building
//! - Two-phase settlement of atomic effects into shared memory
//! - The gas price updater keyed to upgrade activation times
//! - Layered node configuration and logging setup

pub mod atomic_backend;
pub mod block;
pub mod chain;
pub mod config;
pub mod error;
pub mod gas_price;
pub mod logging;
pub mod validator;
pub mod vm;

#[cfg(test)]
pub(crate) mod testing;

pub use atomic_backend::{AtomicBackend, AtomicStatus, Settlement};
pub use block::{BlockStatus, VmBlock};
pub use chain::{ChainState, Genesis};
pub use config::NodeConfig;
pub use error::{NodeError, NodeResult};
pub use gas_price::{GasPriceHints, GasPriceSetter, GasPriceUpdater};
pub use vm::{DeltaVm, VmContext};
