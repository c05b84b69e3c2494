//! Core data structures for the Delta chain
//!
//! This crate provides the building blocks every other crate shares:
//! - Fixed-size identifiers (Hash, Address, Id, ShortId, NodeId)
//! - Transaction and Block structures with the fee and atomic extension fields
//! - The deterministic codec used for hashing
//! - Cryptographic utilities (Keccak256, secp256k1 recovery)
//! - Chain configuration, protocol constants and the rules resolver

pub mod block;
pub mod codec;
pub mod crypto;
pub mod error;
pub mod params;
pub mod transaction;
pub mod types;

// Re-export commonly used types
pub use block::*;
pub use error::*;
pub use params::{ChainConfig, Rules};
pub use transaction::*;
pub use types::*;
