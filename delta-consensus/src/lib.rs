//! Fee engines for the Delta chain
//!
//! This crate prices blockspace and splits the fees a block collects:
//! - the rolling consumption window embedded in each header
//! - base fee and block gas cost calculation, plus the estimation variant
//! - verification of a header's fee fields against its parent
//! - distribution of collected fees among LP, governance and validators

pub mod error;
pub mod fees;
pub mod header;

pub use error::{ConsensusError, ConsensusResult};
pub use fees::{
    calc_base_fee, calc_block_gas_cost, distribute, estimate_next_base_fee, min_required_tip,
    FeeWindow, FeesDistribution,
};
pub use header::{verify_block_fee, verify_header_fees, TxFee};
