//! Protocol parameters: constants, chain configuration and the rules
//! resolved from it

pub mod compat;
pub mod config;
pub mod protocol;
pub mod rules;

pub use compat::ConfigCompatError;
pub use config::{
    is_block_forked, is_timestamp_forked, ChainConfig, FeeAllocation, OrionContractConfig,
    Upgrade,
};
pub use rules::{BlockGasCostParams, FeeRules, Rules, WindowSurcharge};
