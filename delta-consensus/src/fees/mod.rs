//! Dynamic fee engine and fee distribution

pub mod base_fee;
pub mod block_gas_cost;
pub mod distribution;
pub mod window;

pub use base_fee::{calc_base_fee, estimate_next_base_fee, min_required_tip};
pub use block_gas_cost::calc_block_gas_cost;
pub use distribution::{distribute, FeesDistribution};
pub use window::FeeWindow;
