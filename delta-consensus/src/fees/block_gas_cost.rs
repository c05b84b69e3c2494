//! Per-block gas cost surcharge
//!
//! Blocks produced faster than the target rate pay more, slower blocks
//! pay less, in steps per second of deviation.

use delta_core::params::BlockGasCostParams;

/// Block gas cost for a child at `current_time` of a parent with
/// `parent_cost` produced at `parent_time`
pub fn calc_block_gas_cost(
    params: &BlockGasCostParams,
    parent_cost: Option<u128>,
    parent_time: u64,
    current_time: u64,
) -> u64 {
    let Some(parent_cost) = parent_cost else {
        return params.min;
    };

    let elapsed = current_time.saturating_sub(parent_time);
    let step = u128::from(params.step);
    let target = params.target_block_rate;

    let cost = if elapsed < target {
        parent_cost.saturating_add(step * u128::from(target - elapsed))
    } else {
        parent_cost.saturating_sub(step * u128::from(elapsed - target))
    };

    let cost = cost.clamp(u128::from(params.min), u128::from(params.max));
    u64::try_from(cost).unwrap_or(u64::MAX)
}
