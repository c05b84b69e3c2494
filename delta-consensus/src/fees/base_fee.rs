//! Base fee calculation from the parent's consumption window

use super::block_gas_cost::calc_block_gas_cost;
use super::window::FeeWindow;
use crate::{ConsensusError, ConsensusResult};
use delta_core::params::protocol::{PHASE3_INITIAL_BASE_FEE, ROLLUP_WINDOW};
use delta_core::params::{ChainConfig, WindowSurcharge};
use delta_core::{Header, Wei};

/// Window and base fee for a child of `parent` produced at `timestamp`.
///
/// The parent's rules decide the parameters. Before Phase3, and for the
/// child of genesis, the result is an empty window and the initial base fee.
pub fn calc_base_fee(
    config: &ChainConfig,
    parent: &Header,
    timestamp: u64,
) -> ConsensusResult<(Vec<u8>, Wei)> {
    let rules = config.rules(parent.number, parent.time);
    let fee = match rules.fee {
        Some(fee) if parent.number != 0 => fee,
        _ => return Ok((FeeWindow::default().to_bytes(), PHASE3_INITIAL_BASE_FEE)),
    };

    let window = FeeWindow::from_bytes(&parent.extra)?;
    if timestamp < parent.time {
        return Err(ConsensusError::TimestampBeforeParent {
            parent: parent.time,
            child: timestamp,
        });
    }
    let parent_base_fee = parent.base_fee.ok_or(ConsensusError::MissingBaseFee)?;

    let roll = timestamp - parent.time;
    let mut window = window.roll(roll);

    if roll < ROLLUP_WINDOW {
        let ext_gas = parent.ext_data_gas_used.unwrap_or(0);
        let surcharge = match fee.surcharge {
            WindowSurcharge::Flat(gas) => gas,
            WindowSurcharge::BlockGasCost => match fee.block_gas_cost {
                Some(params) => calc_block_gas_cost(
                    &params,
                    parent.block_gas_cost,
                    parent.time,
                    timestamp,
                ),
                None => 0,
            },
            WindowSurcharge::None => 0,
        };
        let added = match fee.surcharge {
            // Flat surcharge phases predate atomic gas accounting
            WindowSurcharge::Flat(_) => parent.gas_used.saturating_add(surcharge),
            _ => parent
                .gas_used
                .saturating_add(ext_gas)
                .saturating_add(surcharge),
        };
        window.add((ROLLUP_WINDOW - 1 - roll) as usize, added);
    }

    let total = window.sum();
    let target = fee.target_gas;
    if total == target {
        return Ok((window.to_bytes(), parent_base_fee));
    }

    let delta_of = |gas_delta: u64| -> Wei {
        let scaled = parent_base_fee.saturating_mul(u128::from(gas_delta)) / u128::from(target);
        (scaled / u128::from(fee.change_denominator)).max(1)
    };

    let base_fee = if total > target {
        parent_base_fee.saturating_add(delta_of(total - target))
    } else {
        let mut delta = delta_of(target - total);
        if roll > ROLLUP_WINDOW {
            delta = delta.saturating_mul(u128::from(roll / ROLLUP_WINDOW));
        }
        parent_base_fee.saturating_sub(delta)
    };

    Ok((window.to_bytes(), fee.clamp(base_fee)))
}

/// Read-only estimate of the next base fee. A `timestamp` behind the
/// parent is treated as the parent's own time. Not for persisted blocks.
pub fn estimate_next_base_fee(
    config: &ChainConfig,
    parent: &Header,
    timestamp: u64,
) -> ConsensusResult<(Vec<u8>, Wei)> {
    calc_base_fee(config, parent, timestamp.max(parent.time))
}

/// Minimum tip per gas needed for `header` to cover its block gas cost,
/// `None` before Phase4
pub fn min_required_tip(config: &ChainConfig, header: &Header) -> ConsensusResult<Option<Wei>> {
    if !config.rules(header.number, header.time).is_phase4 {
        return Ok(None);
    }
    let base_fee = header.base_fee.ok_or(ConsensusError::MissingBaseFee)?;
    let block_gas_cost = header
        .block_gas_cost
        .ok_or(ConsensusError::MissingBlockGasCost)?;
    let ext_gas = header
        .ext_data_gas_used
        .ok_or(ConsensusError::MissingExtDataGasUsed)?;

    let required_fee = block_gas_cost
        .checked_mul(base_fee)
        .ok_or(ConsensusError::Overflow("required block fee"))?;
    let gas_used = u128::from(header.gas_used) + u128::from(ext_gas);
    let tip = required_fee
        .checked_div(gas_used)
        .ok_or_else(|| ConsensusError::InvalidBlock("block uses no gas".to_string()))?;
    Ok(Some(tip))
}
