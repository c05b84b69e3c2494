//! Fee distribution
//!
//! Splits the base fee and priority fee a block collected between the
//! liquidity-provider pool, governance and the Orion validator set. The
//! validators are paid out of the governance share of the base fee and a
//! separate fraction of the priority fee. Every division truncates and the
//! residue stays with the remaining base or priority fee, so no value is
//! created or lost. The validator share of the base fee is divided by the
//! validator count before the allocation denominator; the order decides
//! which unit the truncation drops.

use crate::{ConsensusError, ConsensusResult};
use delta_core::params::FeeAllocation;
use delta_core::{Rules, Wei};

/// Outcome of splitting one block's fees
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeesDistribution {
    /// Base fee left after every allocation
    pub base_fee: Wei,
    /// Priority fee retained by the block producer
    pub priority_fee: Wei,
    pub lp: Wei,
    pub governance: Wei,
    /// Amount paid to each validator
    pub orion_fee: Wei,
    /// Validator aggregate taken from the base fee
    pub orion_from_base_fee: Wei,
    /// Validator aggregate taken from the priority fee
    pub orion_from_priority_fee: Wei,
}

fn fraction(total: Wei, numerator: u64, allocation: &FeeAllocation) -> ConsensusResult<Wei> {
    total
        .checked_mul(u128::from(numerator))
        .map(|scaled| scaled / u128::from(allocation.denominator))
        .ok_or(ConsensusError::Overflow("fee allocation"))
}

/// Split `base_fee_total` and `priority_fee_total` among the pools under
/// the allocation in `rules`, with `validators` Orion nodes
pub fn distribute(
    base_fee_total: Wei,
    priority_fee_total: Wei,
    validators: u64,
    rules: &Rules,
) -> ConsensusResult<FeesDistribution> {
    let allocation = &rules.fee_allocation;
    if allocation.denominator == 0 {
        return Err(ConsensusError::Overflow("fee allocation with zero denominator"));
    }
    let count = u128::from(validators);

    let lp = fraction(base_fee_total, allocation.lp, allocation)?;
    let gov_and_orion = fraction(base_fee_total, allocation.governance, allocation)?;

    // Capped fraction scales the fee, then is split per validator before
    // the denominator divides it out
    let (governance, orion_from_base_fee) = if validators == 0 {
        (gov_and_orion, 0)
    } else {
        let summary = allocation
            .orion
            .saturating_mul(validators)
            .min(allocation.max_orion);
        let share = base_fee_total
            .checked_mul(u128::from(summary))
            .ok_or(ConsensusError::Overflow("orion allocation"))?
            / count;
        let aggregate = (share * count / u128::from(allocation.denominator)).min(gov_and_orion);
        (gov_and_orion - aggregate, aggregate)
    };

    let (priority_fee, orion_from_priority_fee) = if validators == 0 {
        (priority_fee_total, 0)
    } else {
        let pool = fraction(priority_fee_total, allocation.priority_fee_orion, allocation)?;
        let aggregate = pool / count * count;
        (priority_fee_total - aggregate, aggregate)
    };

    let orion_total = orion_from_base_fee + orion_from_priority_fee;
    let orion_fee = if orion_total > 0 { orion_total / count } else { 0 };

    let base_fee = base_fee_total
        .checked_sub(lp)
        .and_then(|rest| rest.checked_sub(governance))
        .and_then(|rest| rest.checked_sub(orion_from_base_fee))
        .ok_or(ConsensusError::Overflow("remaining base fee"))?;

    Ok(FeesDistribution {
        base_fee,
        priority_fee,
        lp,
        governance,
        orion_fee,
        orion_from_base_fee,
        orion_from_priority_fee,
    })
}
