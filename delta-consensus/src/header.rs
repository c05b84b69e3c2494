//! Header fee field verification

use crate::fees::{calc_base_fee, calc_block_gas_cost};
use crate::{ConsensusError, ConsensusResult};
use delta_core::{ChainConfig, Gas, Header, Wei};
use tracing::trace;

/// Gas and effective tip per gas of one executed transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxFee {
    pub gas_used: Gas,
    pub tip: Wei,
}

/// Check the window, base fee and block gas cost of `header` against the
/// values its `parent` implies
pub fn verify_header_fees(
    config: &ChainConfig,
    parent: &Header,
    header: &Header,
) -> ConsensusResult<()> {
    let rules = config.rules(header.number, header.time);

    if !rules.is_phase3 {
        if header.base_fee.is_some() {
            return Err(ConsensusError::UnexpectedField("baseFee"));
        }
    } else {
        let base_fee = header.base_fee.ok_or(ConsensusError::MissingBaseFee)?;
        let (window, expected) = calc_base_fee(config, parent, header.time)?;
        if header.extra != window {
            return Err(ConsensusError::WindowMismatch {
                expected: hex::encode(&window),
                actual: hex::encode(&header.extra),
            });
        }
        if base_fee != expected {
            return Err(ConsensusError::BaseFeeMismatch {
                expected,
                actual: base_fee,
            });
        }
    }

    match rules.block_gas_cost() {
        None => {
            if header.block_gas_cost.is_some() {
                return Err(ConsensusError::UnexpectedField("blockGasCost"));
            }
        }
        Some(params) => {
            let actual = header
                .block_gas_cost
                .ok_or(ConsensusError::MissingBlockGasCost)?;
            let expected = u128::from(calc_block_gas_cost(
                &params,
                parent.block_gas_cost,
                parent.time,
                header.time,
            ));
            if actual != expected {
                return Err(ConsensusError::BlockGasCostMismatch { expected, actual });
            }
        }
    }

    trace!(number = header.number, time = header.time, "header fee fields verified");
    Ok(())
}

/// Check that the tips in a block, plus whatever the atomic transactions
/// paid above their own gas, cover `required_block_gas_cost` at `base_fee`
pub fn verify_block_fee(
    base_fee: Wei,
    required_block_gas_cost: u128,
    txs: &[TxFee],
    extra_contribution: Wei,
) -> ConsensusResult<()> {
    if base_fee == 0 {
        return Err(ConsensusError::MissingBaseFee);
    }

    let mut total_fee = extra_contribution;
    for tx in txs {
        let paid = u128::from(tx.gas_used)
            .checked_mul(tx.tip)
            .ok_or(ConsensusError::Overflow("block fee contribution"))?;
        total_fee = total_fee
            .checked_add(paid)
            .ok_or(ConsensusError::Overflow("block fee contribution"))?;
    }

    let block_gas = total_fee / base_fee;
    if block_gas < required_block_gas_cost {
        return Err(ConsensusError::InsufficientBlockFee {
            block_gas,
            required: required_block_gas_cost,
            base_fee,
        });
    }
    Ok(())
}
