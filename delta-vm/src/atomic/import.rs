//! Import: consume UTXOs another chain exported to us and credit accounts

use super::components::{
    is_sorted_and_unique_by, is_sorted_by, AccountOutput, TransferableInput, Utxo,
};
use super::context::{ChainContext, SemanticContext};
use super::flow::FlowChecker;
use super::shared_memory::Requests;
use super::tx::Tx;
use super::{AtomicResult, AtomicTxError};
use crate::gas::calculate_dynamic_fee;
use crate::state::StateDB;
use delta_core::params::protocol::{
    ATOMIC_TX_BASE_COST, ATOMIC_TX_FLAT_FEE, TX_BYTES_GAS, X2C_RATE,
};
use delta_core::{Gas, Id, Rules};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct UnsignedImportTx {
    pub network_id: u32,
    pub blockchain_id: Id,
    /// Chain the consumed UTXOs were exported from
    pub source_chain: Id,
    pub imported_inputs: Vec<TransferableInput>,
    pub outs: Vec<AccountOutput>,
}

impl UnsignedImportTx {
    pub fn verify(&self, ctx: &ChainContext, rules: &Rules) -> AtomicResult<()> {
        if self.imported_inputs.is_empty() {
            return Err(AtomicTxError::NoImportInputs);
        }
        if self.network_id != ctx.network_id {
            return Err(AtomicTxError::WrongNetworkId {
                expected: ctx.network_id,
                actual: self.network_id,
            });
        }
        if self.blockchain_id != ctx.chain_id {
            return Err(AtomicTxError::WrongBlockchainId {
                expected: ctx.chain_id,
                actual: self.blockchain_id,
            });
        }
        if rules.is_phase3 && self.outs.is_empty() {
            return Err(AtomicTxError::NoAccountOutputs);
        }
        ctx.verify_peer_chain(&self.source_chain, rules)?;

        for out in &self.outs {
            out.verify()?;
            if rules.is_banff && out.asset_id != ctx.native_asset_id {
                return Err(AtomicTxError::NonNativeAsset("import output"));
            }
        }
        for input in &self.imported_inputs {
            input.verify()?;
            if rules.is_banff && input.asset_id != ctx.native_asset_id {
                return Err(AtomicTxError::NonNativeAsset("import input"));
            }
        }
        if !is_sorted_and_unique_by(&self.imported_inputs, |i| i.utxo_id) {
            return Err(AtomicTxError::InputsNotSortedUnique);
        }

        if rules.is_phase2 {
            if !is_sorted_and_unique_by(&self.outs, AccountOutput::sort_key) {
                return Err(AtomicTxError::OutputsNotSortedUnique);
            }
        } else if rules.is_phase1 && !is_sorted_by(&self.outs, AccountOutput::sort_key) {
            return Err(AtomicTxError::OutputsNotSorted);
        }
        Ok(())
    }

    pub fn input_utxos(&self) -> BTreeSet<Id> {
        self.imported_inputs
            .iter()
            .map(TransferableInput::input_id)
            .collect()
    }

    /// Gas for a signed encoding of `signed_len` bytes
    pub fn gas_used(&self, signed_len: usize, fixed_fee: bool) -> AtomicResult<Gas> {
        let overflow = || AtomicTxError::Overflow("import gas");
        let mut gas = (signed_len as u64)
            .checked_mul(TX_BYTES_GAS)
            .ok_or_else(overflow)?;
        for input in &self.imported_inputs {
            gas = gas.checked_add(input.input.cost()?).ok_or_else(overflow)?;
        }
        if fixed_fee {
            gas = gas.checked_add(ATOMIC_TX_BASE_COST).ok_or_else(overflow)?;
        }
        Ok(gas)
    }

    pub fn burned(&self, asset: &Id) -> AtomicResult<u64> {
        let overflow = || AtomicTxError::Overflow("import burned amount");
        let mut input = 0u64;
        for i in self.imported_inputs.iter().filter(|i| i.asset_id == *asset) {
            input = input.checked_add(i.input.amount).ok_or_else(overflow)?;
        }
        let mut spent = 0u64;
        for out in self.outs.iter().filter(|o| o.asset_id == *asset) {
            spent = spent.checked_add(out.amount).ok_or_else(overflow)?;
        }
        input.checked_sub(spent).ok_or_else(overflow)
    }

    pub fn semantic_verify(&self, stx: &Tx, env: &SemanticContext<'_>) -> AtomicResult<()> {
        let rules = env.rules;
        let native = env.chain.native_asset_id;
        self.verify(env.chain, rules)?;

        let mut flow = FlowChecker::new();
        if rules.is_phase3 {
            let gas = stx.gas_used(rules.is_phase5)?;
            flow.produce(native, calculate_dynamic_fee(gas, env.base_fee)?);
        } else if rules.is_phase2 {
            flow.produce(native, ATOMIC_TX_FLAT_FEE);
        }
        for out in &self.outs {
            flow.produce(out.asset_id, out.amount);
        }
        for input in &self.imported_inputs {
            flow.consume(input.asset_id, input.input.amount);
        }
        flow.verify()?;

        stx.check_credential_count()?;
        if !env.bootstrapped {
            return Ok(());
        }

        let keys: Vec<Vec<u8>> = self
            .imported_inputs
            .iter()
            .map(|i| i.input_id().as_bytes().to_vec())
            .collect();
        let values = env.shared_memory.get(&self.source_chain, &keys)?;
        let unsigned = stx.unsigned.bytes()?;

        for ((input, value), cred) in self.imported_inputs.iter().zip(&values).zip(&stx.creds) {
            let utxo = Utxo::from_bytes(value)?;
            if utxo.asset_id != input.asset_id {
                return Err(AtomicTxError::AssetMismatch {
                    utxo: utxo.asset_id,
                    input: input.asset_id,
                });
            }
            env.fx
                .verify_transfer(&unsigned, &input.input, cred, &utxo.output)?;
        }

        env.conflicts.check_conflicts(&self.input_utxos(), &env.parent)
    }

    /// Consume the imported UTXOs from the source chain's keyspace
    pub fn atomic_ops(&self) -> (Id, Requests) {
        let remove_requests = self
            .imported_inputs
            .iter()
            .map(|i| i.input_id().as_bytes().to_vec())
            .collect();
        (
            self.source_chain,
            Requests {
                remove_requests,
                put_requests: Vec::new(),
            },
        )
    }

    /// Credit every output; native amounts scale to the account denomination
    pub fn state_transfer(&self, ctx: &ChainContext, state: &mut dyn StateDB) -> AtomicResult<()> {
        for out in &self.outs {
            if out.asset_id == ctx.native_asset_id {
                let amount = u128::from(out.amount)
                    .checked_mul(u128::from(X2C_RATE))
                    .ok_or(AtomicTxError::Overflow("import amount"))?;
                debug!(address = %out.address, amount, "crediting imported native funds");
                state.add_balance(out.address, amount)?;
            } else {
                debug!(address = %out.address, asset = %out.asset_id, amount = out.amount, "crediting imported asset");
                state.add_multicoin(out.address, out.asset_id, u128::from(out.amount))?;
            }
        }
        Ok(())
    }
}
