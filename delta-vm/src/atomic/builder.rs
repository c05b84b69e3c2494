//! Wallet-side construction of signed atomic transactions

use super::components::{
    AccountInput, AccountOutput, OutputOwners, TransferInput, TransferOutput, TransferableInput,
    TransferableOutput, Utxo,
};
use super::context::ChainContext;
use super::export::UnsignedExportTx;
use super::import::UnsignedImportTx;
use super::shared_memory::{IndexCursor, SharedMemory};
use super::tx::{Tx, UnsignedAtomicTx};
use super::{AtomicResult, AtomicTxError};
use crate::gas::calculate_dynamic_fee;
use crate::state::StateDB;
use delta_core::crypto::address_of;
use delta_core::params::protocol::{ATOMIC_TX_FLAT_FEE, X2C_RATE};
use delta_core::{Address, Id, Rules, ShortId, Wei};
use std::collections::BTreeMap;
use tracing::debug;

/// UTXOs fetched per shared-memory page
const UTXO_PAGE_SIZE: usize = 1024;

type PrivateKey = [u8; 32];

/// Builds import and export txs for a set of keys
pub struct AtomicTxBuilder<'a> {
    ctx: &'a ChainContext,
    rules: Rules,
    base_fee: Option<Wei>,
    now: u64,
}

impl<'a> AtomicTxBuilder<'a> {
    /// Builder for a block with `rules` and `base_fee`
    pub fn new(ctx: &'a ChainContext, rules: Rules, base_fee: Option<Wei>) -> Self {
        Self {
            ctx,
            rules,
            base_fee,
            now: chrono::Utc::now().timestamp().max(0) as u64,
        }
    }

    /// Evaluate UTXO locktimes against `now`
    pub fn with_time(mut self, now: u64) -> Self {
        self.now = now;
        self
    }

    /// Fee the tx must burn in the native asset
    fn fee_for(&self, tx: &Tx) -> AtomicResult<u64> {
        if self.rules.is_phase3 {
            let gas = tx.gas_used(self.rules.is_phase5)?;
            Ok(calculate_dynamic_fee(gas, self.base_fee)?)
        } else if self.rules.is_phase2 {
            Ok(ATOMIC_TX_FLAT_FEE)
        } else {
            Ok(0)
        }
    }

    fn sign(unsigned: UnsignedAtomicTx, signers: &[Vec<PrivateKey>]) -> AtomicResult<Tx> {
        let mut tx = Tx::new(unsigned);
        tx.sign(signers)?;
        Ok(tx)
    }

    /// Import every spendable UTXO `keys` own on `source_chain` into `to`,
    /// paying the fee out of the native amount
    pub fn new_import_tx(
        &self,
        shared_memory: &dyn SharedMemory,
        source_chain: Id,
        to: Address,
        keys: &[PrivateKey],
    ) -> AtomicResult<Tx> {
        let mut owners: BTreeMap<ShortId, PrivateKey> = BTreeMap::new();
        for key in keys {
            owners.insert(ShortId::new(*address_of(key)?.as_bytes()), *key);
        }
        let traits: Vec<Vec<u8>> = owners.keys().map(|o| o.as_bytes().to_vec()).collect();

        let mut utxos = Vec::new();
        let mut cursor: Option<IndexCursor> = None;
        loop {
            let page = shared_memory.indexed(&source_chain, &traits, cursor.as_ref(), UTXO_PAGE_SIZE)?;
            let full = page.values.len() == UTXO_PAGE_SIZE;
            for value in &page.values {
                utxos.push(Utxo::from_bytes(value)?);
            }
            if !full {
                break;
            }
            cursor = page.last;
        }

        let native = self.ctx.native_asset_id;
        let mut spends: Vec<(TransferableInput, PrivateKey)> = Vec::new();
        let mut totals: BTreeMap<Id, u64> = BTreeMap::new();
        for utxo in utxos {
            if self.rules.is_banff && utxo.asset_id != native {
                continue;
            }
            let out = &utxo.output.owners;
            if out.threshold != 1 || out.locktime > self.now {
                continue;
            }
            let Some((index, key)) = out
                .addrs
                .iter()
                .enumerate()
                .find_map(|(i, addr)| owners.get(addr).map(|key| (i, *key)))
            else {
                continue;
            };

            let total = totals.entry(utxo.asset_id).or_insert(0);
            *total = total
                .checked_add(utxo.output.amount)
                .ok_or(AtomicTxError::Overflow("imported amount"))?;
            spends.push((
                TransferableInput {
                    utxo_id: utxo.utxo_id,
                    asset_id: utxo.asset_id,
                    input: TransferInput {
                        amount: utxo.output.amount,
                        sig_indices: vec![index as u32],
                    },
                },
                key,
            ));
        }
        if spends.is_empty() {
            return Err(AtomicTxError::NoImportInputs);
        }
        spends.sort_by_key(|(input, _)| input.utxo_id);
        let (imported_inputs, keys): (Vec<_>, Vec<_>) = spends.into_iter().unzip();
        let signers: Vec<Vec<PrivateKey>> = keys.into_iter().map(|k| vec![k]).collect();

        let native_total = totals.remove(&native).unwrap_or(0);
        let mut outs: Vec<AccountOutput> = totals
            .into_iter()
            .map(|(asset_id, amount)| AccountOutput {
                address: to,
                amount,
                asset_id,
            })
            .collect();

        let unsigned = |outs: Vec<AccountOutput>| {
            UnsignedAtomicTx::Import(UnsignedImportTx {
                network_id: self.ctx.network_id,
                blockchain_id: self.ctx.chain_id,
                source_chain,
                imported_inputs: imported_inputs.clone(),
                outs,
            })
        };

        // Encoded length does not depend on amounts, so the draft prices the
        // final tx exactly
        let mut draft_outs = outs.clone();
        draft_outs.push(AccountOutput {
            address: to,
            amount: native_total,
            asset_id: native,
        });
        let fee = self.fee_for(&Self::sign(unsigned(draft_outs), &signers)?)?;
        let remaining = native_total
            .checked_sub(fee)
            .ok_or(AtomicTxError::InsufficientFundsForFee)?;
        if remaining > 0 {
            outs.push(AccountOutput {
                address: to,
                amount: remaining,
                asset_id: native,
            });
        }
        outs.sort_by_key(AccountOutput::sort_key);

        let tx = Self::sign(unsigned(outs), &signers)?;
        tx.unsigned.verify(self.ctx, &self.rules)?;
        debug!(%source_chain, inputs = signers.len(), fee, "built import tx");
        Ok(tx)
    }

    /// Export `amount` of `asset` to `to` on `destination_chain`, funded
    /// from the accounts of `keys` in order
    pub fn new_export_tx(
        &self,
        state: &dyn StateDB,
        asset: Id,
        amount: u64,
        destination_chain: Id,
        to: ShortId,
        keys: &[PrivateKey],
    ) -> AtomicResult<Tx> {
        let exported_outputs = vec![TransferableOutput {
            asset_id: asset,
            output: TransferOutput {
                amount,
                owners: OutputOwners::single(to),
            },
        }];

        // Each round funds the fee of the previous draft; more inputs only
        // ever raise the fee, so the loop settles within a few rounds
        let mut fee = 0u64;
        for _ in 0..=keys.len() + 1 {
            let (ins, signers) = self.select_inputs(state, asset, amount, fee, keys)?;
            let tx = Self::sign(
                UnsignedAtomicTx::Export(UnsignedExportTx {
                    network_id: self.ctx.network_id,
                    blockchain_id: self.ctx.chain_id,
                    destination_chain,
                    ins,
                    exported_outputs: exported_outputs.clone(),
                }),
                &signers,
            )?;
            let required = self.fee_for(&tx)?;
            if required <= fee {
                tx.unsigned.verify(self.ctx, &self.rules)?;
                debug!(%destination_chain, amount, fee, "built export tx");
                return Ok(tx);
            }
            fee = required;
        }
        Err(AtomicTxError::InsufficientFundsForFee)
    }

    /// Account inputs covering `amount` of `asset` plus `fee` of the
    /// native asset, one per (address, asset), sorted
    fn select_inputs(
        &self,
        state: &dyn StateDB,
        asset: Id,
        amount: u64,
        fee: u64,
        keys: &[PrivateKey],
    ) -> AtomicResult<(Vec<AccountInput>, Vec<Vec<PrivateKey>>)> {
        let native = self.ctx.native_asset_id;
        let mut needs: BTreeMap<Id, u64> = BTreeMap::new();
        if asset == native {
            let total = amount
                .checked_add(fee)
                .ok_or(AtomicTxError::Overflow("export amount"))?;
            needs.insert(native, total);
        } else {
            needs.insert(asset, amount);
            if fee > 0 {
                needs.insert(native, fee);
            }
        }
        let wanted = needs.clone();

        let mut selected: Vec<(AccountInput, PrivateKey)> = Vec::new();
        for key in keys {
            let address = address_of(key)?;
            let nonce = state.nonce(&address)?;
            for (asset_id, remaining) in needs.iter_mut().filter(|(_, r)| **r > 0) {
                let available = if *asset_id == native {
                    state.balance(&address)? / Wei::from(X2C_RATE)
                } else {
                    state.multicoin_balance(&address, asset_id)?
                };
                let take = u64::try_from(available).unwrap_or(u64::MAX).min(*remaining);
                if take == 0 {
                    continue;
                }
                *remaining -= take;
                selected.push((
                    AccountInput {
                        address,
                        amount: take,
                        asset_id: *asset_id,
                        nonce,
                    },
                    *key,
                ));
            }
        }

        if let Some((asset_id, remaining)) = needs.iter().find(|(_, r)| **r > 0) {
            let fee_only = *asset_id == native && (asset != native || *remaining <= fee);
            if fee_only {
                return Err(AtomicTxError::InsufficientFundsForFee);
            }
            let required = wanted.get(asset_id).copied().unwrap_or(0);
            let from = match keys.first() {
                Some(key) => address_of(key)?,
                None => Address::zero(),
            };
            return Err(AtomicTxError::InsufficientFunds {
                address: from,
                required: u128::from(required),
                available: u128::from(required - remaining),
            });
        }

        selected.sort_by_key(|(input, _)| input.sort_key());
        Ok(selected
            .into_iter()
            .map(|(input, key)| (input, vec![key]))
            .unzip())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::Account;
    use crate::atomic::fixtures::*;
    use crate::state::MemoryStateDB;
    use delta_core::params::Upgrade;
    use delta_core::ChainConfig;

    #[test]
    fn test_import_builder_spends_owned_utxos() {
        let harness = Harness::new();
        let rules = latest_rules();
        harness.fund(1, NATIVE, 600_000, short_id(&KEY));
        harness.fund(2, NATIVE, 400_000, short_id(&KEY));
        harness.fund(3, NATIVE, 5_000_000, short_id(&OTHER_KEY));

        let builder = AtomicTxBuilder::new(&harness.ctx, rules.clone(), Some(BASE_FEE)).with_time(NOW);
        let tx = builder
            .new_import_tx(&harness.memory, X_CHAIN_ID, address(&KEY), &[KEY])
            .unwrap();
        tx.semantic_verify(&harness.semantic(&rules, true)).unwrap();

        let UnsignedAtomicTx::Import(unsigned) = &tx.unsigned else {
            panic!("expected import");
        };
        assert_eq!(unsigned.imported_inputs.len(), 2);
        assert_eq!(unsigned.outs.len(), 1);
        let fee = builder.fee_for(&tx).unwrap();
        assert_eq!(unsigned.outs[0].amount, 1_000_000 - fee);
        assert_eq!(unsigned.burned(&NATIVE).unwrap(), fee);
    }

    #[test]
    fn test_import_builder_fee_shortfall() {
        let harness = Harness::new();
        harness.fund(1, NATIVE, 10, short_id(&KEY));
        let builder = AtomicTxBuilder::new(&harness.ctx, latest_rules(), Some(BASE_FEE)).with_time(NOW);
        assert!(matches!(
            builder.new_import_tx(&harness.memory, X_CHAIN_ID, address(&KEY), &[KEY]),
            Err(AtomicTxError::InsufficientFundsForFee)
        ));
        assert!(matches!(
            builder.new_import_tx(&harness.memory, X_CHAIN_ID, address(&KEY), &[OTHER_KEY]),
            Err(AtomicTxError::NoImportInputs)
        ));
    }

    #[test]
    fn test_export_builder_pays_fee() {
        let harness = Harness::new();
        let rules = latest_rules();
        let units = |n: u64| Wei::from(n) * Wei::from(X2C_RATE);
        let mut state = MemoryStateDB::with_accounts([
            (address(&KEY), Account::with_balance(units(300_000))),
            (address(&OTHER_KEY), Account::with_balance(units(1_000_000))),
        ]);

        let builder = AtomicTxBuilder::new(&harness.ctx, rules.clone(), Some(BASE_FEE));
        let tx = builder
            .new_export_tx(&state, NATIVE, 500_000, X_CHAIN_ID, short_id(&KEY), &[KEY, OTHER_KEY])
            .unwrap();
        tx.semantic_verify(&harness.semantic(&rules, true)).unwrap();

        let UnsignedAtomicTx::Export(unsigned) = &tx.unsigned else {
            panic!("expected export");
        };
        assert_eq!(unsigned.ins.len(), 2);
        let fee = builder.fee_for(&tx).unwrap();
        assert!(unsigned.burned(&NATIVE).unwrap() >= fee);

        tx.state_transfer(&harness.ctx, &mut state).unwrap();
        assert_eq!(state.balance(&address(&KEY)).unwrap(), 0);
        assert_eq!(state.nonce(&address(&OTHER_KEY)).unwrap(), 1);
    }

    #[test]
    fn test_export_builder_insufficient() {
        let harness = Harness::new();
        let units = |n: u64| Wei::from(n) * Wei::from(X2C_RATE);
        let state =
            MemoryStateDB::with_accounts([(address(&KEY), Account::with_balance(units(1_000)))]);

        let builder = AtomicTxBuilder::new(&harness.ctx, latest_rules(), Some(BASE_FEE));
        assert!(matches!(
            builder.new_export_tx(&state, NATIVE, 5_000, X_CHAIN_ID, short_id(&KEY), &[KEY]),
            Err(AtomicTxError::InsufficientFunds { required: 5_000, available: 1_000, .. })
        ));
        assert!(matches!(
            builder.new_export_tx(&state, NATIVE, 1_000, X_CHAIN_ID, short_id(&KEY), &[KEY]),
            Err(AtomicTxError::InsufficientFundsForFee)
        ));
    }

    #[test]
    fn test_flat_fee_export() {
        let harness = Harness::new();
        let rules = ChainConfig::test_through(Upgrade::Phase2).rules(0, 0);
        let units = |n: u64| Wei::from(n) * Wei::from(X2C_RATE);
        let state = MemoryStateDB::with_accounts([(
            address(&KEY),
            Account::with_balance(units(ATOMIC_TX_FLAT_FEE + 100)),
        )]);
        let builder = AtomicTxBuilder::new(&harness.ctx, rules, None);
        let tx = builder
            .new_export_tx(&state, NATIVE, 100, X_CHAIN_ID, short_id(&KEY), &[KEY])
            .unwrap();
        let UnsignedAtomicTx::Export(unsigned) = &tx.unsigned else {
            panic!("expected export");
        };
        assert_eq!(unsigned.ins[0].amount, ATOMIC_TX_FLAT_FEE + 100);
    }
}
