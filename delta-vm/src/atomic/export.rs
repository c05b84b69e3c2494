//! Export: debit accounts and create UTXOs on a destination chain

use super::components::{
    is_sorted_and_unique_by, is_sorted_by, AccountInput, TransferableOutput, Utxo, UtxoId,
};
use super::context::{ChainContext, SemanticContext};
use super::flow::FlowChecker;
use super::shared_memory::{Element, Requests};
use super::tx::Tx;
use super::{AtomicResult, AtomicTxError};
use crate::gas::calculate_dynamic_fee;
use crate::state::StateDB;
use delta_core::crypto::recover_address;
use delta_core::params::protocol::{
    ATOMIC_TX_BASE_COST, ATOMIC_TX_FLAT_FEE, COST_PER_SIGNATURE, TX_BYTES_GAS, X2C_RATE,
};
use delta_core::{Address, Gas, Id, Nonce, Rules};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct UnsignedExportTx {
    pub network_id: u32,
    pub blockchain_id: Id,
    /// Chain receiving the exported outputs
    pub destination_chain: Id,
    pub ins: Vec<AccountInput>,
    pub exported_outputs: Vec<TransferableOutput>,
}

impl UnsignedExportTx {
    pub fn verify(&self, ctx: &ChainContext, rules: &Rules) -> AtomicResult<()> {
        if self.exported_outputs.is_empty() {
            return Err(AtomicTxError::NoExportOutputs);
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
        ctx.verify_peer_chain(&self.destination_chain, rules)?;

        for input in &self.ins {
            input.verify()?;
            if rules.is_banff && input.asset_id != ctx.native_asset_id {
                return Err(AtomicTxError::NonNativeAsset("export input"));
            }
        }
        for out in &self.exported_outputs {
            out.verify()?;
            if out.asset_id != ctx.native_asset_id {
                if self.destination_chain == ctx.omega_chain_id {
                    return Err(AtomicTxError::WrongChainId(self.destination_chain));
                }
                if rules.is_banff {
                    return Err(AtomicTxError::NonNativeAsset("export output"));
                }
            }
        }
        if !is_sorted_by(&self.exported_outputs, TransferableOutput::sort_key) {
            return Err(AtomicTxError::OutputsNotSorted);
        }
        if rules.is_phase1 && !is_sorted_and_unique_by(&self.ins, AccountInput::sort_key) {
            return Err(AtomicTxError::InputsNotSortedUnique);
        }
        Ok(())
    }

    pub fn input_utxos(&self) -> BTreeSet<Id> {
        self.ins.iter().map(AccountInput::input_id).collect()
    }

    /// Gas for a signed encoding of `signed_len` bytes
    pub fn gas_used(&self, signed_len: usize, fixed_fee: bool) -> AtomicResult<Gas> {
        let overflow = || AtomicTxError::Overflow("export gas");
        let bytes = (signed_len as u64)
            .checked_mul(TX_BYTES_GAS)
            .ok_or_else(overflow)?;
        let sigs = (self.ins.len() as u64)
            .checked_mul(COST_PER_SIGNATURE)
            .ok_or_else(overflow)?;
        let mut gas = bytes.checked_add(sigs).ok_or_else(overflow)?;
        if fixed_fee {
            gas = gas.checked_add(ATOMIC_TX_BASE_COST).ok_or_else(overflow)?;
        }
        Ok(gas)
    }

    pub fn burned(&self, asset: &Id) -> AtomicResult<u64> {
        let overflow = || AtomicTxError::Overflow("export burned amount");
        let mut input = 0u64;
        for i in self.ins.iter().filter(|i| i.asset_id == *asset) {
            input = input.checked_add(i.amount).ok_or_else(overflow)?;
        }
        let mut spent = 0u64;
        for out in self.exported_outputs.iter().filter(|o| o.asset_id == *asset) {
            spent = spent.checked_add(out.output.amount).ok_or_else(overflow)?;
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
        for out in &self.exported_outputs {
            flow.produce(out.asset_id, out.output.amount);
        }
        for input in &self.ins {
            flow.consume(input.asset_id, input.amount);
        }
        flow.verify()?;

        stx.check_credential_count()?;
        let digest = stx.unsigned.signing_hash()?;
        for (input, cred) in self.ins.iter().zip(&stx.creds) {
            let [sig] = cred.sigs.as_slice() else {
                return Err(AtomicTxError::SignatureCount {
                    expected: 1,
                    actual: cred.sigs.len(),
                });
            };
            if recover_address(&digest, sig)? != input.address {
                return Err(AtomicTxError::SignatureMismatch);
            }
        }
        Ok(())
    }

    /// Put one UTXO per exported output into the destination chain's
    /// keyspace, indexed by its owners
    pub fn atomic_ops(&self, tx_id: Id) -> AtomicResult<(Id, Requests)> {
        let mut put_requests = Vec::with_capacity(self.exported_outputs.len());
        for (index, out) in self.exported_outputs.iter().enumerate() {
            let index = u32::try_from(index).map_err(|_| AtomicTxError::Overflow("output index"))?;
            let utxo = Utxo {
                utxo_id: UtxoId::new(tx_id, index),
                asset_id: out.asset_id,
                output: out.output.clone(),
            };
            put_requests.push(Element {
                key: utxo.input_id().as_bytes().to_vec(),
                value: utxo.to_bytes()?,
                traits: out
                    .output
                    .owners
                    .addrs
                    .iter()
                    .map(|a| a.as_bytes().to_vec())
                    .collect(),
            });
        }
        Ok((
            self.destination_chain,
            Requests {
                remove_requests: Vec::new(),
                put_requests,
            },
        ))
    }

    /// Debit every input and advance each sender's nonce once
    pub fn state_transfer(&self, ctx: &ChainContext, state: &mut dyn StateDB) -> AtomicResult<()> {
        let mut nonces: BTreeMap<Address, Nonce> = BTreeMap::new();
        for input in &self.ins {
            if input.asset_id == ctx.native_asset_id {
                let amount = u128::from(input.amount)
                    .checked_mul(u128::from(X2C_RATE))
                    .ok_or(AtomicTxError::Overflow("export amount"))?;
                let available = state.balance(&input.address)?;
                if available < amount {
                    return Err(AtomicTxError::InsufficientFunds {
                        address: input.address,
                        required: amount,
                        available,
                    });
                }
                state.sub_balance(input.address, amount)?;
            } else {
                let amount = u128::from(input.amount);
                let available = state.multicoin_balance(&input.address, &input.asset_id)?;
                if available < amount {
                    return Err(AtomicTxError::InsufficientFunds {
                        address: input.address,
                        required: amount,
                        available,
                    });
                }
                state.sub_multicoin(input.address, input.asset_id, amount)?;
            }

            let nonce = state.nonce(&input.address)?;
            if nonce != input.nonce {
                return Err(AtomicTxError::InvalidNonce {
                    address: input.address,
                    expected: nonce,
                    actual: input.nonce,
                });
            }
            nonces.insert(input.address, input.nonce);
        }
        for (address, nonce) in nonces {
            let next = nonce
                .checked_add(1)
                .ok_or(AtomicTxError::Overflow("export nonce"))?;
            debug!(%address, nonce = next, "advancing exporter nonce");
            state.set_nonce(address, next)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::Account;
    use crate::atomic::components::{OutputOwners, TransferOutput};
    use crate::atomic::fixtures::*;
    use crate::atomic::shared_memory::{AtomicRequests, SharedMemory};
    use crate::atomic::tx::UnsignedAtomicTx;
    use crate::state::MemoryStateDB;
    use delta_core::params::Upgrade;
    use delta_core::ChainConfig;
    use delta_db::WriteBatch;

    fn debit(key: &[u8; 32], amount: u64, nonce: Nonce) -> AccountInput {
        AccountInput {
            address: address(key),
            amount,
            asset_id: NATIVE,
            nonce,
        }
    }

    fn exported(amount: u64) -> TransferableOutput {
        TransferableOutput {
            asset_id: NATIVE,
            output: TransferOutput {
                amount,
                owners: OutputOwners::single(short_id(&KEY)),
            },
        }
    }

    fn export_of(ins: Vec<AccountInput>, outs: Vec<TransferableOutput>) -> UnsignedExportTx {
        UnsignedExportTx {
            network_id: NETWORK_ID,
            blockchain_id: CHAIN_ID,
            destination_chain: X_CHAIN_ID,
            ins,
            exported_outputs: outs,
        }
    }

    fn signed(unsigned: UnsignedExportTx, keys: &[[u8; 32]]) -> Tx {
        let signers: Vec<Vec<[u8; 32]>> = keys.iter().map(|k| vec![*k]).collect();
        let mut tx = Tx::new(UnsignedAtomicTx::Export(unsigned));
        tx.sign(&signers).unwrap();
        tx
    }

    #[test]
    fn test_verify_order() {
        let ctx = chain_context();
        let rules = latest_rules();
        let valid = export_of(vec![debit(&KEY, 10, 0)], vec![exported(5)]);
        assert!(valid.verify(&ctx, &rules).is_ok());

        let mut tx = valid.clone();
        tx.exported_outputs.clear();
        assert!(matches!(tx.verify(&ctx, &rules), Err(AtomicTxError::NoExportOutputs)));

        let mut tx = valid.clone();
        tx.network_id = 1;
        assert!(matches!(tx.verify(&ctx, &rules), Err(AtomicTxError::WrongNetworkId { .. })));

        let mut tx = valid.clone();
        tx.destination_chain = FOREIGN_CHAIN_ID;
        assert!(matches!(tx.verify(&ctx, &rules), Err(AtomicTxError::WrongChainId(_))));

        let mut tx = valid.clone();
        tx.ins[0].amount = 0;
        assert!(matches!(tx.verify(&ctx, &rules), Err(AtomicTxError::InvalidEntry { .. })));

        let mut tx = valid.clone();
        tx.exported_outputs[0].asset_id = OTHER_ASSET;
        assert!(matches!(
            tx.verify(&ctx, &rules),
            Err(AtomicTxError::NonNativeAsset("export output"))
        ));

        let mut tx = valid.clone();
        tx.exported_outputs = vec![exported(9), exported(3)];
        assert!(matches!(tx.verify(&ctx, &rules), Err(AtomicTxError::OutputsNotSorted)));

        let mut tx = valid;
        tx.ins.push(debit(&KEY, 1, 0));
        assert!(matches!(
            tx.verify(&ctx, &rules),
            Err(AtomicTxError::InputsNotSortedUnique)
        ));
    }

    #[test]
    fn test_non_native_export_before_banff() {
        let mut ctx = chain_context();
        let rules = ChainConfig::test_through(Upgrade::Phase4).rules(0, 0);
        let mut out = exported(5);
        out.asset_id = OTHER_ASSET;
        let tx = export_of(vec![debit(&KEY, 10, 0)], vec![out]);
        assert!(tx.verify(&ctx, &rules).is_ok());

        // The omega chain only takes the native asset
        ctx.omega_chain_id = X_CHAIN_ID;
        assert!(matches!(tx.verify(&ctx, &rules), Err(AtomicTxError::WrongChainId(_))));
    }

    #[test]
    fn test_gas_used() {
        let tx = export_of(vec![debit(&KEY, 10, 0), debit(&OTHER_KEY, 10, 0)], vec![exported(5)]);
        assert_eq!(tx.gas_used(100, false).unwrap(), 100 + 2 * COST_PER_SIGNATURE);
        assert_eq!(
            tx.gas_used(100, true).unwrap(),
            100 + 2 * COST_PER_SIGNATURE + ATOMIC_TX_BASE_COST
        );
        assert_eq!(tx.burned(&NATIVE).unwrap(), 15);
    }

    #[test]
    fn test_semantic_verify_fee_and_signatures() {
        let harness = Harness::new();
        let rules = latest_rules();

        let draft = signed(export_of(vec![debit(&KEY, 1_000_000, 0)], vec![exported(1)]), &[KEY]);
        let fee = calculate_dynamic_fee(draft.gas_used(true).unwrap(), Some(BASE_FEE)).unwrap();

        let exact = signed(
            export_of(vec![debit(&KEY, 1_000_000, 0)], vec![exported(1_000_000 - fee)]),
            &[KEY],
        );
        exact.semantic_verify(&harness.semantic(&rules, true)).unwrap();

        let short = signed(
            export_of(vec![debit(&KEY, 1_000_000, 0)], vec![exported(1_000_000 - fee + 1)]),
            &[KEY],
        );
        assert!(matches!(
            short.semantic_verify(&harness.semantic(&rules, true)),
            Err(AtomicTxError::FlowCheck { .. })
        ));

        let forged = signed(
            export_of(vec![debit(&KEY, 1_000_000, 0)], vec![exported(1)]),
            &[OTHER_KEY],
        );
        assert!(matches!(
            forged.semantic_verify(&harness.semantic(&rules, true)),
            Err(AtomicTxError::SignatureMismatch)
        ));

        let mut doubled = draft;
        let sig = doubled.creds[0].sigs[0];
        doubled.creds[0].sigs.push(sig);
        assert!(matches!(
            doubled.semantic_verify(&harness.semantic(&rules, true)),
            Err(AtomicTxError::SignatureCount { expected: 1, actual: 2 })
        ));
    }

    #[test]
    fn test_flat_fee_without_fee_remainder() {
        let harness = Harness::new();
        let rules = ChainConfig::test_through(Upgrade::Phase2).rules(0, 0);
        // 100 in, 100 out: nothing left for the fee
        let tx = signed(export_of(vec![debit(&KEY, 100, 0)], vec![exported(100)]), &[KEY]);
        let mut env = harness.semantic(&rules, true);
        env.base_fee = None;
        assert!(matches!(
            tx.semantic_verify(&env),
            Err(AtomicTxError::FlowCheck { produced, consumed: 100, .. }) if produced == 100 + ATOMIC_TX_FLAT_FEE
        ));
    }

    #[test]
    fn test_atomic_ops_visible_to_destination() {
        let harness = Harness::new();
        let tx = signed(export_of(vec![debit(&KEY, 10, 0)], vec![exported(5)]), &[KEY]);
        let tx_id = tx.id().unwrap();
        let (chain, requests) = tx.atomic_ops().unwrap();
        assert_eq!(chain, X_CHAIN_ID);
        assert_eq!(requests.put_requests.len(), 1);
        assert_eq!(requests.put_requests[0].traits, vec![short_id(&KEY).as_bytes().to_vec()]);

        let mut all = AtomicRequests::new();
        all.insert(chain, requests);
        harness.memory.apply(&all, WriteBatch::new()).unwrap();

        let key = UtxoId::new(tx_id, 0).input_id().as_bytes().to_vec();
        let values = harness.peer.get(&CHAIN_ID, &[key]).unwrap();
        let utxo = Utxo::from_bytes(&values[0]).unwrap();
        assert_eq!(utxo.output.amount, 5);
        assert_eq!(utxo.utxo_id, UtxoId::new(tx_id, 0));
    }

    #[test]
    fn test_state_transfer() {
        let ctx = chain_context();
        let sender = address(&KEY);
        let scaled = |units: u64| u128::from(units) * u128::from(X2C_RATE);
        let mut account = Account::with_balance(scaled(100));
        account.nonce = 3;
        account.multicoin.insert(OTHER_ASSET, 50);
        let mut state = MemoryStateDB::with_accounts([(sender, account)]);

        let mut multi = debit(&KEY, 20, 3);
        multi.asset_id = OTHER_ASSET;
        let tx = export_of(vec![debit(&KEY, 60, 3), multi], vec![exported(1)]);
        tx.state_transfer(&ctx, &mut state).unwrap();

        assert_eq!(state.balance(&sender).unwrap(), scaled(40));
        assert_eq!(state.multicoin_balance(&sender, &OTHER_ASSET).unwrap(), 30);
        // Two inputs from one address advance its nonce once
        assert_eq!(state.nonce(&sender).unwrap(), 4);

        let stale = export_of(vec![debit(&KEY, 1, 3)], vec![exported(1)]);
        assert!(matches!(
            stale.state_transfer(&ctx, &mut state),
            Err(AtomicTxError::InvalidNonce { expected: 4, actual: 3, .. })
        ));

        let broke = export_of(vec![debit(&KEY, 41, 4)], vec![exported(1)]);
        assert!(matches!(
            broke.state_transfer(&ctx, &mut state),
            Err(AtomicTxError::InsufficientFunds { .. })
        ));
    }
}
