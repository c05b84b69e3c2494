//! Ordinary transaction execution
//!
//! The general-purpose interpreter sits behind `TransactionExecutor`; the
//! block state machine only needs a receipt with the gas used and the tip
//! actually paid. `TransferExecutor` handles plain value transfers.

use crate::gas::GasMeter;
use crate::state::StateDB;
use crate::{VmError, VmResult};
use delta_core::{Address, BlockNumber, Gas, Hash, Timestamp, Transaction, Wei};
use tracing::debug;

/// Intrinsic gas of a value transfer
pub const TRANSFER_GAS: Gas = 21_000;
/// Gas per byte of calldata
pub const DATA_BYTE_GAS: Gas = 16;

/// Block-level values an executor needs
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub chain_id: u64,
    pub block_number: BlockNumber,
    pub timestamp: Timestamp,
    /// Base fee of the block, `None` before dynamic fees
    pub base_fee: Option<Wei>,
    /// Recipient of tips
    pub coinbase: Address,
}

/// Outcome of one transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub tx_hash: Hash,
    pub gas_used: Gas,
    /// Tip per gas paid on top of the base fee
    pub tip: Wei,
}

/// Executes an ordinary transaction against a state
pub trait TransactionExecutor: Send + Sync {
    fn execute(
        &self,
        tx: &Transaction,
        state: &mut dyn StateDB,
        context: &ExecutionContext,
    ) -> VmResult<Receipt>;
}

/// Value-transfer executor
#[derive(Debug, Clone, Default)]
pub struct TransferExecutor;

impl TransferExecutor {
    pub fn new() -> Self {
        Self
    }

    fn intrinsic_gas(tx: &Transaction) -> VmResult<Gas> {
        (tx.data.len() as u64)
            .checked_mul(DATA_BYTE_GAS)
            .and_then(|g| g.checked_add(TRANSFER_GAS))
            .ok_or(VmError::Overflow("intrinsic gas"))
    }
}

impl TransactionExecutor for TransferExecutor {
    fn execute(
        &self,
        tx: &Transaction,
        state: &mut dyn StateDB,
        context: &ExecutionContext,
    ) -> VmResult<Receipt> {
        let tx_hash = tx.hash()?;
        if tx.chain_id != context.chain_id {
            return Err(VmError::InvalidTransaction(format!(
                "wrong chain id: expected {}, got {}",
                context.chain_id, tx.chain_id
            )));
        }
        let to = tx.to.ok_or_else(|| {
            VmError::InvalidTransaction("contract creation is not supported".to_string())
        })?;
        let sender = tx.sender()?;

        let expected = state.nonce(&sender)?;
        if expected != tx.nonce {
            return Err(VmError::InvalidNonce {
                address: sender,
                expected,
                actual: tx.nonce,
            });
        }

        let mut meter = GasMeter::new(tx.gas_limit);
        meter.consume(Self::intrinsic_gas(tx)?)?;
        let gas_used = meter.consumed();

        // Price paid per gas, split into the burned base fee and the tip
        let (price, tip) = match context.base_fee {
            Some(base_fee) => {
                let tip = tx.effective_tip(base_fee).ok_or_else(|| {
                    VmError::InvalidTransaction(format!(
                        "gas price {} below base fee {}",
                        tx.gas_price, base_fee
                    ))
                })?;
                (base_fee + tip, tip)
            }
            None => (tx.gas_price, tx.gas_price),
        };
        let fee = price
            .checked_mul(Wei::from(gas_used))
            .ok_or(VmError::Overflow("transaction fee"))?;
        let total = fee
            .checked_add(tx.value)
            .ok_or(VmError::Overflow("transaction cost"))?;

        state.sub_balance(sender, total)?;
        state.add_balance(to, tx.value)?;
        let tip_total = tip
            .checked_mul(Wei::from(gas_used))
            .ok_or(VmError::Overflow("transaction tip"))?;
        state.add_balance(context.coinbase, tip_total)?;

        let mut account = state.get_account(&sender)?.unwrap_or_default();
        account.increment_nonce()?;
        state.set_account(sender, account)?;

        debug!(tx = %tx_hash, %sender, %to, value = tx.value, gas_used, "executed transfer");
        Ok(Receipt {
            tx_hash,
            gas_used,
            tip,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::Account;
    use crate::state::MemoryStateDB;
    use delta_core::crypto::address_of;
    use delta_core::params::protocol::BLACKHOLE_ADDRESS;

    const KEY: [u8; 32] = [1u8; 32];

    fn context(base_fee: Option<Wei>) -> ExecutionContext {
        ExecutionContext {
            chain_id: 1,
            block_number: 1,
            timestamp: 10,
            base_fee,
            coinbase: BLACKHOLE_ADDRESS,
        }
    }

    fn funded_state() -> (MemoryStateDB, Address) {
        let sender = address_of(&KEY).unwrap();
        let state = MemoryStateDB::with_accounts([(sender, Account::with_balance(10_000_000))]);
        (state, sender)
    }

    fn transfer(nonce: u64, gas_price: Wei) -> Transaction {
        let mut tx = Transaction::transfer(1, nonce, Address::new([9u8; 20]), 1_000, gas_price, 21_000);
        tx.sign(&KEY).unwrap();
        tx
    }

    #[test]
    fn test_transfer_with_base_fee() {
        let (mut state, sender) = funded_state();
        let tx = transfer(0, 100);
        let receipt = TransferExecutor::new()
            .execute(&tx, &mut state, &context(Some(60)))
            .unwrap();

        assert_eq!(receipt.gas_used, 21_000);
        assert_eq!(receipt.tip, 40);
        assert_eq!(state.balance(&sender).unwrap(), 10_000_000 - 1_000 - 100 * 21_000);
        assert_eq!(state.balance(&Address::new([9u8; 20])).unwrap(), 1_000);
        assert_eq!(state.balance(&BLACKHOLE_ADDRESS).unwrap(), 40 * 21_000);
        assert_eq!(state.nonce(&sender).unwrap(), 1);
    }

    #[test]
    fn test_rejects_bad_nonce_and_low_price() {
        let (mut state, _) = funded_state();
        let executor = TransferExecutor::new();

        assert!(matches!(
            executor.execute(&transfer(3, 100), &mut state, &context(Some(60))),
            Err(VmError::InvalidNonce { expected: 0, actual: 3, .. })
        ));
        assert!(matches!(
            executor.execute(&transfer(0, 50), &mut state, &context(Some(60))),
            Err(VmError::InvalidTransaction(_))
        ));
    }

    #[test]
    fn test_out_of_gas() {
        let (mut state, _) = funded_state();
        let mut tx = Transaction::transfer(1, 0, Address::new([9u8; 20]), 1, 100, 21_000);
        tx.data = vec![0u8; 4];
        tx.sign(&KEY).unwrap();
        assert!(matches!(
            TransferExecutor::new().execute(&tx, &mut state, &context(None)),
            Err(VmError::OutOfGas { required: 21_064, .. })
        ));
    }
}
