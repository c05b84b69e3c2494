//! Account model
//!
//! Every account carries the native balance in wei plus a secondary ledger
//! of per-asset balances for assets imported from the external ledger.

use crate::{VmError, VmResult};
use delta_core::{Hash, Id, Nonce, Wei};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Account information
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Account nonce (number of transactions sent)
    pub nonce: Nonce,
    /// Native balance in wei
    pub balance: Wei,
    /// Balances of non-native assets, keyed by asset id
    pub multicoin: BTreeMap<Id, u128>,
    /// Code hash (zero for externally owned accounts)
    pub code_hash: Hash,
}

impl Account {
    /// Create a new empty account
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an account with initial balance
    pub fn with_balance(balance: Wei) -> Self {
        Self {
            balance,
            ..Self::default()
        }
    }

    /// Check if account is empty
    pub fn is_empty(&self) -> bool {
        self.nonce == 0
            && self.balance == 0
            && self.code_hash.is_zero()
            && self.multicoin.values().all(|v| *v == 0)
    }

    /// Increment nonce
    pub fn increment_nonce(&mut self) -> VmResult<()> {
        self.nonce = self
            .nonce
            .checked_add(1)
            .ok_or(VmError::Overflow("account nonce"))?;
        Ok(())
    }

    /// Add to balance
    pub fn add_balance(&mut self, amount: Wei) -> VmResult<()> {
        self.balance = self
            .balance
            .checked_add(amount)
            .ok_or(VmError::Overflow("account balance"))?;
        Ok(())
    }

    /// Subtract from balance
    pub fn sub_balance(&mut self, amount: Wei) -> VmResult<()> {
        if self.balance < amount {
            return Err(VmError::InsufficientBalance {
                required: amount,
                available: self.balance,
            });
        }
        self.balance -= amount;
        Ok(())
    }

    /// Balance of a non-native asset
    pub fn multicoin_balance(&self, asset: &Id) -> u128 {
        self.multicoin.get(asset).copied().unwrap_or(0)
    }

    pub fn add_multicoin(&mut self, asset: Id, amount: u128) -> VmResult<()> {
        let entry = self.multicoin.entry(asset).or_insert(0);
        *entry = entry
            .checked_add(amount)
            .ok_or(VmError::Overflow("multicoin balance"))?;
        Ok(())
    }

    pub fn sub_multicoin(&mut self, asset: Id, amount: u128) -> VmResult<()> {
        let available = self.multicoin_balance(&asset);
        if available < amount {
            return Err(VmError::InsufficientBalance {
                required: amount,
                available,
            });
        }
        if available == amount {
            self.multicoin.remove(&asset);
        } else {
            self.multicoin.insert(asset, available - amount);
        }
        Ok(())
    }
}
