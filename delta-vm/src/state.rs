//! State database
//!
//! `StateDB` is the account-model view every state transition goes through.
//! Balance and nonce helpers are provided on top of `get_account` /
//! `set_account` so backends only implement raw access.

use crate::account::Account;
use crate::VmResult;
use delta_core::{Address, Hash, Id, Nonce, Wei};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// State database trait
pub trait StateDB: Send + Sync {
    /// Get account by address
    fn get_account(&self, address: &Address) -> VmResult<Option<Account>>;

    /// Set account; empty accounts are removed
    fn set_account(&mut self, address: Address, account: Account) -> VmResult<()>;

    /// Storage slot of a contract, zero when unset
    fn get_state(&self, address: &Address, slot: &Hash) -> VmResult<Hash>;

    /// Set a storage slot; a zero value clears it
    fn set_state(&mut self, address: Address, slot: Hash, value: Hash) -> VmResult<()>;

    /// Get state root hash
    fn state_root(&self) -> Hash;

    /// Independent copy of this state
    fn fork(&self) -> Box<dyn StateDB>;

    fn balance(&self, address: &Address) -> VmResult<Wei> {
        Ok(self.get_account(address)?.map_or(0, |a| a.balance))
    }

    fn nonce(&self, address: &Address) -> VmResult<Nonce> {
        Ok(self.get_account(address)?.map_or(0, |a| a.nonce))
    }

    fn multicoin_balance(&self, address: &Address, asset: &Id) -> VmResult<u128> {
        Ok(self
            .get_account(address)?
            .map_or(0, |a| a.multicoin_balance(asset)))
    }

    fn add_balance(&mut self, address: Address, amount: Wei) -> VmResult<()> {
        let mut account = self.get_account(&address)?.unwrap_or_default();
        account.add_balance(amount)?;
        self.set_account(address, account)
    }

    fn sub_balance(&mut self, address: Address, amount: Wei) -> VmResult<()> {
        let mut account = self.get_account(&address)?.unwrap_or_default();
        account.sub_balance(amount)?;
        self.set_account(address, account)
    }

    fn add_multicoin(&mut self, address: Address, asset: Id, amount: u128) -> VmResult<()> {
        let mut account = self.get_account(&address)?.unwrap_or_default();
        account.add_multicoin(asset, amount)?;
        self.set_account(address, account)
    }

    fn sub_multicoin(&mut self, address: Address, asset: Id, amount: u128) -> VmResult<()> {
        let mut account = self.get_account(&address)?.unwrap_or_default();
        account.sub_multicoin(asset, amount)?;
        self.set_account(address, account)
    }

    fn set_nonce(&mut self, address: Address, nonce: Nonce) -> VmResult<()> {
        let mut account = self.get_account(&address)?.unwrap_or_default();
        account.nonce = nonce;
        self.set_account(address, account)
    }
}

/// In-memory state database implementation
#[derive(Debug, Clone, Default)]
pub struct MemoryStateDB {
    accounts: BTreeMap<Address, Account>,
    storage: BTreeMap<Address, BTreeMap<Hash, Hash>>,
    state_root: Hash,
}

impl MemoryStateDB {
    /// Create new memory state DB
    pub fn new() -> Self {
        let mut db = Self::default();
        db.update_state_root();
        db
    }

    /// Create with initial accounts
    pub fn with_accounts(accounts: impl IntoIterator<Item = (Address, Account)>) -> Self {
        let mut db = Self::default();
        db.accounts = accounts
            .into_iter()
            .filter(|(_, account)| !account.is_empty())
            .collect();
        db.update_state_root();
        db
    }

    /// Number of non-empty accounts
    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    /// Blake3 over accounts and storage in key order
    fn update_state_root(&mut self) {
        let mut hasher = blake3::Hasher::new();
        for (address, account) in &self.accounts {
            hasher.update(address.as_bytes());
            hasher.update(&account.nonce.to_be_bytes());
            hasher.update(&account.balance.to_be_bytes());
            hasher.update(account.code_hash.as_bytes());
            for (asset, amount) in &account.multicoin {
                hasher.update(asset.as_bytes());
                hasher.update(&amount.to_be_bytes());
            }
        }
        for (address, slots) in &self.storage {
            hasher.update(address.as_bytes());
            for (slot, value) in slots {
                hasher.update(slot.as_bytes());
                hasher.update(value.as_bytes());
            }
        }
        self.state_root = Hash::new(*hasher.finalize().as_bytes());
    }
}

impl StateDB for MemoryStateDB {
    fn get_account(&self, address: &Address) -> VmResult<Option<Account>> {
        Ok(self.accounts.get(address).cloned())
    }

    fn set_account(&mut self, address: Address, account: Account) -> VmResult<()> {
        if account.is_empty() {
            self.accounts.remove(&address);
        } else {
            self.accounts.insert(address, account);
        }
        self.update_state_root();
        Ok(())
    }

    fn get_state(&self, address: &Address, slot: &Hash) -> VmResult<Hash> {
        Ok(self
            .storage
            .get(address)
            .and_then(|slots| slots.get(slot))
            .copied()
            .unwrap_or_default())
    }

    fn set_state(&mut self, address: Address, slot: Hash, value: Hash) -> VmResult<()> {
        if value.is_zero() {
            if let Some(slots) = self.storage.get_mut(&address) {
                slots.remove(&slot);
                if slots.is_empty() {
                    self.storage.remove(&address);
                }
            }
        } else {
            self.storage.entry(address).or_default().insert(slot, value);
        }
        self.update_state_root();
        Ok(())
    }

    fn state_root(&self) -> Hash {
        self.state_root
    }

    fn fork(&self) -> Box<dyn StateDB> {
        Box::new(self.clone())
    }
}

/// Thread-safe state DB wrapper
#[derive(Clone)]
pub struct SharedStateDB {
    inner: Arc<RwLock<Box<dyn StateDB>>>,
}

impl SharedStateDB {
    /// Create new shared state DB
    pub fn new(state_db: Box<dyn StateDB>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(state_db)),
        }
    }

    /// Create from memory state
    pub fn memory() -> Self {
        Self::new(Box::new(MemoryStateDB::new()))
    }

    /// Run `f` under the read lock
    pub fn read<R>(&self, f: impl FnOnce(&dyn StateDB) -> R) -> R {
        let guard = self.inner.read();
        f(&**guard)
    }

    /// Run `f` under the write lock
    pub fn update<R>(&self, f: impl FnOnce(&mut dyn StateDB) -> VmResult<R>) -> VmResult<R> {
        let mut guard = self.inner.write();
        f(&mut **guard)
    }

    /// Get account (read-only)
    pub fn get_account(&self, address: &Address) -> VmResult<Option<Account>> {
        self.inner.read().get_account(address)
    }

    pub fn balance(&self, address: &Address) -> VmResult<Wei> {
        self.inner.read().balance(address)
    }

    pub fn nonce(&self, address: &Address) -> VmResult<Nonce> {
        self.inner.read().nonce(address)
    }

    /// Independent copy, e.g. for speculative execution of a block
    pub fn fork(&self) -> SharedStateDB {
        Self::new(self.inner.read().fork())
    }

    /// Get state root
    pub fn state_root(&self) -> Hash {
        self.inner.read().state_root()
    }
}

impl std::fmt::Debug for SharedStateDB {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedStateDB")
            .field("state_root", &self.state_root())
            .finish()
    }
}
