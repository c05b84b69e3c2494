//! Pending atomic transactions awaiting inclusion

use super::tx::Tx;
use super::{AtomicResult, AtomicTxError};
use delta_core::{Gas, Id};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, trace};

/// Pool interface block acceptance and rejection drive
pub trait AtomicTxPool: Send + Sync {
    /// Drop `tx` once a block including it is accepted
    fn remove_tx(&self, tx: &Tx);

    /// Add `tx`; `local` marks txs submitted through this node
    fn issue_tx(&self, tx: Tx, local: bool) -> AtomicResult<()>;
}

#[derive(Debug, Clone)]
struct PooledTx {
    tx: Tx,
    /// Native units burned per unit of gas
    price: u64,
    seq: u64,
}

impl PooledTx {
    /// Higher price first, then older first
    fn priority(&self) -> (std::cmp::Reverse<u64>, u64) {
        (std::cmp::Reverse(self.price), self.seq)
    }
}

#[derive(Debug, Default)]
struct PoolInner {
    txs: HashMap<Id, PooledTx>,
    /// Input id to the pooled tx spending it
    spent: HashMap<Id, Id>,
    next_seq: u64,
}

impl PoolInner {
    fn remove(&mut self, id: &Id) -> Option<PooledTx> {
        let pooled = self.txs.remove(id)?;
        for input in pooled.tx.input_utxos() {
            self.spent.remove(&input);
        }
        Some(pooled)
    }

    /// Cheapest tx, newest first among equal prices
    fn cheapest(&self) -> Option<(Id, u64)> {
        self.txs
            .iter()
            .max_by_key(|(_, pooled)| pooled.priority())
            .map(|(id, pooled)| (*id, pooled.price))
    }
}

/// Bounded pool that never holds two txs spending the same input
pub struct AtomicMempool {
    inner: RwLock<PoolInner>,
    capacity: usize,
    native_asset_id: Id,
}

impl AtomicMempool {
    pub fn new(capacity: usize, native_asset_id: Id) -> Self {
        Self {
            inner: RwLock::new(PoolInner::default()),
            capacity,
            native_asset_id,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().txs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn has(&self, id: &Id) -> bool {
        self.inner.read().txs.contains_key(id)
    }

    pub fn get(&self, id: &Id) -> Option<Tx> {
        self.inner.read().txs.get(id).map(|pooled| pooled.tx.clone())
    }

    fn price_of(&self, tx: &Tx) -> AtomicResult<u64> {
        let gas = tx.gas_used(true)?;
        let burned = tx.unsigned.burned(&self.native_asset_id)?;
        Ok(burned / gas.max(1))
    }

    /// Highest-priced txs whose combined gas fits `gas_limit`. The txs stay
    /// pooled until `remove_tx`.
    pub fn next_batch(&self, gas_limit: Gas, fixed_fee: bool) -> Vec<Tx> {
        let inner = self.inner.read();
        let mut ordered: Vec<&PooledTx> = inner.txs.values().collect();
        ordered.sort_by_key(|pooled| pooled.priority());

        let mut used: Gas = 0;
        let mut batch = Vec::new();
        for pooled in ordered {
            let Ok(gas) = pooled.tx.gas_used(fixed_fee) else {
                continue;
            };
            match used.checked_add(gas) {
                Some(total) if total <= gas_limit => {
                    used = total;
                    batch.push(pooled.tx.clone());
                }
                _ => trace!(gas, used, gas_limit, "atomic tx does not fit batch"),
            }
        }
        batch
    }
}

impl AtomicTxPool for AtomicMempool {
    fn remove_tx(&self, tx: &Tx) {
        let Ok(id) = tx.id() else {
            return;
        };
        if self.inner.write().remove(&id).is_some() {
            debug!(tx = %id, "removed atomic tx from mempool");
        }
    }

    fn issue_tx(&self, tx: Tx, local: bool) -> AtomicResult<()> {
        let id = tx.id()?;
        let price = self.price_of(&tx)?;
        let inputs = tx.input_utxos();

        let mut inner = self.inner.write();
        if inner.txs.contains_key(&id) {
            return Ok(());
        }

        // A conflicting tx is only replaced by a strictly better-paying one
        let mut conflicts: BTreeMap<Id, Id> = BTreeMap::new();
        for input in &inputs {
            if let Some(holder) = inner.spent.get(input) {
                conflicts.insert(*holder, *input);
            }
        }
        for (holder, input) in &conflicts {
            let holder_price = inner.txs.get(holder).map(|p| p.price).unwrap_or(0);
            if price <= holder_price {
                return Err(AtomicTxError::ConflictingTx {
                    input: *input,
                    tx: *holder,
                });
            }
        }

        let room_after_evictions = inner.txs.len() - conflicts.len();
        let evict_cheapest = if room_after_evictions >= self.capacity {
            match inner.cheapest() {
                Some((cheapest, cheapest_price))
                    if price > cheapest_price && !conflicts.contains_key(&cheapest) =>
                {
                    Some(cheapest)
                }
                _ => {
                    return Err(AtomicTxError::MempoolFull {
                        capacity: self.capacity,
                    })
                }
            }
        } else {
            None
        };

        for holder in conflicts.keys() {
            inner.remove(holder);
            debug!(tx = %holder, replacement = %id, "evicted conflicting atomic tx");
        }
        if let Some(cheapest) = evict_cheapest {
            inner.remove(&cheapest);
            debug!(tx = %cheapest, "evicted cheapest atomic tx");
        }

        for input in inputs {
            inner.spent.insert(input, id);
        }
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.txs.insert(id, PooledTx { tx, price, seq });
        debug!(tx = %id, price, local, size = inner.txs.len(), "added atomic tx to mempool");
        Ok(())
    }
}
