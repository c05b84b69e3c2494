//! Atomic state of processing blocks and its settlement
//!
//! Verifying a block reserves the shared-memory requests of its atomic txs.
//! Rejecting it aborts the reservation. Accepting it commits in two phases:
//!
//! 1. The tx index, the caller's pending writes (block, last accepted) and
//!    a pending record of the requests are committed through the versioned
//!    database in one write.
//! 2. The requests are applied to shared memory in the same write that
//!    deletes the pending record.
//!
//! A crash between the phases leaves the pending record behind, and
//! `recover` replays it on startup. A failed apply while running does the
//! same, and the backend refuses new reservations until `recover` succeeds.

use crate::{NodeError, NodeResult};
use delta_core::{codec, Hash, Id};
use delta_db::{ColumnFamily, KeyValueDB, VersionDb, WriteBatch};
use delta_vm::atomic::{AtomicRequests, SharedMemory, Tx};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtomicStatus {
    Reserved,
    Committed,
    Aborted,
}

impl fmt::Display for AtomicStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AtomicStatus::Reserved => "reserved",
            AtomicStatus::Committed => "committed",
            AtomicStatus::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Requests of an accepted block not yet applied to shared memory
#[derive(Debug, Clone, PartialEq, Eq, bincode::Encode, bincode::Decode)]
struct PendingOps {
    block: Hash,
    requests: AtomicRequests,
}

#[derive(Debug, Clone, PartialEq, Eq, bincode::Encode, bincode::Decode)]
struct IndexedTx {
    height: u64,
    bytes: Vec<u8>,
}

/// Atomic effects of one verified block
#[derive(Debug, Clone)]
pub struct AtomicState {
    block: Hash,
    height: u64,
    txs: Vec<Tx>,
    requests: AtomicRequests,
    status: AtomicStatus,
}

impl AtomicState {
    pub fn status(&self) -> AtomicStatus {
        self.status
    }

    pub fn height(&self) -> u64 {
        self.height
    }

    pub fn requests(&self) -> &AtomicRequests {
        &self.requests
    }

    /// Only a reservation can be decided, and only once
    fn decide(&mut self, to: AtomicStatus) -> NodeResult<()> {
        if self.status != AtomicStatus::Reserved {
            return Err(NodeError::AtomicStatus {
                block: self.block,
                status: self.status,
            });
        }
        self.status = to;
        Ok(())
    }
}

fn height_key(height: u64) -> [u8; 8] {
    height.to_be_bytes()
}

pub struct AtomicBackend {
    db: Arc<VersionDb>,
    shared_memory: Arc<dyn SharedMemory>,
    bonus_blocks: HashMap<u64, Hash>,
    verified: Mutex<HashMap<Hash, AtomicState>>,
    replay_required: AtomicBool,
}

/// Outcome of a committed block still to be applied to shared memory
#[derive(Debug)]
pub struct Settlement {
    block: Hash,
    key: [u8; 8],
    pending: Option<PendingOps>,
}

impl AtomicBackend {
    pub fn new(
        db: Arc<VersionDb>,
        shared_memory: Arc<dyn SharedMemory>,
        bonus_blocks: HashMap<u64, Hash>,
    ) -> Self {
        Self {
            db,
            shared_memory,
            bonus_blocks,
            verified: Mutex::new(HashMap::new()),
            replay_required: AtomicBool::new(false),
        }
    }

    /// Whether `block` at `height` had its atomic effects applied out of band
    pub fn is_bonus(&self, height: u64, block: &Hash) -> bool {
        self.bonus_blocks.get(&height) == Some(block)
    }

    /// Reserve the requests of `txs` for `block`
    pub fn insert(&self, block: Hash, height: u64, txs: &[Tx]) -> NodeResult<()> {
        self.ensure_settled()?;
        let mut requests = AtomicRequests::new();
        for tx in txs {
            let (chain, ops) = tx.atomic_ops()?;
            requests.entry(chain).or_default().extend(ops);
        }
        let state = AtomicState {
            block,
            height,
            txs: txs.to_vec(),
            requests,
            status: AtomicStatus::Reserved,
        };
        self.verified.lock().insert(block, state);
        Ok(())
    }

    /// Reservation of a verified, undecided block
    pub fn verified_state(&self, block: &Hash) -> Option<AtomicState> {
        self.verified.lock().get(block).cloned()
    }

    /// Drop the reservation of `block`; nothing durable is touched
    pub fn reject(&self, block: &Hash) -> NodeResult<()> {
        let mut state = self
            .verified
            .lock()
            .remove(block)
            .ok_or(NodeError::UnknownBlock(*block))?;
        state.decide(AtomicStatus::Aborted)?;
        debug!(block = %block, height = state.height, "aborted atomic state");
        Ok(())
    }

    /// Settle the reservation of `block`: `commit`, then `apply`
    pub fn accept(&self, block: &Hash) -> NodeResult<()> {
        let settlement = self.commit(block)?;
        self.apply(settlement)
    }

    /// First phase. Commits the tx index, the pending record and the writes
    /// already staged in the versioned database. On failure the reservation
    /// stays in place.
    pub fn commit(&self, block: &Hash) -> NodeResult<Settlement> {
        self.ensure_settled()?;
        let mut verified = self.verified.lock();
        let state = verified.get(block).ok_or(NodeError::UnknownBlock(*block))?;
        if state.status != AtomicStatus::Reserved {
            return Err(NodeError::AtomicStatus {
                block: *block,
                status: state.status,
            });
        }

        let mut ids = Vec::with_capacity(state.txs.len());
        for tx in &state.txs {
            let id = tx.id()?;
            let record = IndexedTx {
                height: state.height,
                bytes: tx.signed_bytes()?,
            };
            self.db
                .put(ColumnFamily::AtomicTxs, id.as_bytes(), &codec::encode(&record)?)?;
            ids.push(id);
        }
        if !ids.is_empty() {
            self.db.put(
                ColumnFamily::AtomicHeights,
                &height_key(state.height),
                &codec::encode(&ids)?,
            )?;
        }

        let bonus = self.is_bonus(state.height, block);
        let pending = (!state.requests.is_empty() && !bonus).then(|| PendingOps {
            block: *block,
            requests: state.requests.clone(),
        });
        let key = height_key(state.height);
        if let Some(pending) = &pending {
            self.db
                .put(ColumnFamily::AtomicPending, &key, &codec::encode(pending)?)?;
        }
        self.db.commit()?;

        let mut state = verified
            .remove(block)
            .ok_or(NodeError::UnknownBlock(*block))?;
        state.decide(AtomicStatus::Committed)?;
        if bonus {
            info!(block = %block, height = state.height, "skipping shared memory apply on bonus block");
        }
        debug!(block = %block, height = state.height, txs = ids.len(), "committed atomic state");
        Ok(Settlement {
            block: *block,
            key,
            pending,
        })
    }

    /// Second phase. A failure leaves the pending record for `recover`, and
    /// no block can reserve or settle until it has run.
    pub fn apply(&self, settlement: Settlement) -> NodeResult<()> {
        let Some(pending) = settlement.pending else {
            return Ok(());
        };
        if let Err(err) = self.apply_pending(&settlement.key, &pending) {
            self.replay_required.store(true, Ordering::SeqCst);
            warn!(block = %settlement.block, error = %err, "shared memory apply failed, replay required");
            return Err(NodeError::UnappliedAtomicOps {
                block: settlement.block,
                source: Box::new(err),
            });
        }
        Ok(())
    }

    /// Fails while an accepted block's requests await replay
    pub fn ensure_settled(&self) -> NodeResult<()> {
        if self.replay_required.load(Ordering::SeqCst) {
            return Err(NodeError::ReplayRequired);
        }
        Ok(())
    }

    fn apply_pending(&self, key: &[u8], pending: &PendingOps) -> NodeResult<()> {
        let mut batch = WriteBatch::new();
        batch.delete(ColumnFamily::AtomicPending, key);
        self.shared_memory.apply(&pending.requests, batch)?;
        Ok(())
    }

    /// Apply every accepted block's requests still pending, oldest first
    pub fn recover(&self) -> NodeResult<usize> {
        let pending = self.db.iter_prefix(ColumnFamily::AtomicPending, &[])?;
        for (key, value) in &pending {
            let ops: PendingOps = codec::decode(value)?;
            info!(block = %ops.block, chains = ops.requests.len(), "replaying atomic operations");
            self.apply_pending(key, &ops)?;
        }
        self.replay_required.store(false, Ordering::SeqCst);
        Ok(pending.len())
    }

    /// Accepted atomic tx and the height it was accepted at
    pub fn accepted_tx(&self, id: &Id) -> NodeResult<Option<(u64, Tx)>> {
        let Some(bytes) = self.db.get(ColumnFamily::AtomicTxs, id.as_bytes())? else {
            return Ok(None);
        };
        let record: IndexedTx = codec::decode(&bytes)?;
        Ok(Some((record.height, Tx::from_bytes(&record.bytes)?)))
    }

    /// Ids of the atomic txs accepted at `height`
    pub fn accepted_at(&self, height: u64) -> NodeResult<Vec<Id>> {
        match self.db.get(ColumnFamily::AtomicHeights, &height_key(height))? {
            Some(bytes) => Ok(codec::decode(&bytes)?),
            None => Ok(Vec::new()),
        }
    }
}
