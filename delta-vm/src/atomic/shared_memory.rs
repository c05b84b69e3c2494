//! Cross-chain shared memory
//!
//! Each ordered pair of chains has its own keyspace: elements chain A puts
//! for chain B are readable and removable only by B. Elements carry owner
//! traits (output addresses) that are indexed for wallet lookups.
//!
//! `MemorySharedMemory` keeps its data in the node's own key-value store so
//! `apply` can commit the shared-memory mutation and the caller's local
//! batch in one write.

use super::{AtomicResult, AtomicTxError};
use delta_core::crypto::keccak256;
use delta_core::{codec, Id};
use delta_db::{ColumnFamily, SharedDatabase, WriteBatch};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Value put into a peer chain's keyspace
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct Element {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    /// Owner traits the element is indexed under
    pub traits: Vec<Vec<u8>>,
}

/// Mutations towards one peer chain
#[derive(
    Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct Requests {
    /// Keys the peer put for us, consumed now
    pub remove_requests: Vec<Vec<u8>>,
    /// Elements put for the peer
    pub put_requests: Vec<Element>,
}

impl Requests {
    pub fn is_empty(&self) -> bool {
        self.remove_requests.is_empty() && self.put_requests.is_empty()
    }

    pub fn extend(&mut self, other: Requests) {
        self.remove_requests.extend(other.remove_requests);
        self.put_requests.extend(other.put_requests);
    }
}

/// Requests of one block, keyed by peer chain
pub type AtomicRequests = BTreeMap<Id, Requests>;

/// Position after the last element returned by `indexed`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexCursor {
    pub owner_trait: Vec<u8>,
    pub key: Vec<u8>,
}

/// One page of `indexed` results
#[derive(Debug, Clone, Default)]
pub struct IndexedPage {
    pub values: Vec<Vec<u8>>,
    pub last: Option<IndexCursor>,
}

/// Shared memory as seen from one chain
pub trait SharedMemory: Send + Sync {
    /// Values `peer_chain` put for this chain, in `keys` order; fails if
    /// any key is missing
    fn get(&self, peer_chain: &Id, keys: &[Vec<u8>]) -> AtomicResult<Vec<Vec<u8>>>;

    /// Values `peer_chain` put for this chain owned by any of `traits`,
    /// resuming after `start`
    fn indexed(
        &self,
        peer_chain: &Id,
        traits: &[Vec<u8>],
        start: Option<&IndexCursor>,
        limit: usize,
    ) -> AtomicResult<IndexedPage>;

    /// Apply `requests` and `batch` as one atomic write
    fn apply(&self, requests: &AtomicRequests, batch: WriteBatch) -> AtomicResult<()>;
}

#[derive(bincode::Encode, bincode::Decode)]
struct StoredElement {
    value: Vec<u8>,
    traits: Vec<Vec<u8>>,
}

/// Shared memory stored in a key-value database
#[derive(Clone)]
pub struct MemorySharedMemory {
    db: SharedDatabase,
    chain_id: Id,
}

/// Keyspace of elements `source` put for `destination`
fn pair_prefix(source: &Id, destination: &Id) -> [u8; 32] {
    let mut raw = [0u8; 64];
    raw[..32].copy_from_slice(source.as_bytes());
    raw[32..].copy_from_slice(destination.as_bytes());
    *keccak256(&raw).as_bytes()
}

fn element_key(prefix: &[u8; 32], key: &[u8]) -> Vec<u8> {
    let mut full = Vec::with_capacity(32 + key.len());
    full.extend_from_slice(prefix);
    full.extend_from_slice(key);
    full
}

fn trait_prefix(prefix: &[u8; 32], owner_trait: &[u8]) -> Vec<u8> {
    let mut full = Vec::with_capacity(64);
    full.extend_from_slice(prefix);
    full.extend_from_slice(keccak256(owner_trait).as_bytes());
    full
}

fn index_key(prefix: &[u8; 32], owner_trait: &[u8], key: &[u8]) -> Vec<u8> {
    let mut full = trait_prefix(prefix, owner_trait);
    full.extend_from_slice(key);
    full
}

fn missing(chain: &Id, key: &[u8]) -> AtomicTxError {
    AtomicTxError::MissingUtxo {
        chain: *chain,
        key: hex::encode(key),
    }
}

impl MemorySharedMemory {
    /// View of the shared memory for `chain_id`
    pub fn new(db: SharedDatabase, chain_id: Id) -> Self {
        Self { db, chain_id }
    }

    /// The same memory as seen by another chain
    pub fn for_chain(&self, chain_id: Id) -> Self {
        Self::new(self.db.clone(), chain_id)
    }

    pub fn chain_id(&self) -> Id {
        self.chain_id
    }

    fn load(&self, prefix: &[u8; 32], key: &[u8]) -> AtomicResult<Option<StoredElement>> {
        self.db
            .get(ColumnFamily::SharedMemory, &element_key(prefix, key))?
            .map(|bytes| codec::decode(&bytes).map_err(AtomicTxError::from))
            .transpose()
    }
}

impl SharedMemory for MemorySharedMemory {
    fn get(&self, peer_chain: &Id, keys: &[Vec<u8>]) -> AtomicResult<Vec<Vec<u8>>> {
        let prefix = pair_prefix(peer_chain, &self.chain_id);
        keys.iter()
            .map(|key| {
                self.load(&prefix, key)?
                    .map(|element| element.value)
                    .ok_or_else(|| missing(peer_chain, key))
            })
            .collect()
    }

    fn indexed(
        &self,
        peer_chain: &Id,
        traits: &[Vec<u8>],
        start: Option<&IndexCursor>,
        limit: usize,
    ) -> AtomicResult<IndexedPage> {
        let prefix = pair_prefix(peer_chain, &self.chain_id);
        let ordered: BTreeSet<&Vec<u8>> = traits.iter().collect();
        let mut seen = BTreeSet::new();
        let mut page = IndexedPage::default();

        for owner_trait in ordered {
            if let Some(cursor) = start {
                if *owner_trait < cursor.owner_trait {
                    continue;
                }
            }
            let index_prefix = trait_prefix(&prefix, owner_trait);
            for (index_key, _) in self.db.iter_prefix(ColumnFamily::SharedIndex, &index_prefix)? {
                let key = index_key[index_prefix.len()..].to_vec();
                if let Some(cursor) = start {
                    if *owner_trait == cursor.owner_trait && key <= cursor.key {
                        continue;
                    }
                }
                if page.values.len() >= limit {
                    return Ok(page);
                }
                if !seen.insert(key.clone()) {
                    continue;
                }
                let element = self
                    .load(&prefix, &key)?
                    .ok_or_else(|| missing(peer_chain, &key))?;
                page.values.push(element.value);
                page.last = Some(IndexCursor {
                    owner_trait: owner_trait.clone(),
                    key,
                });
            }
        }
        Ok(page)
    }

    fn apply(&self, requests: &AtomicRequests, batch: WriteBatch) -> AtomicResult<()> {
        let mut combined = WriteBatch::new();
        for (peer, request) in requests {
            let inbound = pair_prefix(peer, &self.chain_id);
            for key in &request.remove_requests {
                let element = self.load(&inbound, key)?.ok_or_else(|| missing(peer, key))?;
                combined.delete(ColumnFamily::SharedMemory, &element_key(&inbound, key));
                for owner_trait in &element.traits {
                    combined.delete(ColumnFamily::SharedIndex, &index_key(&inbound, owner_trait, key));
                }
            }

            let outbound = pair_prefix(&self.chain_id, peer);
            for element in &request.put_requests {
                let stored = StoredElement {
                    value: element.value.clone(),
                    traits: element.traits.clone(),
                };
                combined.put(
                    ColumnFamily::SharedMemory,
                    &element_key(&outbound, &element.key),
                    &codec::encode(&stored)?,
                );
                for owner_trait in &element.traits {
                    combined.put(
                        ColumnFamily::SharedIndex,
                        &index_key(&outbound, owner_trait, &element.key),
                        &[],
                    );
                }
            }
            debug!(
                chain = %self.chain_id,
                %peer,
                removes = request.remove_requests.len(),
                puts = request.put_requests.len(),
                "applying shared memory requests"
            );
        }
        combined.extend(batch);
        self.db.write(combined)?;
        Ok(())
    }
}
