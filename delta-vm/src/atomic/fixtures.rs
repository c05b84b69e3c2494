//! Shared setup for atomic tx tests

use super::components::{OutputOwners, TransferOutput, Utxo, UtxoId};
use super::context::{ChainContext, ConflictChecker, SemanticContext, StaticSubnets};
use super::fx::SecpTransferFx;
use super::shared_memory::{AtomicRequests, Element, MemorySharedMemory, Requests, SharedMemory};
use super::{AtomicResult, AtomicTxError};
use delta_core::crypto::address_of;
use delta_core::{Address, ChainConfig, Hash, Id, Rules, ShortId, Wei};
use delta_db::{MemoryDb, WriteBatch};
use std::collections::BTreeSet;
use std::sync::Arc;

pub const NETWORK_ID: u32 = 5;
pub const KEY: [u8; 32] = [0x11; 32];
pub const OTHER_KEY: [u8; 32] = [0x22; 32];
/// 25 gwei; the dynamic fee is then 25 units per gas
pub const BASE_FEE: Wei = 25_000_000_000;
pub const NOW: u64 = 1_000;

pub const CHAIN_ID: Id = Id::new([0xc0; 32]);
pub const X_CHAIN_ID: Id = Id::new([0xaa; 32]);
pub const FOREIGN_CHAIN_ID: Id = Id::new([0xf0; 32]);
pub const NATIVE: Id = Id::new([0x01; 32]);
pub const OTHER_ASSET: Id = Id::new([0x02; 32]);

pub fn address(key: &[u8; 32]) -> Address {
    address_of(key).unwrap()
}

pub fn short_id(key: &[u8; 32]) -> ShortId {
    ShortId::new(*address(key).as_bytes())
}

pub fn chain_context() -> ChainContext {
    let subnet = Id::new([0x5b; 32]);
    ChainContext {
        network_id: NETWORK_ID,
        chain_id: CHAIN_ID,
        a_chain_id: X_CHAIN_ID,
        omega_chain_id: Id::new([0x0e; 32]),
        native_asset_id: NATIVE,
        subnets: Arc::new(
            StaticSubnets::new()
                .with_chain(CHAIN_ID, subnet)
                .with_chain(X_CHAIN_ID, subnet)
                .with_chain(FOREIGN_CHAIN_ID, Id::new([0x5c; 32])),
        ),
    }
}

/// Rules with every upgrade active
pub fn latest_rules() -> Rules {
    ChainConfig::test_chain().rules(0, 0)
}

/// Conflict checker that records nothing as spent unless told to
#[derive(Default)]
pub struct SpentSet(pub BTreeSet<Id>);

impl ConflictChecker for SpentSet {
    fn check_conflicts(&self, inputs: &BTreeSet<Id>, _parent: &Hash) -> AtomicResult<()> {
        match inputs.iter().find(|id| self.0.contains(id)) {
            Some(id) => Err(AtomicTxError::ConflictingAncestor(*id)),
            None => Ok(()),
        }
    }
}

pub struct Harness {
    pub ctx: ChainContext,
    pub db: Arc<MemoryDb>,
    pub memory: MemorySharedMemory,
    pub peer: MemorySharedMemory,
    pub fx: SecpTransferFx,
    pub spent: SpentSet,
}

impl Harness {
    pub fn new() -> Self {
        let db = Arc::new(MemoryDb::new());
        let memory = MemorySharedMemory::new(db.clone(), CHAIN_ID);
        let peer = memory.for_chain(X_CHAIN_ID);
        Self {
            ctx: chain_context(),
            db,
            memory,
            peer,
            fx: SecpTransferFx::with_fixed_time(NOW),
            spent: SpentSet::default(),
        }
    }

    /// Export a UTXO from the X-chain to this chain
    pub fn fund(&self, seed: u8, asset: Id, amount: u64, owner: ShortId) -> Utxo {
        let utxo = Utxo {
            utxo_id: UtxoId::new(Id::new([seed; 32]), 0),
            asset_id: asset,
            output: TransferOutput {
                amount,
                owners: OutputOwners::single(owner),
            },
        };
        let mut requests = AtomicRequests::new();
        requests.insert(
            CHAIN_ID,
            Requests {
                remove_requests: Vec::new(),
                put_requests: vec![Element {
                    key: utxo.input_id().as_bytes().to_vec(),
                    value: utxo.to_bytes().unwrap(),
                    traits: vec![owner.as_bytes().to_vec()],
                }],
            },
        );
        self.peer.apply(&requests, WriteBatch::new()).unwrap();
        utxo
    }

    pub fn semantic<'a>(&'a self, rules: &'a Rules, bootstrapped: bool) -> SemanticContext<'a> {
        SemanticContext {
            chain: &self.ctx,
            rules,
            base_fee: Some(BASE_FEE),
            parent: Hash::zero(),
            shared_memory: &self.memory,
            fx: &self.fx,
            conflicts: &self.spent,
            bootstrapped,
        }
    }
}
