//! Chain identity and the collaborators semantic verification consults

use super::fx::Fx;
use super::shared_memory::SharedMemory;
use super::{AtomicResult, AtomicTxError};
use delta_core::{Hash, Id, Rules, Wei};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Answers which chains validate in the same subnet
pub trait SubnetLookup: Send + Sync {
    /// Subnet validating `chain`, if known
    fn subnet_of(&self, chain: &Id) -> Option<Id>;
}

/// Fixed chain-to-subnet table
#[derive(Debug, Clone, Default)]
pub struct StaticSubnets {
    subnets: HashMap<Id, Id>,
}

impl StaticSubnets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chain(mut self, chain: Id, subnet: Id) -> Self {
        self.subnets.insert(chain, subnet);
        self
    }
}

impl SubnetLookup for StaticSubnets {
    fn subnet_of(&self, chain: &Id) -> Option<Id> {
        self.subnets.get(chain).copied()
    }
}

/// Identity of this chain within its network
#[derive(Clone)]
pub struct ChainContext {
    pub network_id: u32,
    pub chain_id: Id,
    /// Peer chain allowed before subnet-wide transfers were enabled
    pub a_chain_id: Id,
    /// Chain that only accepts the native asset
    pub omega_chain_id: Id,
    pub native_asset_id: Id,
    pub subnets: Arc<dyn SubnetLookup>,
}

impl ChainContext {
    /// `peer` is another chain of this chain's subnet
    pub fn same_subnet(&self, peer: &Id) -> bool {
        if *peer == self.chain_id {
            return false;
        }
        match (
            self.subnets.subnet_of(&self.chain_id),
            self.subnets.subnet_of(peer),
        ) {
            (Some(ours), Some(theirs)) => ours == theirs,
            _ => false,
        }
    }

    /// Check a source or destination chain under `rules`
    pub fn verify_peer_chain(&self, peer: &Id, rules: &Rules) -> AtomicResult<()> {
        let allowed = if rules.is_phase5 {
            self.same_subnet(peer)
        } else {
            *peer == self.a_chain_id
        };
        if allowed {
            Ok(())
        } else {
            Err(AtomicTxError::WrongChainId(*peer))
        }
    }
}

impl std::fmt::Debug for ChainContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainContext")
            .field("network_id", &self.network_id)
            .field("chain_id", &self.chain_id)
            .field("a_chain_id", &self.a_chain_id)
            .field("native_asset_id", &self.native_asset_id)
            .finish()
    }
}

/// Detects inputs already spent by processing ancestors of a block
pub trait ConflictChecker: Send + Sync {
    fn check_conflicts(&self, inputs: &BTreeSet<Id>, parent: &Hash) -> AtomicResult<()>;
}

/// Everything semantic verification reads besides the tx itself
pub struct SemanticContext<'a> {
    pub chain: &'a ChainContext,
    pub rules: &'a Rules,
    /// Base fee of the block the tx is verified for
    pub base_fee: Option<Wei>,
    /// Parent of the block the tx is verified for
    pub parent: Hash,
    pub shared_memory: &'a dyn SharedMemory,
    pub fx: &'a dyn Fx,
    pub conflicts: &'a dyn ConflictChecker,
    /// Shared-memory checks are skipped while bootstrapping
    pub bootstrapped: bool,
}
