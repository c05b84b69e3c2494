//! Orion validator list
//!
//! The validators that share in block fees are kept in a contract's
//! storage: one slot holds the last update timestamp, one holds the list
//! length, and the elements follow the usual dynamic-array layout starting
//! at `keccak(size_slot)`.

use crate::state::StateDB;
use crate::VmResult;
use delta_core::crypto::keccak256;
use delta_core::params::OrionContractConfig;
use delta_core::{Address, Hash, NodeId};

/// Reads the validator list out of contract storage
#[derive(Debug, Clone)]
pub struct OrionNodesGetter {
    contract: Address,
    last_update_slot: Hash,
    size_slot: Hash,
    list_start_slot: Hash,
}

impl OrionNodesGetter {
    pub fn new(contract: Address, last_update_slot: Hash, list_slot: Hash) -> Self {
        Self {
            contract,
            last_update_slot,
            size_slot: list_slot,
            list_start_slot: keccak256(list_slot.as_bytes()),
        }
    }

    pub fn from_config(config: &OrionContractConfig) -> Self {
        Self::new(config.contract, config.last_update_slot, config.list_slot)
    }

    /// Low 8 bytes of a slot as a big-endian integer
    fn get_u64(&self, state: &dyn StateDB, slot: &Hash) -> VmResult<u64> {
        let value = state.get_state(&self.contract, slot)?;
        let mut low = [0u8; 8];
        low.copy_from_slice(&value.as_bytes()[24..]);
        Ok(u64::from_be_bytes(low))
    }

    pub fn last_update_timestamp(&self, state: &dyn StateDB) -> VmResult<u64> {
        self.get_u64(state, &self.last_update_slot)
    }

    /// Number of validators in the list
    pub fn validator_count(&self, state: &dyn StateDB) -> VmResult<u64> {
        self.get_u64(state, &self.size_slot)
    }

    pub fn nodes(&self, state: &dyn StateDB) -> VmResult<Vec<NodeId>> {
        let size = self.validator_count(state)?;
        let mut nodes = Vec::new();
        for index in 0..size {
            let slot = slot_offset(&self.list_start_slot, index);
            let value = state.get_state(&self.contract, &slot)?;
            let mut id = [0u8; 20];
            id.copy_from_slice(&value.as_bytes()[..20]);
            nodes.push(NodeId::new(id));
        }
        Ok(nodes)
    }
}

/// `base + offset` as 256-bit big-endian integers, wrapping at 2^256
fn slot_offset(base: &Hash, offset: u64) -> Hash {
    let mut bytes = *base.as_bytes();
    let mut carry = u128::from(offset);
    for byte in bytes.iter_mut().rev() {
        if carry == 0 {
            break;
        }
        let sum = u128::from(*byte) + (carry & 0xff);
        *byte = sum as u8;
        carry = (carry >> 8) + (sum >> 8);
    }
    Hash::new(bytes)
}
