//! Per-asset value conservation check

use super::{AtomicResult, AtomicTxError};
use delta_core::Id;
use std::collections::BTreeMap;

/// Accumulates produced and consumed amounts per asset
#[derive(Debug, Default)]
pub struct FlowChecker {
    produced: BTreeMap<Id, u64>,
    consumed: BTreeMap<Id, u64>,
    overflowed: bool,
}

impl FlowChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record value leaving the tx (outputs, fees)
    pub fn produce(&mut self, asset: Id, amount: u64) {
        Self::add(&mut self.produced, &mut self.overflowed, asset, amount);
    }

    /// Record value entering the tx (inputs)
    pub fn consume(&mut self, asset: Id, amount: u64) {
        Self::add(&mut self.consumed, &mut self.overflowed, asset, amount);
    }

    fn add(map: &mut BTreeMap<Id, u64>, overflowed: &mut bool, asset: Id, amount: u64) {
        let entry = map.entry(asset).or_insert(0);
        match entry.checked_add(amount) {
            Some(total) => *entry = total,
            None => *overflowed = true,
        }
    }

    /// Every asset must be consumed at least as much as it is produced
    pub fn verify(&self) -> AtomicResult<()> {
        if self.overflowed {
            return Err(AtomicTxError::Overflow("flow check"));
        }
        for (asset, produced) in &self.produced {
            let consumed = self.consumed.get(asset).copied().unwrap_or(0);
            if consumed < *produced {
                return Err(AtomicTxError::FlowCheck {
                    asset: *asset,
                    produced: *produced,
                    consumed,
                });
            }
        }
        Ok(())
    }
}
