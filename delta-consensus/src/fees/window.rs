//! Rolling gas consumption window
//!
//! Ten one-second slots of big-endian u64 counters. Slot 0 is the oldest
//! second; the last slot is the most recent. Rolling shifts counters toward
//! the front and zero-fills at the back.

use crate::{ConsensusError, ConsensusResult};
use delta_core::params::protocol::{DYNAMIC_FEE_EXTRA_DATA_SIZE, ROLLUP_WINDOW, WINDOW_SLOT_LEN};

const SLOTS: usize = ROLLUP_WINDOW as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeeWindow([u64; SLOTS]);

impl FeeWindow {
    /// Decode a header's extra data
    pub fn from_bytes(bytes: &[u8]) -> ConsensusResult<Self> {
        if bytes.len() != DYNAMIC_FEE_EXTRA_DATA_SIZE {
            return Err(ConsensusError::WindowLength {
                expected: DYNAMIC_FEE_EXTRA_DATA_SIZE,
                actual: bytes.len(),
            });
        }
        let mut slots = [0u64; SLOTS];
        for (slot, chunk) in slots.iter_mut().zip(bytes.chunks_exact(WINDOW_SLOT_LEN)) {
            let mut word = [0u8; WINDOW_SLOT_LEN];
            word.copy_from_slice(chunk);
            *slot = u64::from_be_bytes(word);
        }
        Ok(Self(slots))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.iter().flat_map(|slot| slot.to_be_bytes()).collect()
    }

    pub fn slots(&self) -> &[u64; SLOTS] {
        &self.0
    }

    /// Drop the oldest `roll` seconds. A roll of a full window or more
    /// clears everything.
    pub fn roll(&self, roll: u64) -> Self {
        let mut rolled = [0u64; SLOTS];
        if roll < ROLLUP_WINDOW {
            let roll = roll as usize;
            rolled[..SLOTS - roll].copy_from_slice(&self.0[roll..]);
        }
        Self(rolled)
    }

    /// Add gas to one slot, saturating at `u64::MAX`
    pub fn add(&mut self, slot: usize, gas: u64) {
        if let Some(counter) = self.0.get_mut(slot) {
            *counter = counter.saturating_add(gas);
        }
    }

    /// Total gas in the window, saturating at `u64::MAX`
    pub fn sum(&self) -> u64 {
        self.0.iter().fold(0u64, |acc, slot| acc.saturating_add(*slot))
    }
}
