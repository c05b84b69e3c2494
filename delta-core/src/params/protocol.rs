//! Protocol constants

use crate::{Address, Gas, Wei};

/// nDIONE per DIONE on the external ledger
pub const DIONE: u64 = 1_000_000_000;

/// Conversion rate from external-ledger native units to account-model wei
pub const X2C_RATE: u64 = 1_000_000_000;

/// Minimum gas price at launch
pub const LAUNCH_MIN_GAS_PRICE: Wei = 2_380_952_380_952_381;
/// Minimum gas price from Phase1 until dynamic fees take over
pub const PHASE1_MIN_GAS_PRICE: Wei = 2_380_952_380_952_381;

/// Flat fee charged by atomic transactions before dynamic fees
pub const ATOMIC_TX_FLAT_FEE: u64 = 50 * DIONE;

pub const PHASE1_GAS_LIMIT: Gas = 8_000_000;
pub const CORTINA_GAS_LIMIT: Gas = 15_000_000;

/// Header extra size once the consumption window is embedded
pub const PHASE1_EXTRA_DATA_SIZE: usize = 80;
/// Upper bound on header extra size before Phase1
pub const MAXIMUM_EXTRA_DATA_SIZE: usize = 64;

pub const PHASE3_MIN_BASE_FEE: Wei = 2_380_952_380_952_381;
pub const PHASE3_MAX_BASE_FEE: Wei = 7_142_857_142_857_143;
pub const PHASE3_INITIAL_BASE_FEE: Wei = 2_380_952_380_952_381;
pub const PHASE3_TARGET_GAS: Gas = 10_000_000;
pub const PHASE3_BASE_FEE_CHANGE_DENOMINATOR: u64 = 12;
/// Flat surcharge added to the window per block in Phase3
pub const PHASE3_BLOCK_GAS_FEE: Gas = 1_000_000;

pub const PHASE4_MIN_BASE_FEE: Wei = 2_380_952_380_952_381;
pub const PHASE4_MAX_BASE_FEE: Wei = 7_142_857_142_857_143;
pub const PHASE4_BASE_FEE_CHANGE_DENOMINATOR: u64 = 12;
pub const PHASE4_MIN_BLOCK_GAS_COST: u64 = 0;
pub const PHASE4_MAX_BLOCK_GAS_COST: u64 = 1_000_000;
pub const PHASE4_BLOCK_GAS_COST_STEP: u64 = 50_000;
/// Target seconds between blocks for the block gas cost
pub const PHASE4_TARGET_BLOCK_RATE: u64 = 2;

pub const PHASE5_TARGET_GAS: Gas = 15_000_000;
pub const PHASE5_BASE_FEE_CHANGE_DENOMINATOR: u64 = 36;
pub const PHASE5_BLOCK_GAS_COST_STEP: u64 = 200_000;

/// Number of one-second slots in the consumption window
pub const ROLLUP_WINDOW: u64 = 10;
/// Width of one window slot in bytes
pub const WINDOW_SLOT_LEN: usize = 8;
/// Encoded window length
pub const DYNAMIC_FEE_EXTRA_DATA_SIZE: usize = ROLLUP_WINDOW as usize * WINDOW_SLOT_LEN;

/// Fixed surcharge per atomic transaction once Phase1 is active
pub const ATOMIC_TX_BASE_COST: Gas = 10_000;
/// Gas available to atomic transactions in one block
pub const ATOMIC_GAS_LIMIT: Gas = 100_000;
/// Gas per signature verified by an atomic transaction
pub const COST_PER_SIGNATURE: Gas = 1_000;
/// Gas per byte of an atomic transaction's signed encoding
pub const TX_BYTES_GAS: Gas = 1;

/// Seconds a block timestamp may run ahead of the local clock
pub const MAX_FUTURE_BLOCK_TIME: u64 = 10;

/// Coinbase every block must use
pub const BLACKHOLE_ADDRESS: Address = Address::new([
    0x01, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
]);

/// Denominator of the default fee allocation fractions
pub const ALLOCATION_DENOMINATOR: u64 = 100;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_size_matches_extra_size() {
        assert_eq!(DYNAMIC_FEE_EXTRA_DATA_SIZE, PHASE1_EXTRA_DATA_SIZE);
    }

    #[test]
    fn test_blackhole_address() {
        assert_eq!(
            BLACKHOLE_ADDRESS.to_string(),
            "0x0100000000000000000000000000000000000000"
        );
    }
}
