//! Rules resolved for one (height, timestamp) pair
//!
//! Everything that varies between upgrades is decided here once per block:
//! - fork flags
//! - fee window parameters and the block gas cost schedule
//! - fee allocation fractions
//! - gas limit, extra data format and legacy gas price floor

use super::config::{is_block_forked, ChainConfig, FeeAllocation, Upgrade};
use super::protocol::*;
use crate::{Gas, Timestamp, Wei};

/// What the parent block contributes to the window on top of its gas usage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowSurcharge {
    /// Fixed gas amount per block
    Flat(Gas),
    /// The block gas cost computed for the child block
    BlockGasCost,
    /// Gas usage only
    None,
}

/// Block gas cost schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockGasCostParams {
    /// Target seconds between blocks
    pub target_block_rate: u64,
    pub min: u64,
    pub max: u64,
    pub step: u64,
}

impl BlockGasCostParams {
    /// Schedule introduced by Phase4
    pub const PHASE4: Self = Self {
        target_block_rate: PHASE4_TARGET_BLOCK_RATE,
        min: PHASE4_MIN_BLOCK_GAS_COST,
        max: PHASE4_MAX_BLOCK_GAS_COST,
        step: PHASE4_BLOCK_GAS_COST_STEP,
    };

    /// Phase5 schedule: steeper step, same bounds
    pub const PHASE5: Self = Self {
        step: PHASE5_BLOCK_GAS_COST_STEP,
        ..Self::PHASE4
    };
}

/// Dynamic fee parameters active once Phase3 is on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeRules {
    pub target_gas: Gas,
    pub change_denominator: u64,
    pub min_base_fee: Wei,
    /// `None` means unbounded
    pub max_base_fee: Option<Wei>,
    pub initial_base_fee: Wei,
    pub surcharge: WindowSurcharge,
    /// Present from Phase4 on
    pub block_gas_cost: Option<BlockGasCostParams>,
}

impl FeeRules {
    pub fn phase3() -> Self {
        Self {
            target_gas: PHASE3_TARGET_GAS,
            change_denominator: PHASE3_BASE_FEE_CHANGE_DENOMINATOR,
            min_base_fee: PHASE3_MIN_BASE_FEE,
            max_base_fee: Some(PHASE3_MAX_BASE_FEE),
            initial_base_fee: PHASE3_INITIAL_BASE_FEE,
            surcharge: WindowSurcharge::Flat(PHASE3_BLOCK_GAS_FEE),
            block_gas_cost: None,
        }
    }

    pub fn phase4() -> Self {
        Self {
            change_denominator: PHASE4_BASE_FEE_CHANGE_DENOMINATOR,
            min_base_fee: PHASE4_MIN_BASE_FEE,
            max_base_fee: Some(PHASE4_MAX_BASE_FEE),
            surcharge: WindowSurcharge::BlockGasCost,
            block_gas_cost: Some(BlockGasCostParams::PHASE4),
            ..Self::phase3()
        }
    }

    pub fn phase5() -> Self {
        Self {
            target_gas: PHASE5_TARGET_GAS,
            change_denominator: PHASE5_BASE_FEE_CHANGE_DENOMINATOR,
            max_base_fee: None,
            surcharge: WindowSurcharge::None,
            block_gas_cost: Some(BlockGasCostParams::PHASE5),
            ..Self::phase4()
        }
    }

    /// Clamp `fee` into the phase bounds
    pub fn clamp(&self, fee: Wei) -> Wei {
        let fee = fee.max(self.min_base_fee);
        match self.max_base_fee {
            Some(max) => fee.min(max),
            None => fee,
        }
    }
}

/// Immutable rule set for one block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rules {
    pub chain_id: u64,

    pub is_homestead: bool,
    pub is_eip150: bool,
    pub is_eip155: bool,
    pub is_eip158: bool,
    pub is_byzantium: bool,
    pub is_constantinople: bool,
    pub is_petersburg: bool,
    pub is_istanbul: bool,

    pub is_phase1: bool,
    pub is_phase2: bool,
    pub is_phase3: bool,
    pub is_phase4: bool,
    pub is_phase5: bool,
    pub is_phase_pre6: bool,
    pub is_phase6: bool,
    pub is_phase_post6: bool,
    pub is_phase7: bool,
    pub is_banff: bool,
    pub is_cortina: bool,
    pub is_d_upgrade: bool,
    pub is_cancun: bool,

    /// Dynamic fee parameters, `None` before Phase3
    pub fee: Option<FeeRules>,
    /// Fee split, all-zero before Phase7
    pub fee_allocation: FeeAllocation,
}

impl Rules {
    /// Resolve the rules in force at `height` and `time`
    pub fn resolve(config: &ChainConfig, height: u64, time: Timestamp) -> Self {
        let active = |upgrade| config.is_active(upgrade, time);

        let fee = if active(Upgrade::Phase5) {
            Some(FeeRules::phase5())
        } else if active(Upgrade::Phase4) {
            Some(FeeRules::phase4())
        } else if active(Upgrade::Phase3) {
            Some(FeeRules::phase3())
        } else {
            None
        };

        let fee_allocation = if active(Upgrade::Phase7) {
            config.fee_allocation
        } else {
            FeeAllocation {
                denominator: config.fee_allocation.denominator,
                ..FeeAllocation::default()
            }
        };

        Self {
            chain_id: config.chain_id,
            is_homestead: is_block_forked(config.homestead_block, height),
            is_eip150: is_block_forked(config.eip150_block, height),
            is_eip155: is_block_forked(config.eip155_block, height),
            is_eip158: is_block_forked(config.eip158_block, height),
            is_byzantium: is_block_forked(config.byzantium_block, height),
            is_constantinople: is_block_forked(config.constantinople_block, height),
            is_petersburg: is_block_forked(config.petersburg_block, height),
            is_istanbul: is_block_forked(config.istanbul_block, height),
            is_phase1: active(Upgrade::Phase1),
            is_phase2: active(Upgrade::Phase2),
            is_phase3: active(Upgrade::Phase3),
            is_phase4: active(Upgrade::Phase4),
            is_phase5: active(Upgrade::Phase5),
            is_phase_pre6: active(Upgrade::PhasePre6),
            is_phase6: active(Upgrade::Phase6),
            is_phase_post6: active(Upgrade::PhasePost6),
            is_phase7: active(Upgrade::Phase7),
            is_banff: active(Upgrade::Banff),
            is_cortina: active(Upgrade::Cortina),
            is_d_upgrade: active(Upgrade::DUpgrade),
            is_cancun: active(Upgrade::Cancun),
            fee,
            fee_allocation,
        }
    }

    /// Required header gas limit, `None` before Phase1
    pub fn gas_limit(&self) -> Option<Gas> {
        if self.is_cortina {
            Some(CORTINA_GAS_LIMIT)
        } else if self.is_phase1 {
            Some(PHASE1_GAS_LIMIT)
        } else {
            None
        }
    }

    /// Whether the header extra data length is acceptable
    pub fn valid_extra_len(&self, len: usize) -> bool {
        if self.is_phase1 {
            len == PHASE1_EXTRA_DATA_SIZE
        } else {
            len <= MAXIMUM_EXTRA_DATA_SIZE
        }
    }

    /// Gas price floor for ordinary transactions, `None` once dynamic
    /// fees take over
    pub fn min_gas_price(&self) -> Option<Wei> {
        if self.is_phase3 {
            None
        } else if self.is_phase1 {
            Some(PHASE1_MIN_GAS_PRICE)
        } else {
            Some(LAUNCH_MIN_GAS_PRICE)
        }
    }

    /// Block gas cost schedule, `None` before Phase4
    pub fn block_gas_cost(&self) -> Option<BlockGasCostParams> {
        self.fee.and_then(|fee| fee.block_gas_cost)
    }
}

impl ChainConfig {
    /// Rules in force at `height` and `time`
    pub fn rules(&self, height: u64, time: Timestamp) -> Rules {
        Rules::resolve(self, height, time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_rules() {
        let rules = ChainConfig::test_launch().rules(0, 1_000);
        assert!(rules.is_istanbul);
        assert!(!rules.is_phase1);
        assert!(rules.fee.is_none());
        assert_eq!(rules.gas_limit(), None);
        assert_eq!(rules.min_gas_price(), Some(LAUNCH_MIN_GAS_PRICE));
        assert!(rules.valid_extra_len(64));
        assert!(!rules.valid_extra_len(65));
    }

    #[test]
    fn test_fee_rules_per_phase() {
        let phase3 = ChainConfig::test_through(Upgrade::Phase3).rules(0, 0);
        let fee = phase3.fee.unwrap();
        assert_eq!(fee.target_gas, 10_000_000);
        assert_eq!(fee.surcharge, WindowSurcharge::Flat(1_000_000));
        assert!(phase3.block_gas_cost().is_none());
        assert_eq!(phase3.min_gas_price(), None);

        let phase4 = ChainConfig::test_through(Upgrade::Phase4).rules(0, 0);
        let fee = phase4.fee.unwrap();
        assert_eq!(fee.surcharge, WindowSurcharge::BlockGasCost);
        assert_eq!(fee.max_base_fee, Some(PHASE4_MAX_BASE_FEE));
        assert_eq!(phase4.block_gas_cost().unwrap().step, 50_000);

        let phase5 = ChainConfig::test_through(Upgrade::Phase5).rules(0, 0);
        let fee = phase5.fee.unwrap();
        assert_eq!(fee.target_gas, 15_000_000);
        assert_eq!(fee.change_denominator, 36);
        assert_eq!(fee.max_base_fee, None);
        assert_eq!(fee.surcharge, WindowSurcharge::None);
        assert_eq!(phase5.block_gas_cost().unwrap().step, 200_000);
    }

    #[test]
    fn test_rules_follow_timestamp() {
        let config = ChainConfig::test_launch()
            .with_upgrade_time(Upgrade::Phase1, Some(100))
            .with_upgrade_time(Upgrade::Phase2, Some(200));
        assert!(!config.rules(0, 99).is_phase1);
        assert!(config.rules(0, 100).is_phase1);
        assert!(!config.rules(0, 100).is_phase2);
        assert!(config.rules(0, 200).is_phase2);
    }

    #[test]
    fn test_gas_limit_and_extra() {
        let rules = ChainConfig::test_through(Upgrade::Banff).rules(0, 0);
        assert_eq!(rules.gas_limit(), Some(PHASE1_GAS_LIMIT));
        assert!(rules.valid_extra_len(80));
        assert!(!rules.valid_extra_len(64));

        let rules = ChainConfig::test_chain().rules(0, 0);
        assert_eq!(rules.gas_limit(), Some(CORTINA_GAS_LIMIT));
    }

    #[test]
    fn test_fee_allocation_gated_by_phase7() {
        let allocation = FeeAllocation {
            lp: 25,
            governance: 50,
            ..Default::default()
        };
        let config = ChainConfig::test_chain().with_fee_allocation(allocation);
        assert_eq!(config.rules(0, 0).fee_allocation.governance, 0);

        let config = config.with_upgrade_time(Upgrade::Phase7, Some(50));
        assert_eq!(config.rules(0, 49).fee_allocation.lp, 0);
        assert_eq!(config.rules(0, 50).fee_allocation, allocation);
    }

    #[test]
    fn test_clamp_unbounded_above() {
        let fee = FeeRules::phase5();
        assert_eq!(fee.clamp(0), PHASE4_MIN_BASE_FEE);
        assert_eq!(fee.clamp(u128::MAX), u128::MAX);
        assert_eq!(FeeRules::phase4().clamp(u128::MAX), PHASE4_MAX_BASE_FEE);
    }
}
