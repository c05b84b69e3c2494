//! Chain configuration
//!
//! Legacy forks are keyed by block height and may only activate at
//! genesis. Every live upgrade is keyed by block timestamp because block
//! production is asynchronous and has no fixed cadence.

use crate::{Address, CoreError, CoreResult, Hash};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use super::protocol::ALLOCATION_DENOMINATOR;

pub const MAINNET_CHAIN_ID: u64 = 153;
pub const TESTNET_CHAIN_ID: u64 = 13;
pub const LOCAL_CHAIN_ID: u64 = 12;

/// Timestamp-activated upgrades in canonical activation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Upgrade {
    Phase1,
    Phase2,
    Phase3,
    Phase4,
    Phase5,
    PhasePre6,
    Phase6,
    PhasePost6,
    Phase7,
    Banff,
    Cortina,
    DUpgrade,
    Cancun,
}

impl Upgrade {
    pub const ALL: [Upgrade; 13] = [
        Upgrade::Phase1,
        Upgrade::Phase2,
        Upgrade::Phase3,
        Upgrade::Phase4,
        Upgrade::Phase5,
        Upgrade::PhasePre6,
        Upgrade::Phase6,
        Upgrade::PhasePost6,
        Upgrade::Phase7,
        Upgrade::Banff,
        Upgrade::Cortina,
        Upgrade::DUpgrade,
        Upgrade::Cancun,
    ];

    /// JSON field name of the activation timestamp
    pub fn config_key(self) -> &'static str {
        match self {
            Upgrade::Phase1 => "odyPhase1BlockTimestamp",
            Upgrade::Phase2 => "odyPhase2BlockTimestamp",
            Upgrade::Phase3 => "odyPhase3BlockTimestamp",
            Upgrade::Phase4 => "odyPhase4BlockTimestamp",
            Upgrade::Phase5 => "odyPhase5BlockTimestamp",
            Upgrade::PhasePre6 => "odyPhasePre6BlockTimestamp",
            Upgrade::Phase6 => "odyPhase6BlockTimestamp",
            Upgrade::PhasePost6 => "odyPhasePost6BlockTimestamp",
            Upgrade::Phase7 => "odyPhase7BlockTimestamp",
            Upgrade::Banff => "banffBlockTimestamp",
            Upgrade::Cortina => "cortinaBlockTimestamp",
            Upgrade::DUpgrade => "dUpgradeBlockTimestamp",
            Upgrade::Cancun => "cancunTime",
        }
    }

    /// Human readable name used in compatibility errors
    pub fn label(self) -> &'static str {
        match self {
            Upgrade::Phase1 => "OdyPhase1",
            Upgrade::Phase2 => "OdyPhase2",
            Upgrade::Phase3 => "OdyPhase3",
            Upgrade::Phase4 => "OdyPhase4",
            Upgrade::Phase5 => "OdyPhase5",
            Upgrade::PhasePre6 => "OdyPhasePre6",
            Upgrade::Phase6 => "OdyPhase6",
            Upgrade::PhasePost6 => "OdyPhasePost6",
            Upgrade::Phase7 => "OdyPhase7",
            Upgrade::Banff => "Banff",
            Upgrade::Cortina => "Cortina",
            Upgrade::DUpgrade => "DUpgrade",
            Upgrade::Cancun => "Cancun",
        }
    }

    /// Optional upgrades may stay unset while later ones are scheduled
    fn optional(self) -> bool {
        matches!(self, Upgrade::Phase7)
    }
}

/// Fee split fractions, each expressed over `denominator`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FeeAllocation {
    /// Liquidity-provider share of the base fee
    pub lp: u64,
    /// Governance share of the base fee; validators are paid out of it
    pub governance: u64,
    /// Per-validator share of the base fee
    pub orion: u64,
    /// Cap on the aggregate validator share of the base fee
    pub max_orion: u64,
    /// Validator share of the priority fee
    pub priority_fee_orion: u64,
    pub denominator: u64,
}

impl Default for FeeAllocation {
    fn default() -> Self {
        Self {
            lp: 0,
            governance: 0,
            orion: 0,
            max_orion: 0,
            priority_fee_orion: 0,
            denominator: ALLOCATION_DENOMINATOR,
        }
    }
}

impl FeeAllocation {
    pub fn validate(&self) -> CoreResult<()> {
        if self.denominator == 0 {
            return Err(CoreError::Config(
                "fee allocation denominator must be greater than 0".to_string(),
            ));
        }
        let base_share = self.lp.checked_add(self.governance);
        if base_share.is_none_or(|share| share > self.denominator) {
            return Err(CoreError::Config(format!(
                "lp ({}) plus governance ({}) allocation exceeds denominator {}",
                self.lp, self.governance, self.denominator
            )));
        }
        for (name, value) in [
            ("orion", self.orion),
            ("maxOrion", self.max_orion),
            ("priorityFeeOrion", self.priority_fee_orion),
        ] {
            if value > self.denominator {
                return Err(CoreError::Config(format!(
                    "{} allocation {} exceeds denominator {}",
                    name, value, self.denominator
                )));
            }
        }
        Ok(())
    }
}

/// Location of the validator list in contract storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrionContractConfig {
    pub contract: Address,
    pub last_update_slot: Hash,
    pub list_slot: Hash,
}

/// Chain configuration
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainConfig {
    pub chain_id: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homestead_block: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dao_fork_block: Option<u64>,
    #[serde(default)]
    pub dao_fork_support: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eip150_block: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eip155_block: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eip158_block: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub byzantium_block: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constantinople_block: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub petersburg_block: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub istanbul_block: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub muir_glacier_block: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ody_phase1_block_timestamp: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ody_phase2_block_timestamp: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ody_phase3_block_timestamp: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ody_phase4_block_timestamp: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ody_phase5_block_timestamp: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ody_phase_pre6_block_timestamp: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ody_phase6_block_timestamp: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ody_phase_post6_block_timestamp: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ody_phase7_block_timestamp: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub banff_block_timestamp: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cortina_block_timestamp: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub d_upgrade_block_timestamp: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancun_time: Option<u64>,

    /// Fee split applied once Phase7 is active
    #[serde(default)]
    pub fee_allocation: FeeAllocation,
    /// Validator list location, if validators share fees
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orion_contract: Option<OrionContractConfig>,
}

/// Whether a height-keyed fork scheduled at `fork` is active at `head`
pub fn is_block_forked(fork: Option<u64>, head: u64) -> bool {
    fork.is_some_and(|f| f <= head)
}

/// Whether a timestamp-keyed upgrade scheduled at `fork` is active at `time`
pub fn is_timestamp_forked(fork: Option<u64>, time: u64) -> bool {
    fork.is_some_and(|f| f <= time)
}

pub(crate) struct HeightFork {
    pub name: &'static str,
    pub block: Option<u64>,
    pub optional: bool,
}

impl ChainConfig {
    /// Load configuration from a JSON file and validate it
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> CoreResult<Self> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| CoreError::Config(format!("Failed to read config file: {}", e)))?;

        let config: ChainConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> CoreResult<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), content)
            .map_err(|e| CoreError::Config(format!("Failed to write config file: {}", e)))?;
        Ok(())
    }

    /// Validate fork ordering and fee allocation
    pub fn validate(&self) -> CoreResult<()> {
        self.check_fork_order()?;
        self.fee_allocation.validate()
    }

    pub(crate) fn height_forks(&self) -> [HeightFork; 10] {
        let fork = |name, block, optional| HeightFork {
            name,
            block,
            optional,
        };
        [
            fork("homesteadBlock", self.homestead_block, false),
            fork("daoForkBlock", self.dao_fork_block, true),
            fork("eip150Block", self.eip150_block, false),
            fork("eip155Block", self.eip155_block, false),
            fork("eip158Block", self.eip158_block, false),
            fork("byzantiumBlock", self.byzantium_block, false),
            fork("constantinopleBlock", self.constantinople_block, false),
            fork("petersburgBlock", self.petersburg_block, false),
            fork("istanbulBlock", self.istanbul_block, false),
            fork("muirGlacierBlock", self.muir_glacier_block, true),
        ]
    }

    /// Reject configurations that skip forks or activate a height fork
    /// anywhere but genesis
    pub fn check_fork_order(&self) -> CoreResult<()> {
        let mut last: Option<(&'static str, Option<u64>)> = None;
        for cur in self.height_forks() {
            if cur.block.is_some_and(|b| b != 0) {
                return Err(CoreError::NonGenesisForkByHeight);
            }
            check_pair(last, cur.name, cur.block)?;
            if !cur.optional || cur.block.is_some() {
                last = Some((cur.name, cur.block));
            }
        }

        let mut last: Option<(&'static str, Option<u64>)> = None;
        for upgrade in Upgrade::ALL {
            let time = self.upgrade_time(upgrade);
            check_pair(last, upgrade.config_key(), time)?;
            if !upgrade.optional() || time.is_some() {
                last = Some((upgrade.config_key(), time));
            }
        }
        Ok(())
    }

    /// Activation timestamp of `upgrade`
    pub fn upgrade_time(&self, upgrade: Upgrade) -> Option<u64> {
        match upgrade {
            Upgrade::Phase1 => self.ody_phase1_block_timestamp,
            Upgrade::Phase2 => self.ody_phase2_block_timestamp,
            Upgrade::Phase3 => self.ody_phase3_block_timestamp,
            Upgrade::Phase4 => self.ody_phase4_block_timestamp,
            Upgrade::Phase5 => self.ody_phase5_block_timestamp,
            Upgrade::PhasePre6 => self.ody_phase_pre6_block_timestamp,
            Upgrade::Phase6 => self.ody_phase6_block_timestamp,
            Upgrade::PhasePost6 => self.ody_phase_post6_block_timestamp,
            Upgrade::Phase7 => self.ody_phase7_block_timestamp,
            Upgrade::Banff => self.banff_block_timestamp,
            Upgrade::Cortina => self.cortina_block_timestamp,
            Upgrade::DUpgrade => self.d_upgrade_block_timestamp,
            Upgrade::Cancun => self.cancun_time,
        }
    }

    /// Schedule (or unschedule) `upgrade`
    pub fn set_upgrade_time(&mut self, upgrade: Upgrade, time: Option<u64>) {
        let slot = match upgrade {
            Upgrade::Phase1 => &mut self.ody_phase1_block_timestamp,
            Upgrade::Phase2 => &mut self.ody_phase2_block_timestamp,
            Upgrade::Phase3 => &mut self.ody_phase3_block_timestamp,
            Upgrade::Phase4 => &mut self.ody_phase4_block_timestamp,
            Upgrade::Phase5 => &mut self.ody_phase5_block_timestamp,
            Upgrade::PhasePre6 => &mut self.ody_phase_pre6_block_timestamp,
            Upgrade::Phase6 => &mut self.ody_phase6_block_timestamp,
            Upgrade::PhasePost6 => &mut self.ody_phase_post6_block_timestamp,
            Upgrade::Phase7 => &mut self.ody_phase7_block_timestamp,
            Upgrade::Banff => &mut self.banff_block_timestamp,
            Upgrade::Cortina => &mut self.cortina_block_timestamp,
            Upgrade::DUpgrade => &mut self.d_upgrade_block_timestamp,
            Upgrade::Cancun => &mut self.cancun_time,
        };
        *slot = time;
    }

    /// Builder form of [`ChainConfig::set_upgrade_time`]
    pub fn with_upgrade_time(mut self, upgrade: Upgrade, time: Option<u64>) -> Self {
        self.set_upgrade_time(upgrade, time);
        self
    }

    /// Set the fee split
    pub fn with_fee_allocation(mut self, allocation: FeeAllocation) -> Self {
        self.fee_allocation = allocation;
        self
    }

    pub fn is_active(&self, upgrade: Upgrade, time: u64) -> bool {
        is_timestamp_forked(self.upgrade_time(upgrade), time)
    }

    pub fn is_dao_fork(&self, height: u64) -> bool {
        is_block_forked(self.dao_fork_block, height)
    }

    pub fn is_eip158(&self, height: u64) -> bool {
        is_block_forked(self.eip158_block, height)
    }

    /// Every height fork at genesis
    fn genesis_forks(chain_id: u64) -> Self {
        Self {
            chain_id,
            homestead_block: Some(0),
            eip150_block: Some(0),
            eip155_block: Some(0),
            eip158_block: Some(0),
            byzantium_block: Some(0),
            constantinople_block: Some(0),
            petersburg_block: Some(0),
            istanbul_block: Some(0),
            muir_glacier_block: Some(0),
            ..Default::default()
        }
    }

    /// Height forks at genesis and every upgrade up to and including
    /// `last` active from genesis; later upgrades unscheduled
    fn through(chain_id: u64, last: Option<Upgrade>) -> Self {
        let mut config = Self::genesis_forks(chain_id);
        if let Some(last) = last {
            for upgrade in Upgrade::ALL.into_iter().filter(|u| *u <= last) {
                if upgrade != Upgrade::Phase7 {
                    config.set_upgrade_time(upgrade, Some(0));
                }
            }
        }
        config
    }

    /// Main network
    pub fn mainnet() -> Self {
        let mut config = Self::through(MAINNET_CHAIN_ID, Some(Upgrade::Cortina));
        config.dao_fork_block = Some(0);
        config.dao_fork_support = true;
        config
    }

    /// Public test network
    pub fn testnet() -> Self {
        let mut config = Self::through(TESTNET_CHAIN_ID, Some(Upgrade::Cortina));
        config.dao_fork_block = Some(0);
        config.dao_fork_support = true;
        config
    }

    /// Local development network
    pub fn local() -> Self {
        let mut config = Self::through(LOCAL_CHAIN_ID, Some(Upgrade::DUpgrade));
        config.dao_fork_block = Some(0);
        config.dao_fork_support = true;
        config
    }

    /// Test configuration with every shipped upgrade active at genesis
    pub fn test_chain() -> Self {
        Self::through(1, Some(Upgrade::DUpgrade))
    }

    /// Test configuration with no timestamp upgrade scheduled
    pub fn test_launch() -> Self {
        Self::through(1, None)
    }

    /// Test configuration with upgrades through `last` active at genesis
    pub fn test_through(last: Upgrade) -> Self {
        Self::through(1, Some(last))
    }
}

fn check_pair(
    last: Option<(&'static str, Option<u64>)>,
    name: &'static str,
    at: Option<u64>,
) -> CoreResult<()> {
    let Some((last_name, last_at)) = last else {
        return Ok(());
    };
    match (last_at, at) {
        (None, Some(cur)) => Err(CoreError::ForkOrder(format!(
            "{} not enabled, but {} enabled at {}",
            last_name, name, cur
        ))),
        (Some(prev), Some(cur)) if prev > cur => Err(CoreError::ForkOrder(format!(
            "{} enabled at {}, but {} enabled at {}",
            last_name, prev, name, cur
        ))),
        _ => Ok(()),
    }
}
