//! Compatibility of a new chain configuration with the stored one
//!
//! A fork may only be rescheduled while neither the stored nor the new
//! activation point has been reached. Conflicts are reported together
//! with the height or timestamp the chain would have to rewind to; the
//! rewind itself is left to the operator.

use super::config::{is_block_forked, is_timestamp_forked, ChainConfig, Upgrade};
use thiserror::Error;

fn show(value: &Option<u64>) -> String {
    value.map_or_else(|| "nil".to_string(), |v| v.to_string())
}

/// Configuration change that would alter already processed history
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCompatError {
    #[error(
        "mismatching {what} in database (have block {}, want block {}, rewindto block {rewind_to})",
        show(.stored),
        show(.new)
    )]
    Block {
        what: &'static str,
        stored: Option<u64>,
        new: Option<u64>,
        rewind_to: u64,
    },

    #[error(
        "mismatching {what} in database (have timestamp {}, want timestamp {}, rewindto timestamp {rewind_to})",
        show(.stored),
        show(.new)
    )]
    Timestamp {
        what: String,
        stored: Option<u64>,
        new: Option<u64>,
        rewind_to: u64,
    },
}

/// Earliest of the two points, minus one
fn rewind_target(stored: Option<u64>, new: Option<u64>) -> u64 {
    let rewind = match (stored, new) {
        (None, new) => new,
        (Some(s), Some(n)) if s >= n => Some(n),
        (stored, _) => stored,
    };
    rewind.filter(|r| *r > 0).map_or(0, |r| r - 1)
}

impl ConfigCompatError {
    fn block(what: &'static str, stored: Option<u64>, new: Option<u64>) -> Self {
        ConfigCompatError::Block {
            what,
            stored,
            new,
            rewind_to: rewind_target(stored, new),
        }
    }

    fn timestamp(what: String, stored: Option<u64>, new: Option<u64>) -> Self {
        ConfigCompatError::Timestamp {
            what,
            stored,
            new,
            rewind_to: rewind_target(stored, new),
        }
    }

    /// Height to rewind to, 0 for timestamp conflicts
    pub fn rewind_to_block(&self) -> u64 {
        match self {
            ConfigCompatError::Block { rewind_to, .. } => *rewind_to,
            ConfigCompatError::Timestamp { .. } => 0,
        }
    }

    /// Timestamp to rewind to, 0 for height conflicts
    pub fn rewind_to_time(&self) -> u64 {
        match self {
            ConfigCompatError::Timestamp { rewind_to, .. } => *rewind_to,
            ConfigCompatError::Block { .. } => 0,
        }
    }
}

fn block_incompatible(stored: Option<u64>, new: Option<u64>, head: u64) -> bool {
    (is_block_forked(stored, head) || is_block_forked(new, head)) && stored != new
}

fn timestamp_incompatible(stored: Option<u64>, new: Option<u64>, time: u64) -> bool {
    (is_timestamp_forked(stored, time) || is_timestamp_forked(new, time)) && stored != new
}

impl ChainConfig {
    /// Check whether `new` can replace this stored configuration for a
    /// chain whose head is at `height` and `time`. Returns the earliest
    /// conflict, walking back until the rewind target is stable.
    pub fn check_compatible(
        &self,
        new: &ChainConfig,
        height: u64,
        time: u64,
    ) -> Option<ConfigCompatError> {
        let (mut head, mut head_time) = (height, time);
        let mut last: Option<ConfigCompatError> = None;
        while let Some(err) = self.check_compatible_at(new, head, head_time) {
            if last.as_ref().is_some_and(|prev| {
                prev.rewind_to_block() == err.rewind_to_block()
                    && prev.rewind_to_time() == err.rewind_to_time()
            }) {
                break;
            }
            if err.rewind_to_time() > 0 {
                head_time = err.rewind_to_time();
            } else {
                head = err.rewind_to_block();
            }
            last = Some(err);
        }
        last
    }

    fn check_compatible_at(
        &self,
        new: &ChainConfig,
        head: u64,
        time: u64,
    ) -> Option<ConfigCompatError> {
        let forks = [
            ("Homestead fork block", self.homestead_block, new.homestead_block),
            ("DAO fork block", self.dao_fork_block, new.dao_fork_block),
        ];
        for (what, stored, next) in forks {
            if block_incompatible(stored, next, head) {
                return Some(ConfigCompatError::block(what, stored, next));
            }
        }
        if self.is_dao_fork(head) && self.dao_fork_support != new.dao_fork_support {
            return Some(ConfigCompatError::block(
                "DAO fork support flag",
                self.dao_fork_block,
                new.dao_fork_block,
            ));
        }

        let forks = [
            ("EIP150 fork block", self.eip150_block, new.eip150_block),
            ("EIP155 fork block", self.eip155_block, new.eip155_block),
            ("EIP158 fork block", self.eip158_block, new.eip158_block),
        ];
        for (what, stored, next) in forks {
            if block_incompatible(stored, next, head) {
                return Some(ConfigCompatError::block(what, stored, next));
            }
        }
        if self.is_eip158(head) && self.chain_id != new.chain_id {
            return Some(ConfigCompatError::block(
                "EIP158 chain ID",
                self.eip158_block,
                new.eip158_block,
            ));
        }

        let forks = [
            ("Byzantium fork block", self.byzantium_block, new.byzantium_block),
            (
                "Constantinople fork block",
                self.constantinople_block,
                new.constantinople_block,
            ),
        ];
        for (what, stored, next) in forks {
            if block_incompatible(stored, next, head) {
                return Some(ConfigCompatError::block(what, stored, next));
            }
        }
        // Petersburg may be moved onto the stored Constantinople height
        if block_incompatible(self.petersburg_block, new.petersburg_block, head)
            && block_incompatible(self.constantinople_block, new.petersburg_block, head)
        {
            return Some(ConfigCompatError::block(
                "Petersburg fork block",
                self.petersburg_block,
                new.petersburg_block,
            ));
        }

        let forks = [
            ("Istanbul fork block", self.istanbul_block, new.istanbul_block),
            (
                "Muir Glacier fork block",
                self.muir_glacier_block,
                new.muir_glacier_block,
            ),
        ];
        for (what, stored, next) in forks {
            if block_incompatible(stored, next, head) {
                return Some(ConfigCompatError::block(what, stored, next));
            }
        }

        Upgrade::ALL.into_iter().find_map(|upgrade| {
            let (stored, next) = (self.upgrade_time(upgrade), new.upgrade_time(upgrade));
            timestamp_incompatible(stored, next, time).then(|| {
                ConfigCompatError::timestamp(
                    format!("{} fork block timestamp", upgrade.label()),
                    stored,
                    next,
                )
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_configs_compatible() {
        let config = ChainConfig::mainnet();
        assert!(config.check_compatible(&config, 1_000, 1_700_000_000).is_none());
    }

    #[test]
    fn test_future_reschedule_allowed() {
        let stored = ChainConfig::test_launch().with_upgrade_time(Upgrade::Phase1, Some(1_000));
        let new = stored
            .clone()
            .with_upgrade_time(Upgrade::Phase1, Some(2_000));
        assert!(stored.check_compatible(&new, 10, 500).is_none());
    }

    #[test]
    fn test_past_timestamp_change_rejected() {
        let stored = ChainConfig::test_chain();
        let new = stored.clone().with_upgrade_time(Upgrade::Phase1, Some(100));
        let err = stored.check_compatible(&new, 5, 200).unwrap();
        assert_eq!(err.rewind_to_time(), 0);
        assert_eq!(
            err.to_string(),
            "mismatching OdyPhase1 fork block timestamp in database (have timestamp 0, want timestamp 100, rewindto timestamp 0)"
        );
    }

    #[test]
    fn test_rewind_walks_back_to_earliest_conflict() {
        let stored = ChainConfig::test_launch()
            .with_upgrade_time(Upgrade::Phase1, Some(10))
            .with_upgrade_time(Upgrade::Phase2, Some(20));
        let new = stored.clone().with_upgrade_time(Upgrade::Phase2, Some(30));

        let err = stored.check_compatible(&new, 0, 25).unwrap();
        assert_eq!(err.rewind_to_time(), 19);
        assert!(err.to_string().contains("OdyPhase2"));
    }

    #[test]
    fn test_chain_id_change_rejected() {
        let stored = ChainConfig::test_chain();
        let mut new = stored.clone();
        new.chain_id = 2;
        let err = stored.check_compatible(&new, 0, 0).unwrap();
        assert_eq!(
            err.to_string(),
            "mismatching EIP158 chain ID in database (have block 0, want block 0, rewindto block 0)"
        );
    }

    #[test]
    fn test_dao_support_flag() {
        let stored = ChainConfig::mainnet();
        let mut new = stored.clone();
        new.dao_fork_support = false;
        let err = stored.check_compatible(&new, 0, 0).unwrap();
        assert!(matches!(
            err,
            ConfigCompatError::Block {
                what: "DAO fork support flag",
                ..
            }
        ));
    }

    #[test]
    fn test_petersburg_onto_constantinople() {
        let mut stored = ChainConfig::test_chain();
        stored.petersburg_block = None;
        let new = ChainConfig::test_chain();
        assert!(stored.check_compatible(&new, 10, 0).is_none());

        let mut moved = ChainConfig::test_chain();
        moved.constantinople_block = Some(0);
        moved.petersburg_block = Some(5);
        let err = stored.check_compatible(&moved, 10, 0).unwrap();
        assert!(err.to_string().contains("Petersburg fork block"));
        assert!(err.to_string().contains("have block nil, want block 5"));
    }

    #[test]
    fn test_cancun_reports_its_own_schedule() {
        let stored = ChainConfig::test_chain();
        let new = stored.clone().with_upgrade_time(Upgrade::Cancun, Some(3));
        let err = stored.check_compatible(&new, 0, 10).unwrap();
        assert_eq!(
            err.to_string(),
            "mismatching Cancun fork block timestamp in database (have timestamp nil, want timestamp 3, rewindto timestamp 2)"
        );
    }

    #[test]
    fn test_rewind_target() {
        assert_eq!(rewind_target(None, Some(5)), 4);
        assert_eq!(rewind_target(Some(3), Some(5)), 2);
        assert_eq!(rewind_target(Some(7), Some(5)), 4);
        assert_eq!(rewind_target(Some(7), None), 6);
        assert_eq!(rewind_target(Some(0), None), 0);
    }
}
