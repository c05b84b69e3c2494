//! Node configuration
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! environment variables such as `DELTA__MEMPOOL__CAPACITY=8192`.

use crate::{NodeError, NodeResult};
use config::{Config, Environment, File, FileFormat};
use delta_core::params::protocol::MAX_FUTURE_BLOCK_TIME;
use delta_core::{ChainConfig, Hash, Id};
use delta_vm::atomic::{ChainContext, StaticSubnets};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "DELTA";
/// Separator between prefix and nested keys
pub const ENV_SEPARATOR: &str = "__";
/// File name written by `init`
pub const CONFIG_FILE_NAME: &str = "delta.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Chain configuration JSON; the local preset when unset
    pub chain_config_path: Option<PathBuf>,
    /// Sled database directory; in-memory when unset
    pub data_dir: Option<PathBuf>,
    pub identity: ChainIdentity,
    pub logging: LoggingConfig,
    pub mempool: MempoolConfig,
    /// Seconds a block may be ahead of the local clock
    pub max_future_block_time: u64,
    /// Blocks whose atomic effects were applied out of band
    pub bonus_blocks: Vec<BonusBlock>,
    /// JSON map of block hash to ext data hash, checked before Phase1
    pub ext_data_hashes_path: Option<PathBuf>,
}

/// Where this chain sits in the network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainIdentity {
    pub network_id: u32,
    pub chain_id: Id,
    /// Asset chain, the usual import and export peer
    pub a_chain_id: Id,
    pub omega_chain_id: Id,
    pub native_asset_id: Id,
    /// Subnet validating this chain and the asset chain
    pub subnet_id: Id,
}

impl ChainIdentity {
    pub fn context(&self) -> ChainContext {
        ChainContext {
            network_id: self.network_id,
            chain_id: self.chain_id,
            a_chain_id: self.a_chain_id,
            omega_chain_id: self.omega_chain_id,
            native_asset_id: self.native_asset_id,
            subnets: Arc::new(
                StaticSubnets::new()
                    .with_chain(self.chain_id, self.subnet_id)
                    .with_chain(self.a_chain_id, self.subnet_id),
            ),
        }
    }
}

impl Default for ChainIdentity {
    fn default() -> Self {
        Self {
            network_id: 12345,
            chain_id: Id::new([0x0c; 32]),
            a_chain_id: Id::new([0x0a; 32]),
            omega_chain_id: Id::zero(),
            native_asset_id: Id::new([0x01; 32]),
            subnet_id: Id::zero(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    pub json: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MempoolConfig {
    pub capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BonusBlock {
    pub height: u64,
    pub hash: Hash,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            chain_config_path: None,
            data_dir: None,
            identity: ChainIdentity::default(),
            logging: LoggingConfig::default(),
            mempool: MempoolConfig::default(),
            max_future_block_time: MAX_FUTURE_BLOCK_TIME,
            bonus_blocks: Vec::new(),
            ext_data_hashes_path: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Default for MempoolConfig {
    fn default() -> Self {
        Self { capacity: 4096 }
    }
}

impl NodeConfig {
    /// Load defaults, overlay `path` if given, then the environment
    pub fn load(path: Option<&Path>) -> NodeResult<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&NodeConfig::default())?);
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
        }
        let config: NodeConfig = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator(ENV_SEPARATOR)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default configuration into `dir`
    pub fn init(dir: &Path) -> NodeResult<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(CONFIG_FILE_NAME);
        NodeConfig::default().save_to_file(&path)?;
        Ok(path)
    }

    pub fn save_to_file(&self, path: &Path) -> NodeResult<()> {
        let contents = toml::to_string_pretty(self).map_err(|e| NodeError::Config {
            reason: format!("failed to serialize config: {}", e),
        })?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn validate(&self) -> NodeResult<()> {
        if self.mempool.capacity == 0 {
            return Err(NodeError::Config {
                reason: "mempool capacity must be positive".to_string(),
            });
        }
        if self.logging.level.trim().is_empty() {
            return Err(NodeError::Config {
                reason: "logging level must not be empty".to_string(),
            });
        }
        if self.identity.chain_id == self.identity.a_chain_id {
            return Err(NodeError::Config {
                reason: "chain id and asset chain id must differ".to_string(),
            });
        }
        let mut heights = HashMap::new();
        for bonus in &self.bonus_blocks {
            if heights.insert(bonus.height, bonus.hash).is_some() {
                return Err(NodeError::Config {
                    reason: format!("duplicate bonus block height {}", bonus.height),
                });
            }
        }
        Ok(())
    }

    /// Chain configuration named by `chain_config_path`
    pub fn chain_config(&self) -> NodeResult<ChainConfig> {
        match &self.chain_config_path {
            Some(path) => Ok(ChainConfig::load_from_file(path)?),
            None => Ok(ChainConfig::local()),
        }
    }

    /// Bonus blocks keyed by height
    pub fn bonus_block_table(&self) -> HashMap<u64, Hash> {
        self.bonus_blocks
            .iter()
            .map(|bonus| (bonus.height, bonus.hash))
            .collect()
    }

    /// Legacy ext data hashes, if a table is configured
    pub fn ext_data_hashes(&self) -> NodeResult<Option<HashMap<Hash, Hash>>> {
        let Some(path) = &self.ext_data_hashes_path else {
            return Ok(None);
        };
        let contents = std::fs::read_to_string(path)?;
        let table = serde_json::from_str(&contents).map_err(|e| NodeError::Config {
            reason: format!("failed to parse ext data hashes '{}': {}", path.display(), e),
        })?;
        Ok(Some(table))
    }
}
