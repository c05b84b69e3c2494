//! The chain VM consensus drives
//!
//! Owns the versioned database, the chain state, the atomic backend and
//! mempool, and hands out blocks whose lifecycle lives in `block`.

use crate::atomic_backend::AtomicBackend;
use crate::block::{BlockStatus, VmBlock, LAST_ACCEPTED_KEY};
use crate::chain::{ChainState, Genesis};
use crate::config::NodeConfig;
use crate::gas_price::{GasPriceHints, GasPriceUpdater};
use crate::validator::BlockValidator;
use crate::{NodeError, NodeResult};
use delta_core::params::protocol::ATOMIC_GAS_LIMIT;
use delta_core::{Block, ChainConfig, Hash, Transaction};
use delta_db::{ColumnFamily, KeyValueDB, SharedDatabase, VersionDb};
use delta_vm::atomic::{AtomicMempool, AtomicTxPool, ChainContext, Fx, SharedMemory, Tx};
use delta_vm::TransactionExecutor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Everything the VM is wired to from outside
pub struct VmContext {
    pub chain_config: Arc<ChainConfig>,
    pub chain: ChainContext,
    pub db: SharedDatabase,
    pub shared_memory: Arc<dyn SharedMemory>,
    pub fx: Arc<dyn Fx>,
    pub executor: Arc<dyn TransactionExecutor>,
}

pub struct DeltaVm {
    config: Arc<ChainConfig>,
    db: Arc<VersionDb>,
    shared_memory: Arc<dyn SharedMemory>,
    chain: ChainState,
    atomic_backend: AtomicBackend,
    mempool: AtomicMempool,
    validator: BlockValidator,
    gas_price_hints: Arc<GasPriceHints>,
    bootstrapped: AtomicBool,
    fixed_now: Option<u64>,
}

impl DeltaVm {
    /// Open the VM on `context`, replaying atomic operations a previous run
    /// accepted but never applied
    pub fn new(context: VmContext, genesis: Genesis, node: &NodeConfig) -> NodeResult<Self> {
        let genesis_hash = genesis.block.hash()?;
        let db = Arc::new(VersionDb::new(context.db));
        if db.get(ColumnFamily::Metadata, LAST_ACCEPTED_KEY)?.is_none() {
            db.put(ColumnFamily::Blocks, genesis_hash.as_bytes(), &genesis.block.encode()?)?;
            db.put(ColumnFamily::Metadata, LAST_ACCEPTED_KEY, genesis_hash.as_bytes())?;
            db.commit()?;
            info!(genesis = %genesis_hash, "initialized chain from genesis");
        }

        let mut validator = BlockValidator::new(
            context.chain.clone(),
            genesis_hash,
            node.max_future_block_time,
        );
        if let Some(table) = node.ext_data_hashes()? {
            validator = validator.with_ext_data_hashes(table);
        }

        let atomic_backend = AtomicBackend::new(
            db.clone(),
            context.shared_memory.clone(),
            node.bonus_block_table(),
        );
        let replayed = atomic_backend.recover()?;
        if replayed > 0 {
            info!(blocks = replayed, "replayed pending atomic operations");
        }

        let mempool = AtomicMempool::new(node.mempool.capacity, context.chain.native_asset_id);
        let chain = ChainState::new(
            context.chain_config.clone(),
            context.chain,
            context.executor,
            context.shared_memory.clone(),
            context.fx,
            genesis,
        )?;

        Ok(Self {
            config: context.chain_config,
            db,
            shared_memory: context.shared_memory,
            chain,
            atomic_backend,
            mempool,
            validator,
            gas_price_hints: Arc::new(GasPriceHints::new()),
            bootstrapped: AtomicBool::new(false),
            fixed_now: None,
        })
    }

    /// Pin the local clock, for replay and tests
    pub fn with_fixed_time(mut self, now: u64) -> Self {
        self.fixed_now = Some(now);
        self
    }

    pub fn now(&self) -> u64 {
        self.fixed_now
            .unwrap_or_else(|| chrono::Utc::now().timestamp().max(0) as u64)
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn db(&self) -> &VersionDb {
        &self.db
    }

    pub fn chain(&self) -> &ChainState {
        &self.chain
    }

    pub fn validator(&self) -> &BlockValidator {
        &self.validator
    }

    pub fn atomic_backend(&self) -> &AtomicBackend {
        &self.atomic_backend
    }

    pub fn shared_memory(&self) -> &dyn SharedMemory {
        self.shared_memory.as_ref()
    }

    pub fn mempool(&self) -> &AtomicMempool {
        &self.mempool
    }

    pub fn gas_price_hints(&self) -> Arc<GasPriceHints> {
        self.gas_price_hints.clone()
    }

    pub fn set_bootstrapped(&self, bootstrapped: bool) {
        self.bootstrapped.store(bootstrapped, Ordering::SeqCst);
    }

    pub fn is_bootstrapped(&self) -> bool {
        self.bootstrapped.load(Ordering::SeqCst)
    }

    pub fn last_accepted(&self) -> Hash {
        self.chain.last_accepted().0
    }

    /// Decode a block received from the network
    pub fn parse_block(&self, bytes: &[u8]) -> NodeResult<VmBlock> {
        let block = Block::decode(bytes)?;
        let rules = self.config.rules(block.number(), block.time());
        VmBlock::new(block, rules.is_phase5)
    }

    /// Accepted block by id
    pub fn get_block(&self, id: &Hash) -> NodeResult<Option<VmBlock>> {
        let Some(bytes) = self.db.get(ColumnFamily::Blocks, id.as_bytes())? else {
            return Ok(None);
        };
        let block = self.parse_block(&bytes)?;
        Ok(Some(block.with_status(BlockStatus::Accepted)))
    }

    /// Verify `tx` against the last accepted state and pool it
    pub fn issue_tx(&self, tx: Tx, local: bool) -> NodeResult<()> {
        self.chain.verify_at_tip(&tx, self.now(), self.is_bootstrapped())?;
        self.mempool.issue_tx(tx, local)?;
        Ok(())
    }

    /// Build on the last accepted block at the local clock
    pub fn build_block(&self, txs: Vec<Transaction>) -> NodeResult<VmBlock> {
        let (parent, header) = self.chain.last_accepted();
        self.build_child(&parent, self.now().max(header.time), txs)
    }

    /// Build a child of `parent` at `time` from `txs` and pooled atomic txs
    pub fn build_child(&self, parent: &Hash, time: u64, txs: Vec<Transaction>) -> NodeResult<VmBlock> {
        self.atomic_backend.ensure_settled()?;
        let height = self
            .chain
            .header(parent)
            .ok_or(NodeError::UnknownParent(*parent))?
            .number
            + 1;
        let rules = self.config.rules(height, time);
        let mut atomic_txs = self.mempool.next_batch(ATOMIC_GAS_LIMIT, rules.is_phase5);
        if !rules.is_phase5 {
            atomic_txs.truncate(1);
        }
        if txs.is_empty() && atomic_txs.is_empty() {
            return Err(NodeError::EmptyBlock);
        }
        debug!(%parent, height, atomic_txs = atomic_txs.len(), txs = txs.len(), "building block");

        let block = self.chain.build_block(parent, time, txs, atomic_txs)?;
        VmBlock::new(block, rules.is_phase5)
    }

    /// Start publishing gas price hints for the configured upgrades
    pub fn start_gas_price_updater(&self, shutdown: CancellationToken) -> GasPriceUpdater {
        let updater = GasPriceUpdater::new(self.gas_price_hints.clone(), self.config.clone(), shutdown);
        updater.start();
        updater
    }
}
