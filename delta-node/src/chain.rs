//! Chain state: the last accepted block and the blocks still processing
//!
//! Every verified block keeps the state it produced, so children can be
//! executed on top of it before it is decided. Processing blocks also
//! remember the shared-memory inputs their atomic txs spend, which is what
//! the conflict check against processing ancestors walks.

use crate::{NodeError, NodeResult};
use delta_consensus::{
    calc_base_fee, calc_block_gas_cost, distribute, estimate_next_base_fee, verify_block_fee,
    verify_header_fees, FeesDistribution, TxFee,
};
use delta_core::params::protocol::{BLACKHOLE_ADDRESS, X2C_RATE};
use delta_core::{Block, ChainConfig, Gas, Hash, Header, Id, Transaction, Wei};
use delta_vm::atomic::{
    encode_atomic_txs, AtomicResult, AtomicTxError, ChainContext, ConflictChecker, Fx,
    SemanticContext, SharedMemory, Tx,
};
use delta_vm::{ExecutionContext, OrionNodesGetter, SharedStateDB, StateDB, TransactionExecutor};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, trace};

/// Genesis block and the state it commits to
#[derive(Debug, Clone)]
pub struct Genesis {
    pub block: Block,
    pub state: SharedStateDB,
}

impl Genesis {
    /// Genesis with an empty state and a zero header
    pub fn empty() -> NodeResult<Self> {
        Ok(Self {
            block: Block::new(Header::default(), Vec::new(), Vec::new(), None, false)?,
            state: SharedStateDB::memory(),
        })
    }
}

#[derive(Debug, Clone)]
struct Tip {
    hash: Hash,
    header: Header,
    state: SharedStateDB,
    fees: FeesDistribution,
}

#[derive(Debug, Clone)]
struct ProcessedBlock {
    header: Header,
    state: SharedStateDB,
    /// Shared-memory inputs spent by the block's atomic txs
    inputs: BTreeSet<Id>,
    fees: FeesDistribution,
}

struct ChainInner {
    last_accepted: Tip,
    processing: HashMap<Hash, ProcessedBlock>,
}

impl ChainInner {
    fn parent(&self, hash: &Hash) -> NodeResult<(&Header, &SharedStateDB)> {
        if *hash == self.last_accepted.hash {
            return Ok((&self.last_accepted.header, &self.last_accepted.state));
        }
        self.processing
            .get(hash)
            .map(|block| (&block.header, &block.state))
            .ok_or(NodeError::UnknownParent(*hash))
    }
}

impl ConflictChecker for ChainInner {
    fn check_conflicts(&self, inputs: &BTreeSet<Id>, parent: &Hash) -> AtomicResult<()> {
        let mut cursor = *parent;
        while let Some(block) = self.processing.get(&cursor) {
            if let Some(id) = block.inputs.intersection(inputs).next() {
                return Err(AtomicTxError::ConflictingAncestor(*id));
            }
            cursor = block.header.parent_hash;
        }
        Ok(())
    }
}

/// Conflicts with processing ancestors and with earlier txs of the same block
struct BlockConflicts<'a> {
    chain: &'a ChainInner,
    spent: &'a BTreeSet<Id>,
}

impl ConflictChecker for BlockConflicts<'_> {
    fn check_conflicts(&self, inputs: &BTreeSet<Id>, parent: &Hash) -> AtomicResult<()> {
        if let Some(id) = self.spent.intersection(inputs).next() {
            return Err(AtomicTxError::ConflictingAncestor(*id));
        }
        self.chain.check_conflicts(inputs, parent)
    }
}

/// Result of running a block body on its parent state
struct Execution {
    state: SharedStateDB,
    gas_used: Gas,
    inputs: BTreeSet<Id>,
    fees: FeesDistribution,
}

fn overflow(what: &'static str) -> NodeError {
    NodeError::Overflow(what)
}

/// Run `f` against the state under its write lock
fn with_state<R>(
    state: &SharedStateDB,
    f: impl FnOnce(&mut dyn StateDB) -> NodeResult<R>,
) -> NodeResult<R> {
    state.update(|s| Ok(f(s)))?
}

pub struct ChainState {
    config: Arc<ChainConfig>,
    ctx: ChainContext,
    executor: Arc<dyn TransactionExecutor>,
    orion: Option<OrionNodesGetter>,
    shared_memory: Arc<dyn SharedMemory>,
    fx: Arc<dyn Fx>,
    inner: RwLock<ChainInner>,
}

impl ChainState {
    pub fn new(
        config: Arc<ChainConfig>,
        ctx: ChainContext,
        executor: Arc<dyn TransactionExecutor>,
        shared_memory: Arc<dyn SharedMemory>,
        fx: Arc<dyn Fx>,
        genesis: Genesis,
    ) -> NodeResult<Self> {
        let orion = config.orion_contract.as_ref().map(OrionNodesGetter::from_config);
        let tip = Tip {
            hash: genesis.block.hash()?,
            header: genesis.block.header,
            state: genesis.state,
            fees: FeesDistribution::default(),
        };
        Ok(Self {
            config,
            ctx,
            executor,
            orion,
            shared_memory,
            fx,
            inner: RwLock::new(ChainInner {
                last_accepted: tip,
                processing: HashMap::new(),
            }),
        })
    }

    pub fn last_accepted(&self) -> (Hash, Header) {
        let inner = self.inner.read();
        (inner.last_accepted.hash, inner.last_accepted.header.clone())
    }

    /// State after the last accepted block
    pub fn last_accepted_state(&self) -> SharedStateDB {
        self.inner.read().last_accepted.state.clone()
    }

    /// State after `hash`, if it is accepted last or still processing
    pub fn state_at(&self, hash: &Hash) -> Option<SharedStateDB> {
        let inner = self.inner.read();
        inner.parent(hash).ok().map(|(_, state)| state.clone())
    }

    /// Header of the last accepted block or a processing one
    pub fn header(&self, hash: &Hash) -> Option<Header> {
        let inner = self.inner.read();
        inner.parent(hash).ok().map(|(header, _)| header.clone())
    }

    /// Fee split of a processing or the last accepted block
    pub fn fees(&self, hash: &Hash) -> Option<FeesDistribution> {
        let inner = self.inner.read();
        if *hash == inner.last_accepted.hash {
            return Some(inner.last_accepted.fees);
        }
        inner.processing.get(hash).map(|block| block.fees)
    }

    pub fn is_processing(&self, hash: &Hash) -> bool {
        self.inner.read().processing.contains_key(hash)
    }

    fn execute(
        &self,
        inner: &ChainInner,
        header: &Header,
        txs: &[Transaction],
        atomic_txs: &[Tx],
        bootstrapped: bool,
    ) -> NodeResult<Execution> {
        let (_, parent_state) = inner.parent(&header.parent_hash)?;
        let state = parent_state.fork();
        let rules = self.config.rules(header.number, header.time);
        let base_fee = if rules.is_phase3 { header.base_fee } else { None };

        let context = ExecutionContext {
            chain_id: self.config.chain_id,
            block_number: header.number,
            timestamp: header.time,
            base_fee,
            coinbase: header.coinbase,
        };
        let mut tx_fees = Vec::with_capacity(txs.len());
        let mut gas_used: Gas = 0;
        let mut base_total: Wei = 0;
        let mut priority_total: Wei = 0;
        for tx in txs {
            let receipt = state.update(|s| self.executor.execute(tx, s, &context))?;
            let gas = Wei::from(receipt.gas_used);
            gas_used = gas_used
                .checked_add(receipt.gas_used)
                .ok_or_else(|| overflow("block gas used"))?;
            // Before dynamic fees the whole price counts as base fee
            let (burned, tip) = match base_fee {
                Some(base_fee) => (base_fee, receipt.tip),
                None => (receipt.tip, 0),
            };
            base_total = gas
                .checked_mul(burned)
                .and_then(|fee| base_total.checked_add(fee))
                .ok_or_else(|| overflow("base fee total"))?;
            priority_total = gas
                .checked_mul(tip)
                .and_then(|fee| priority_total.checked_add(fee))
                .ok_or_else(|| overflow("priority fee total"))?;
            tx_fees.push(TxFee {
                gas_used: receipt.gas_used,
                tip: receipt.tip,
            });
        }

        let mut inputs = BTreeSet::new();
        let mut contribution: Wei = 0;
        for tx in atomic_txs {
            let conflicts = BlockConflicts {
                chain: inner,
                spent: &inputs,
            };
            let env = SemanticContext {
                chain: &self.ctx,
                rules: &rules,
                base_fee: header.base_fee,
                parent: header.parent_hash,
                shared_memory: self.shared_memory.as_ref(),
                fx: self.fx.as_ref(),
                conflicts: &conflicts,
                bootstrapped,
            };
            tx.semantic_verify(&env)?;
            with_state(&state, |s| Ok(tx.state_transfer(&self.ctx, s)?))?;

            if rules.is_phase4 {
                let base_fee = header.base_fee.ok_or(NodeError::MissingBaseFee)?;
                contribution = self
                    .atomic_contribution(tx, rules.is_phase5, base_fee)?
                    .checked_add(contribution)
                    .ok_or_else(|| overflow("atomic fee contribution"))?;
            }
            inputs.extend(tx.input_utxos());
        }

        if rules.is_phase4 {
            let base_fee = header.base_fee.ok_or(NodeError::MissingBaseFee)?;
            let required = header
                .block_gas_cost
                .ok_or(NodeError::MissingBlockGasCost)?;
            verify_block_fee(base_fee, required, &tx_fees, contribution)?;
        }

        let validators = match &self.orion {
            Some(getter) if rules.is_phase7 => state.read(|s| getter.validator_count(s))?,
            _ => 0,
        };
        let fees = distribute(base_total, priority_total, validators, &rules)?;
        trace!(number = header.number, gas_used, base_total, priority_total, validators, "executed block body");

        Ok(Execution {
            state,
            gas_used,
            inputs,
            fees,
        })
    }

    /// Native value an atomic tx burned beyond what its gas costs at `base_fee`
    fn atomic_contribution(&self, tx: &Tx, fixed_fee: bool, base_fee: Wei) -> NodeResult<Wei> {
        let burned = Wei::from(tx.unsigned.burned(&self.ctx.native_asset_id)?)
            .checked_mul(Wei::from(X2C_RATE))
            .ok_or_else(|| overflow("atomic tx burned amount"))?;
        let required = Wei::from(tx.gas_used(fixed_fee)?)
            .checked_mul(base_fee)
            .ok_or_else(|| overflow("atomic tx fee"))?;
        burned
            .checked_sub(required)
            .ok_or(NodeError::InsufficientAtomicFee { burned, required })
    }

    /// Execute `block` on its parent and keep the result as processing
    pub fn insert_block(&self, block: &Block, atomic_txs: &[Tx], bootstrapped: bool) -> NodeResult<()> {
        let hash = block.hash()?;
        let mut inner = self.inner.write();
        if hash == inner.last_accepted.hash || inner.processing.contains_key(&hash) {
            return Ok(());
        }

        let header = &block.header;
        let (parent, _) = inner.parent(&header.parent_hash)?;
        let want = parent.number + 1;
        if header.number != want {
            return Err(NodeError::InvalidNumber {
                have: header.number,
                want,
            });
        }
        verify_header_fees(&self.config, parent, header)?;

        let outcome = self.execute(&inner, header, &block.transactions, atomic_txs, bootstrapped)?;
        if outcome.gas_used != header.gas_used {
            return Err(NodeError::GasUsedMismatch {
                have: header.gas_used,
                want: outcome.gas_used,
            });
        }
        let root = outcome.state.state_root();
        if root != header.state_root {
            return Err(NodeError::StateRootMismatch {
                have: header.state_root,
                want: root,
            });
        }

        debug!(block = %hash, number = header.number, gas_used = outcome.gas_used, "inserted block");
        inner.processing.insert(
            hash,
            ProcessedBlock {
                header: header.clone(),
                state: outcome.state,
                inputs: outcome.inputs,
                fees: outcome.fees,
            },
        );
        Ok(())
    }

    /// Promote a processing child of the last accepted block
    /// Whether `hash` is a processing child of the last accepted block
    pub fn check_accept(&self, hash: &Hash) -> NodeResult<()> {
        Self::acceptable(&self.inner.read(), hash)
    }

    fn acceptable(inner: &ChainInner, hash: &Hash) -> NodeResult<()> {
        let last_accepted = inner.last_accepted.hash;
        match inner.processing.get(hash) {
            None => Err(NodeError::UnknownBlock(*hash)),
            Some(block) if block.header.parent_hash != last_accepted => {
                Err(NodeError::NotLastAcceptedChild {
                    block: *hash,
                    last_accepted,
                })
            }
            Some(_) => Ok(()),
        }
    }

    /// Promote `hash` to last accepted
    pub fn accept(&self, hash: &Hash) -> NodeResult<()> {
        let mut inner = self.inner.write();
        Self::acceptable(&inner, hash)?;
        let block = inner
            .processing
            .remove(hash)
            .ok_or(NodeError::UnknownBlock(*hash))?;
        inner.last_accepted = Tip {
            hash: *hash,
            header: block.header,
            state: block.state,
            fees: block.fees,
        };
        Ok(())
    }

    pub fn reject(&self, hash: &Hash) -> NodeResult<()> {
        self.inner
            .write()
            .processing
            .remove(hash)
            .map(|_| ())
            .ok_or(NodeError::UnknownBlock(*hash))
    }

    /// Check `tx` for inclusion in the next block on the last accepted one
    pub fn verify_at_tip(&self, tx: &Tx, now: u64, bootstrapped: bool) -> NodeResult<()> {
        let inner = self.inner.read();
        let tip = &inner.last_accepted;
        let time = now.max(tip.header.time);
        let rules = self.config.rules(tip.header.number + 1, time);
        let base_fee = if rules.is_phase3 {
            Some(estimate_next_base_fee(&self.config, &tip.header, time)?.1)
        } else {
            None
        };

        tx.unsigned.verify(&self.ctx, &rules)?;
        tx.semantic_verify(&SemanticContext {
            chain: &self.ctx,
            rules: &rules,
            base_fee,
            parent: tip.hash,
            shared_memory: self.shared_memory.as_ref(),
            fx: self.fx.as_ref(),
            conflicts: &*inner,
            bootstrapped,
        })?;
        Ok(())
    }

    /// Assemble a child of `parent` at `time` carrying `txs` and `atomic_txs`
    pub fn build_block(
        &self,
        parent: &Hash,
        time: u64,
        txs: Vec<Transaction>,
        atomic_txs: Vec<Tx>,
    ) -> NodeResult<Block> {
        let inner = self.inner.read();
        let (parent_header, _) = inner.parent(parent)?;
        let number = parent_header.number + 1;
        let rules = self.config.rules(number, time);

        let mut header = Header {
            parent_hash: *parent,
            coinbase: BLACKHOLE_ADDRESS,
            difficulty: 1,
            number,
            time,
            gas_limit: rules.gas_limit().unwrap_or(parent_header.gas_limit),
            ..Default::default()
        };
        if rules.is_phase1 {
            let (window, base_fee) = calc_base_fee(&self.config, parent_header, time)?;
            header.extra = window;
            if rules.is_phase3 {
                header.base_fee = Some(base_fee);
            }
        }
        if let Some(params) = rules.block_gas_cost() {
            header.block_gas_cost = Some(u128::from(calc_block_gas_cost(
                &params,
                parent_header.block_gas_cost,
                parent_header.time,
                time,
            )));
        }
        if rules.is_phase4 {
            let mut ext_gas: Gas = 0;
            for tx in &atomic_txs {
                ext_gas = ext_gas
                    .checked_add(tx.gas_used(rules.is_phase5)?)
                    .ok_or_else(|| overflow("ext data gas"))?;
            }
            header.ext_data_gas_used = Some(ext_gas);
        }

        let outcome = self.execute(&inner, &header, &txs, &atomic_txs, true)?;
        header.gas_used = outcome.gas_used;
        header.state_root = outcome.state.state_root();

        let ext_data = if atomic_txs.is_empty() {
            None
        } else {
            Some(encode_atomic_txs(&atomic_txs, rules.is_phase5)?)
        };
        let block = Block::new(header, txs, Vec::new(), ext_data, rules.is_phase1)?;
        debug!(number, time, atomic_txs = atomic_txs.len(), "built block");
        Ok(block)
    }
}
