//! Block lifecycle
//!
//! A block starts `Unverified`. `verify` moves it to `Verified`, which only
//! lives in memory; consensus then decides it exactly once with `accept` or
//! `reject`.

use crate::atomic_backend::Settlement;
use crate::vm::DeltaVm;
use crate::{NodeError, NodeResult};
use delta_core::{Block, BlockNumber, Hash, Timestamp};
use delta_db::{ColumnFamily, KeyValueDB};
use delta_vm::atomic::{extract_atomic_txs, AtomicTxPool, Tx};
use std::fmt;
use tracing::{debug, info, warn};

/// Metadata key of the last accepted block id
pub const LAST_ACCEPTED_KEY: &[u8] = b"last_accepted";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStatus {
    Unverified,
    Verified,
    Accepted,
    Rejected,
}

impl BlockStatus {
    pub fn is_decided(&self) -> bool {
        matches!(self, BlockStatus::Accepted | BlockStatus::Rejected)
    }
}

impl fmt::Display for BlockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BlockStatus::Unverified => "unverified",
            BlockStatus::Verified => "verified",
            BlockStatus::Accepted => "accepted",
            BlockStatus::Rejected => "rejected",
        };
        f.write_str(name)
    }
}

/// A block together with its decoded atomic transactions
#[derive(Debug, Clone)]
pub struct VmBlock {
    id: Hash,
    block: Block,
    atomic_txs: Vec<Tx>,
    status: BlockStatus,
}

impl VmBlock {
    /// Wrap `block`, decoding its atomic payload in the format active at
    /// its timestamp
    pub fn new(block: Block, batch_atomic_txs: bool) -> NodeResult<Self> {
        let atomic_txs = extract_atomic_txs(block.ext_data(), batch_atomic_txs)?;
        Ok(Self {
            id: block.hash()?,
            block,
            atomic_txs,
            status: BlockStatus::Unverified,
        })
    }

    pub(crate) fn with_status(mut self, status: BlockStatus) -> Self {
        self.status = status;
        self
    }

    pub fn id(&self) -> Hash {
        self.id
    }

    pub fn parent(&self) -> Hash {
        self.block.parent_hash()
    }

    pub fn height(&self) -> BlockNumber {
        self.block.number()
    }

    pub fn timestamp(&self) -> Timestamp {
        self.block.time()
    }

    pub fn block(&self) -> &Block {
        &self.block
    }

    pub fn atomic_txs(&self) -> &[Tx] {
        &self.atomic_txs
    }

    pub fn status(&self) -> BlockStatus {
        self.status
    }

    pub fn bytes(&self) -> NodeResult<Vec<u8>> {
        Ok(self.block.encode()?)
    }

    fn invalid_status(&self, op: &'static str) -> NodeError {
        NodeError::InvalidStatus {
            block: self.id,
            status: self.status,
            op,
        }
    }

    /// Check the block and apply it on top of its parent's state
    pub fn verify(&mut self, vm: &DeltaVm) -> NodeResult<()> {
        match self.status {
            BlockStatus::Unverified => {}
            BlockStatus::Verified => return Ok(()),
            _ => return Err(self.invalid_status("verify")),
        }

        let rules = vm.config().rules(self.height(), self.timestamp());
        vm.validator().syntactic_verify(self, &rules, vm.now())?;
        self.verify_utxos_present(vm)?;

        vm.atomic_backend()
            .insert(self.id, self.height(), &self.atomic_txs)?;
        if let Err(err) = vm
            .chain()
            .insert_block(&self.block, &self.atomic_txs, vm.is_bootstrapped())
        {
            warn!(block = %self.id, error = %err, "aborting atomic state after failed insert");
            if let Err(abort) = vm.atomic_backend().reject(&self.id) {
                warn!(block = %self.id, error = %abort, "failed to abort atomic state");
            }
            return Err(err);
        }

        self.status = BlockStatus::Verified;
        debug!(block = %self.id, height = self.height(), atomic_txs = self.atomic_txs.len(), "verified block");
        Ok(())
    }

    /// Shared-memory UTXOs spent by this block's imports must still exist
    fn verify_utxos_present(&self, vm: &DeltaVm) -> NodeResult<()> {
        if vm.atomic_backend().is_bonus(self.height(), &self.id) {
            info!(block = %self.id, "skipping atomic tx verification on bonus block");
            return Ok(());
        }
        if !vm.is_bootstrapped() {
            return Ok(());
        }
        for tx in &self.atomic_txs {
            let (chain, requests) = tx.atomic_ops()?;
            vm.shared_memory()
                .get(&chain, &requests.remove_requests)
                .map_err(NodeError::MissingUtxos)?;
        }
        Ok(())
    }

    /// Make this block the last accepted one and settle its atomic effects.
    ///
    /// Nothing changes unless the durable commit succeeds. After it has, the
    /// block is accepted even if its shared-memory requests fail to apply;
    /// that error is returned and the requests wait for replay.
    pub fn accept(&mut self, vm: &DeltaVm) -> NodeResult<()> {
        if self.status != BlockStatus::Verified {
            return Err(self.invalid_status("accept"));
        }
        debug!(block = %self.id, height = self.height(), "accepting block");

        let settlement = match self.commit(vm) {
            Ok(settlement) => settlement,
            Err(err) => {
                vm.db().abort();
                return Err(err);
            }
        };
        self.status = BlockStatus::Accepted;
        vm.chain().accept(&self.id)?;
        for tx in &self.atomic_txs {
            vm.mempool().remove_tx(tx);
        }
        vm.atomic_backend().apply(settlement)
    }

    fn commit(&self, vm: &DeltaVm) -> NodeResult<Settlement> {
        vm.chain().check_accept(&self.id)?;
        vm.db()
            .put(ColumnFamily::Blocks, self.id.as_bytes(), &self.bytes()?)?;
        vm.db()
            .put(ColumnFamily::Metadata, LAST_ACCEPTED_KEY, self.id.as_bytes())?;
        vm.atomic_backend().commit(&self.id)
    }

    /// Drop this block and return its atomic txs to the mempool
    pub fn reject(&mut self, vm: &DeltaVm) -> NodeResult<()> {
        match self.status {
            BlockStatus::Verified => {}
            BlockStatus::Rejected => return Ok(()),
            _ => return Err(self.invalid_status("reject")),
        }
        self.status = BlockStatus::Rejected;
        debug!(block = %self.id, height = self.height(), "rejecting block");

        for tx in &self.atomic_txs {
            vm.mempool().remove_tx(tx);
            if let Err(err) = vm.issue_tx(tx.clone(), false) {
                debug!(error = %err, "failed to re-issue transaction in rejected block");
            }
        }
        vm.atomic_backend().reject(&self.id)?;
        vm.chain().reject(&self.id)
    }
}

impl fmt::Display for VmBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "block {} at height {}", self.id, self.height())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeConfig;
    use crate::testing::*;
    use delta_core::ChainConfig;
    use delta_db::MemoryDb;
    use delta_vm::atomic::{MemorySharedMemory, SharedMemory};
    use std::sync::Arc;

    fn genesis_of(t: &TestVm) -> Hash {
        t.vm.last_accepted()
    }

    fn transfer_block(t: &TestVm) -> VmBlock {
        t.vm.build_child(&genesis_of(t), GENESIS_TIME + 2, vec![transfer(0, GAS_PRICE)])
            .unwrap()
    }

    #[test]
    fn test_decided_exactly_once() {
        let t = test_vm(ChainConfig::test_chain());
        let mut block = transfer_block(&t);
        assert_eq!(block.status(), BlockStatus::Unverified);
        assert!(matches!(
            block.accept(&t.vm),
            Err(NodeError::InvalidStatus { op: "accept", .. })
        ));
        assert!(matches!(
            block.reject(&t.vm),
            Err(NodeError::InvalidStatus { op: "reject", .. })
        ));

        block.verify(&t.vm).unwrap();
        block.verify(&t.vm).unwrap();
        assert_eq!(block.status(), BlockStatus::Verified);

        block.reject(&t.vm).unwrap();
        block.reject(&t.vm).unwrap();
        assert_eq!(block.status(), BlockStatus::Rejected);
        assert!(block.accept(&t.vm).is_err());
        assert!(block.verify(&t.vm).is_err());
        assert!(!t.vm.chain().is_processing(&block.id()));
    }

    #[test]
    fn test_accept_settles_atomic_tx() {
        let t = test_vm(ChainConfig::test_chain());
        let utxo = fund_utxo(&t.memory, 1, 1_000 * DIONE);
        let tx = import_tx(&t.memory);
        t.vm.issue_tx(tx.clone(), true).unwrap();

        let mut block = t.vm.build_child(&genesis_of(&t), GENESIS_TIME + 2, vec![]).unwrap();
        assert_eq!(block.atomic_txs(), &[tx.clone()]);
        block.verify(&t.vm).unwrap();
        block.accept(&t.vm).unwrap();

        assert_eq!(block.status(), BlockStatus::Accepted);
        assert_eq!(t.vm.last_accepted(), block.id());
        assert_eq!(
            t.db.get(ColumnFamily::Metadata, LAST_ACCEPTED_KEY).unwrap(),
            Some(block.id().as_bytes().to_vec())
        );
        assert!(t.vm.mempool().is_empty());
        assert!(t
            .memory
            .get(&X_CHAIN_ID, &[utxo.input_id().as_bytes().to_vec()])
            .is_err());

        let (height, stored) = t.vm.atomic_backend().accepted_tx(&tx.id().unwrap()).unwrap().unwrap();
        assert_eq!(height, 1);
        assert_eq!(stored, tx);
        assert_eq!(
            t.vm.get_block(&block.id()).unwrap().map(|b| b.status()),
            Some(BlockStatus::Accepted)
        );
    }

    #[test]
    fn test_reject_returns_atomic_txs() {
        let t = test_vm(ChainConfig::test_chain());
        fund_utxo(&t.memory, 1, 1_000 * DIONE);
        let tx = import_tx(&t.memory);
        t.vm.issue_tx(tx.clone(), true).unwrap();

        let mut block = t.vm.build_child(&genesis_of(&t), GENESIS_TIME + 2, vec![]).unwrap();
        block.verify(&t.vm).unwrap();
        t.vm.mempool().remove_tx(&tx);
        assert!(t.vm.mempool().is_empty());

        block.reject(&t.vm).unwrap();
        assert!(t.vm.mempool().has(&tx.id().unwrap()));
        assert!(t.vm.atomic_backend().verified_state(&block.id()).is_none());
        assert!(!t.vm.chain().is_processing(&block.id()));
    }

    #[test]
    fn test_double_reject_requeues_once() {
        let t = test_vm(ChainConfig::test_chain());
        fund_utxo(&t.memory, 1, 1_000 * DIONE);
        let tx = import_tx(&t.memory);
        t.vm.issue_tx(tx.clone(), true).unwrap();

        let mut block = t.vm.build_child(&genesis_of(&t), GENESIS_TIME + 2, vec![]).unwrap();
        assert_eq!(block.atomic_txs, vec![tx.clone()]);
        block.verify(&t.vm).unwrap();
        block.reject(&t.vm).unwrap();
        block.reject(&t.vm).unwrap();

        assert_eq!(t.vm.mempool().len(), 1);
        assert!(t.vm.mempool().has(&tx.id().unwrap()));
    }

    #[test]
    fn test_failed_apply_accepts_and_halts_until_replay() {
        let db = Arc::new(MemoryDb::new());
        let memory = MemorySharedMemory::new(db.clone(), CHAIN_ID);
        let flaky = Arc::new(FlakySharedMemory::failing(memory.clone()));
        let t = test_vm_with(ChainConfig::test_chain(), db, &NodeConfig::default(), memory, flaky);
        let utxo = fund_utxo(&t.memory, 1, 1_000 * DIONE);
        let key = utxo.input_id().as_bytes().to_vec();
        t.vm.issue_tx(import_tx(&t.memory), true).unwrap();

        let genesis = genesis_of(&t);
        let mut block = t.vm.build_child(&genesis, GENESIS_TIME + 2, vec![]).unwrap();
        let mut sibling = t.vm.build_child(&genesis, GENESIS_TIME + 3, vec![]).unwrap();
        block.verify(&t.vm).unwrap();

        assert!(matches!(
            block.accept(&t.vm),
            Err(NodeError::UnappliedAtomicOps { .. })
        ));
        // Durably accepted, so memory agrees and the block cannot be rejected
        assert_eq!(block.status(), BlockStatus::Accepted);
        assert_eq!(t.vm.last_accepted(), block.id());
        assert!(matches!(
            block.reject(&t.vm),
            Err(NodeError::InvalidStatus { op: "reject", .. })
        ));
        assert!(t.vm.mempool().is_empty());

        // The UTXO is still in shared memory, but nothing may spend it
        assert!(t.memory.get(&X_CHAIN_ID, &[key.clone()]).is_ok());
        assert!(matches!(sibling.verify(&t.vm), Err(NodeError::ReplayRequired)));
        assert!(matches!(
            t.vm.build_block(vec![transfer(0, GAS_PRICE)]),
            Err(NodeError::ReplayRequired)
        ));

        assert_eq!(t.vm.atomic_backend().recover().unwrap(), 1);
        assert!(t.memory.get(&X_CHAIN_ID, &[key]).is_err());
        assert!(matches!(sibling.verify(&t.vm), Err(NodeError::MissingUtxos(_))));
    }

    #[test]
    fn test_failed_verify_releases_atomic_state() {
        let t = test_vm(ChainConfig::test_chain());
        fund_utxo(&t.memory, 1, 1_000 * DIONE);
        t.vm.issue_tx(import_tx(&t.memory), true).unwrap();

        let built = t.vm.build_child(&genesis_of(&t), GENESIS_TIME + 2, vec![]).unwrap();
        let mut inner = built.block().clone();
        inner.header.state_root = Hash::new([1u8; 32]);
        let mut bad = VmBlock::new(inner, true).unwrap();

        assert!(matches!(
            bad.verify(&t.vm),
            Err(NodeError::StateRootMismatch { .. })
        ));
        assert_eq!(bad.status(), BlockStatus::Unverified);
        assert!(t.vm.atomic_backend().verified_state(&bad.id()).is_none());
    }

    #[test]
    fn test_spent_utxos_fail_sibling() {
        let t = test_vm(ChainConfig::test_chain());
        fund_utxo(&t.memory, 1, 1_000 * DIONE);
        t.vm.issue_tx(import_tx(&t.memory), true).unwrap();

        let genesis = genesis_of(&t);
        let mut first = t.vm.build_child(&genesis, GENESIS_TIME + 2, vec![]).unwrap();
        let mut sibling = t.vm.build_child(&genesis, GENESIS_TIME + 3, vec![]).unwrap();
        first.verify(&t.vm).unwrap();
        first.accept(&t.vm).unwrap();

        assert!(matches!(sibling.verify(&t.vm), Err(NodeError::MissingUtxos(_))));
    }

    #[test]
    fn test_accept_out_of_order_keeps_status() {
        let t = test_vm(ChainConfig::test_chain());
        let mut parent = transfer_block(&t);
        parent.verify(&t.vm).unwrap();
        let mut child = t
            .vm
            .build_child(&parent.id(), GENESIS_TIME + 4, vec![transfer(1, GAS_PRICE)])
            .unwrap();
        child.verify(&t.vm).unwrap();

        assert!(matches!(
            child.accept(&t.vm),
            Err(NodeError::NotLastAcceptedChild { .. })
        ));
        assert_eq!(child.status(), BlockStatus::Verified);
        assert_eq!(t.vm.db().pending_len(), 0);

        parent.accept(&t.vm).unwrap();
        child.accept(&t.vm).unwrap();
        assert_eq!(t.vm.last_accepted(), child.id());
        assert!(t.vm.get_block(&parent.id()).unwrap().is_some());
    }
}
