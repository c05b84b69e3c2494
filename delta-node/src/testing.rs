//! Shared setup for node tests

use crate::chain::Genesis;
use crate::config::NodeConfig;
use crate::vm::{DeltaVm, VmContext};
use delta_core::crypto::address_of;
use delta_core::params::protocol::PHASE3_INITIAL_BASE_FEE;
use delta_core::{Address, Block, ChainConfig, Header, Id, ShortId, Transaction, Wei};
use delta_db::{DbError, MemoryDb, SharedDatabase, WriteBatch};
use delta_vm::atomic::{
    AtomicRequests, AtomicResult, AtomicTxBuilder, AtomicTxError, ChainContext, Element,
    IndexCursor, IndexedPage, MemorySharedMemory, OutputOwners, Requests, SecpTransferFx,
    SharedMemory, StaticSubnets, TransferOutput, Tx, Utxo, UtxoId,
};
use delta_vm::{Account, MemoryStateDB, SharedStateDB, TransferExecutor};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub use delta_core::params::protocol::DIONE;

pub const KEY: [u8; 32] = [0x11; 32];
pub const RECIPIENT: Address = Address::new([0x99; 20]);
pub const CHAIN_ID: Id = Id::new([0xc0; 32]);
pub const X_CHAIN_ID: Id = Id::new([0xaa; 32]);
pub const NATIVE: Id = Id::new([0x01; 32]);

pub const GENESIS_TIME: u64 = 1_000;
/// Local clock of test nodes, well past the blocks tests produce
pub const NOW: u64 = 1_100;
pub const FUNDS: Wei = 1_000_000_000_000_000_000_000_000;
/// Above the initial base fee, so transfers carry a tip
pub const GAS_PRICE: Wei = 3_000_000_000_000_000;

pub fn address(key: &[u8; 32]) -> Address {
    address_of(key).unwrap()
}

pub fn short_id(key: &[u8; 32]) -> ShortId {
    ShortId::new(*address(key).as_bytes())
}

pub fn chain_context() -> ChainContext {
    let subnet = Id::new([0x5b; 32]);
    ChainContext {
        network_id: 5,
        chain_id: CHAIN_ID,
        a_chain_id: X_CHAIN_ID,
        omega_chain_id: Id::new([0x0e; 32]),
        native_asset_id: NATIVE,
        subnets: Arc::new(
            StaticSubnets::new()
                .with_chain(CHAIN_ID, subnet)
                .with_chain(X_CHAIN_ID, subnet),
        ),
    }
}

/// Signed transfer from `KEY` on chain 1
pub fn transfer(nonce: u64, gas_price: Wei) -> Transaction {
    let mut tx = Transaction::transfer(1, nonce, RECIPIENT, 1_000, gas_price, 21_000);
    tx.sign(&KEY).unwrap();
    tx
}

pub fn shared_memory() -> MemorySharedMemory {
    MemorySharedMemory::new(Arc::new(MemoryDb::new()), CHAIN_ID)
}

/// Genesis crediting `FUNDS` to `KEY`
pub fn genesis() -> Genesis {
    let state = SharedStateDB::new(Box::new(MemoryStateDB::with_accounts([(
        address(&KEY),
        Account::with_balance(FUNDS),
    )])));
    let header = Header {
        time: GENESIS_TIME,
        gas_limit: 15_000_000,
        state_root: state.state_root(),
        ..Default::default()
    };
    let block = Block::new(header, vec![], vec![], None, false).unwrap();
    Genesis { block, state }
}

/// Export `amount` of the native asset from the X-chain to `KEY`
pub fn fund_utxo(memory: &MemorySharedMemory, seed: u8, amount: u64) -> Utxo {
    let owner = short_id(&KEY);
    let utxo = Utxo {
        utxo_id: UtxoId::new(Id::new([seed; 32]), 0),
        asset_id: NATIVE,
        output: TransferOutput {
            amount,
            owners: OutputOwners::single(owner),
        },
    };
    let mut requests = AtomicRequests::new();
    requests.insert(
        CHAIN_ID,
        Requests {
            remove_requests: Vec::new(),
            put_requests: vec![Element {
                key: utxo.input_id().as_bytes().to_vec(),
                value: utxo.to_bytes().unwrap(),
                traits: vec![owner.as_bytes().to_vec()],
            }],
        },
    );
    memory
        .for_chain(X_CHAIN_ID)
        .apply(&requests, WriteBatch::new())
        .unwrap();
    utxo
}

/// Import of every UTXO `KEY` owns, priced for the child of genesis
pub fn import_tx(memory: &MemorySharedMemory) -> Tx {
    let ctx = chain_context();
    AtomicTxBuilder::new(&ctx, ChainConfig::test_chain().rules(1, NOW), Some(PHASE3_INITIAL_BASE_FEE))
        .with_time(NOW)
        .new_import_tx(memory, X_CHAIN_ID, address(&KEY), &[KEY])
        .unwrap()
}

pub struct TestVm {
    pub db: Arc<MemoryDb>,
    pub memory: MemorySharedMemory,
    pub vm: DeltaVm,
}

/// Bootstrapped node on `config` over a fresh memory database
pub fn test_vm(config: ChainConfig) -> TestVm {
    let db = Arc::new(MemoryDb::new());
    test_vm_on(config, db, &NodeConfig::default())
}

/// Node on an existing database, as after a restart
pub fn test_vm_on(config: ChainConfig, db: Arc<MemoryDb>, node: &NodeConfig) -> TestVm {
    let memory = MemorySharedMemory::new(db.clone(), CHAIN_ID);
    test_vm_with(config, db, node, memory.clone(), Arc::new(memory))
}

/// Node whose shared memory is `shared`, wrapping `memory`
pub fn test_vm_with(
    config: ChainConfig,
    db: Arc<MemoryDb>,
    node: &NodeConfig,
    memory: MemorySharedMemory,
    shared: Arc<dyn SharedMemory>,
) -> TestVm {
    let base: SharedDatabase = db.clone();
    let context = VmContext {
        chain_config: Arc::new(config),
        chain: chain_context(),
        db: base,
        shared_memory: shared,
        fx: Arc::new(SecpTransferFx::with_fixed_time(NOW)),
        executor: Arc::new(TransferExecutor::new()),
    };
    let vm = DeltaVm::new(context, genesis(), node).unwrap().with_fixed_time(NOW);
    vm.set_bootstrapped(true);
    TestVm { db, memory, vm }
}

/// Shared memory whose next `apply` fails while `fail` is set
pub struct FlakySharedMemory {
    pub inner: MemorySharedMemory,
    pub fail: AtomicBool,
}

impl FlakySharedMemory {
    pub fn failing(inner: MemorySharedMemory) -> Self {
        Self {
            inner,
            fail: AtomicBool::new(true),
        }
    }
}

impl SharedMemory for FlakySharedMemory {
    fn get(&self, peer_chain: &Id, keys: &[Vec<u8>]) -> AtomicResult<Vec<Vec<u8>>> {
        self.inner.get(peer_chain, keys)
    }

    fn indexed(
        &self,
        peer_chain: &Id,
        traits: &[Vec<u8>],
        start: Option<&IndexCursor>,
        limit: usize,
    ) -> AtomicResult<IndexedPage> {
        self.inner.indexed(peer_chain, traits, start, limit)
    }

    fn apply(&self, requests: &AtomicRequests, batch: WriteBatch) -> AtomicResult<()> {
        if self.fail.swap(false, Ordering::SeqCst) {
            return Err(AtomicTxError::Db(DbError::Other("interrupted".to_string())));
        }
        self.inner.apply(requests, batch)
    }
}
