use anyhow::Context;
use clap::{Parser, Subcommand};
use delta_db::{KeyValueDB, MemoryDb, SharedDatabase, SledDb};
use delta_node::{logging, DeltaVm, Genesis, NodeConfig, VmContext};
use delta_vm::atomic::{MemorySharedMemory, SecpTransferFx};
use delta_vm::TransferExecutor;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser)]
#[command(name = "delta-node", version, about = "Delta chain VM node")]
struct Cli {
    /// Node configuration file
    #[arg(long, env = "DELTA_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default configuration file into DIR
    Init { dir: PathBuf },
    /// Open the chain and publish gas price hints until interrupted
    Run,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { dir } => {
            let path = NodeConfig::init(&dir).context("failed to write configuration")?;
            println!("wrote {}", path.display());
            Ok(())
        }
        Command::Run => run(cli.config).await,
    }
}

async fn run(path: Option<PathBuf>) -> anyhow::Result<()> {
    let node = NodeConfig::load(path.as_deref()).context("failed to load configuration")?;
    logging::init(&node.logging)?;

    let chain_config = Arc::new(node.chain_config()?);
    let db: SharedDatabase = match &node.data_dir {
        Some(dir) => Arc::new(SledDb::open(dir).context("failed to open database")?),
        None => Arc::new(MemoryDb::new()),
    };
    let chain = node.identity.context();
    let context = VmContext {
        chain_config: chain_config.clone(),
        shared_memory: Arc::new(MemorySharedMemory::new(db.clone(), chain.chain_id)),
        chain,
        db: db.clone(),
        fx: Arc::new(SecpTransferFx::new()),
        executor: Arc::new(TransferExecutor::new()),
    };
    let vm = DeltaVm::new(context, Genesis::empty()?, &node)?;
    vm.set_bootstrapped(true);
    info!(chain_id = chain_config.chain_id, last_accepted = %vm.last_accepted(), "node started");

    let shutdown = CancellationToken::new();
    let updater = vm.start_gas_price_updater(shutdown);
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    info!(pending = updater.pending(), "shutting down");
    updater.shutdown().await;
    db.flush()?;
    Ok(())
}
