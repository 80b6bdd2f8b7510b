//! lendindex CLI: run the lending-platform indexer and inspect its state.
//!
//! # Commands
//! ```text
//! lendindex run     [--config lendindex.yaml]
//! lendindex status  [--config lendindex.yaml]
//! lendindex topics  [--config lendindex.yaml]
//! lendindex info
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use lendindex_core::registry::MAX_CONTRACTS;
use lendindex_core::{CheckpointManager, IndexerConfig, SubscriptionHub};
use lendindex_evm::IndexerBuilder;

mod config;
mod logging;
mod relay;
mod storage;

use config::{AppConfig, Overrides};
use relay::LoggingRelay;

#[derive(Parser)]
#[command(
    name = "lendindex",
    about = "Chain indexer for the NFT-collateralized lending platform",
    long_about = "
Polls a Saga JSON-RPC endpoint, classifies vault, loan and DPO token events,
stores them idempotently and pushes per-wallet notifications.

ENVIRONMENT VARIABLES:
  SAGA_RPC_URL             JSON-RPC endpoint
  VAULT_CONTRACT_ADDRESS   NFT vault contract
  LOAN_MANAGER_ADDRESS     loan manager contract
  DPO_TOKEN_ADDRESS        DPO token contract
  DATABASE_URL             memory | sqlite:<path> | postgres://...
  LOG_LEVEL                trace | debug | info | warn | error
  LIVE_EVENTS              follow contract logs between scans (true | false)
",
    version
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalArgs {
    /// YAML configuration file
    #[arg(short, long, global = true, env = "LENDINDEX_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, global = true, env = "SAGA_RPC_URL")]
    rpc_url: Option<String>,

    #[arg(long, global = true, env = "VAULT_CONTRACT_ADDRESS")]
    vault: Option<String>,

    #[arg(long, global = true, env = "LOAN_MANAGER_ADDRESS")]
    loan_manager: Option<String>,

    #[arg(long, global = true, env = "DPO_TOKEN_ADDRESS")]
    dpo_token: Option<String>,

    #[arg(long, global = true, env = "DATABASE_URL")]
    database_url: Option<String>,

    #[arg(long, global = true, env = "LOG_LEVEL")]
    log_level: Option<String>,

    /// Emit JSON logs
    #[arg(long, global = true)]
    json_logs: bool,

    /// Follow new contract logs between scan ticks
    #[arg(long, global = true, env = "LIVE_EVENTS")]
    live_events: bool,
}

impl GlobalArgs {
    fn overrides(&self) -> Overrides {
        Overrides {
            rpc_url: self.rpc_url.clone(),
            vault: self.vault.clone(),
            loan_manager: self.loan_manager.clone(),
            dpo_token: self.dpo_token.clone(),
            database_url: self.database_url.clone(),
            log_level: self.log_level.clone(),
            json_logs: self.json_logs,
            live_events: self.live_events,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Start the indexer and run until Ctrl-C or a fatal error
    Run,
    /// Print the persisted checkpoint and stored event count
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the topic hash of every configured event binding
    Topics,
    /// Show default policy values
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut cfg = AppConfig::load(cli.global.config.as_deref())?;
    cfg.apply(&cli.global.overrides());
    logging::init_tracing(&cfg.log);

    match cli.command {
        Commands::Run => cmd_run(cfg).await,
        Commands::Status { json } => cmd_status(cfg, json).await,
        Commands::Topics => cmd_topics(&cfg),
        Commands::Info => {
            cmd_info();
            Ok(())
        }
    }
}

async fn cmd_run(cfg: AppConfig) -> Result<()> {
    let registry = cfg.validate_for_run()?;
    tracing::info!(
        contracts = ?registry.addresses(),
        live_events = cfg.indexer.live_events,
        "watching contracts"
    );

    let storage = storage::open(&cfg.database_url).await?;
    let hub = SubscriptionHub::new();

    let service = IndexerBuilder::from_config(cfg.indexer.clone())
        .event_store(storage.events.clone())
        .checkpoint_store(storage.checkpoints.clone())
        .relay(Arc::new(LoggingRelay::new(hub)))
        .build()
        .context("building indexer")?;

    let mut handle = service.start();
    tokio::select! {
        joined = &mut handle => {
            return joined.context("indexer task panicked")?.context("indexer stopped");
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("listening for Ctrl-C")?;
            tracing::info!("shutdown signal received");
            service.stop();
        }
    }

    handle
        .await
        .context("indexer task panicked")?
        .context("indexer stopped")?;
    let status = service.status();
    tracing::info!(last_processed_block = status.last_processed_block, "bye");
    Ok(())
}

async fn cmd_status(cfg: AppConfig, json: bool) -> Result<()> {
    let storage = storage::open(&cfg.database_url).await?;
    let manager = CheckpointManager::new(
        storage.checkpoints.clone(),
        cfg.indexer.chain.clone(),
        cfg.indexer.id.clone(),
    );
    let checkpoint = manager.load().await?;
    let events = storage.events.event_count().await?;
    let pending = storage.events.unprocessed(1_000).await?.len();

    if json {
        let out = serde_json::json!({
            "chain": cfg.indexer.chain,
            "indexer": cfg.indexer.id,
            "lastProcessedBlock": checkpoint.as_ref().map(|c| c.block_number),
            "updatedAt": checkpoint.as_ref().map(|c| c.updated_at),
            "events": events,
            "unprocessed": pending,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("indexer {} on {}", cfg.indexer.id, cfg.indexer.chain);
    match checkpoint {
        Some(cp) => println!(
            "  last processed block: {} (saved at {})",
            cp.block_number, cp.updated_at
        ),
        None => println!("  last processed block: none (no checkpoint)"),
    }
    println!("  stored events:        {events}");
    println!("  unprocessed events:   {pending}");
    Ok(())
}

fn cmd_topics(cfg: &AppConfig) -> Result<()> {
    let registry = cfg.registry()?;
    for entry in registry.entries() {
        println!(
            "{:<13} {}  {}  {:<16} {}",
            entry.role.to_string(),
            entry.address,
            entry.topic0,
            entry.event.as_str(),
            entry.signature
        );
    }
    Ok(())
}

fn cmd_info() {
    let d = IndexerConfig::default();
    println!("lendindex v{}", env!("CARGO_PKG_VERSION"));
    println!("  Default poll interval: {} ms", d.poll_interval_ms);
    println!("  Default batch size: {} blocks", d.batch_size);
    println!("  Default attempts per tick: {}", d.max_attempts);
    println!("  Default retry delay: {} ms", d.retry_delay_ms);
    println!("  Default RPC call timeout: {} ms", d.call_timeout_ms);
    println!("  Default live log poll interval: {} ms (when enabled)", d.live_poll_interval_ms);
    println!("  Watched contracts: 1 to {MAX_CONTRACTS}");
    println!("  Storage backends: memory, SQLite (sqlite:<path>), PostgreSQL (postgres://)");
}
