//! chainwatch CLI: inspect defaults, validate configs, simulate polling.
//!
//! Usage:
//! ```bash
//! chainwatch info
//! chainwatch check-config --file watcher.json
//! chainwatch simulate --cycles 5 --blocks-per-cycle 3 --poll-interval-ms 200
//! ```

mod logging;

use std::sync::Arc;

use anyhow::{Context, Result};
use chainwatch_core::{
    config::DEFAULT_POLL_INTERVAL_MS, handler_fn, ContractHandle, EventRecord, MemoryLedger,
    RunState, StartOptions, Watcher, WatcherConfig,
};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;

/// Poll interval for `simulate` when no config file is given.
const SIMULATE_POLL_INTERVAL_MS: u64 = 500;

#[derive(Parser)]
#[command(name = "chainwatch", about = "ChainWatch CLI for the contract event polling engine", version)]
struct Cli {
    /// Log level filter (overridden by RUST_LOG)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Emit JSON structured logs
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show default watcher settings
    Info,

    /// Parse and validate a watcher config file (JSON)
    #[command(name = "check-config")]
    CheckConfig {
        #[arg(short, long)]
        file: String,
    },

    /// Run the watcher's scheduler against an in-memory chain that mines
    /// blocks once per poll interval
    Simulate {
        /// Stop after this many completed cycles
        #[arg(long, default_value_t = 5)]
        cycles: u32,
        /// Blocks mined per poll interval
        #[arg(long, default_value_t = 3)]
        blocks_per_cycle: u64,
        /// Override the configured poll interval
        #[arg(long)]
        poll_interval_ms: Option<u64>,
        /// Optional watcher config (JSON); defaults to tip mode from block 0
        #[arg(long)]
        config: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_tracing(&cli.log_level, cli.json);

    match cli.command {
        Commands::Info => cmd_info(),
        Commands::CheckConfig { file } => cmd_check_config(&file),
        Commands::Simulate {
            cycles,
            blocks_per_cycle,
            poll_interval_ms,
            config,
        } => cmd_simulate(cycles, blocks_per_cycle, poll_interval_ms, config.as_deref()).await,
    }
}

fn cmd_info() -> Result<()> {
    let ranged = WatcherConfig::ranged();
    println!("ChainWatch v{}", env!("CARGO_PKG_VERSION"));
    println!("  Default poll interval: {DEFAULT_POLL_INTERVAL_MS} ms");
    println!("  Default gate: tip mode, start block 0");
    println!(
        "  Ranged gate: {}",
        serde_json::to_string(&ranged.gate).context("serializing gate")?
    );
    println!("  Default failure policy: halt");
    Ok(())
}

fn cmd_check_config(file: &str) -> Result<()> {
    let config = WatcherConfig::from_file(file).with_context(|| format!("invalid config {file}"))?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    println!("start block: {}", config.resolved_start_block());
    Ok(())
}

async fn cmd_simulate(
    cycles: u32,
    blocks_per_cycle: u64,
    poll_interval_ms: Option<u64>,
    config: Option<&str>,
) -> Result<()> {
    let config = match config {
        Some(path) => {
            WatcherConfig::from_file(path).with_context(|| format!("invalid config {path}"))?
        }
        None => WatcherConfig {
            poll_interval_ms: SIMULATE_POLL_INTERVAL_MS,
            ..WatcherConfig::default()
        },
    };

    let ledger = Arc::new(MemoryLedger::new());
    let watcher = Watcher::new(Arc::clone(&ledger), config)?;

    watcher.add_contract(ContractHandle::new("Token", "0x0000000000000000000000000000000000000001"));
    watcher.subscribe(
        "Token",
        "Transfer",
        handler_fn(|ev| {
            tracing::info!(block = ev.block_number, payload = %ev.payload, "Transfer handled");
            Ok(())
        }),
    );
    let (done_tx, mut done_rx) = mpsc::unbounded_channel();
    watcher.on_cycle_complete(move |range| {
        println!("cycle complete: {range}");
        let _ = done_tx.send(range);
    });

    let mut options = StartOptions::default();
    if let Some(ms) = poll_interval_ms {
        options = options.poll_interval_ms(ms);
    }
    watcher.start(options)?;

    let mut blocks = tokio::time::interval(watcher.config().poll_interval());
    let mut completed = 0;
    while completed < cycles && watcher.state() == RunState::Running {
        tokio::select! {
            _ = blocks.tick() => {
                let head = ledger.advance(blocks_per_cycle);
                ledger.push_event(
                    EventRecord::new("Token", "Transfer", head)
                        .with_payload(serde_json::json!({ "value": head * 100 })),
                );
                tracing::debug!(head, "Mined blocks");
            }
            Some(_) = done_rx.recv() => completed += 1,
        }
    }

    watcher.stop();
    watcher.wait().await.context("watcher halted")?;

    println!("cursor: {}", watcher.cursor());
    println!("{}", serde_json::to_string_pretty(&watcher.metrics())?);
    Ok(())
}
