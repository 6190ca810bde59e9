//! Inventory dashboard client: entry point.
//!
//! Connects to the scan relay, applies every scan to the local product
//! table, and beeps the scanner when a product runs low.
//!
//! # Usage
//!
//! ```text
//! stockroom-client [OPTIONS]
//!
//! Options:
//!   --relay-url <URL>              Relay WebSocket URL [default: ws://127.0.0.1:8080]
//!   --cache-dir <DIR>              Directory holding products_data.json [default: .]
//!   --low-stock-threshold <N>      Beep when a scan leaves N or fewer items [default: 3]
//! ```
//!
//! Each flag can also be set with `STOCKROOM_RELAY_URL`,
//! `STOCKROOM_CACHE_DIR`, and `STOCKROOM_LOW_STOCK_THRESHOLD`.

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use stockroom_client::application::{StockLedger, DEFAULT_LOW_STOCK_THRESHOLD};
use stockroom_client::domain::seed_products;
use stockroom_client::infrastructure::{
    JsonFileCache, RelayConnection, RelayConnectionConfig, RelayEvent,
};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Inventory dashboard client for the stock-room scan relay.
#[derive(Debug, Parser)]
#[command(
    name = "stockroom-client",
    about = "Applies RFID scans from the relay to a local product table",
    version
)]
struct Cli {
    /// WebSocket URL of the relay.
    #[arg(long, env = "STOCKROOM_RELAY_URL", default_value = "ws://127.0.0.1:8080")]
    relay_url: String,

    /// Directory holding the product cache file.
    #[arg(long, env = "STOCKROOM_CACHE_DIR", default_value = ".")]
    cache_dir: PathBuf,

    /// Beep when a scan leaves this many items or fewer.
    #[arg(long, env = "STOCKROOM_LOW_STOCK_THRESHOLD", default_value_t = DEFAULT_LOW_STOCK_THRESHOLD)]
    low_stock_threshold: u32,
}

impl Cli {
    fn connection_config(&self) -> RelayConnectionConfig {
        RelayConnectionConfig {
            relay_url: self.relay_url.clone(),
            ..RelayConnectionConfig::default()
        }
    }
}

fn open_ledger(cache: JsonFileCache, threshold: u32) -> StockLedger<JsonFileCache> {
    match StockLedger::open(cache.clone(), threshold) {
        Ok(ledger) => ledger,
        Err(e) => {
            warn!("ignoring unreadable product cache: {e}");
            StockLedger::with_products(cache, seed_products(), threshold)
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cache = JsonFileCache::in_dir(&cli.cache_dir);
    info!(
        "stock-room client starting: relay={}, cache={}, low_stock_threshold={}",
        cli.relay_url,
        cache.path().display(),
        cli.low_stock_threshold
    );
    let mut ledger = open_ledger(cache, cli.low_stock_threshold);

    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C, shutting down client");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    let connection = Arc::new(RelayConnection::new(cli.connection_config()));
    let mut events = Arc::clone(&connection).start(Arc::clone(&running));

    while let Some(event) = events.recv().await {
        match event {
            RelayEvent::Connected { relay_url } => info!("relay connected: {relay_url}"),
            RelayEvent::Disconnected { retry_in } => {
                info!("relay disconnected; retrying in {retry_in:?}");
            }
            RelayEvent::Scan(report) => {
                let outcome = ledger.apply_scan(&report.uid, &chrono::Local::now());
                info!(
                    uid = %outcome.record.uid,
                    product = %outcome.record.product_name,
                    quantity = ?outcome.record.quantity,
                    "scan applied"
                );
                if let Some(command) = outcome.command {
                    if !connection.send_command(&command).await? {
                        warn!("relay offline; low-stock beep dropped");
                    }
                }
            }
            RelayEvent::RelayError(message) => warn!("relay rejected a frame: {message}"),
        }
    }

    info!("stock-room client stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
