//! Pool payout daemon.
//!
//! # Architecture Overview
//!
//! ```text
//!   funding request ──▶ broadcast orchestrator ──▶ chain provider (explorer REST)
//!                          │        ▲                     ▲
//!                          ▼        │                     │
//!                    idempotency ledger          confirmation poller
//!                          │                              │
//!                          └──────────▶ store ◀───────────┘
//!                                 (sqlite | memory)
//! ```
//!
//! The daemon owns the background half: the confirmation poller and the
//! ledger purge loop. Funding requests enter through the library API.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::broadcast;

use pool_payout::chain::ExplorerClient;
use pool_payout::config::{load_config, PayoutConfig, StorageBackend};
use pool_payout::idempotency::IdempotencyLedger;
use pool_payout::lifecycle::{wait_for_termination, Shutdown};
use pool_payout::observability::{init_logging, init_metrics};
use pool_payout::storage::{LedgerStore, MemoryStore, SqliteStore, TrackedTxStore};
use pool_payout::tracking::ConfirmationPoller;
use pool_payout::unix_now;

#[derive(Parser)]
#[command(name = "pool-payout")]
#[command(about = "Confirmation tracking daemon for pool payouts", long_about = None)]
struct Args {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => PayoutConfig::default(),
    };

    init_logging(&config.observability);
    tracing::info!("pool-payout v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        provider = %config.provider.base_url,
        failovers = config.provider.failover_urls.len(),
        storage = ?config.storage.backend,
        poller_interval_ms = config.poller.interval_ms,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let (ledger_store, tracked_store): (Arc<dyn LedgerStore>, Arc<dyn TrackedTxStore>) =
        match config.storage.backend {
            StorageBackend::Sqlite => {
                let store = Arc::new(SqliteStore::open(&config.storage.path)?);
                tracing::info!(path = %config.storage.path, "Opened SQLite store");
                let ledger: Arc<dyn LedgerStore> = store.clone();
                let tracked: Arc<dyn TrackedTxStore> = store;
                (ledger, tracked)
            }
            StorageBackend::Memory => {
                tracing::warn!("Using in-memory store; state is lost on exit");
                let store = Arc::new(MemoryStore::new());
                let ledger: Arc<dyn LedgerStore> = store.clone();
                let tracked: Arc<dyn TrackedTxStore> = store;
                (ledger, tracked)
            }
        };

    let provider = Arc::new(ExplorerClient::new(config.provider.clone())?);
    let ledger = IdempotencyLedger::new(
        ledger_store,
        Duration::from_secs(config.idempotency.ttl_secs),
    )
    .with_pending_lease(Duration::from_secs(config.idempotency.pending_lease_secs));
    let poller = ConfirmationPoller::new(provider, tracked_store, config.poller.clone());

    let shutdown = Shutdown::new();
    let poller_task = {
        let rx = shutdown.subscribe();
        tokio::spawn(async move { poller.run(rx).await })
    };
    let purge_task = {
        let rx = shutdown.subscribe();
        let interval = Duration::from_secs(config.idempotency.purge_interval_secs);
        tokio::spawn(run_purge_loop(ledger, interval, rx))
    };

    wait_for_termination().await;
    shutdown.trigger();

    for task in [poller_task, purge_task] {
        if let Err(e) = task.await {
            tracing::error!(error = %e, "Background task panicked");
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn run_purge_loop(
    ledger: IdempotencyLedger,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = unix_now();
                if let Err(e) = ledger.purge_expired(now) {
                    tracing::error!(error = %e, "Idempotency purge failed");
                }
                match ledger.count_stale(now) {
                    Ok(0) => {}
                    Ok(stale) => tracing::warn!(stale, "Pending payouts outlived their lease; reconcile them"),
                    Err(e) => tracing::error!(error = %e, "Stale record scan failed"),
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("Purge loop received shutdown signal, exiting loop");
                break;
            }
        }
    }
}
