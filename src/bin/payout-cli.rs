use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::{json, Value};

use pool_payout::assembly::{build_outputs, DesiredOutput, OutputOptions};
use pool_payout::chain::{ChainProvider, ExplorerClient};
use pool_payout::config::{load_config, PayoutConfig, StorageBackend};
use pool_payout::observability::init_logging;
use pool_payout::selection::{estimate_fee, estimate_tx_size, select_utxos};
use pool_payout::storage::SqliteStore;
use pool_payout::tracking::ConfirmationPoller;
use pool_payout::unix_now;

#[derive(Parser)]
#[command(name = "payout-cli")]
#[command(about = "Inspection CLI for pool payouts", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the explorer base URL.
    #[arg(short, long)]
    url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List spendable outputs of an address
    Utxos { address: String },
    /// Dry-run coin selection for a payment
    Select {
        #[arg(long)]
        address: String,
        #[arg(long)]
        amount: u64,
        #[arg(long, default_value_t = 1.0)]
        fee_rate: f64,
    },
    /// Show confirmation state of a transaction
    Status { txid: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => PayoutConfig::default(),
    };
    if let Some(url) = cli.url {
        config.provider.base_url = url;
    }
    init_logging(&config.observability);

    let client = Arc::new(ExplorerClient::new(config.provider.clone())?);

    let output = match cli.command {
        Commands::Utxos { address } => {
            let utxos = client.fetch_address_utxos(&address).await?;
            let total: u64 = utxos.iter().map(|u| u.value_sats).sum();
            json!({ "address": address, "count": utxos.len(), "totalSats": total, "utxos": utxos })
        }
        Commands::Select {
            address,
            amount,
            fee_rate,
        } => {
            let utxos = client.fetch_address_utxos(&address).await?;
            let options = config.selection.options();
            let selection = select_utxos(&utxos, amount, fee_rate, &options)?;
            let desired = [DesiredOutput {
                address: "<destination>".to_string(),
                value_sats: i64::try_from(amount)?,
            }];
            let outputs = build_outputs(
                &desired,
                &OutputOptions {
                    change_address: Some(&address),
                    change_sats: selection.change_sats,
                    dust_threshold: options.dust_threshold,
                },
            );
            json!({
                "estimatedSize": estimate_tx_size(selection.input_count(), outputs.output_count),
                "estimatedFeeWithChange": estimate_fee(selection.input_count(), options.outputs_without_change + 1, fee_rate),
                "selection": selection,
                "outputs": outputs.outputs,
            })
        }
        Commands::Status { txid } => status(&config, client, &txid).await?,
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Refresh through the store when the transaction is tracked there, otherwise
/// ask the provider directly.
async fn status(
    config: &PayoutConfig,
    client: Arc<ExplorerClient>,
    txid: &str,
) -> Result<Value, Box<dyn std::error::Error>> {
    if config.storage.backend == StorageBackend::Sqlite
        && std::path::Path::new(&config.storage.path).exists()
    {
        let store = Arc::new(SqliteStore::open(&config.storage.path)?);
        let poller = ConfirmationPoller::new(client.clone(), store, config.poller.clone());
        match poller.refresh(txid, unix_now()).await {
            Ok(report) => return Ok(json!({ "tracked": report.tracked, "chain": report.chain })),
            Err(e) => tracing::debug!(error = %e, "Not refreshed from store"),
        }
    }

    let chain = client.query_tx_status(txid).await?;
    Ok(json!({ "txid": txid, "chain": chain }))
}
