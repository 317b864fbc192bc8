//! `rollstamp`: anchor the current rollup state commitment on Bitcoin.
//!
//! Configuration comes from the environment (see `AnchorConfig::from_env`).
//! The commitment is read from `ROLLSTAMP_STATE_FILE`, `state.txt` by default.

use std::process::ExitCode;

use anyhow::{Context, Result};
use rollstamp_bitcoin::{AnchorConfig, AnchorPipeline, AnchorReceipt, Commitment};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    set_up_logger();

    match run().await {
        Ok(receipt) => {
            info!(
                txid = %receipt.txid,
                fee = receipt.fee_sat,
                change = receipt.change_sat,
                broadcast = receipt.broadcast,
                "done"
            );
            println!("{}", receipt.txid);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<AnchorReceipt> {
    let config = AnchorConfig::from_env().context("loading configuration")?;
    info!(
        network = config.network.name(),
        utxo_api = %config.utxo_api.url,
        broadcast_api = %config.broadcast_api.url,
        dry_run = config.dry_run,
        "configuration loaded"
    );

    let commitment = Commitment::from_file(&config.state_file)
        .with_context(|| format!("reading {}", config.state_file.display()))?;
    info!(
        file = %config.state_file.display(),
        digest = %commitment.digest(),
        "read state commitment"
    );

    let pipeline = AnchorPipeline::from_config(&config)?;
    let receipt = pipeline
        .run(&commitment)
        .await
        .context("anchoring state commitment")?;

    Ok(receipt)
}

/// Install the global subscriber. `RUST_LOG` overrides the default `info` level.
fn set_up_logger() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();
}
