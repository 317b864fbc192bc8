//! The anchoring pipeline: lookup, build, fetch, sign, broadcast.

use std::sync::Arc;

use bitcoin::{Amount, Txid};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::api::{self, Broadcaster, HttpApi, RawTxFetcher, UtxoProvider};
use crate::commitment::Commitment;
use crate::config::AnchorConfig;
use crate::error::Result;
use crate::keys::OwnerKey;
use crate::sign::{PrevTxs, SignedAnchorTx, Signer};
use crate::tx::{AnchorTxBuilder, UnsignedAnchorTx};

/// Outcome of an anchoring run.
#[derive(Debug, Clone, Serialize)]
pub struct AnchorReceipt {
    /// Transaction id of the anchor.
    pub txid: Txid,
    /// Hex-encoded signed transaction.
    pub tx_hex: String,
    /// Fee paid in satoshis.
    pub fee_sat: u64,
    /// Change returned to the owner in satoshis (0 if none).
    pub change_sat: u64,
    /// SHA-256 of the anchored commitment.
    pub commitment_digest: String,
    /// Whether the transaction was submitted.
    pub broadcast: bool,
    /// Unix timestamp of the run.
    pub created_at: i64,
}

/// Sequential anchoring pipeline for one owner key.
///
/// Each run processes exactly one commitment. Stages run one after the
/// other and the first failure aborts the run; nothing is retried.
pub struct AnchorPipeline {
    /// Owner key.
    owner: OwnerKey,
    /// Transaction builder.
    builder: AnchorTxBuilder,
    /// UTXO source.
    utxos: Arc<dyn UtxoProvider>,
    /// Previous transaction source.
    raw_txs: Arc<dyn RawTxFetcher>,
    /// Broadcast endpoint.
    broadcaster: Arc<dyn Broadcaster>,
    /// Skip the broadcast stage.
    dry_run: bool,
}

impl AnchorPipeline {
    /// Create a pipeline with explicit service implementations.
    pub fn new(
        config: &AnchorConfig,
        utxos: Arc<dyn UtxoProvider>,
        raw_txs: Arc<dyn RawTxFetcher>,
        broadcaster: Arc<dyn Broadcaster>,
    ) -> Result<Self> {
        config.validate()?;
        let owner = OwnerKey::from_wif(&config.private_key, config.network)?;

        let builder = AnchorTxBuilder::new()
            .with_fee_policy(config.fee)
            .with_selection(config.selection)
            .with_dust_threshold(Amount::from_sat(config.dust_threshold_sat));

        Ok(Self {
            owner,
            builder,
            utxos,
            raw_txs,
            broadcaster,
            dry_run: config.dry_run,
        })
    }

    /// Create a pipeline talking to the configured HTTP endpoints.
    pub fn from_config(config: &AnchorConfig) -> Result<Self> {
        let client = api::http_client(config.timeout_secs)?;

        let utxos = Arc::new(HttpApi::new(&config.utxo_api, client.clone()));
        let raw_txs = Arc::new(HttpApi::new(&config.tx_api, client.clone()));
        let broadcaster = Arc::new(HttpApi::new(&config.broadcast_api, client));

        Self::new(config, utxos, raw_txs, broadcaster)
    }

    /// Owner key.
    pub fn owner(&self) -> &OwnerKey {
        &self.owner
    }

    /// Build and sign an anchor for `commitment` without broadcasting it.
    pub async fn prepare(&self, commitment: &Commitment) -> Result<(UnsignedAnchorTx, SignedAnchorTx)> {
        self.builder.check_commitment(commitment)?;

        let address = self.owner.address();
        info!(
            %address,
            digest = %commitment.digest(),
            size = commitment.len(),
            "anchoring commitment"
        );

        let utxos = self.utxos.utxos(address).await?;
        debug!(count = utxos.len(), "fetched utxos");

        let unsigned = self.builder.build(address, commitment, &utxos)?;
        info!(
            outpoint = %unsigned.spent[0].outpoint,
            value = unsigned.input_value().to_sat(),
            fee = unsigned.fee.to_sat(),
            "selected utxo"
        );
        if unsigned.change.is_none() {
            warn!(fee = unsigned.fee.to_sat(), "change below dust threshold, no change output");
        }

        let mut prev_txs = PrevTxs::new();
        for utxo in &unsigned.spent {
            let txid = utxo.outpoint.txid;
            if prev_txs.contains_key(&txid) {
                continue;
            }
            let tx = self.raw_txs.raw_transaction(&txid).await?;
            prev_txs.insert(txid, tx);
        }

        let signed = Signer::new(&self.owner).sign(&unsigned, &prev_txs)?;
        debug!(txid = %signed.txid(), hex = %signed.to_hex(), "signed anchor transaction");

        Ok((unsigned, signed))
    }

    /// Run the full pipeline for `commitment`.
    pub async fn run(&self, commitment: &Commitment) -> Result<AnchorReceipt> {
        let (unsigned, signed) = self.prepare(commitment).await?;

        let txid = if self.dry_run {
            info!(txid = %signed.txid(), "dry run, not broadcasting");
            signed.txid()
        } else {
            let txid = self.broadcaster.submit(&signed.bytes).await.map_err(|e| {
                error!(error = %e, "broadcast failed");
                e
            })?;
            if txid != signed.txid() {
                warn!(expected = %signed.txid(), reported = %txid, "broadcaster reported a different txid");
            }
            info!(%txid, "anchor broadcast");
            txid
        };

        Ok(AnchorReceipt {
            txid,
            tx_hex: signed.to_hex(),
            fee_sat: unsigned.fee.to_sat(),
            change_sat: unsigned.change.map(|c| c.to_sat()).unwrap_or(0),
            commitment_digest: commitment.digest(),
            broadcast: !self.dry_run,
            created_at: chrono::Utc::now().timestamp(),
        })
    }
}

/// Anchor `commitment` using the HTTP services named in `config`.
pub async fn anchor(config: &AnchorConfig, commitment: &Commitment) -> Result<AnchorReceipt> {
    AnchorPipeline::from_config(config)?.run(commitment).await
}
