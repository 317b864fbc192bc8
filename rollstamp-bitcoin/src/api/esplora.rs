//! Esplora REST client (Blockstream, mempool.space, electrs).

use async_trait::async_trait;
use bitcoin::{Address, Amount, OutPoint, Transaction, Txid};
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use tracing::debug;

use super::{check_status, decode_transaction, parse_txid, Broadcaster, RawTxFetcher, UtxoProvider};
use crate::error::{AnchorError, Result, Stage};
use crate::tx::Utxo;

/// HTTP client for an Esplora API.
#[derive(Debug, Clone)]
pub struct EsploraClient {
    /// Base URL, e.g. `https://blockstream.info/testnet/api`.
    base_url: String,
    /// Underlying HTTP client.
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct EsploraUtxo {
    txid: String,
    vout: u32,
    value: u64,
}

impl EsploraClient {
    /// Create a new client with a default HTTP client.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, reqwest::Client::new())
    }

    /// Create a new client sharing `client`.
    pub fn with_client(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url, client }
    }

    /// Base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get(&self, stage: Stage, url: &str) -> Result<reqwest::Response> {
        debug!(%url, %stage, "esplora request");
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AnchorError::network(stage, e))?;
        check_status(stage, resp).await
    }
}

#[async_trait]
impl UtxoProvider for EsploraClient {
    async fn utxos(&self, address: &Address) -> Result<Vec<Utxo>> {
        let url = format!("{}/address/{}/utxo", self.base_url, address);
        let entries: Vec<EsploraUtxo> = self
            .get(Stage::UtxoLookup, &url)
            .await?
            .json()
            .await
            .map_err(|e| AnchorError::Decode(e.to_string()))?;

        entries
            .into_iter()
            .filter(|u| u.value > 0)
            .map(|u| -> Result<Utxo> {
                Ok(Utxo::new(
                    OutPoint::new(parse_txid(&u.txid)?, u.vout),
                    Amount::from_sat(u.value),
                ))
            })
            .collect()
    }
}

#[async_trait]
impl RawTxFetcher for EsploraClient {
    async fn raw_transaction(&self, txid: &Txid) -> Result<Transaction> {
        let url = format!("{}/tx/{}/hex", self.base_url, txid);
        let tx_hex = self
            .get(Stage::RawTxFetch, &url)
            .await?
            .text()
            .await
            .map_err(|e| AnchorError::network(Stage::RawTxFetch, e))?;

        decode_transaction(txid, &tx_hex)
    }
}

#[async_trait]
impl Broadcaster for EsploraClient {
    async fn submit(&self, raw_tx: &[u8]) -> Result<Txid> {
        let url = format!("{}/tx", self.base_url);

        let resp = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "text/plain")
            .body(hex::encode(raw_tx))
            .send()
            .await
            .map_err(|e| AnchorError::network(Stage::Broadcast, e))?;
        let txid = check_status(Stage::Broadcast, resp)
            .await?
            .text()
            .await
            .map_err(|e| AnchorError::network(Stage::Broadcast, e))?;

        parse_txid(&txid)
    }
}
