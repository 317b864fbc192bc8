//! BlockCypher v1 REST client.

use async_trait::async_trait;
use bitcoin::{Address, Amount, OutPoint, Transaction, Txid};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{check_status, decode_transaction, parse_txid, Broadcaster, RawTxFetcher, UtxoProvider};
use crate::error::{AnchorError, Result, Stage};
use crate::tx::Utxo;

/// HTTP client for the BlockCypher API.
#[derive(Debug, Clone)]
pub struct BlockCypherClient {
    /// Base URL, e.g. `https://api.blockcypher.com/v1/btc/test3`.
    base_url: String,
    /// Underlying HTTP client.
    client: reqwest::Client,
}

/// `GET /addrs/{address}` response.
#[derive(Debug, Deserialize)]
struct AddressResponse {
    /// Confirmed unspent outputs. Absent when the address has none.
    #[serde(default)]
    txrefs: Vec<TxRef>,
}

#[derive(Debug, Deserialize)]
struct TxRef {
    tx_hash: String,
    tx_output_n: i64,
    value: u64,
}

/// `GET /txs/{txid}?includeHex=true` response.
#[derive(Debug, Deserialize)]
struct TxResponse {
    hex: String,
}

#[derive(Debug, Serialize)]
struct PushRequest<'a> {
    tx: &'a str,
}

/// `POST /txs/push` response.
#[derive(Debug, Deserialize)]
struct PushResponse {
    tx: PushedTx,
}

#[derive(Debug, Deserialize)]
struct PushedTx {
    hash: String,
}

impl BlockCypherClient {
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
}

#[async_trait]
impl UtxoProvider for BlockCypherClient {
    async fn utxos(&self, address: &Address) -> Result<Vec<Utxo>> {
        let url = format!("{}/addrs/{}?unspentOnly=true", self.base_url, address);
        debug!(%url, "fetching utxos");

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AnchorError::network(Stage::UtxoLookup, e))?;
        let resp = check_status(Stage::UtxoLookup, resp).await?;
        let body: AddressResponse = resp
            .json()
            .await
            .map_err(|e| AnchorError::Decode(e.to_string()))?;

        body.txrefs
            .into_iter()
            .filter(|r| r.tx_output_n >= 0 && r.value > 0)
            .map(|r| -> Result<Utxo> {
                let vout = u32::try_from(r.tx_output_n)
                    .map_err(|_| AnchorError::Decode(format!("output index {}", r.tx_output_n)))?;
                Ok(Utxo::new(
                    OutPoint::new(parse_txid(&r.tx_hash)?, vout),
                    Amount::from_sat(r.value),
                ))
            })
            .collect()
    }
}

#[async_trait]
impl RawTxFetcher for BlockCypherClient {
    async fn raw_transaction(&self, txid: &Txid) -> Result<Transaction> {
        let url = format!("{}/txs/{}?includeHex=true", self.base_url, txid);
        debug!(%url, "fetching raw transaction");

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AnchorError::network(Stage::RawTxFetch, e))?;
        let resp = check_status(Stage::RawTxFetch, resp).await?;
        let body: TxResponse = resp
            .json()
            .await
            .map_err(|e| AnchorError::Decode(e.to_string()))?;

        decode_transaction(txid, &body.hex)
    }
}

#[async_trait]
impl Broadcaster for BlockCypherClient {
    async fn submit(&self, raw_tx: &[u8]) -> Result<Txid> {
        let url = format!("{}/txs/push", self.base_url);
        let tx_hex = hex::encode(raw_tx);

        let resp = self
            .client
            .post(&url)
            .json(&PushRequest { tx: &tx_hex })
            .send()
            .await
            .map_err(|e| AnchorError::network(Stage::Broadcast, e))?;
        let resp = check_status(Stage::Broadcast, resp).await?;
        let body: PushResponse = resp
            .json()
            .await
            .map_err(|e| AnchorError::Decode(e.to_string()))?;

        parse_txid(&body.tx.hash)
    }
}
