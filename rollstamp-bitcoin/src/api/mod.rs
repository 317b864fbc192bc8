//! External services used by the pipeline.
//!
//! Each service role is a trait so the pipeline can be driven by the HTTP
//! clients in production and by in-memory fakes in tests. Two public REST
//! flavours are supported and each can serve any role:
//!
//! | Role | BlockCypher | Esplora |
//! |---|---|---|
//! | UTXOs | `GET /addrs/{addr}?unspentOnly=true` | `GET /address/{addr}/utxo` |
//! | Raw tx | `GET /txs/{txid}?includeHex=true` | `GET /tx/{txid}/hex` |
//! | Broadcast | `POST /txs/push {"tx": hex}` | `POST /tx` (hex body) |

mod blockcypher;
mod esplora;


use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use bitcoin::consensus::encode;
use bitcoin::{Address, Transaction, Txid};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub use blockcypher::BlockCypherClient;
pub use esplora::EsploraClient;

use crate::error::{AnchorError, Result, Stage};
use crate::tx::Utxo;

/// Source of spendable outputs.
#[async_trait]
pub trait UtxoProvider: Send + Sync {
    /// Unspent outputs of `address`, in provider order.
    ///
    /// An empty list is a valid answer.
    async fn utxos(&self, address: &Address) -> Result<Vec<Utxo>>;
}

/// Source of full previous transactions.
#[async_trait]
pub trait RawTxFetcher: Send + Sync {
    /// Fetch and decode the transaction `txid`.
    async fn raw_transaction(&self, txid: &Txid) -> Result<Transaction>;
}

/// Submits signed transactions to the network.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Submit serialized transaction bytes, returning the network txid.
    async fn submit(&self, raw_tx: &[u8]) -> Result<Txid>;
}

/// REST API flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiKind {
    /// BlockCypher v1 API.
    BlockCypher,
    /// Esplora (Blockstream / mempool.space) API.
    Esplora,
}

impl fmt::Display for ApiKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiKind::BlockCypher => f.write_str("blockcypher"),
            ApiKind::Esplora => f.write_str("esplora"),
        }
    }
}

impl FromStr for ApiKind {
    type Err = AnchorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "blockcypher" => Ok(ApiKind::BlockCypher),
            "esplora" | "blockstream" | "mempool" => Ok(ApiKind::Esplora),
            other => Err(AnchorError::Configuration(format!("unknown API kind: {other}"))),
        }
    }
}

/// A service base URL and its flavour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// API flavour.
    pub kind: ApiKind,
    /// Base URL, without trailing slash.
    pub url: String,
}

impl Endpoint {
    /// Create a new endpoint.
    pub fn new(kind: ApiKind, url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            kind,
            url: url.trim_end_matches('/').to_string(),
        }
    }
}

/// HTTP client for either API flavour.
#[derive(Debug, Clone)]
pub enum HttpApi {
    /// BlockCypher client.
    BlockCypher(BlockCypherClient),
    /// Esplora client.
    Esplora(EsploraClient),
}

impl HttpApi {
    /// Create a client for `endpoint` sharing `client`.
    pub fn new(endpoint: &Endpoint, client: reqwest::Client) -> Self {
        match endpoint.kind {
            ApiKind::BlockCypher => {
                HttpApi::BlockCypher(BlockCypherClient::with_client(&endpoint.url, client))
            }
            ApiKind::Esplora => HttpApi::Esplora(EsploraClient::with_client(&endpoint.url, client)),
        }
    }
}

#[async_trait]
impl UtxoProvider for HttpApi {
    async fn utxos(&self, address: &Address) -> Result<Vec<Utxo>> {
        match self {
            HttpApi::BlockCypher(c) => c.utxos(address).await,
            HttpApi::Esplora(c) => c.utxos(address).await,
        }
    }
}

#[async_trait]
impl RawTxFetcher for HttpApi {
    async fn raw_transaction(&self, txid: &Txid) -> Result<Transaction> {
        match self {
            HttpApi::BlockCypher(c) => c.raw_transaction(txid).await,
            HttpApi::Esplora(c) => c.raw_transaction(txid).await,
        }
    }
}

#[async_trait]
impl Broadcaster for HttpApi {
    async fn submit(&self, raw_tx: &[u8]) -> Result<Txid> {
        match self {
            HttpApi::BlockCypher(c) => c.submit(raw_tx).await,
            HttpApi::Esplora(c) => c.submit(raw_tx).await,
        }
    }
}

/// Build the shared HTTP client. The timeout lives here, at the transport.
pub fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(concat!("rollstamp/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| AnchorError::Configuration(format!("HTTP client: {e}")))
}

/// Parse a txid in display (reversed hex) form.
pub(crate) fn parse_txid(s: &str) -> Result<Txid> {
    Txid::from_str(s.trim()).map_err(|e| AnchorError::Decode(format!("invalid txid {s:?}: {e}")))
}

/// Decode a hex-encoded transaction and check it hashes to `txid`.
pub(crate) fn decode_transaction(txid: &Txid, tx_hex: &str) -> Result<Transaction> {
    let bytes = hex::decode(tx_hex.trim())?;
    let tx: Transaction = encode::deserialize(&bytes)?;
    if tx.compute_txid() != *txid {
        return Err(AnchorError::Decode(format!(
            "transaction returned for {txid} hashes to {}",
            tx.compute_txid()
        )));
    }
    Ok(tx)
}

/// Turn a non-success response into a rejection carrying the body.
pub(crate) async fn check_status(stage: Stage, resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = match resp.text().await {
        Ok(body) => body,
        Err(e) => {
            debug!(%stage, %status, error = %e, "failed to read error body");
            String::new()
        }
    };
    let reason = serde_json::from_str::<ErrorBody>(&body)
        .map(|e| e.error)
        .unwrap_or_else(|_| body.trim().to_string());

    Err(AnchorError::Rejected {
        stage,
        reason: if reason.is_empty() {
            status.to_string()
        } else {
            format!("{status}: {reason}")
        },
    })
}

/// `{"error": "..."}` payload returned by both APIs on failure.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}
