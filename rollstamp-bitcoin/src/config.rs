//! Anchoring configuration.

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::api::{ApiKind, Endpoint};
use crate::error::{AnchorError, Result};
use crate::fee::FeePolicy;
use crate::select::SelectionStrategy;
use crate::{DEFAULT_DUST_THRESHOLD_SAT, DEFAULT_FEE_SAT, MAX_OP_RETURN_SIZE};

/// Bitcoin network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// Bitcoin mainnet.
    Mainnet,
    /// Bitcoin testnet.
    #[default]
    Testnet,
    /// Bitcoin signet.
    Signet,
    /// Bitcoin regtest (local development).
    Regtest,
}

impl Network {
    /// Get the network name.
    pub fn name(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
            Network::Signet => "signet",
            Network::Regtest => "regtest",
        }
    }

    /// Convert to bitcoin crate network type.
    pub fn to_bitcoin_network(&self) -> bitcoin::Network {
        match self {
            Network::Mainnet => bitcoin::Network::Bitcoin,
            Network::Testnet => bitcoin::Network::Testnet,
            Network::Signet => bitcoin::Network::Signet,
            Network::Regtest => bitcoin::Network::Regtest,
        }
    }

    /// Public endpoint of `kind` serving this network, if one exists.
    pub fn default_url(&self, kind: ApiKind) -> Option<&'static str> {
        match (kind, self) {
            (ApiKind::BlockCypher, Network::Mainnet) => Some("https://api.blockcypher.com/v1/btc/main"),
            (ApiKind::BlockCypher, Network::Testnet) => Some("https://api.blockcypher.com/v1/btc/test3"),
            (ApiKind::Esplora, Network::Mainnet) => Some("https://blockstream.info/api"),
            (ApiKind::Esplora, Network::Testnet) => Some("https://blockstream.info/testnet/api"),
            (ApiKind::Esplora, Network::Signet) => Some("https://mempool.space/signet/api"),
            _ => None,
        }
    }
}

impl FromStr for Network {
    type Err = AnchorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mainnet" | "main" | "bitcoin" => Ok(Network::Mainnet),
            "testnet" | "test" | "testnet3" => Ok(Network::Testnet),
            "signet" => Ok(Network::Signet),
            "regtest" => Ok(Network::Regtest),
            other => Err(AnchorError::Configuration(format!("unknown network: {other}"))),
        }
    }
}

/// Configuration for an anchoring run.
///
/// Loaded once at startup and passed by reference; nothing mutates it
/// afterwards.
#[derive(Clone, Serialize, Deserialize)]
pub struct AnchorConfig {
    /// Bitcoin network.
    pub network: Network,

    /// Owner private key (WIF).
    #[serde(skip_serializing)]
    pub private_key: String,

    /// UTXO provider.
    pub utxo_api: Endpoint,

    /// Previous transaction source.
    pub tx_api: Endpoint,

    /// Broadcast endpoint.
    pub broadcast_api: Endpoint,

    /// Fee policy.
    pub fee: FeePolicy,

    /// Change below this amount is folded into the fee.
    pub dust_threshold_sat: u64,

    /// Input selection strategy.
    pub selection: SelectionStrategy,

    /// HTTP request timeout in seconds.
    pub timeout_secs: u64,

    /// Commitment file written by the state fetcher.
    pub state_file: PathBuf,

    /// Build and sign without broadcasting.
    pub dry_run: bool,
}

impl AnchorConfig {
    /// Create a new configuration with public default endpoints for `network`.
    pub fn new(private_key: impl Into<String>, network: Network) -> Self {
        let endpoint = |kind| Endpoint::new(kind, network.default_url(kind).unwrap_or_default());

        Self {
            network,
            private_key: private_key.into(),
            utxo_api: endpoint(ApiKind::BlockCypher),
            tx_api: endpoint(ApiKind::Esplora),
            broadcast_api: endpoint(ApiKind::BlockCypher),
            fee: FeePolicy::Flat(DEFAULT_FEE_SAT),
            dust_threshold_sat: DEFAULT_DUST_THRESHOLD_SAT,
            selection: SelectionStrategy::First,
            timeout_secs: 30,
            state_file: PathBuf::from("state.txt"),
            dry_run: false,
        }
    }

    /// Create configuration for testnet.
    pub fn testnet(private_key: impl Into<String>) -> Self {
        Self::new(private_key, Network::Testnet)
    }

    /// Set the UTXO provider.
    pub fn with_utxo_api(mut self, kind: ApiKind, url: impl Into<String>) -> Self {
        self.utxo_api = Endpoint::new(kind, url);
        self
    }

    /// Set the previous transaction source.
    pub fn with_tx_api(mut self, kind: ApiKind, url: impl Into<String>) -> Self {
        self.tx_api = Endpoint::new(kind, url);
        self
    }

    /// Set the broadcast endpoint.
    pub fn with_broadcast_api(mut self, kind: ApiKind, url: impl Into<String>) -> Self {
        self.broadcast_api = Endpoint::new(kind, url);
        self
    }

    /// Set a flat fee in satoshis.
    pub fn with_fee(mut self, sat: u64) -> Self {
        self.fee = FeePolicy::Flat(sat);
        self
    }

    /// Set a fee rate in sat/vB.
    pub fn with_fee_rate(mut self, sat_per_vb: u64) -> Self {
        self.fee = FeePolicy::PerVbyte(sat_per_vb);
        self
    }

    /// Set the dust threshold.
    pub fn with_dust_threshold(mut self, sat: u64) -> Self {
        self.dust_threshold_sat = sat;
        self
    }

    /// Set the selection strategy.
    pub fn with_selection(mut self, selection: SelectionStrategy) -> Self {
        self.selection = selection;
        self
    }

    /// Set the HTTP timeout.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Set the commitment file.
    pub fn with_state_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_file = path.into();
        self
    }

    /// Build and sign only.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Load configuration from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from `lookup`, keyed by environment variable name.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let private_key = get("BITCOIN_PRIVATE_KEY").ok_or_else(|| {
            AnchorError::Configuration("BITCOIN_PRIVATE_KEY is not set".into())
        })?;
        let network = get("ROLLSTAMP_NETWORK")
            .map(|v| v.parse::<Network>())
            .transpose()?
            .unwrap_or_default();

        let mut config = Self::new(private_key, network);

        let endpoint = |prefix: &str, current: Endpoint| -> Result<Endpoint> {
            let kind = get(&format!("{prefix}_KIND"))
                .map(|v| v.parse::<ApiKind>())
                .transpose()?
                .unwrap_or(current.kind);
            let url = match get(prefix) {
                Some(url) => url,
                None if kind == current.kind => current.url,
                None => network.default_url(kind).unwrap_or_default().to_string(),
            };
            Ok(Endpoint::new(kind, url))
        };
        config.utxo_api = endpoint("ROLLSTAMP_UTXO_API", config.utxo_api)?;
        config.tx_api = endpoint("ROLLSTAMP_TX_API", config.tx_api)?;
        config.broadcast_api = endpoint("ROLLSTAMP_BROADCAST_API", config.broadcast_api)?;

        if let Some(sat) = get("ROLLSTAMP_FEE_SAT") {
            config.fee = FeePolicy::Flat(parse_number("ROLLSTAMP_FEE_SAT", &sat)?);
        }
        if let Some(rate) = get("ROLLSTAMP_FEE_RATE") {
            config.fee = FeePolicy::PerVbyte(parse_number("ROLLSTAMP_FEE_RATE", &rate)?);
        }
        if let Some(sat) = get("ROLLSTAMP_DUST_SAT") {
            config.dust_threshold_sat = parse_number("ROLLSTAMP_DUST_SAT", &sat)?;
        }
        if let Some(selection) = get("ROLLSTAMP_SELECTION") {
            config.selection = selection.parse()?;
        }
        if let Some(secs) = get("ROLLSTAMP_TIMEOUT_SECS") {
            config.timeout_secs = parse_number("ROLLSTAMP_TIMEOUT_SECS", &secs)?;
        }
        if let Some(path) = get("ROLLSTAMP_STATE_FILE") {
            config.state_file = PathBuf::from(path);
        }
        if let Some(flag) = get("ROLLSTAMP_DRY_RUN") {
            config.dry_run = parse_flag("ROLLSTAMP_DRY_RUN", &flag)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.private_key.trim().is_empty() {
            return Err(AnchorError::Configuration("private key is required".into()));
        }

        for (name, endpoint) in [
            ("UTXO API", &self.utxo_api),
            ("transaction API", &self.tx_api),
            ("broadcast API", &self.broadcast_api),
        ] {
            if endpoint.url.is_empty() {
                return Err(AnchorError::Configuration(format!(
                    "{name} URL is required for {} {}",
                    endpoint.kind,
                    self.network.name()
                )));
            }
            if !endpoint.url.starts_with("http://") && !endpoint.url.starts_with("https://") {
                return Err(AnchorError::Configuration(format!(
                    "{name} URL must be http(s): {}",
                    endpoint.url
                )));
            }
        }

        if self.timeout_secs == 0 {
            return Err(AnchorError::Configuration(
                "timeout must be at least 1 second".into(),
            ));
        }

        if self.fee == FeePolicy::PerVbyte(0) {
            return Err(AnchorError::Configuration("fee rate must be positive".into()));
        }
        self.fee.estimate(MAX_OP_RETURN_SIZE)?;

        Ok(())
    }
}

impl std::fmt::Debug for AnchorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnchorConfig")
            .field("network", &self.network)
            .field("private_key", &"<redacted>")
            .field("utxo_api", &self.utxo_api)
            .field("tx_api", &self.tx_api)
            .field("broadcast_api", &self.broadcast_api)
            .field("fee", &self.fee)
            .field("dust_threshold_sat", &self.dust_threshold_sat)
            .field("selection", &self.selection)
            .field("timeout_secs", &self.timeout_secs)
            .field("state_file", &self.state_file)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

fn parse_number(key: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| AnchorError::Configuration(format!("{key} must be an integer, got {value:?}")))
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(AnchorError::Configuration(format!(
            "{key} must be a boolean, got {value:?}"
        ))),
    }
}
