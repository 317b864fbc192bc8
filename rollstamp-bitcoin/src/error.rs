//! Error types for Bitcoin anchoring.

use std::fmt;

use thiserror::Error;

/// Result type for anchoring operations.
pub type Result<T> = std::result::Result<T, AnchorError>;

/// Pipeline stage that talks to an external service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Looking up unspent outputs for the owner address.
    UtxoLookup,
    /// Fetching a previous transaction.
    RawTxFetch,
    /// Submitting the signed transaction.
    Broadcast,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::UtxoLookup => "utxo lookup",
            Stage::RawTxFetch => "raw transaction fetch",
            Stage::Broadcast => "broadcast",
        };
        f.write_str(name)
    }
}

/// Errors that can occur during Bitcoin anchoring.
#[derive(Debug, Error)]
pub enum AnchorError {
    /// Missing or invalid configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The owner address has no spendable outputs.
    #[error("no spendable outputs available for {0}")]
    NoFundsAvailable(String),

    /// The selected output cannot pay the fee.
    #[error("insufficient funds: need {need} sat, have {have} sat")]
    InsufficientFunds {
        /// Amount needed.
        need: u64,
        /// Amount available.
        have: u64,
    },

    /// Commitment has no bytes.
    #[error("commitment is empty")]
    EmptyCommitment,

    /// Commitment does not fit in a data output.
    #[error("commitment too large: {size} > {max} bytes")]
    CommitmentTooLarge {
        /// Commitment size.
        size: usize,
        /// Maximum data output capacity.
        max: usize,
    },

    /// Commitment artifact could not be read.
    #[error("commitment unavailable: {0}")]
    Commitment(String),

    /// A spent input has no previous transaction to sign against.
    #[error("missing previous transaction: {0}")]
    MissingPreviousTransaction(String),

    /// A previous transaction does not match the output being spent.
    #[error("invalid previous transaction: {0}")]
    InvalidPreviousTransaction(String),

    /// An input was left without a valid unlocking script.
    #[error("input {input} is not signed")]
    IncompleteSigning {
        /// Input index.
        input: usize,
    },

    /// Signature creation failed.
    #[error("signing failed: {0}")]
    Signing(String),

    /// Transport failure talking to an external service.
    #[error("{stage} failed: {message}")]
    Network {
        /// Stage that failed.
        stage: Stage,
        /// Transport error message.
        message: String,
    },

    /// The service answered with an error payload.
    #[error("{stage} rejected: {reason}")]
    Rejected {
        /// Stage that failed.
        stage: Stage,
        /// Rejection reason reported by the service.
        reason: String,
    },

    /// Malformed data returned by a service.
    #[error("decode error: {0}")]
    Decode(String),
}

impl AnchorError {
    pub(crate) fn network(stage: Stage, err: impl fmt::Display) -> Self {
        AnchorError::Network {
            stage,
            message: err.to_string(),
        }
    }

    /// Stage of the external service involved, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            AnchorError::Network { stage, .. } | AnchorError::Rejected { stage, .. } => {
                Some(*stage)
            }
            _ => None,
        }
    }
}

impl From<bitcoin::consensus::encode::Error> for AnchorError {
    fn from(e: bitcoin::consensus::encode::Error) -> Self {
        AnchorError::Decode(e.to_string())
    }
}

impl From<bitcoin::address::ParseError> for AnchorError {
    fn from(e: bitcoin::address::ParseError) -> Self {
        AnchorError::Configuration(format!("invalid address: {e}"))
    }
}

impl From<bitcoin::key::FromWifError> for AnchorError {
    fn from(e: bitcoin::key::FromWifError) -> Self {
        AnchorError::Configuration(format!("invalid private key: {e}"))
    }
}

impl From<hex::FromHexError> for AnchorError {
    fn from(e: hex::FromHexError) -> Self {
        AnchorError::Decode(e.to_string())
    }
}

impl From<serde_json::Error> for AnchorError {
    fn from(e: serde_json::Error) -> Self {
        AnchorError::Decode(e.to_string())
    }
}
