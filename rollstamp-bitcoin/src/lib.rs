//! Bitcoin OP_RETURN anchoring for rollup state commitments.
//!
//! This crate takes an opaque state commitment (typically the hash of a
//! rollup's latest state) and binds it to Bitcoin history by embedding it in
//! the OP_RETURN output of a transaction funded from a single P2PKH address.
//!
//! # How It Works
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                    ANCHORING PIPELINE (one run)                      │
//! │                                                                      │
//! │  1. Commitment                                                       │
//! │     └─ raw bytes read from the state file (≤ 80 bytes)              │
//! │                                                                      │
//! │  2. UTXO lookup                                                      │
//! │     └─ GET unspent outputs of the owner address                     │
//! │                                                                      │
//! │  3. Build                                                            │
//! │     └─ [OP_RETURN <commitment>] value 0                             │
//! │        [P2PKH owner]           value = utxo - fee                   │
//! │                                                                      │
//! │  4. Sign                                                             │
//! │     └─ legacy SIGHASH_ALL over the full previous transaction        │
//! │                                                                      │
//! │  5. Broadcast                                                        │
//! │     └─ POST hex-encoded transaction, report txid or rejection       │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use rollstamp_bitcoin::{AnchorConfig, AnchorPipeline, Commitment};
//!
//! let config = AnchorConfig::from_env()?;
//! let commitment = Commitment::from_file(&config.state_file)?;
//!
//! let pipeline = AnchorPipeline::from_config(&config)?;
//! let receipt = pipeline.run(&commitment).await?;
//! println!("anchored in {}", receipt.txid);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod api;
mod commitment;
mod config;
mod error;
mod fee;
mod keys;
mod pipeline;
mod select;
mod sign;
mod tx;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

#[cfg(test)]
mod proptest;

pub use api::{ApiKind, Broadcaster, Endpoint, HttpApi, RawTxFetcher, UtxoProvider};
pub use commitment::Commitment;
pub use config::{AnchorConfig, Network};
pub use error::{AnchorError, Result, Stage};
pub use fee::FeePolicy;
pub use keys::OwnerKey;
pub use pipeline::{anchor, AnchorPipeline, AnchorReceipt};
pub use select::SelectionStrategy;
pub use sign::{verify_input, PrevTxs, SignedAnchorTx, Signer};
pub use tx::{build_op_return_script, parse_op_return_script, AnchorTxBuilder, UnsignedAnchorTx, Utxo};

/// Maximum OP_RETURN payload relayed by standard nodes (80 bytes).
pub const MAX_OP_RETURN_SIZE: usize = 80;

/// Default flat fee in satoshis.
pub const DEFAULT_FEE_SAT: u64 = 1000;

/// Default change threshold below which no change output is created.
///
/// 546 sat is the standard dust limit for a P2PKH output at the default
/// relay fee.
pub const DEFAULT_DUST_THRESHOLD_SAT: u64 = 546;
