//! In-memory chain for testing and development.
//!
//! `MockChain` implements every service trait from [`crate::api`] and
//! records each call, so tests can assert which stages ran and what bytes
//! were broadcast.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use bitcoin::hashes::Hash;
use bitcoin::{
    absolute, consensus::encode, transaction, Address, Amount, OutPoint, ScriptBuf, Sequence,
    Transaction, TxIn, TxOut, Txid, Witness,
};
use parking_lot::RwLock;

use crate::api::{Broadcaster, RawTxFetcher, UtxoProvider};
use crate::error::{AnchorError, Result, Stage};
use crate::tx::Utxo;

/// Calls observed by a [`MockChain`].
#[derive(Debug, Clone, Default)]
pub struct MockCalls {
    /// Addresses looked up.
    pub utxo_lookups: Vec<String>,
    /// Previous transactions requested.
    pub raw_tx_fetches: Vec<Txid>,
    /// Serialized transactions submitted.
    pub submitted: Vec<Vec<u8>>,
}

/// Simulated UTXO index, transaction store and mempool.
#[derive(Default)]
pub struct MockChain {
    utxos: RwLock<HashMap<String, Vec<Utxo>>>,
    transactions: RwLock<HashMap<Txid, Transaction>>,
    reject_broadcast: RwLock<Option<String>>,
    unavailable: RwLock<Option<Stage>>,
    calls: RwLock<MockCalls>,
    counter: AtomicU32,
}

impl MockChain {
    /// Create an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transaction paying `value` sat to `address` and index its output.
    pub fn fund(&self, address: &Address, value: u64) -> Utxo {
        let tx = funding_tx(
            address.script_pubkey(),
            value,
            self.counter.fetch_add(1, Ordering::Relaxed),
        );
        let utxo = Utxo::new(OutPoint::new(tx.compute_txid(), 0), Amount::from_sat(value));

        self.transactions.write().insert(tx.compute_txid(), tx);
        self.utxos
            .write()
            .entry(address.to_string())
            .or_default()
            .push(utxo.clone());
        utxo
    }

    /// Forget the stored previous transaction for `txid`.
    pub fn drop_transaction(&self, txid: &Txid) {
        self.transactions.write().remove(txid);
    }

    /// Make every broadcast fail with `reason`.
    pub fn reject_broadcasts(&self, reason: impl Into<String>) {
        *self.reject_broadcast.write() = Some(reason.into());
    }

    /// Make calls for `stage` fail with a transport error.
    pub fn set_unavailable(&self, stage: Stage) {
        *self.unavailable.write() = Some(stage);
    }

    /// Snapshot of the observed calls.
    pub fn calls(&self) -> MockCalls {
        self.calls.read().clone()
    }

    fn check_available(&self, stage: Stage) -> Result<()> {
        if *self.unavailable.read() == Some(stage) {
            return Err(AnchorError::network(stage, "connection refused"));
        }
        Ok(())
    }
}

#[async_trait]
impl UtxoProvider for MockChain {
    async fn utxos(&self, address: &Address) -> Result<Vec<Utxo>> {
        self.calls.write().utxo_lookups.push(address.to_string());
        self.check_available(Stage::UtxoLookup)?;

        Ok(self
            .utxos
            .read()
            .get(&address.to_string())
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl RawTxFetcher for MockChain {
    async fn raw_transaction(&self, txid: &Txid) -> Result<Transaction> {
        self.calls.write().raw_tx_fetches.push(*txid);
        self.check_available(Stage::RawTxFetch)?;

        self.transactions
            .read()
            .get(txid)
            .cloned()
            .ok_or_else(|| AnchorError::Rejected {
                stage: Stage::RawTxFetch,
                reason: format!("transaction {txid} not found"),
            })
    }
}

#[async_trait]
impl Broadcaster for MockChain {
    async fn submit(&self, raw_tx: &[u8]) -> Result<Txid> {
        self.calls.write().submitted.push(raw_tx.to_vec());
        self.check_available(Stage::Broadcast)?;

        if let Some(reason) = self.reject_broadcast.read().clone() {
            return Err(AnchorError::Rejected {
                stage: Stage::Broadcast,
                reason,
            });
        }

        let tx: Transaction = encode::deserialize(raw_tx)?;
        Ok(tx.compute_txid())
    }
}

/// A version-1 transaction paying `value` to `script` at output 0.
///
/// `nonce` makes otherwise identical funding transactions distinct.
pub fn funding_tx(script: ScriptBuf, value: u64, nonce: u32) -> Transaction {
    Transaction {
        version: transaction::Version::ONE,
        lock_time: absolute::LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint::new(Txid::from_byte_array([0xfa; 32]), nonce),
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        }],
        output: vec![TxOut {
            value: Amount::from_sat(value),
            script_pubkey: script,
        }],
    }
}
