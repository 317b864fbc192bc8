//! Legacy P2PKH signing of anchor transactions.
//!
//! Inputs are signed with `SIGHASH_ALL` over the legacy (pre-segwit)
//! digest. The full previous transaction of every input is required so
//! the spent output can be checked before anything is signed.

use std::collections::HashMap;

use bitcoin::blockdata::script::{Builder, Instruction, PushBytesBuf};
use bitcoin::consensus::encode;
use bitcoin::hashes::Hash;
use bitcoin::secp256k1::{All, Message, Secp256k1};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::{ecdsa, PublicKey, Script, ScriptBuf, Transaction, Txid};

use crate::error::{AnchorError, Result};
use crate::keys::OwnerKey;
use crate::tx::UnsignedAnchorTx;

/// Previous transactions keyed by txid.
pub type PrevTxs = HashMap<Txid, Transaction>;

/// A fully signed anchor transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedAnchorTx {
    /// Signed transaction.
    pub tx: Transaction,
    /// Consensus serialization of `tx`.
    pub bytes: Vec<u8>,
}

impl SignedAnchorTx {
    /// Transaction id.
    pub fn txid(&self) -> Txid {
        self.tx.compute_txid()
    }

    /// Hex encoding of the serialized transaction.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }

    /// Decode a signed transaction from its serialized bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let tx: Transaction = encode::deserialize(bytes)?;
        Ok(Self {
            tx,
            bytes: bytes.to_vec(),
        })
    }
}

/// Signs anchor transactions with the owner key.
pub struct Signer<'a> {
    key: &'a OwnerKey,
    secp: Secp256k1<All>,
}

impl<'a> Signer<'a> {
    /// Create a signer for `key`.
    pub fn new(key: &'a OwnerKey) -> Self {
        Self {
            key,
            secp: Secp256k1::new(),
        }
    }

    /// Sign every input of `unsigned`.
    ///
    /// The unsigned transaction is left untouched; a new signed value is
    /// returned.
    pub fn sign(&self, unsigned: &UnsignedAnchorTx, prev_txs: &PrevTxs) -> Result<SignedAnchorTx> {
        let prev_scripts = unsigned
            .tx
            .input
            .iter()
            .enumerate()
            .map(|(index, input)| self.spent_script(unsigned, index, input.previous_output, prev_txs))
            .collect::<Result<Vec<_>>>()?;

        let cache = SighashCache::new(&unsigned.tx);
        let mut tx = unsigned.tx.clone();

        for (index, prev_script) in prev_scripts.iter().enumerate() {
            let sighash = cache
                .legacy_signature_hash(index, prev_script, EcdsaSighashType::All.to_u32())
                .map_err(|e| AnchorError::Signing(e.to_string()))?;
            let msg = Message::from_digest(sighash.to_byte_array());

            let signature = ecdsa::Signature {
                signature: self.secp.sign_ecdsa(&msg, self.key.secret_key()),
                sighash_type: EcdsaSighashType::All,
            };
            let sig_bytes = PushBytesBuf::try_from(signature.to_vec())
                .map_err(|e| AnchorError::Signing(e.to_string()))?;

            tx.input[index].script_sig = Builder::new()
                .push_slice(sig_bytes)
                .push_key(self.key.public_key())
                .into_script();
        }

        finalize(&tx, &prev_scripts)?;

        let bytes = encode::serialize(&tx);
        Ok(SignedAnchorTx { tx, bytes })
    }

    /// Resolve and check the output spent by input `index`.
    fn spent_script(
        &self,
        unsigned: &UnsignedAnchorTx,
        index: usize,
        outpoint: bitcoin::OutPoint,
        prev_txs: &PrevTxs,
    ) -> Result<ScriptBuf> {
        let prev_tx = prev_txs
            .get(&outpoint.txid)
            .ok_or_else(|| AnchorError::MissingPreviousTransaction(outpoint.txid.to_string()))?;

        if prev_tx.compute_txid() != outpoint.txid {
            return Err(AnchorError::InvalidPreviousTransaction(format!(
                "{} does not hash to its txid",
                outpoint.txid
            )));
        }

        let prev_out = prev_tx.output.get(outpoint.vout as usize).ok_or_else(|| {
            AnchorError::InvalidPreviousTransaction(format!("{outpoint} does not exist"))
        })?;

        if let Some(utxo) = unsigned.spent.get(index) {
            if utxo.outpoint != outpoint || utxo.amount != prev_out.value {
                return Err(AnchorError::InvalidPreviousTransaction(format!(
                    "{outpoint} holds {} but {} was selected",
                    prev_out.value, utxo.amount
                )));
            }
        }

        if prev_out.script_pubkey != self.key.script_pubkey() {
            return Err(AnchorError::InvalidPreviousTransaction(format!(
                "{outpoint} is not paid to {}",
                self.key.address()
            )));
        }

        Ok(prev_out.script_pubkey.clone())
    }
}

/// Require every input of `tx` to carry a valid unlocking script for the
/// matching entry of `prev_scripts`.
fn finalize(tx: &Transaction, prev_scripts: &[ScriptBuf]) -> Result<()> {
    if tx.input.len() != prev_scripts.len() {
        return Err(AnchorError::IncompleteSigning {
            input: tx.input.len().min(prev_scripts.len()),
        });
    }

    for (index, prev_script) in prev_scripts.iter().enumerate() {
        if !verify_input(tx, index, prev_script) {
            return Err(AnchorError::IncompleteSigning { input: index });
        }
    }
    Ok(())
}

/// Check that input `index` of `tx` validly spends a P2PKH `prev_script`.
///
/// The unlocking script must be exactly `<sig> <pubkey>`, the key must hash
/// to `prev_script` and the signature must verify against the legacy digest.
pub fn verify_input(tx: &Transaction, index: usize, prev_script: &Script) -> bool {
    let Some(input) = tx.input.get(index) else {
        return false;
    };

    let pushes: Vec<Vec<u8>> = match input
        .script_sig
        .instructions()
        .map(|ins| match ins {
            Ok(Instruction::PushBytes(bytes)) => Some(bytes.as_bytes().to_vec()),
            _ => None,
        })
        .collect::<Option<Vec<_>>>()
    {
        Some(pushes) if pushes.len() == 2 => pushes,
        _ => return false,
    };

    let (Ok(signature), Ok(public_key)) = (
        ecdsa::Signature::from_slice(&pushes[0]),
        PublicKey::from_slice(&pushes[1]),
    ) else {
        return false;
    };

    if ScriptBuf::new_p2pkh(&public_key.pubkey_hash()).as_script() != prev_script {
        return false;
    }

    let Ok(sighash) = SighashCache::new(tx).legacy_signature_hash(
        index,
        prev_script,
        signature.sighash_type.to_u32(),
    ) else {
        return false;
    };

    let msg = Message::from_digest(sighash.to_byte_array());
    Secp256k1::verification_only()
        .verify_ecdsa(&msg, &signature.signature, &public_key.inner)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use bitcoin::{Amount, OutPoint};

    use super::*;
    use crate::commitment::Commitment;
    use crate::fee::FeePolicy;
    use crate::keys::test_utils;
    use crate::mock::funding_tx;
    use crate::tx::{AnchorTxBuilder, Utxo};

    fn fixture(value: u64) -> (OwnerKey, UnsignedAnchorTx, PrevTxs) {
        let owner = test_utils::owner(0x11);
        let prev = funding_tx(owner.script_pubkey(), value, 0);
        let utxo = Utxo::new(OutPoint::new(prev.compute_txid(), 0), Amount::from_sat(value));

        let unsigned = AnchorTxBuilder::new()
            .with_fee_policy(FeePolicy::Flat(1000))
            .build(
                owner.address(),
                &Commitment::new(vec![0x42; 32]).unwrap(),
                &[utxo],
            )
            .unwrap();

        let mut prev_txs = PrevTxs::new();
        prev_txs.insert(prev.compute_txid(), prev);
        (owner, unsigned, prev_txs)
    }

    #[test]
    fn test_sign_produces_valid_input() {
        let (owner, unsigned, prev_txs) = fixture(5000);
        let signed = Signer::new(&owner).sign(&unsigned, &prev_txs).unwrap();

        assert!(!signed.tx.input[0].script_sig.is_empty());
        assert!(verify_input(&signed.tx, 0, &owner.script_pubkey()));
        // Unsigned value untouched.
        assert!(unsigned.tx.input[0].script_sig.is_empty());
        assert_eq!(signed.tx.output, unsigned.tx.output);
    }

    #[test]
    fn test_signed_bytes_roundtrip() {
        let (owner, unsigned, prev_txs) = fixture(5000);
        let signed = Signer::new(&owner).sign(&unsigned, &prev_txs).unwrap();

        let decoded = SignedAnchorTx::from_bytes(&signed.bytes).unwrap();
        assert_eq!(decoded.tx, signed.tx);
        assert_eq!(encode::serialize(&decoded.tx), signed.bytes);
        assert_eq!(decoded.txid(), signed.txid());
    }

    #[test]
    fn test_signing_twice_yields_valid_transactions() {
        let (owner, unsigned, prev_txs) = fixture(5000);
        let signer = Signer::new(&owner);

        let first = signer.sign(&unsigned, &prev_txs).unwrap();
        let second = signer.sign(&unsigned, &prev_txs).unwrap();

        assert!(verify_input(&first.tx, 0, &owner.script_pubkey()));
        assert!(verify_input(&second.tx, 0, &owner.script_pubkey()));
    }

    #[test]
    fn test_missing_previous_transaction() {
        let (owner, unsigned, _) = fixture(5000);
        let err = Signer::new(&owner).sign(&unsigned, &PrevTxs::new()).unwrap_err();
        assert!(matches!(err, AnchorError::MissingPreviousTransaction(_)));
    }

    #[test]
    fn test_previous_output_value_mismatch() {
        let (owner, mut unsigned, prev_txs) = fixture(5000);
        unsigned.spent[0].amount = Amount::from_sat(6000);

        let err = Signer::new(&owner).sign(&unsigned, &prev_txs).unwrap_err();
        assert!(matches!(err, AnchorError::InvalidPreviousTransaction(_)));
    }

    #[test]
    fn test_previous_output_owned_by_someone_else() {
        let (_owner, unsigned, prev_txs) = fixture(5000);
        let stranger = test_utils::owner(0x33);

        let err = Signer::new(&stranger).sign(&unsigned, &prev_txs).unwrap_err();
        assert!(matches!(err, AnchorError::InvalidPreviousTransaction(_)));
    }

    #[test]
    fn test_tampered_output_fails_verification() {
        let (owner, unsigned, prev_txs) = fixture(5000);
        let mut signed = Signer::new(&owner).sign(&unsigned, &prev_txs).unwrap();

        signed.tx.output[1].value = Amount::from_sat(4500);
        assert!(!verify_input(&signed.tx, 0, &owner.script_pubkey()));
    }

    #[test]
    fn test_finalize_rejects_missing_unlocking_script() {
        let (owner, unsigned, _) = fixture(5000);
        let err = finalize(&unsigned.tx, &[owner.script_pubkey()]).unwrap_err();
        assert!(matches!(err, AnchorError::IncompleteSigning { input: 0 }));
    }

    #[test]
    fn test_finalize_rejects_garbage_unlocking_script() {
        let (owner, unsigned, prev_txs) = fixture(5000);
        let mut tx = Signer::new(&owner).sign(&unsigned, &prev_txs).unwrap().tx;
        finalize(&tx, &[owner.script_pubkey()]).unwrap();

        tx.input[0].script_sig = ScriptBuf::from_bytes(vec![0x01, 0xff, 0x51]);
        let err = finalize(&tx, &[owner.script_pubkey()]).unwrap_err();
        assert!(matches!(err, AnchorError::IncompleteSigning { input: 0 }));
    }

    #[test]
    fn test_finalize_rejects_signature_for_another_script() {
        let (owner, unsigned, prev_txs) = fixture(5000);
        let tx = Signer::new(&owner).sign(&unsigned, &prev_txs).unwrap().tx;

        let stranger = test_utils::owner(0x33);
        let err = finalize(&tx, &[stranger.script_pubkey()]).unwrap_err();
        assert!(matches!(err, AnchorError::IncompleteSigning { input: 0 }));
    }

    #[test]
    fn test_unsigned_input_fails_verification() {
        let (owner, unsigned, _) = fixture(5000);
        assert!(!verify_input(&unsigned.tx, 0, &owner.script_pubkey()));
        assert!(!verify_input(&unsigned.tx, 5, &owner.script_pubkey()));
    }
}
