//! Property-based tests for anchor construction.
//!
//! Tests invariants of built and signed anchors under arbitrary commitments
//! and funding amounts.

use bitcoin::hashes::Hash;
use bitcoin::{Amount, OutPoint, Txid};
use proptest::prelude::*;

use crate::commitment::Commitment;
use crate::error::AnchorError;
use crate::fee::FeePolicy;
use crate::keys::test_utils;
use crate::mock::funding_tx;
use crate::sign::{verify_input, PrevTxs, Signer};
use crate::tx::{build_op_return_script, parse_op_return_script, AnchorTxBuilder, Utxo};
use crate::MAX_OP_RETURN_SIZE;

// ============================================================================
// Arbitrary Implementations
// ============================================================================

/// Generate a commitment that fits in an OP_RETURN output.
fn arb_commitment() -> impl Strategy<Value = Commitment> {
    prop::collection::vec(any::<u8>(), 1..=MAX_OP_RETURN_SIZE)
        .prop_map(|bytes| Commitment::new(bytes).unwrap())
}

/// Generate an outpoint.
fn arb_outpoint() -> impl Strategy<Value = OutPoint> {
    (prop::array::uniform32(any::<u8>()), 0u32..8)
        .prop_map(|(txid, vout)| OutPoint::new(Txid::from_byte_array(txid), vout))
}

// ============================================================================
// Property Tests: Data Output
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// The data output carries exactly the commitment bytes
    #[test]
    fn prop_data_output_decodes_to_commitment(
        commitment in arb_commitment(),
        outpoint in arb_outpoint(),
    ) {
        let owner = test_utils::owner(0x11);
        let utxo = Utxo::new(outpoint, Amount::from_sat(100_000));

        let unsigned = AnchorTxBuilder::new()
            .build(owner.address(), &commitment, &[utxo])
            .unwrap();

        let data = unsigned.data_output();
        prop_assert_eq!(data.value, Amount::ZERO);
        prop_assert!(data.script_pubkey.is_op_return());
        prop_assert_eq!(
            parse_op_return_script(&data.script_pubkey).unwrap(),
            commitment.as_bytes().to_vec()
        );
    }

    /// Oversized payloads never produce a script
    #[test]
    fn prop_oversized_payload_rejected(
        data in prop::collection::vec(any::<u8>(), (MAX_OP_RETURN_SIZE + 1)..200),
    ) {
        let is_too_large = matches!(
            build_op_return_script(&data),
            Err(AnchorError::CommitmentTooLarge { .. })
        );
        prop_assert!(is_too_large);
    }
}

// ============================================================================
// Property Tests: Value Conservation
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Either change = value - fee, or the build fails with insufficient funds
    #[test]
    fn prop_change_conserves_value(
        value in 1u64..20_000,
        fee in 0u64..5_000,
        commitment in arb_commitment(),
    ) {
        let owner = test_utils::owner(0x11);
        let utxo = Utxo::new(
            OutPoint::new(Txid::from_byte_array([7; 32]), 0),
            Amount::from_sat(value),
        );
        let builder = AnchorTxBuilder::new()
            .with_fee_policy(FeePolicy::Flat(fee))
            .with_dust_threshold(Amount::ZERO);

        match builder.build(owner.address(), &commitment, &[utxo]) {
            Ok(unsigned) => {
                prop_assert!(value >= fee);
                let change = unsigned.change.map(|c| c.to_sat()).unwrap_or(0);
                prop_assert_eq!(change, value - fee);
                prop_assert_eq!(unsigned.fee.to_sat(), fee);

                let out: u64 = unsigned.tx.output.iter().map(|o| o.value.to_sat()).sum();
                prop_assert_eq!(out + unsigned.fee.to_sat(), value);
            }
            Err(AnchorError::InsufficientFunds { need, have }) => {
                prop_assert!(value < fee);
                prop_assert_eq!(need, fee);
                prop_assert_eq!(have, value);
            }
            Err(e) => prop_assert!(false, "unexpected error: {e}"),
        }
    }
}

// ============================================================================
// Property Tests: Signing
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(20))]

    /// Every signed anchor verifies against the funding output
    #[test]
    fn prop_signed_anchor_verifies(
        commitment in arb_commitment(),
        value in 1_000u64..1_000_000,
        seed in 1u8..=0xfe,
    ) {
        let owner = test_utils::owner(seed);
        let prev = funding_tx(owner.script_pubkey(), value, seed as u32);
        let utxo = Utxo::new(OutPoint::new(prev.compute_txid(), 0), Amount::from_sat(value));

        let unsigned = AnchorTxBuilder::new()
            .build(owner.address(), &commitment, &[utxo])
            .unwrap();

        let mut prev_txs = PrevTxs::new();
        prev_txs.insert(prev.compute_txid(), prev);

        let signed = Signer::new(&owner).sign(&unsigned, &prev_txs).unwrap();
        prop_assert!(verify_input(&signed.tx, 0, &owner.script_pubkey()));
        prop_assert_eq!(signed.txid(), signed.tx.compute_txid());
    }
}
