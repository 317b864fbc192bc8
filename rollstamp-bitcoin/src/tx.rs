//! Bitcoin transaction building for OP_RETURN anchoring.

use bitcoin::blockdata::opcodes;
use bitcoin::blockdata::script::{Builder, Instruction, PushBytesBuf, ScriptBuf};
use bitcoin::{
    absolute, transaction, Address, Amount, OutPoint, Sequence, Transaction, TxIn, TxOut, Witness,
};

use crate::commitment::Commitment;
use crate::error::{AnchorError, Result};
use crate::fee::FeePolicy;
use crate::select::SelectionStrategy;
use crate::{DEFAULT_DUST_THRESHOLD_SAT, MAX_OP_RETURN_SIZE};

/// Build an OP_RETURN script carrying `data` as a single push.
pub fn build_op_return_script(data: &[u8]) -> Result<ScriptBuf> {
    if data.len() > MAX_OP_RETURN_SIZE {
        return Err(AnchorError::CommitmentTooLarge {
            size: data.len(),
            max: MAX_OP_RETURN_SIZE,
        });
    }

    let push_bytes = PushBytesBuf::try_from(data.to_vec()).map_err(|_| {
        AnchorError::CommitmentTooLarge {
            size: data.len(),
            max: MAX_OP_RETURN_SIZE,
        }
    })?;

    Ok(Builder::new()
        .push_opcode(opcodes::all::OP_RETURN)
        .push_slice(push_bytes)
        .into_script())
}

/// Extract the pushed payload from an OP_RETURN script.
pub fn parse_op_return_script(script: &ScriptBuf) -> Result<Vec<u8>> {
    let mut instructions = script.instructions();

    match instructions.next() {
        Some(Ok(Instruction::Op(op))) if op == opcodes::all::OP_RETURN => {}
        _ => return Err(AnchorError::Decode("not an OP_RETURN script".into())),
    }

    let data = match instructions.next() {
        Some(Ok(Instruction::PushBytes(bytes))) => bytes.as_bytes().to_vec(),
        _ => return Err(AnchorError::Decode("OP_RETURN without data push".into())),
    };

    if instructions.next().is_some() {
        return Err(AnchorError::Decode("trailing data after OP_RETURN push".into()));
    }

    Ok(data)
}

/// An unspent output of the owner address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utxo {
    /// Previous output point.
    pub outpoint: OutPoint,
    /// Amount in satoshis.
    pub amount: Amount,
}

impl Utxo {
    /// Create a new UTXO reference.
    pub fn new(outpoint: OutPoint, amount: Amount) -> Self {
        Self { outpoint, amount }
    }
}

/// Anchor transaction before signing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedAnchorTx {
    /// Transaction with empty unlocking scripts.
    pub tx: Transaction,
    /// Outputs spent by `tx`, in input order.
    pub spent: Vec<Utxo>,
    /// Fee paid, including any change folded in as dust.
    pub fee: Amount,
    /// Change returned to the owner, if a change output was created.
    pub change: Option<Amount>,
    /// Locking script of the owner address.
    pub owner_script: ScriptBuf,
}

impl UnsignedAnchorTx {
    /// The OP_RETURN output.
    pub fn data_output(&self) -> &TxOut {
        &self.tx.output[0]
    }

    /// The change output, if any.
    pub fn change_output(&self) -> Option<&TxOut> {
        self.tx.output.get(1)
    }

    /// Total value of the spent outputs.
    pub fn input_value(&self) -> Amount {
        self.spent.iter().map(|u| u.amount).sum()
    }
}

/// Transaction builder for anchor transactions.
///
/// Building is pure: the UTXO set is fetched by the caller.
#[derive(Debug, Clone)]
pub struct AnchorTxBuilder {
    /// Fee policy.
    fee: FeePolicy,
    /// Input selection strategy.
    selection: SelectionStrategy,
    /// Change below this amount is not returned.
    dust_threshold: Amount,
}

impl Default for AnchorTxBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AnchorTxBuilder {
    /// Create a builder with the default flat fee and first-UTXO selection.
    pub fn new() -> Self {
        Self {
            fee: FeePolicy::default(),
            selection: SelectionStrategy::default(),
            dust_threshold: Amount::from_sat(DEFAULT_DUST_THRESHOLD_SAT),
        }
    }

    /// Set fee policy.
    pub fn with_fee_policy(mut self, fee: FeePolicy) -> Self {
        self.fee = fee;
        self
    }

    /// Set selection strategy.
    pub fn with_selection(mut self, selection: SelectionStrategy) -> Self {
        self.selection = selection;
        self
    }

    /// Set dust threshold.
    pub fn with_dust_threshold(mut self, threshold: Amount) -> Self {
        self.dust_threshold = threshold;
        self
    }

    /// Check that a commitment fits in a data output.
    pub fn check_commitment(&self, commitment: &Commitment) -> Result<()> {
        if commitment.len() > MAX_OP_RETURN_SIZE {
            return Err(AnchorError::CommitmentTooLarge {
                size: commitment.len(),
                max: MAX_OP_RETURN_SIZE,
            });
        }
        Ok(())
    }

    /// Build an anchor transaction spending one of `utxos`.
    ///
    /// Outputs are `[OP_RETURN commitment, change]`; the change output is
    /// left out when the change is below the dust threshold.
    pub fn build(
        &self,
        owner: &Address,
        commitment: &Commitment,
        utxos: &[Utxo],
    ) -> Result<UnsignedAnchorTx> {
        if utxos.is_empty() {
            return Err(AnchorError::NoFundsAvailable(owner.to_string()));
        }
        self.check_commitment(commitment)?;

        let fee = self.fee.estimate(commitment.len())?;
        let utxo = self.selection.select(utxos, fee)?;

        let have = utxo.amount.to_sat();
        let change = have
            .checked_sub(fee)
            .ok_or(AnchorError::InsufficientFunds { need: fee, have })?;

        let owner_script = owner.script_pubkey();

        let input = TxIn {
            previous_output: utxo.outpoint,
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        };

        let mut outputs = vec![TxOut {
            value: Amount::ZERO,
            script_pubkey: build_op_return_script(commitment.as_bytes())?,
        }];

        // A zero change is always dropped, even with a zero threshold.
        let change = Amount::from_sat(change);
        let change = if change > Amount::ZERO && change >= self.dust_threshold {
            outputs.push(TxOut {
                value: change,
                script_pubkey: owner_script.clone(),
            });
            Some(change)
        } else {
            None
        };

        let paid = utxo.amount - change.unwrap_or(Amount::ZERO);

        Ok(UnsignedAnchorTx {
            tx: Transaction {
                version: transaction::Version::TWO,
                lock_time: absolute::LockTime::ZERO,
                input: vec![input],
                output: outputs,
            },
            spent: vec![utxo.clone()],
            fee: paid,
            change,
            owner_script,
        })
    }
}
