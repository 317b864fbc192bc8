//! Fee policies for anchor transactions.

use serde::{Deserialize, Serialize};

use crate::error::{AnchorError, Result};
use crate::DEFAULT_FEE_SAT;

/// How the fee of an anchor transaction is chosen.
///
/// The fee is fixed before the transaction is built and subtracted from the
/// selected output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeePolicy {
    /// Constant fee in satoshis.
    Flat(u64),
    /// Fee rate in sat/vB applied to the estimated transaction size.
    PerVbyte(u64),
}

impl Default for FeePolicy {
    fn default() -> Self {
        FeePolicy::Flat(DEFAULT_FEE_SAT)
    }
}

impl FeePolicy {
    /// Fee in satoshis for an anchor carrying `data_len` bytes.
    ///
    /// Fails if a fee rate is too large for the fee to be represented.
    pub fn estimate(&self, data_len: usize) -> Result<u64> {
        match *self {
            FeePolicy::Flat(sat) => Ok(sat),
            FeePolicy::PerVbyte(rate) => (estimate_size(1, data_len) as u64)
                .checked_mul(rate)
                .ok_or_else(|| {
                    AnchorError::Configuration(format!("fee rate {rate} sat/vB overflows the fee"))
                }),
        }
    }
}

/// Estimate the serialized size of a legacy P2PKH anchor transaction.
///
/// Assumes compressed keys, a 72-byte signature and a change output.
fn estimate_size(num_inputs: usize, data_len: usize) -> usize {
    // - Version: 4 bytes
    // - Input count: 1 byte
    // - Per input: 32 (txid) + 4 (vout) + 1 (script len) + 107 (sig + key) + 4 (sequence)
    // - Output count: 1 byte
    // - OP_RETURN output: 8 (value) + 1 (script len) + 1 (OP_RETURN) + push + data
    // - Change output (P2PKH): 8 + 1 + 25 = 34 bytes
    // - Locktime: 4 bytes
    let base = 4 + 1 + 1 + 4;
    let inputs = num_inputs * 148;
    let push_prefix = if data_len <= 75 { 1 } else { 2 };
    let op_return = 8 + 1 + 1 + push_prefix + data_len;
    let change = 34;

    base + inputs + op_return + change
}
