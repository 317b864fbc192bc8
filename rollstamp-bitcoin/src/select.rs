//! Input selection strategies.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AnchorError, Result};
use crate::tx::Utxo;

/// Strategy for picking the output that funds an anchor.
///
/// Exactly one output is spent per anchor. The choice determines the fee
/// and change, so it is part of the configuration rather than hard-coded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    /// First output in provider order, whether or not it covers the fee.
    #[default]
    First,
    /// Largest output.
    LargestFirst,
    /// Smallest output that covers the fee.
    SmallestSufficient,
}

impl SelectionStrategy {
    /// Pick one output from `utxos` to pay `fee`.
    pub fn select<'a>(&self, utxos: &'a [Utxo], fee: u64) -> Result<&'a Utxo> {
        let picked = match self {
            SelectionStrategy::First => utxos.first(),
            SelectionStrategy::LargestFirst => utxos.iter().max_by_key(|u| u.amount),
            SelectionStrategy::SmallestSufficient => utxos
                .iter()
                .filter(|u| u.amount.to_sat() >= fee)
                .min_by_key(|u| u.amount)
                .or_else(|| utxos.iter().max_by_key(|u| u.amount)),
        };

        picked.ok_or_else(|| AnchorError::NoFundsAvailable("empty utxo set".into()))
    }

    /// Configuration name.
    pub fn name(&self) -> &'static str {
        match self {
            SelectionStrategy::First => "first",
            SelectionStrategy::LargestFirst => "largest",
            SelectionStrategy::SmallestSufficient => "smallest",
        }
    }
}

impl fmt::Display for SelectionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SelectionStrategy {
    type Err = AnchorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first" => Ok(SelectionStrategy::First),
            "largest" | "largest_first" => Ok(SelectionStrategy::LargestFirst),
            "smallest" | "smallest_sufficient" => Ok(SelectionStrategy::SmallestSufficient),
            other => Err(AnchorError::Configuration(format!(
                "unknown selection strategy: {other}"
            ))),
        }
    }
}
