//! State commitment read from the upstream state artifact.

use std::fmt;
use std::path::Path;

use bitcoin::hashes::{sha256, Hash};

use crate::error::{AnchorError, Result};

/// Opaque bytes to anchor.
///
/// The bytes are embedded verbatim; no framing or magic prefix is added.
#[derive(Clone, PartialEq, Eq)]
pub struct Commitment(Vec<u8>);

impl Commitment {
    /// Create a commitment from raw bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(AnchorError::EmptyCommitment);
        }
        Ok(Self(bytes))
    }

    /// Read a commitment from the file written by the state fetcher.
    ///
    /// The file content is taken as-is, trailing newlines included.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .map_err(|e| AnchorError::Commitment(format!("{}: {e}", path.display())))?;
        Self::new(bytes)
    }

    /// Raw commitment bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Size in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; empty commitments cannot be constructed.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// SHA-256 of the commitment, hex encoded. Used for logging and receipts.
    pub fn digest(&self) -> String {
        sha256::Hash::hash(&self.0).to_string()
    }
}

impl fmt::Debug for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Commitment({})", hex::encode(&self.0))
    }
}

impl AsRef<[u8]> for Commitment {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
