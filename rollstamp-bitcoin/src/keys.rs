//! Owner key handling.

use std::fmt;

use bitcoin::secp256k1::{Secp256k1, SecretKey};
use bitcoin::{Address, NetworkKind, PrivateKey, PublicKey, ScriptBuf};

use crate::config::Network;
use crate::error::{AnchorError, Result};

/// The key that owns the funding address and signs anchor transactions.
#[derive(Clone)]
pub struct OwnerKey {
    private_key: PrivateKey,
    public_key: PublicKey,
    address: Address,
}

impl OwnerKey {
    /// Parse a WIF-encoded private key for `network`.
    pub fn from_wif(wif: &str, network: Network) -> Result<Self> {
        let private_key = PrivateKey::from_wif(wif.trim())?;
        Self::from_private_key(private_key, network)
    }

    /// Wrap an existing private key.
    pub fn from_private_key(private_key: PrivateKey, network: Network) -> Result<Self> {
        let expected = NetworkKind::from(network.to_bitcoin_network());
        if private_key.network != expected {
            return Err(AnchorError::Configuration(format!(
                "private key is not a {} key",
                network.name()
            )));
        }

        let secp = Secp256k1::signing_only();
        let public_key = private_key.public_key(&secp);
        let address = Address::p2pkh(public_key.pubkey_hash(), network.to_bitcoin_network());

        Ok(Self {
            private_key,
            public_key,
            address,
        })
    }

    /// P2PKH address funded by this key.
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Locking script of the owner address.
    pub fn script_pubkey(&self) -> ScriptBuf {
        self.address.script_pubkey()
    }

    /// Public key.
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub(crate) fn secret_key(&self) -> &SecretKey {
        &self.private_key.inner
    }
}

impl fmt::Debug for OwnerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnerKey")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}
