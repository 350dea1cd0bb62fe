//! Key handling for the acting identity.
//!
//! Key custody lives outside this crate. Callers hand in an implementation of
//! [`KeyProvider`]; the codec only needs "current secret key" and "current
//! public key" from it.

use crate::nip01::{generate_secret_key, get_public_key_hex};
use bitcoin::secp256k1::SecretKey;
use thiserror::Error;

/// Errors raised while reading or validating key material.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid secret key: {0}")]
    InvalidSecretKey(String),

    #[error("no identity available")]
    NoIdentity,
}

/// Parse a hex-encoded secret key.
///
/// Rejects anything that is not 64 hex characters or is outside the curve order.
pub fn parse_secret_key(value: &str) -> Result<[u8; 32], KeyError> {
    let value = value.trim();
    if value.len() != 64 {
        return Err(KeyError::InvalidSecretKey(format!(
            "expected 64 hex characters, got {}",
            value.len()
        )));
    }

    let bytes = hex::decode(value).map_err(|e| KeyError::InvalidSecretKey(e.to_string()))?;
    let mut key = [0u8; 32];
    key.copy_from_slice(&bytes);

    SecretKey::from_slice(&key).map_err(|e| KeyError::InvalidSecretKey(e.to_string()))?;
    Ok(key)
}

/// Whether `value` is a usable hex secret key.
pub fn is_valid_secret_key(value: &str) -> bool {
    parse_secret_key(value).is_ok()
}

/// Source of the acting identity's keys.
pub trait KeyProvider: Send + Sync {
    /// Hex x-only public key of the current identity.
    fn current_public_key(&self) -> Result<String, KeyError>;

    /// Raw secret key of the current identity.
    fn current_secret_key(&self) -> Result<[u8; 32], KeyError>;
}

/// An in-memory key pair.
#[derive(Clone)]
pub struct Keypair {
    pub secret_key: [u8; 32],
    pub public_key: String,
}

impl Keypair {
    pub fn from_secret_key(secret_key: [u8; 32]) -> Result<Self, KeyError> {
        let public_key = get_public_key_hex(&secret_key)
            .map_err(|e| KeyError::InvalidSecretKey(e.to_string()))?;
        Ok(Self {
            secret_key,
            public_key,
        })
    }

    pub fn from_secret_key_hex(value: &str) -> Result<Self, KeyError> {
        Self::from_secret_key(parse_secret_key(value)?)
    }

    /// Fresh random identity.
    pub fn generate() -> Self {
        let secret_key = generate_secret_key();
        // A key from generate_secret_key is always in range.
        let public_key = get_public_key_hex(&secret_key).unwrap_or_default();
        Self {
            secret_key,
            public_key,
        }
    }

    pub fn public_key_hex(&self) -> &str {
        &self.public_key
    }

    pub fn secret_key_hex(&self) -> String {
        hex::encode(self.secret_key)
    }
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keypair")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

impl KeyProvider for Keypair {
    fn current_public_key(&self) -> Result<String, KeyError> {
        Ok(self.public_key.clone())
    }

    fn current_secret_key(&self) -> Result<[u8; 32], KeyError> {
        Ok(self.secret_key)
    }
}
