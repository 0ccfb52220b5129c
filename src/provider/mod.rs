//! Secure key-material backend
//!
//! The provider owns all private key material. Callers hold opaque
//! `KeyHandle`s and never see raw private scalars; a key pair leaves the
//! boundary only as a sealed blob produced by `export_blob`.

pub mod software;

pub use software::SoftwareCryptoProvider;

use std::fmt;

use thiserror::Error;
use uuid::Uuid;

use crate::types::OperationalPublicKey;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Unknown key handle: {0}")]
    UnknownHandle(String),

    #[error("Invalid key blob: {0}")]
    InvalidBlob(String),

    #[error("Cryptographic error: {0}")]
    CryptoError(String),
}

/// Opaque reference to a key pair held inside a provider.
///
/// Handles are only meaningful to the provider that issued them and are never
/// serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyHandle(Uuid);

impl KeyHandle {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for KeyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Capability contract for a secure key-material backend.
pub trait SecureCryptoProvider {
    /// Generate a fresh P-256 key pair inside the boundary.
    fn generate(&self) -> Result<KeyHandle, ProviderError>;

    /// Public half of the key pair behind `handle`.
    fn public_key(&self, handle: &KeyHandle) -> Result<OperationalPublicKey, ProviderError>;

    /// Export the key pair behind `handle` as a sealed blob. The blob is
    /// ciphertext with integrity protection; its layout belongs to the
    /// provider.
    fn export_blob(&self, handle: &KeyHandle) -> Result<Vec<u8>, ProviderError>;

    /// Re-materialize a key pair from a blob produced by `export_blob`.
    fn import_blob(&self, blob: &[u8]) -> Result<KeyHandle, ProviderError>;

    /// Sign `message` (SHA-256, then ECDSA) with the key pair behind
    /// `handle`. Returns the raw 64-byte signature.
    fn sign(&self, handle: &KeyHandle, message: &[u8]) -> Result<Vec<u8>, ProviderError>;

    /// Release the key pair behind `handle`. Unknown handles are ignored.
    fn free(&self, handle: KeyHandle);

    /// Length in bytes of every blob `export_blob` produces.
    fn sealed_blob_len(&self) -> usize;
}
