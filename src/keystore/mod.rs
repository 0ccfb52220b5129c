//! Operational key lifecycle
//!
//! This module is the core of the crate:
//! - `OperationalKeyPair`: owning wrapper for one provider-held key pair
//! - `SigningRequest`: the certificate signing request derived from it
//! - `KeyLifecycleManager`: the pending → active → committed state machine
//!   with its read-through signing cache

pub mod keypair;
pub mod lifecycle;

pub use keypair::{OperationalKeyPair, SigningRequest};
pub use lifecycle::KeyLifecycleManager;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum KeystoreError {
    #[error("Invalid identity: {0}")]
    InvalidIdentity(String),

    #[error("Public key mismatch: {0}")]
    InvalidPublicKey(String),

    #[error("Incorrect state: {0}")]
    IncorrectState(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Cryptographic error: {0}")]
    CryptoError(String),
}
