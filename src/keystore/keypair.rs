//! Operational key pair wrapper
//!
//! Owns one provider-held key pair: the public half plus the opaque handle.
//! The handle is released exactly once, on drop or explicit `clear`. The
//! private scalar never crosses the provider boundary unencrypted.

use serde::{Deserialize, Serialize};

use crate::provider::{KeyHandle, SecureCryptoProvider};
use crate::types::OperationalPublicKey;

use super::KeystoreError;

pub struct OperationalKeyPair<'p, P: SecureCryptoProvider> {
    provider: &'p P,
    handle: Option<KeyHandle>,
    public_key: OperationalPublicKey,
}

impl<'p, P: SecureCryptoProvider> OperationalKeyPair<'p, P> {
    /// Generate a fresh key pair inside the provider.
    pub fn generate(provider: &'p P) -> Result<Self, KeystoreError> {
        let handle = provider
            .generate()
            .map_err(|e| KeystoreError::CryptoError(e.to_string()))?;
        Self::wrap(provider, handle)
    }

    /// Re-materialize a key pair from a sealed blob produced by
    /// [`export_blob`](Self::export_blob).
    pub fn from_blob(provider: &'p P, blob: &[u8]) -> Result<Self, KeystoreError> {
        let handle = provider
            .import_blob(blob)
            .map_err(|e| KeystoreError::CryptoError(e.to_string()))?;
        Self::wrap(provider, handle)
    }

    fn wrap(provider: &'p P, handle: KeyHandle) -> Result<Self, KeystoreError> {
        match provider.public_key(&handle) {
            Ok(public_key) => Ok(Self {
                provider,
                handle: Some(handle),
                public_key,
            }),
            Err(e) => {
                provider.free(handle);
                Err(KeystoreError::CryptoError(e.to_string()))
            }
        }
    }

    pub fn public_key(&self) -> &OperationalPublicKey {
        &self.public_key
    }

    /// Sign `message`. Returns the raw 64-byte ECDSA signature.
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>, KeystoreError> {
        let handle = self.handle()?;
        self.provider
            .sign(handle, message)
            .map_err(|e| KeystoreError::CryptoError(e.to_string()))
    }

    /// Export the sealed blob for durable storage.
    pub fn export_blob(&self) -> Result<Vec<u8>, KeystoreError> {
        let handle = self.handle()?;
        self.provider
            .export_blob(handle)
            .map_err(|e| KeystoreError::CryptoError(e.to_string()))
    }

    /// Build a signing request for this key pair.
    pub fn signing_request(&self, subject: &str) -> Result<SigningRequest, KeystoreError> {
        let public_key = hex::encode(self.public_key.as_bytes());
        let payload = SigningRequest::payload_bytes(subject, &public_key)?;
        let signature = self.sign(&payload)?;

        Ok(SigningRequest {
            subject: subject.to_string(),
            public_key,
            signature: hex::encode(signature),
        })
    }

    /// Release the provider handle early. Signing afterwards fails with
    /// `IncorrectState`.
    pub fn clear(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.provider.free(handle);
        }
    }

    fn handle(&self) -> Result<&KeyHandle, KeystoreError> {
        self.handle
            .as_ref()
            .ok_or_else(|| KeystoreError::IncorrectState("key pair already cleared".to_string()))
    }
}

impl<P: SecureCryptoProvider> Drop for OperationalKeyPair<'_, P> {
    fn drop(&mut self) {
        self.clear();
    }
}

/// A certificate signing request: the staged public key plus a proof of
/// possession, serialized as JSON.
///
/// The signature covers the serialized `{subject, public_key}` payload, so a
/// verifier can check that whoever produced the request holds the private
/// half of the embedded key. The certificate format proper is not this
/// crate's concern; an external authority answers the request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningRequest {
    /// Who the certificate is requested for.
    pub subject: String,
    /// Hex-encoded SEC1 uncompressed public key.
    pub public_key: String,
    /// Hex-encoded ECDSA signature over the request payload.
    pub signature: String,
}

#[derive(Serialize)]
struct RequestPayload<'a> {
    subject: &'a str,
    public_key: &'a str,
}

impl SigningRequest {
    fn payload_bytes(subject: &str, public_key: &str) -> Result<Vec<u8>, KeystoreError> {
        serde_json::to_vec(&RequestPayload {
            subject,
            public_key,
        })
        .map_err(|e| KeystoreError::SerializationError(e.to_string()))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, KeystoreError> {
        serde_json::to_vec(self).map_err(|e| KeystoreError::SerializationError(e.to_string()))
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, KeystoreError> {
        serde_json::from_slice(data).map_err(|e| KeystoreError::SerializationError(e.to_string()))
    }

    /// The embedded public key, decoded.
    pub fn public_key(&self) -> Result<OperationalPublicKey, KeystoreError> {
        let bytes = hex::decode(&self.public_key)
            .map_err(|e| KeystoreError::SerializationError(e.to_string()))?;
        OperationalPublicKey::from_slice(&bytes).ok_or_else(|| {
            KeystoreError::InvalidPublicKey("wrong public key length".to_string())
        })
    }

    /// Check the proof of possession.
    pub fn verify(&self) -> bool {
        let Ok(public_key) = self.public_key() else {
            return false;
        };
        let Ok(payload) = Self::payload_bytes(&self.subject, &self.public_key) else {
            return false;
        };
        let Ok(signature) = hex::decode(&self.signature) else {
            return false;
        };
        public_key.verify(&payload, &signature)
    }
}
