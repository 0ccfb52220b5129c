//! Software provider
//!
//! Keeps P-256 signing keys in an in-memory handle table and seals exports
//! with AES-256-GCM under a key derived from a 32-byte sealing root via
//! HKDF-SHA256. A blob is `nonce (12) || ciphertext(pubkey || scalar) ||
//! tag (16)` and always [`SEALED_BLOB_LEN`] bytes long, so callers can probe
//! for a stored key pair by length alone.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use hkdf::Hkdf;
use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::types::{OperationalPublicKey, PUBLIC_KEY_LEN};

use super::{KeyHandle, ProviderError, SecureCryptoProvider};

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const SCALAR_LEN: usize = 32;
const PLAINTEXT_LEN: usize = PUBLIC_KEY_LEN + SCALAR_LEN;

/// Total length of a sealed blob: nonce || ciphertext || tag.
pub const SEALED_BLOB_LEN: usize = NONCE_LEN + PLAINTEXT_LEN + TAG_LEN;

/// In-process secure key backend.
///
/// Two instances sharing the same sealing root can import each other's blobs;
/// an [`ephemeral`](Self::ephemeral) instance can only import its own.
pub struct SoftwareCryptoProvider {
    seal_root: [u8; 32],
    keys: Mutex<HashMap<KeyHandle, SigningKey>>,
}

impl SoftwareCryptoProvider {
    /// Create a provider sealing exports under the given 32-byte root.
    pub fn new(seal_root: [u8; 32]) -> Self {
        Self {
            seal_root,
            keys: Mutex::new(HashMap::new()),
        }
    }

    /// Create a provider with a random sealing root.
    pub fn ephemeral() -> Self {
        let mut seal_root = [0u8; 32];
        OsRng.fill_bytes(&mut seal_root);
        Self::new(seal_root)
    }

    /// Number of live key handles.
    pub fn handle_count(&self) -> usize {
        self.table().len()
    }

    fn table(&self) -> MutexGuard<'_, HashMap<KeyHandle, SigningKey>> {
        self.keys.lock().expect("key table lock poisoned")
    }

    /// Derive the AES key for blob sealing from the root.
    fn sealing_key(&self) -> [u8; 32] {
        let hk = Hkdf::<Sha256>::new(None, &self.seal_root);
        let mut okm = [0u8; 32];
        hk.expand(b"opkeystore-blob-seal-v1", &mut okm)
            .expect("32 bytes is a valid HKDF-SHA256 output length");
        okm
    }

    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, ProviderError> {
        let key = self.sealing_key();
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| ProviderError::CryptoError(e.to_string()))?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| ProviderError::CryptoError(e.to_string()))?;

        // nonce (12 bytes) || ciphertext
        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);
        Ok(blob)
    }

    fn unseal(&self, blob: &[u8]) -> Result<Vec<u8>, ProviderError> {
        if blob.len() != SEALED_BLOB_LEN {
            return Err(ProviderError::InvalidBlob(format!(
                "expected {} blob bytes, got {}",
                SEALED_BLOB_LEN,
                blob.len()
            )));
        }

        let key = self.sealing_key();
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| ProviderError::CryptoError(e.to_string()))?;

        let nonce = Nonce::from_slice(&blob[..NONCE_LEN]);
        cipher
            .decrypt(nonce, &blob[NONCE_LEN..])
            .map_err(|e| ProviderError::InvalidBlob(e.to_string()))
    }
}

impl SecureCryptoProvider for SoftwareCryptoProvider {
    fn generate(&self) -> Result<KeyHandle, ProviderError> {
        let key = SigningKey::random(&mut OsRng);
        let handle = KeyHandle::new();
        self.table().insert(handle, key);
        Ok(handle)
    }

    fn public_key(&self, handle: &KeyHandle) -> Result<OperationalPublicKey, ProviderError> {
        let table = self.table();
        let key = table
            .get(handle)
            .ok_or_else(|| ProviderError::UnknownHandle(handle.to_string()))?;
        Ok(OperationalPublicKey::from_verifying_key(key.verifying_key()))
    }

    fn export_blob(&self, handle: &KeyHandle) -> Result<Vec<u8>, ProviderError> {
        let mut plaintext = {
            let table = self.table();
            let key = table
                .get(handle)
                .ok_or_else(|| ProviderError::UnknownHandle(handle.to_string()))?;

            let public = OperationalPublicKey::from_verifying_key(key.verifying_key());
            let mut buf = Vec::with_capacity(PLAINTEXT_LEN);
            buf.extend_from_slice(public.as_bytes());
            buf.extend_from_slice(key.to_bytes().as_slice());
            buf
        };

        let blob = self.seal(&plaintext);
        plaintext.zeroize();
        blob
    }

    fn import_blob(&self, blob: &[u8]) -> Result<KeyHandle, ProviderError> {
        let mut plaintext = self.unseal(blob)?;
        if plaintext.len() != PLAINTEXT_LEN {
            plaintext.zeroize();
            return Err(ProviderError::InvalidBlob(
                "unexpected key material length".to_string(),
            ));
        }

        let key = match SigningKey::from_slice(&plaintext[PUBLIC_KEY_LEN..]) {
            Ok(key) => key,
            Err(e) => {
                plaintext.zeroize();
                return Err(ProviderError::InvalidBlob(e.to_string()));
            }
        };

        let derived = OperationalPublicKey::from_verifying_key(key.verifying_key());
        let embedded_matches = derived.as_bytes()[..] == plaintext[..PUBLIC_KEY_LEN];
        plaintext.zeroize();
        if !embedded_matches {
            return Err(ProviderError::InvalidBlob(
                "embedded public key does not match private scalar".to_string(),
            ));
        }

        let handle = KeyHandle::new();
        self.table().insert(handle, key);
        Ok(handle)
    }

    fn sign(&self, handle: &KeyHandle, message: &[u8]) -> Result<Vec<u8>, ProviderError> {
        let table = self.table();
        let key = table
            .get(handle)
            .ok_or_else(|| ProviderError::UnknownHandle(handle.to_string()))?;

        let signature: Signature = key
            .try_sign(message)
            .map_err(|e| ProviderError::CryptoError(e.to_string()))?;
        Ok(signature.to_vec())
    }

    fn free(&self, handle: KeyHandle) {
        self.table().remove(&handle);
    }

    fn sealed_blob_len(&self) -> usize {
        SEALED_BLOB_LEN
    }
}
