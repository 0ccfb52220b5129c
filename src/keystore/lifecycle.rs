//! Key lifecycle state machine
//!
//! One pending key pair at a time across all identities: staged when
//! generated, active once an external authority has confirmed the exact
//! staged public key, durable once committed. Activation must precede
//! commit, so a key only becomes durable policy after its certificate has
//! been observed to match. A single-entry read-through cache keeps the most
//! recently used committed key pair live for repeated signing.

use log::{debug, warn};

use crate::provider::SecureCryptoProvider;
use crate::store::PersistentStore;
use crate::types::{IdentityIndex, OperationalPublicKey};

use super::keypair::OperationalKeyPair;
use super::KeystoreError;

/// Storage key for an identity's committed key blob.
fn storage_key(identity: IdentityIndex) -> String {
    format!("operational-keys.identity-{}", identity)
}

/// Subject string embedded in an identity's signing request.
fn request_subject(identity: IdentityIndex) -> String {
    format!("identity-{}", identity)
}

struct PendingKey<'a, P: SecureCryptoProvider> {
    identity: IdentityIndex,
    keypair: OperationalKeyPair<'a, P>,
    active: bool,
}

/// Orchestrates the pending → active → committed transition for operational
/// key pairs and answers signing requests for committed identities.
///
/// The manager borrows its collaborators and owns the pending slot and the
/// cache; all mutating operations take `&mut self`, so callers provide the
/// mutual exclusion.
pub struct KeyLifecycleManager<'a, P: SecureCryptoProvider, S: PersistentStore> {
    provider: &'a P,
    store: &'a S,
    pending: Option<PendingKey<'a, P>>,
    cache: Option<(IdentityIndex, OperationalKeyPair<'a, P>)>,
    finalized: bool,
}

impl<'a, P: SecureCryptoProvider, S: PersistentStore> KeyLifecycleManager<'a, P, S> {
    pub fn new(provider: &'a P, store: &'a S) -> Self {
        Self {
            provider,
            store,
            pending: None,
            cache: None,
            finalized: false,
        }
    }

    fn ensure_usable(&self) -> Result<(), KeystoreError> {
        if self.finalized {
            return Err(KeystoreError::IncorrectState(
                "manager is finalized".to_string(),
            ));
        }
        Ok(())
    }

    /// Drop the cached key pair if it belongs to `identity`, releasing its
    /// handle. A stale entry must never outlive the blob it was loaded from.
    fn evict_cached(&mut self, identity: IdentityIndex) {
        if let Some((cached, keypair)) = self.cache.take() {
            if cached != identity {
                self.cache = Some((cached, keypair));
            }
        }
    }

    /// True if a usable key pair exists for `identity`: an activated pending
    /// key, or a committed blob of the expected sealed length. Never decrypts
    /// the blob; this is a length-only existence probe.
    pub fn has_keypair(&self, identity: IdentityIndex) -> bool {
        if self.finalized {
            return false;
        }
        if let Some(pending) = &self.pending {
            if pending.identity == identity && pending.active {
                return true;
            }
        }
        match self.store.get(&storage_key(identity)) {
            Ok(Some(blob)) => blob.len() == self.provider.sealed_blob_len(),
            _ => false,
        }
    }

    /// Stage a fresh key pair for `identity` and return its serialized
    /// signing request.
    ///
    /// Re-staging the same identity replaces the pending key pair; staging
    /// while a different identity is mid-provisioning is rejected.
    pub fn stage_keypair(&mut self, identity: IdentityIndex) -> Result<Vec<u8>, KeystoreError> {
        self.ensure_usable()?;
        if let Some(pending) = &self.pending {
            if pending.identity != identity {
                return Err(KeystoreError::InvalidIdentity(format!(
                    "identity {} is already mid-provisioning",
                    pending.identity
                )));
            }
        }

        let keypair = OperationalKeyPair::generate(self.provider)?;
        let request = keypair.signing_request(&request_subject(identity))?;
        let bytes = request.to_bytes()?;

        // Replacing drops any previous pending key pair, releasing its handle
        self.pending = Some(PendingKey {
            identity,
            keypair,
            active: false,
        });
        debug!("staged new key pair for identity {}", identity);
        Ok(bytes)
    }

    /// Mark the pending key pair as confirmed.
    ///
    /// `confirmed` must equal the staged public key bit-for-bit: a mismatch
    /// means the authority certified a different key than the one staged
    /// here, and the pending key stays inactive.
    pub fn activate_keypair(
        &mut self,
        identity: IdentityIndex,
        confirmed: &OperationalPublicKey,
    ) -> Result<(), KeystoreError> {
        self.ensure_usable()?;
        let pending = self.pending.as_mut().ok_or_else(|| {
            KeystoreError::InvalidIdentity(format!("no pending key for identity {}", identity))
        })?;
        if pending.identity != identity {
            return Err(KeystoreError::InvalidIdentity(format!(
                "pending key belongs to identity {}",
                pending.identity
            )));
        }
        if pending.keypair.public_key() != confirmed {
            return Err(KeystoreError::InvalidPublicKey(
                "confirmed public key does not match the staged key".to_string(),
            ));
        }

        pending.active = true;
        debug!("activated pending key for identity {}", identity);
        Ok(())
    }

    /// Persist the activated pending key pair.
    ///
    /// On success the pending slot is cleared. If the store write fails the
    /// slot is left intact and still active, so commit can be retried without
    /// re-confirming the certificate.
    pub fn commit_keypair(&mut self, identity: IdentityIndex) -> Result<(), KeystoreError> {
        self.ensure_usable()?;
        let pending = self.pending.as_ref().ok_or_else(|| {
            KeystoreError::InvalidIdentity(format!("no pending key for identity {}", identity))
        })?;
        if pending.identity != identity {
            return Err(KeystoreError::InvalidIdentity(format!(
                "pending key belongs to identity {}",
                pending.identity
            )));
        }
        if !pending.active {
            return Err(KeystoreError::IncorrectState(
                "pending key has not been activated".to_string(),
            ));
        }

        let blob = pending.keypair.export_blob()?;
        if let Err(e) = self.store.set(&storage_key(identity), &blob) {
            warn!("failed to persist key blob for identity {}: {}", identity, e);
            return Err(KeystoreError::StorageError(e.to_string()));
        }

        self.pending = None;
        self.evict_cached(identity);
        debug!("committed key pair for identity {}", identity);
        Ok(())
    }

    /// Discard the pending key pair, if any, releasing its handle.
    /// Idempotent.
    pub fn revert_pending(&mut self) {
        if self.pending.take().is_some() {
            debug!("reverted pending key");
        }
    }

    /// Remove the committed key pair for `identity`.
    ///
    /// A pending key pair for the same identity is discarded first. Fails
    /// with `InvalidIdentity` if no durable blob existed, unless a
    /// pending-only key was just discarded.
    pub fn remove_keypair(&mut self, identity: IdentityIndex) -> Result<(), KeystoreError> {
        self.ensure_usable()?;

        let had_pending = match self.pending.take() {
            // Dropping the pending key pair releases its handle
            Some(pending) if pending.identity == identity => true,
            other => {
                self.pending = other;
                false
            }
        };
        self.evict_cached(identity);

        let existed = self
            .store
            .delete(&storage_key(identity))
            .map_err(|e| KeystoreError::StorageError(e.to_string()))?;
        if !existed && !had_pending {
            return Err(KeystoreError::InvalidIdentity(format!(
                "no key stored for identity {}",
                identity
            )));
        }
        debug!("removed key pair for identity {}", identity);
        Ok(())
    }

    /// Sign `message` for `identity`.
    ///
    /// An activated pending key pair wins (signing before commit is part of
    /// the provisioning sequence), then the cache, then the committed blob,
    /// which is imported and cached for the next call.
    pub fn sign_message(
        &mut self,
        identity: IdentityIndex,
        message: &[u8],
    ) -> Result<Vec<u8>, KeystoreError> {
        self.ensure_usable()?;

        if let Some(pending) = &self.pending {
            if pending.identity == identity && pending.active {
                return pending.keypair.sign(message);
            }
        }

        if let Some((cached, keypair)) = &self.cache {
            if *cached == identity {
                return keypair.sign(message);
            }
        }

        let blob = self
            .store
            .get(&storage_key(identity))
            .map_err(|e| KeystoreError::StorageError(e.to_string()))?
            .ok_or_else(|| {
                KeystoreError::InvalidIdentity(format!("no key stored for identity {}", identity))
            })?;

        let keypair = OperationalKeyPair::from_blob(self.provider, &blob)?;
        let signature = keypair.sign(message)?;
        // Replacing drops the evicted key pair, releasing its handle
        self.cache = Some((identity, keypair));
        Ok(signature)
    }

    /// Allocate a one-shot key pair that never touches the pending slot or
    /// the store. Dropping it releases the provider handle.
    pub fn allocate_ephemeral_keypair(
        &self,
    ) -> Result<OperationalKeyPair<'a, P>, KeystoreError> {
        self.ensure_usable()?;
        OperationalKeyPair::generate(self.provider)
    }

    /// End of life: discard the pending key pair, evict the cache, and
    /// refuse all further operations.
    pub fn finalize(&mut self) {
        self.pending = None;
        self.cache = None;
        self.finalized = true;
    }
}
