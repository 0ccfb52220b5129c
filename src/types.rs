//! Identity indices and public key material
//!
//! An `IdentityIndex` names one cryptographic identity (a tenant/fabric
//! slot); an `OperationalPublicKey` is the public half of that identity's
//! signing key pair. Both are plain values: the private half only ever lives
//! behind a provider handle.

use std::fmt;
use std::num::NonZeroU8;

use p256::ecdsa::signature::Verifier;
use p256::ecdsa::{Signature, VerifyingKey};
use p256::elliptic_curve::sec1::ToEncodedPoint;

/// Length in bytes of a SEC1 uncompressed P-256 public key.
pub const PUBLIC_KEY_LEN: usize = 65;

/// Length in bytes of a raw (r || s) P-256 ECDSA signature.
pub const SIGNATURE_LEN: usize = 64;

/// Index identifying a cryptographic identity.
///
/// Zero is the reserved "undefined" sentinel and cannot be constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IdentityIndex(NonZeroU8);

impl IdentityIndex {
    /// Wrap a raw index. Returns `None` for the reserved zero value.
    pub fn new(index: u8) -> Option<Self> {
        NonZeroU8::new(index).map(Self)
    }

    pub fn get(&self) -> u8 {
        self.0.get()
    }
}

impl fmt::Display for IdentityIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An operational public key: a SEC1 uncompressed P-256 point.
///
/// Equality is bit-for-bit. This is the comparison used to confirm that an
/// external authority certified exactly the key that was staged.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct OperationalPublicKey([u8; PUBLIC_KEY_LEN]);

impl OperationalPublicKey {
    pub fn from_bytes(bytes: [u8; PUBLIC_KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Wrap a slice. Returns `None` unless it is exactly one uncompressed
    /// point long.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let bytes: [u8; PUBLIC_KEY_LEN] = bytes.try_into().ok()?;
        Some(Self(bytes))
    }

    pub fn from_verifying_key(key: &VerifyingKey) -> Self {
        let point = key.to_encoded_point(false);
        let bytes: [u8; PUBLIC_KEY_LEN] = point
            .as_bytes()
            .try_into()
            .expect("uncompressed SEC1 point is 65 bytes");
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.0
    }

    /// Verify a raw 64-byte ECDSA signature over `message` (SHA-256 digest).
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        let Ok(key) = VerifyingKey::from_sec1_bytes(&self.0) else {
            return false;
        };
        let Ok(signature) = Signature::from_slice(signature) else {
            return false;
        };
        key.verify(message, &signature).is_ok()
    }
}

impl fmt::Display for OperationalPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for OperationalPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OperationalPublicKey({})", self)
    }
}
