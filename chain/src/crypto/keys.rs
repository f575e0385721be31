//! Ed25519 keypairs, signing and address derivation.
//!
//! Signing is deterministic (pure Ed25519), signatures are detached 64-byte
//! values, and verification never panics: malformed keys or signatures simply
//! verify as `false`. Addresses are the trailing 40 hex characters of the
//! SHA3-256 digest of the public key.

use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::Serialize;

use super::encoding::{canonical_json, canonical_value, sha3_256};
use crate::types::{ADDRESS_LEN, Address, HASH_LEN, PublicKey, Signature};

/// Length in bytes of an Ed25519 secret key seed.
pub const PRIVATE_KEY_LEN: usize = 32;

/// Length in bytes of an Ed25519 public key.
pub const PUBLIC_KEY_LEN: usize = 32;

/// Length in bytes of an Ed25519 detached signature.
pub const SIGNATURE_LEN: usize = 64;

/// An Ed25519 signing keypair.
///
/// Wraps the dalek [`SigningKey`]; the verifying half and the derived
/// account address are computed on demand.
#[derive(Clone)]
pub struct KeyPair {
    signing: SigningKey,
}

impl std::fmt::Debug for KeyPair {
    // Never prints key material.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("address", &self.address().to_hex())
            .finish()
    }
}

impl KeyPair {
    /// Generates a fresh random keypair from the OS entropy source.
    pub fn generate() -> Self {
        let mut csprng = OsRng;
        KeyPair {
            signing: SigningKey::generate(&mut csprng),
        }
    }

    /// Derives a deterministic keypair from an arbitrary seed string.
    ///
    /// The secret key is the SHA3-256 digest of the UTF-8 seed bytes. The
    /// same seed always yields the same keypair, which makes this the tool
    /// of choice for tests and local devnets; do not use guessable seeds for
    /// anything holding value.
    pub fn from_seed(seed: &str) -> Self {
        let digest = sha3_256(seed.as_bytes());
        KeyPair {
            signing: SigningKey::from_bytes(digest.as_bytes()),
        }
    }

    /// Reconstructs a keypair from a 32-byte secret key.
    ///
    /// Returns `None` when the slice has the wrong length.
    pub fn from_private(private_key: &[u8]) -> Option<Self> {
        let bytes: [u8; PRIVATE_KEY_LEN] = private_key.try_into().ok()?;
        Some(KeyPair {
            signing: SigningKey::from_bytes(&bytes),
        })
    }

    /// Returns the secret key bytes.
    pub fn private_key_bytes(&self) -> [u8; PRIVATE_KEY_LEN] {
        self.signing.to_bytes()
    }

    /// Returns the public half of the keypair.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.signing.verifying_key().to_bytes().to_vec())
    }

    /// Returns the account address derived from the public key.
    pub fn address(&self) -> Address {
        address_from_public_key(&self.public_key())
    }

    /// Signs a raw message, returning a detached 64-byte signature.
    pub fn sign(&self, message: &[u8]) -> Signature {
        let sig = self.signing.sign(message);
        Signature(sig.to_bytes().to_vec())
    }

    /// Signs the canonical encoding of a value.
    ///
    /// This is `sign(canon(v))`: the counterpart of
    /// [`verify_value_signature`].
    pub fn sign_value<T: Serialize>(&self, value: &T) -> Signature {
        let canonical = canonical_json(&canonical_value(value));
        self.sign(canonical.as_bytes())
    }
}

/// Derives an account address from public key bytes.
///
/// The address is the last [`ADDRESS_LEN`] bytes of `sha3_256(pubkey)`,
/// i.e. the last 40 characters of the hex digest.
pub fn address_from_public_key(public_key: &PublicKey) -> Address {
    let digest = sha3_256(public_key.as_bytes());
    let mut addr = [0u8; ADDRESS_LEN];
    addr.copy_from_slice(&digest.as_bytes()[HASH_LEN - ADDRESS_LEN..]);
    Address(addr)
}

/// Verifies an Ed25519 signature over a raw message.
///
/// Signature failure is non-exceptional: malformed keys, malformed
/// signatures and honest mismatches all return `false`.
pub fn verify_signature(public_key: &PublicKey, message: &[u8], signature: &Signature) -> bool {
    let Ok(key_bytes) = <[u8; PUBLIC_KEY_LEN]>::try_from(public_key.as_bytes()) else {
        return false;
    };
    let Ok(verifying) = VerifyingKey::from_bytes(&key_bytes) else {
        return false;
    };
    let Ok(sig_bytes) = <[u8; SIGNATURE_LEN]>::try_from(signature.as_bytes()) else {
        return false;
    };
    let sig = ed25519_dalek::Signature::from_bytes(&sig_bytes);
    verifying.verify(message, &sig).is_ok()
}

/// Verifies a signature over the canonical encoding of a value.
pub fn verify_value_signature<T: Serialize>(
    public_key: &PublicKey,
    value: &T,
    signature: &Signature,
) -> bool {
    let canonical = canonical_json(&canonical_value(value));
    verify_signature(public_key, canonical.as_bytes(), signature)
}
