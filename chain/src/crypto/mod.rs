//! Cryptographic primitives for the chain.
//!
//! Everything that is hashed or signed in this system goes through a single
//! canonical byte form (compact JSON with sorted keys, see [`encoding`]);
//! this module bundles that encoding with the hash function (SHA3-256), the
//! signature scheme (Ed25519), address derivation, and the merkle root used
//! for per-block transaction commitments.

pub mod encoding;
pub mod keys;
pub mod merkle;

pub use encoding::{canonical_json, canonical_value, hash_value, sha3_256};
pub use keys::{KeyPair, address_from_public_key, verify_signature, verify_value_signature};
pub use merkle::merkle_root;
