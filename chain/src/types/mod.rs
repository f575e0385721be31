//! Core domain types used by the chain.
//!
//! This module defines strongly-typed hashes, addresses, key material and
//! exact-rational fractions that are shared across the chain implementation.
//! The goal is to avoid "naked" byte buffers and floating-point numbers in
//! public APIs and instead use domain-specific newtypes.
//!
//! All of these types serialize as lowercase hex strings (or, for
//! [`Fraction`], as a small integer object), because every hash and signature
//! in the system is computed over the canonical JSON form defined in
//! [`crate::crypto::encoding`].

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Transaction types.
pub mod tx;
/// Block types and hashing.
pub mod block;
/// Staking-related records: validators, delegations, unbonding, votes.
pub mod staking;

pub use block::Block;
pub use staking::{Delegation, Evidence, EvidenceKind, UnbondingEntry, ValidatorInfo, Vote};
pub use tx::{Transaction, TxType};

/// Length in bytes of all 256-bit hash types used in this module.
pub const HASH_LEN: usize = 32;

/// Length in bytes of an account address (40 hex characters).
pub const ADDRESS_LEN: usize = 20;

/// Strongly-typed 256-bit hash wrapper (SHA3-256).
///
/// This type is used as the backing representation for all fixed-size hashes
/// in the chain (transaction ids, block hashes, merkle roots, state roots).
/// It is always exactly [`HASH_LEN`] bytes long and serializes as a 64
/// character lowercase hex string, which is also the form fed into merkle
/// concatenation and persisted storage keys.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Hash256(pub [u8; HASH_LEN]);

impl Hash256 {
    /// Returns the all-zero hash, used as the genesis `prev_hash` and as the
    /// placeholder hash of a not-yet-signed block.
    pub fn zero() -> Self {
        Hash256([0u8; HASH_LEN])
    }

    /// Returns `true` if every byte is zero.
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    /// Returns the underlying 32-byte hash as a borrowed array.
    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    /// Returns the lowercase hex representation (64 characters).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parses a 64-character hex string into a hash.
    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let arr: [u8; HASH_LEN] = bytes.try_into().ok()?;
        Some(Hash256(arr))
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Hash256 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Hash256 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Hash256::from_hex(&s).ok_or_else(|| serde::de::Error::custom("invalid 256-bit hash hex"))
    }
}

/// Account address: the trailing [`ADDRESS_LEN`] bytes of the SHA3-256 digest
/// of the account's public key.
///
/// Addresses surface everywhere as 40-character lowercase hex strings;
/// validity is exactly "40 characters, hex alphabet". The address is a
/// one-way projection of the public key, so transactions additionally carry
/// the full `sender_pubkey` for signature verification.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Address(pub [u8; ADDRESS_LEN]);

impl Address {
    /// Returns the lowercase hex representation (40 characters).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parses a 40-character hex string into an address.
    pub fn from_hex(s: &str) -> Option<Self> {
        if s.len() != ADDRESS_LEN * 2 {
            return None;
        }
        let bytes = hex::decode(s).ok()?;
        let arr: [u8; ADDRESS_LEN] = bytes.try_into().ok()?;
        Some(Address(arr))
    }

    /// Checks whether a string is a well-formed address.
    pub fn is_valid(s: &str) -> bool {
        Address::from_hex(s).is_some()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Address::from_hex(&s).ok_or_else(|| serde::de::Error::custom("invalid address hex"))
    }
}

/// Ed25519 public key bytes, wrapped to avoid naked `Vec<u8>`.
///
/// An empty key marks an object that has not been signed yet (freshly built
/// transactions and blocks carry empty key/signature fields until their
/// `sign` method fills them in). Serializes as a hex string; an empty key
/// serializes as `""`.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct PublicKey(pub Vec<u8>);

impl PublicKey {
    /// Returns the raw public key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns `true` if no key material is present.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the lowercase hex representation.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// Parses a hex string into a public key.
    pub fn from_hex(s: &str) -> Option<Self> {
        hex::decode(s).ok().map(PublicKey)
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        PublicKey::from_hex(&s).ok_or_else(|| serde::de::Error::custom("invalid public key hex"))
    }
}

/// Ed25519 detached signature bytes (64 bytes when present).
///
/// These are signatures over the canonical JSON encoding of a signable
/// payload; the exact payload projection is defined by the transaction and
/// block types. An empty signature means "unsigned".
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Signature(pub Vec<u8>);

impl Signature {
    /// Returns an empty (absent) signature.
    pub fn empty() -> Self {
        Signature(Vec::new())
    }

    /// Returns the raw signature bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns `true` if no signature is present.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the lowercase hex representation.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// Parses a hex string into a signature.
    pub fn from_hex(s: &str) -> Option<Self> {
        hex::decode(s).ok().map(Signature)
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Signature::from_hex(&s).ok_or_else(|| serde::de::Error::custom("invalid signature hex"))
    }
}

/// Exact rational in `[0, 1]`, as a `num / den` pair of integers.
///
/// Commission rates, slash fractions, the supermajority threshold and the
/// missed-block threshold are all fractions of this kind. Keeping them as
/// integer pairs keeps floating point entirely off the consensus path: every
/// comparison and multiplication below is exact.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Fraction {
    pub num: u64,
    pub den: u64,
}

impl Fraction {
    /// Builds a fraction. The denominator must be nonzero.
    pub fn new(num: u64, den: u64) -> Self {
        assert!(den != 0, "fraction denominator must be nonzero");
        Fraction { num, den }
    }

    /// The zero fraction.
    pub fn zero() -> Self {
        Fraction { num: 0, den: 1 }
    }

    /// Returns `true` if the fraction lies in `[0, 1]`.
    pub fn is_proper(&self) -> bool {
        self.den != 0 && self.num <= self.den
    }

    /// Computes `floor(x * num / den)` without overflow for any `u64` input.
    pub fn mul_floor(&self, x: u64) -> u64 {
        ((x as u128 * self.num as u128) / self.den as u128) as u64
    }

    /// Returns `true` iff `part / whole >= num / den`, exactly.
    ///
    /// A zero `whole` never satisfies the threshold.
    pub fn reached_by(&self, part: u64, whole: u64) -> bool {
        if whole == 0 {
            return false;
        }
        part as u128 * self.den as u128 >= whole as u128 * self.num as u128
    }
}

impl fmt::Display for Fraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}
