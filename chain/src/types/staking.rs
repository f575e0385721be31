//! Staking-related records stored in chain state.
//!
//! This module defines the validator registry entry, the delegation record,
//! the delayed-release unbonding entry, the finality vote and the
//! misbehavior evidence record. All of them serialize canonically (sorted
//! keys, hex-encoded identities) because validators and delegations are part
//! of the state snapshot that the state root commits to.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::crypto::encoding::canonical_value;
use crate::crypto::keys::KeyPair;
use crate::crypto::verify_value_signature;

use super::{Address, Fraction, Hash256, PublicKey, Signature};

/// Registry entry for a validator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValidatorInfo {
    /// Validator account address (also the key of the registry).
    pub address: Address,
    /// Ed25519 public key blocks and votes are verified against.
    pub public_key: PublicKey,
    /// Self-bonded stake.
    pub stake: u64,
    /// Sum of all delegations pointing at this validator.
    pub delegated_stake: u64,
    /// Commission the validator takes on delegation rewards.
    pub commission_rate: Fraction,
    /// Whether the validator is currently jailed.
    pub jailed: bool,
    /// First height at which a jailed validator becomes eligible again.
    pub jailed_until: u64,
    /// Lifetime count of blocks this validator proposed.
    pub total_blocks_proposed: u64,
    /// Lifetime count of heights where this validator was expected but the
    /// block came from someone else.
    pub total_blocks_missed: u64,
    /// Creation time, seconds since the Unix epoch.
    pub created_at: u64,
}

impl ValidatorInfo {
    /// Builds a fresh validator entry with the given self-stake.
    pub fn new(
        address: Address,
        public_key: PublicKey,
        stake: u64,
        commission_rate: Fraction,
        created_at: u64,
    ) -> Self {
        ValidatorInfo {
            address,
            public_key,
            stake,
            delegated_stake: 0,
            commission_rate,
            jailed: false,
            jailed_until: 0,
            total_blocks_proposed: 0,
            total_blocks_missed: 0,
            created_at,
        }
    }

    /// Total voting power: self-stake plus delegated stake.
    pub fn total_stake(&self) -> u64 {
        self.stake + self.delegated_stake
    }

    /// Whether the validator is eligible at `current_height`.
    ///
    /// A validator is active iff it is not serving a jail term and its total
    /// stake meets the chain's minimum.
    pub fn is_active(&self, current_height: u64, min_stake: u64) -> bool {
        if self.jailed && current_height < self.jailed_until {
            return false;
        }
        self.total_stake() >= min_stake
    }
}

/// A delegation record, keyed by `(delegator, validator)`.
///
/// At most one record exists per pair; its amount is strictly positive while
/// the record exists (a delegation drained to zero is removed).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Delegation {
    pub delegator: Address,
    pub validator: Address,
    pub amount: u64,
    pub created_at: u64,
}

/// A delayed-release entry in the unbonding queue.
///
/// Created by UNSTAKE (with `validator: None`) and UNDELEGATE (with the
/// validator the stake came from); the amount returns to `address` once the
/// chain reaches `completion_height`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnbondingEntry {
    /// Account the funds return to.
    pub address: Address,
    /// Source validator for undelegations, `None` for self-unstaking.
    pub validator: Option<Address>,
    /// Amount held back until maturity.
    pub amount: u64,
    /// First height at which the entry is mature.
    pub completion_height: u64,
    /// Creation time, seconds since the Unix epoch.
    pub created_at: u64,
}

impl UnbondingEntry {
    /// Whether the entry has matured at `current_height`.
    pub fn is_mature(&self, current_height: u64) -> bool {
        current_height >= self.completion_height
    }
}

/// A validator's finality vote for a block.
///
/// Votes are deduplicated by `(block_hash, validator)`; a validator gets
/// exactly one vote per block hash.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub validator: Address,
    pub height: u64,
    pub block_hash: Hash256,
    pub timestamp: u64,
    pub signature: Signature,
}

impl Vote {
    /// Builds an unsigned vote.
    pub fn new(validator: Address, height: u64, block_hash: Hash256, timestamp: u64) -> Self {
        Vote {
            validator,
            height,
            block_hash,
            timestamp,
            signature: Signature::empty(),
        }
    }

    /// Returns the signable payload: every field except `signature`.
    pub fn payload(&self) -> Value {
        let mut value = canonical_value(self);
        if let Value::Object(map) = &mut value {
            map.remove("signature");
        }
        value
    }

    /// Signs the vote with the validator's keypair.
    pub fn sign(mut self, keypair: &KeyPair) -> Self {
        self.signature = keypair.sign_value(&self.payload());
        self
    }

    /// Verifies the vote signature against the validator's public key.
    ///
    /// The key is looked up in the validator registry by the caller; the
    /// vote itself only carries the validator address.
    pub fn verify_signature(&self, public_key: &PublicKey) -> bool {
        if self.signature.is_empty() {
            return false;
        }
        verify_value_signature(public_key, &self.payload(), &self.signature)
    }
}

/// Kind of validator misbehavior an [`Evidence`] record proves.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceKind {
    /// Two distinct block hashes signed at the same height.
    DoubleSign,
    /// Miss ratio over the attendance window exceeded the threshold.
    MissedBlocks,
}

/// A structured record proving validator misbehavior.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub kind: EvidenceKind,
    pub validator: Address,
    pub height: u64,
    pub timestamp: u64,
    /// Kind-specific details (conflicting hashes, miss counts, ...).
    pub data: Map<String, Value>,
}
