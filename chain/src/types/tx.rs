// chain/src/types/tx.rs

//! Transaction types for the ledger.
//!
//! A [`Transaction`] is a signed instruction from one account, dispatched on
//! its [`TxType`]: plain transfers, self-staking, delegation, validator
//! management, and consensus votes. The signable payload is the canonical
//! JSON encoding of every field except `signature`; the sender's public key
//! is part of the signed payload, which binds each signature to exactly one
//! key and prevents signature-rebinding attacks.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::crypto::encoding::hash_value;
use crate::crypto::keys::KeyPair;
use crate::crypto::verify_value_signature;

use super::{Address, Hash256, PublicKey, Signature};

/// Default gas limit attached to new transactions.
pub const DEFAULT_GAS_LIMIT: u64 = 100_000;

/// The transaction type tag.
///
/// Serialized as a lowercase snake_case string (`"transfer"`,
/// `"create_validator"`, ...), which is the form hashed into the txid.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxType {
    /// Moves balance from sender to recipient.
    Transfer,
    /// Locks balance as the sender's own stake.
    Stake,
    /// Releases own stake into the unbonding queue.
    Unstake,
    /// Locks balance behind a validator as delegated stake.
    Delegate,
    /// Releases delegated stake into the unbonding queue.
    Undelegate,
    /// Registers the sender as a validator with an initial self-stake.
    CreateValidator,
    /// Updates mutable validator parameters (commission rate).
    EditValidator,
    /// Consensus vote marker; votes travel out-of-band, never as state
    /// transitions.
    Vote,
}

impl TxType {
    /// Returns the canonical string form of the tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            TxType::Transfer => "transfer",
            TxType::Stake => "stake",
            TxType::Unstake => "unstake",
            TxType::Delegate => "delegate",
            TxType::Undelegate => "undelegate",
            TxType::CreateValidator => "create_validator",
            TxType::EditValidator => "edit_validator",
            TxType::Vote => "vote",
        }
    }
}

impl std::fmt::Display for TxType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A signed ledger transaction.
///
/// Address validity, non-negative amounts and non-negative nonces are
/// enforced by construction: [`Address`] only holds well-formed addresses
/// and all quantities are unsigned integers in the smallest denomination.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Sender account address.
    pub sender: Address,
    /// Sender's Ed25519 public key; filled in by [`Transaction::sign`] and
    /// covered by the signature.
    pub sender_pubkey: PublicKey,
    /// Sender's account nonce at apply time.
    pub nonce: u64,
    /// Dispatch tag.
    pub tx_type: TxType,
    /// Amount moved, staked or delegated, depending on `tx_type`.
    pub amount: u64,
    /// Recipient address for TRANSFER, validator address for DELEGATE and
    /// UNDELEGATE; absent otherwise.
    pub recipient: Option<Address>,
    /// Fee paid to the block proposer, deducted before dispatch.
    pub fee: u64,
    /// Gas ceiling carried for forward compatibility; not metered yet.
    pub gas_limit: u64,
    /// Free-form parameters (e.g. `commission_rate` for CREATE_VALIDATOR).
    pub data: Map<String, Value>,
    /// Wall-clock creation time, seconds since the Unix epoch.
    pub timestamp: u64,
    /// Detached Ed25519 signature over the signable payload.
    pub signature: Signature,
}

impl Transaction {
    /// Builds an unsigned transaction with default gas limit and empty data.
    pub fn new(
        sender: Address,
        nonce: u64,
        tx_type: TxType,
        amount: u64,
        recipient: Option<Address>,
        fee: u64,
        timestamp: u64,
    ) -> Self {
        Transaction {
            sender,
            sender_pubkey: PublicKey::default(),
            nonce,
            tx_type,
            amount,
            recipient,
            fee,
            gas_limit: DEFAULT_GAS_LIMIT,
            data: Map::new(),
            timestamp,
            signature: Signature::empty(),
        }
    }

    /// Returns a copy with `key` set in the free-form data map.
    pub fn with_data(mut self, key: &str, value: Value) -> Self {
        self.data.insert(key.to_string(), value);
        self
    }

    /// Returns the signable payload: every field except `signature`.
    ///
    /// The payload is a canonical JSON value; object keys (including the
    /// nested `data` map) come out sorted, so the same logical transaction
    /// always produces the same bytes.
    pub fn payload(&self) -> Value {
        let mut value = crate::crypto::encoding::canonical_value(self);
        if let Value::Object(map) = &mut value {
            map.remove("signature");
        }
        value
    }

    /// Returns the transaction id: the hash of the signable payload.
    ///
    /// Because `sender_pubkey` is part of the payload, the txid of a signed
    /// transaction differs from the txid of its unsigned draft.
    pub fn txid(&self) -> Hash256 {
        hash_value(&self.payload())
    }

    /// Signs the transaction, filling in `sender_pubkey` and `signature`.
    pub fn sign(mut self, keypair: &KeyPair) -> Self {
        self.sender_pubkey = keypair.public_key();
        self.signature = keypair.sign_value(&self.payload());
        self
    }

    /// Verifies the signature against the embedded `sender_pubkey`.
    ///
    /// Unsigned transactions and transactions without a public key verify
    /// as `false`; callers additionally check that the key matches the
    /// claimed sender address.
    pub fn verify_signature(&self) -> bool {
        if self.signature.is_empty() || self.sender_pubkey.is_empty() {
            return false;
        }
        verify_value_signature(&self.sender_pubkey, &self.payload(), &self.signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signed_transfer(seed: &str, nonce: u64, amount: u64) -> (KeyPair, Transaction) {
        let kp = KeyPair::from_seed(seed);
        let recipient = KeyPair::from_seed("recipient").address();
        let tx = Transaction::new(
            kp.address(),
            nonce,
            TxType::Transfer,
            amount,
            Some(recipient),
            10,
            1_700_000_000,
        )
        .sign(&kp);
        (kp, tx)
    }

    #[test]
    fn payload_excludes_signature_only() {
        let (_, tx) = signed_transfer("alice", 0, 100);
        let payload = tx.payload();
        let obj = payload.as_object().expect("payload is an object");

        assert!(!obj.contains_key("signature"));
        for key in [
            "sender",
            "sender_pubkey",
            "nonce",
            "tx_type",
            "amount",
            "recipient",
            "fee",
            "gas_limit",
            "data",
            "timestamp",
        ] {
            assert!(obj.contains_key(key), "payload missing {key}");
        }
    }

    #[test]
    fn sign_then_verify_roundtrip() {
        let (_, tx) = signed_transfer("alice", 0, 100);
        assert!(tx.verify_signature());
    }

    #[test]
    fn unsigned_transaction_does_not_verify() {
        let kp = KeyPair::from_seed("alice");
        let tx = Transaction::new(
            kp.address(),
            0,
            TxType::Transfer,
            5,
            Some(kp.address()),
            1,
            0,
        );
        assert!(!tx.verify_signature());
    }

    #[test]
    fn tampering_invalidates_signature() {
        let (_, tx) = signed_transfer("alice", 0, 100);

        let mut bumped = tx.clone();
        bumped.amount = 1_000_000;
        assert!(!bumped.verify_signature());

        let mut renonced = tx.clone();
        renonced.nonce = 7;
        assert!(!renonced.verify_signature());
    }

    #[test]
    fn signature_is_bound_to_the_public_key() {
        let (_, tx) = signed_transfer("alice", 0, 100);

        // Swapping in a different key (rebinding) must break verification,
        // because the key is inside the signed payload.
        let mut rebound = tx.clone();
        rebound.sender_pubkey = KeyPair::from_seed("mallory").public_key();
        assert!(!rebound.verify_signature());
    }

    #[test]
    fn txid_commits_to_the_full_payload() {
        let (_, a) = signed_transfer("alice", 0, 100);
        let (_, b) = signed_transfer("alice", 0, 100);
        assert_eq!(a.txid(), b.txid());

        let (_, c) = signed_transfer("alice", 1, 100);
        assert_ne!(a.txid(), c.txid());
    }

    #[test]
    fn json_roundtrip_preserves_equality() {
        let (_, tx) = signed_transfer("alice", 3, 250);
        let json = serde_json::to_string(&tx).expect("transaction serializes");
        let back: Transaction = serde_json::from_str(&json).expect("transaction deserializes");
        assert_eq!(tx, back);
        assert_eq!(tx.txid(), back.txid());
        assert!(back.verify_signature());
    }

    #[test]
    fn tx_type_tags_are_snake_case() {
        assert_eq!(
            serde_json::to_string(&TxType::CreateValidator).unwrap(),
            "\"create_validator\""
        );
        assert_eq!(serde_json::to_string(&TxType::Transfer).unwrap(), "\"transfer\"");
        let t: TxType = serde_json::from_str("\"undelegate\"").unwrap();
        assert_eq!(t, TxType::Undelegate);
    }
}
