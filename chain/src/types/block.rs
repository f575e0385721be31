// chain/src/types/block.rs

//! Block types and hashing.
//!
//! A block bundles an ordered list of transactions with the consensus
//! header fields that link it into the chain. The signable header is a
//! projection of the block: every field except `transactions`, `signature`
//! and `hash`, plus the derived `tx_count` and `tx_merkle_root`. The block
//! hash is computed over the header *including* the proposer signature, so
//! the hash commits to the signed block and every reader recomputes it the
//! same way.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::crypto::encoding::{canonical_value, hash_value};
use crate::crypto::keys::KeyPair;
use crate::crypto::merkle::merkle_root;
use crate::crypto::verify_value_signature;

use super::{Address, Hash256, PublicKey, Signature, Transaction};

/// A chain block.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Height of this block; genesis is height 0.
    pub height: u64,
    /// Hash of the parent block; all zeros at genesis.
    pub prev_hash: Hash256,
    /// Wall-clock timestamp, seconds since the Unix epoch.
    pub timestamp: u64,
    /// Address of the proposing validator.
    pub proposer: Address,
    /// Proposer's Ed25519 public key; filled in by [`Block::sign`].
    pub proposer_pubkey: PublicKey,
    /// Ordered transaction list; application order is list order.
    pub transactions: Vec<Transaction>,
    /// State root of the ledger after applying this block.
    pub state_root: Hash256,
    /// Hash of the active validator set before this block.
    pub validator_set_hash: Hash256,
    /// Hash of the active validator set after this block.
    pub next_validator_set_hash: Hash256,
    /// Hash of the consensus parameters in force.
    pub consensus_hash: Hash256,
    /// Application state commitment; equals `state_root` in this chain.
    pub app_hash: Hash256,
    /// Sum of the fees of all included transactions.
    pub total_fees: u64,
    /// Protocol reward minted to the proposer.
    pub block_reward: u64,
    /// Proposer signature over the header projection.
    pub signature: Signature,
    /// Hash of (header + signature); set by [`Block::sign`].
    pub hash: Hash256,
}

impl Block {
    /// Builds an unsigned block with zeroed commitment fields.
    ///
    /// The driver fills in the state and validator-set commitments before
    /// signing.
    pub fn new(
        height: u64,
        prev_hash: Hash256,
        timestamp: u64,
        proposer: Address,
        transactions: Vec<Transaction>,
    ) -> Self {
        Block {
            height,
            prev_hash,
            timestamp,
            proposer,
            proposer_pubkey: PublicKey::default(),
            transactions,
            state_root: Hash256::zero(),
            validator_set_hash: Hash256::zero(),
            next_validator_set_hash: Hash256::zero(),
            consensus_hash: Hash256::zero(),
            app_hash: Hash256::zero(),
            total_fees: 0,
            block_reward: 0,
            signature: Signature::empty(),
            hash: Hash256::zero(),
        }
    }

    /// Computes the merkle root of the transaction ids, in list order.
    pub fn tx_merkle_root(&self) -> Hash256 {
        let txids: Vec<Hash256> = self.transactions.iter().map(|tx| tx.txid()).collect();
        merkle_root(&txids)
    }

    /// Returns the signable header projection.
    ///
    /// Every block field except `transactions`, `signature` and `hash`,
    /// plus the derived `tx_count` and `tx_merkle_root`. The transaction
    /// list itself stays out of the header; it is committed through the
    /// merkle root.
    pub fn header(&self) -> Value {
        let mut value = canonical_value(self);
        if let Value::Object(map) = &mut value {
            map.remove("transactions");
            map.remove("signature");
            map.remove("hash");
            map.insert(
                "tx_count".to_string(),
                Value::from(self.transactions.len() as u64),
            );
            map.insert(
                "tx_merkle_root".to_string(),
                Value::String(self.tx_merkle_root().to_hex()),
            );
        }
        value
    }

    /// Computes the block hash: the hash of the header plus the signature.
    ///
    /// The signature is deliberately inside the hashed material, so the
    /// hash identifies one specific signed block; every reader must use
    /// this same construction.
    pub fn compute_hash(&self) -> Hash256 {
        let mut header = self.header();
        if let Value::Object(map) = &mut header {
            map.insert(
                "signature".to_string(),
                Value::String(self.signature.to_hex()),
            );
        }
        hash_value(&header)
    }

    /// Signs the block with the proposer's keypair and seals the hash.
    pub fn sign(mut self, keypair: &KeyPair) -> Self {
        self.proposer_pubkey = keypair.public_key();
        self.signature = keypair.sign_value(&self.header());
        self.hash = self.compute_hash();
        self
    }

    /// Verifies the proposer signature against the embedded public key.
    pub fn verify_signature(&self) -> bool {
        if self.signature.is_empty() || self.proposer_pubkey.is_empty() {
            return false;
        }
        verify_value_signature(&self.proposer_pubkey, &self.header(), &self.signature)
    }
}
