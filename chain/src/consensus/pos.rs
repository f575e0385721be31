//! Stake-weighted proposer selection.
//!
//! The selector keeps its own registry of eligible validators and picks the
//! proposer for each height deterministically: every active validator gets
//! `max(1, total_stake / min_stake)` slots in a rotation ordered by address,
//! and the slot index comes from the SHA3-256 digest of `"{height}{seed}"`
//! reduced modulo the total weight. Two nodes with the same registry, height
//! and seed always select the same proposer.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::crypto::encoding::sha3_256;
use crate::types::{Address, Fraction, Hash256, ValidatorInfo};

/// Selector-local view of one validator.
///
/// The selector tracks proposal bookkeeping (`total_blocks`,
/// `last_block_time`) that is not part of ledger state; stake and activity
/// are refreshed from the ledger after every committed block.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ValidatorEntry {
    pub address: Address,
    /// Total stake (self + delegated) used for weighting.
    pub stake: u64,
    pub commission: Fraction,
    pub active: bool,
    /// Number of blocks this validator has proposed.
    pub total_blocks: u64,
    /// Timestamp of the last block this validator proposed.
    pub last_block_time: u64,
}

/// Deterministic stake-weighted proposer selector.
#[derive(Clone, Debug)]
pub struct ProposerSelector {
    min_stake: u64,
    validators: BTreeMap<Address, ValidatorEntry>,
}

impl ProposerSelector {
    /// Creates a selector with the given minimum stake.
    pub fn new(min_stake: u64) -> Self {
        ProposerSelector {
            min_stake: min_stake.max(1),
            validators: BTreeMap::new(),
        }
    }

    /// Registers a validator; rejected when below the minimum stake.
    pub fn add_validator(&mut self, address: Address, stake: u64, commission: Fraction) -> bool {
        if stake < self.min_stake {
            return false;
        }
        self.validators.insert(
            address,
            ValidatorEntry {
                address,
                stake,
                commission,
                active: true,
                total_blocks: 0,
                last_block_time: 0,
            },
        );
        true
    }

    /// Refreshes stakes and activity from the ledger's validator registry.
    ///
    /// Entries keep their proposal bookkeeping across refreshes; validators
    /// that disappeared from the active set are dropped.
    pub fn sync_validators(&mut self, active: &[ValidatorInfo]) {
        let mut next = BTreeMap::new();
        for info in active {
            let (total_blocks, last_block_time) = self
                .validators
                .get(&info.address)
                .map(|e| (e.total_blocks, e.last_block_time))
                .unwrap_or((0, 0));
            next.insert(
                info.address,
                ValidatorEntry {
                    address: info.address,
                    stake: info.total_stake(),
                    commission: info.commission_rate,
                    active: true,
                    total_blocks,
                    last_block_time,
                },
            );
        }
        self.validators = next;
    }

    /// Returns the registered entry for an address.
    pub fn validator(&self, address: &Address) -> Option<&ValidatorEntry> {
        self.validators.get(address)
    }

    /// Returns all active entries in address order.
    pub fn active_validators(&self) -> Vec<&ValidatorEntry> {
        self.validators.values().filter(|v| v.active).collect()
    }

    /// Selects the proposer for a height.
    ///
    /// Returns `None` when no active validator exists; the driver treats
    /// that as a stalled chain. The choice is reproducible bit-for-bit from
    /// `(registry, height, seed)`.
    pub fn select_proposer(&self, height: u64, seed: &str) -> Option<Address> {
        let weights: Vec<(Address, u64)> = self
            .validators
            .values()
            .filter(|v| v.active && v.stake >= self.min_stake)
            .map(|v| (v.address, (v.stake / self.min_stake).max(1)))
            .collect();

        let total_weight: u64 = weights.iter().map(|(_, w)| w).sum();
        if total_weight == 0 {
            return None;
        }

        let digest = sha3_256(format!("{height}{seed}").as_bytes());
        let mut slot = digest_mod(&digest, total_weight);

        // Prefix-sum walk over the address-ordered weight table; equivalent
        // to indexing the materialized rotation list.
        for (address, weight) in weights {
            if slot < weight {
                return Some(address);
            }
            slot -= weight;
        }
        None
    }

    /// Records that a validator produced a block.
    pub fn record_block(&mut self, address: &Address, timestamp: u64) {
        if let Some(entry) = self.validators.get_mut(address) {
            entry.total_blocks += 1;
            entry.last_block_time = timestamp;
        }
    }
}

/// Reduces a 256-bit digest modulo `modulus`, byte by byte.
fn digest_mod(digest: &Hash256, modulus: u64) -> u64 {
    let m = modulus as u128;
    let mut rem: u128 = 0;
    for byte in digest.as_bytes() {
        rem = ((rem << 8) | *byte as u128) % m;
    }
    rem as u64
}
