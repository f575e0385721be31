//! Merkle root over an ordered sequence of digests.
//!
//! Blocks commit to their transaction list through the merkle root of the
//! transaction ids, in order. The combination rule concatenates the
//! lowercase hex representations of the two children and hashes the UTF-8
//! bytes of that string with SHA3-256; this basis (hex, not raw bytes) is
//! part of the wire contract and must not change.

use super::encoding::{hash_value, sha3_256};
use crate::types::Hash256;

/// Computes the merkle root of an ordered sequence of digests.
///
/// - empty sequence: the hash of the canonical string `"EMPTY_BLOCK"`;
/// - single leaf: that leaf, unchanged;
/// - otherwise: adjacent pairs are combined level by level, duplicating the
///   last entry whenever a level has an odd number of nodes.
pub fn merkle_root(leaves: &[Hash256]) -> Hash256 {
    if leaves.is_empty() {
        return hash_value(&"EMPTY_BLOCK");
    }

    let mut level: Vec<Hash256> = leaves.to_vec();
    while level.len() > 1 {
        if level.len() % 2 == 1 {
            // Odd level: the last node pairs with itself.
            let last = *level
                .last()
                .expect("level is non-empty inside the reduction loop");
            level.push(last);
        }

        level = level
            .chunks(2)
            .map(|pair| {
                let combined = format!("{}{}", pair[0].to_hex(), pair[1].to_hex());
                sha3_256(combined.as_bytes())
            })
            .collect();
    }

    level[0]
}
