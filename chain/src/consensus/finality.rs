//! Supermajority finality tracking.
//!
//! Validators vote on block hashes; once a block is deep enough below the
//! tip and the voted stake reaches the supermajority threshold, the block is
//! finalized. Finalization is permanent: `latest_finalized_height` never
//! decreases, a finalized `height -> hash` mapping is never rewritten, and
//! any fork at or below the finalized height is refused.

use std::collections::BTreeMap;

use crate::types::{Address, Fraction, Hash256, Vote};

/// Tracks votes and finalized blocks.
#[derive(Clone, Debug)]
pub struct FinalityTracker {
    /// Pending votes per block hash, keyed by voting validator.
    votes_by_block: BTreeMap<Hash256, BTreeMap<Address, Vote>>,
    /// Finalized blocks, `height -> hash`; entries are immutable once set.
    finalized_blocks: BTreeMap<u64, Hash256>,
    latest_finalized_height: Option<u64>,
    /// Blocks must be at least this far below the tip to finalize.
    finality_depth: u64,
    /// Stake fraction required for finalization.
    supermajority: Fraction,
}

impl FinalityTracker {
    /// Creates a tracker with the given depth and threshold.
    pub fn new(finality_depth: u64, supermajority: Fraction) -> Self {
        FinalityTracker {
            votes_by_block: BTreeMap::new(),
            finalized_blocks: BTreeMap::new(),
            latest_finalized_height: None,
            finality_depth,
            supermajority,
        }
    }

    /// Adds a finality vote.
    ///
    /// Idempotent with respect to `(block_hash, validator)`: a second vote
    /// from the same validator for the same hash is rejected. Votes from
    /// validators with no stake in the given set are also rejected.
    pub fn add_vote(&mut self, vote: Vote, stakes: &BTreeMap<Address, u64>) -> bool {
        if stakes.get(&vote.validator).copied().unwrap_or(0) == 0 {
            tracing::debug!(validator = %vote.validator, "vote from unstaked validator dropped");
            return false;
        }

        let votes = self.votes_by_block.entry(vote.block_hash).or_default();
        if votes.contains_key(&vote.validator) {
            tracing::debug!(
                validator = %vote.validator,
                block = %vote.block_hash,
                "duplicate vote dropped"
            );
            return false;
        }

        tracing::info!(
            validator = %vote.validator,
            block = %vote.block_hash,
            height = vote.height,
            "finality vote added"
        );
        votes.insert(vote.validator, vote);
        true
    }

    /// Returns `true` iff the voted stake for a block meets the threshold.
    pub fn has_supermajority(&self, block_hash: &Hash256, stakes: &BTreeMap<Address, u64>) -> bool {
        let Some(votes) = self.votes_by_block.get(block_hash) else {
            return false;
        };
        let voted: u64 = votes
            .keys()
            .map(|v| stakes.get(v).copied().unwrap_or(0))
            .sum();
        let total: u64 = stakes.values().sum();
        self.supermajority.reached_by(voted, total)
    }

    /// Attempts to finalize a block.
    ///
    /// Requires: no block already finalized at that height, the block at
    /// least `finality_depth` below `current_height`, and a supermajority of
    /// voted stake. On success the mapping is recorded, the finalized height
    /// advances monotonically, and the pending votes for the hash are
    /// dropped.
    pub fn try_finalize_block(
        &mut self,
        block_hash: &Hash256,
        block_height: u64,
        current_height: u64,
        stakes: &BTreeMap<Address, u64>,
    ) -> bool {
        if self.finalized_blocks.contains_key(&block_height) {
            return false;
        }

        if current_height < block_height
            || current_height - block_height < self.finality_depth
        {
            tracing::debug!(
                height = block_height,
                current = current_height,
                depth = self.finality_depth,
                "block not deep enough to finalize"
            );
            return false;
        }

        if !self.has_supermajority(block_hash, stakes) {
            return false;
        }

        self.finalized_blocks.insert(block_height, *block_hash);
        self.latest_finalized_height = Some(
            self.latest_finalized_height
                .map_or(block_height, |h| h.max(block_height)),
        );
        self.votes_by_block.remove(block_hash);

        tracing::info!(height = block_height, block = %block_hash, "block finalized");
        true
    }

    /// Returns `true` iff exactly this hash is finalized at this height.
    pub fn is_block_final(&self, block_hash: &Hash256, block_height: u64) -> bool {
        self.finalized_blocks.get(&block_height) == Some(block_hash)
    }

    /// Returns the finalized hash at a height, if any.
    pub fn finalized_block(&self, height: u64) -> Option<Hash256> {
        self.finalized_blocks.get(&height).copied()
    }

    /// Latest finalized height; `None` before the first finalization.
    pub fn finalized_height(&self) -> Option<u64> {
        self.latest_finalized_height
    }

    /// Whether the chain may reorganize to a fork at `fork_height`.
    ///
    /// Reorgs at or below the finalized height are protocol violations.
    pub fn can_reorg_to(&self, fork_height: u64) -> bool {
        self.latest_finalized_height
            .map_or(true, |latest| fork_height > latest)
    }

    /// Number of pending votes for a block hash.
    pub fn vote_count(&self, block_hash: &Hash256) -> usize {
        self.votes_by_block
            .get(block_hash)
            .map(|v| v.len())
            .unwrap_or(0)
    }

    /// Returns `(voted_stake, total_stake)` for a block hash.
    pub fn voting_power(
        &self,
        block_hash: &Hash256,
        stakes: &BTreeMap<Address, u64>,
    ) -> (u64, u64) {
        let total: u64 = stakes.values().sum();
        let voted = self
            .votes_by_block
            .get(block_hash)
            .map(|votes| {
                votes
                    .keys()
                    .map(|v| stakes.get(v).copied().unwrap_or(0))
                    .sum()
            })
            .unwrap_or(0);
        (voted, total)
    }
}
