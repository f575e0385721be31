use serde::{Deserialize, Serialize};

use crate::ledger::LedgerParams;
use crate::types::Fraction;

/// Protocol-level consensus parameters.
///
/// These are chain-wide constants fixed at genesis: staking thresholds, the
/// unbonding window, finality tuning, the block reward, and block assembly
/// limits. The hash of this struct is committed into every block header as
/// the `consensus_hash`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConsensusParams {
    /// Target block time in seconds for the proposal loop.
    pub block_time_secs: u64,
    /// Maximum transactions drained into one block.
    pub max_txs_per_block: usize,
    /// Minimum total stake for a validator to be active and selectable.
    pub min_stake: u64,
    /// Stake amounts must be multiples of this unit.
    pub stake_unit: u64,
    /// Heights between an UNSTAKE/UNDELEGATE and the release of the funds.
    pub unbond_blocks: u64,
    /// Blocks must be at least this far below the tip to finalize.
    pub finality_depth: u64,
    /// Stake fraction required to finalize a block.
    pub supermajority_threshold: Fraction,
    /// Protocol reward minted to the proposer of each block.
    pub block_reward: u64,
}

impl Default for ConsensusParams {
    fn default() -> Self {
        ConsensusParams {
            block_time_secs: 6,
            max_txs_per_block: 100,
            min_stake: 100_000 * 100_000_000,
            stake_unit: 1,
            unbond_blocks: 1_814_400,
            finality_depth: 10,
            supermajority_threshold: Fraction::new(2, 3),
            block_reward: 50 * 100_000_000,
        }
    }
}

impl ConsensusParams {
    /// Projects out the parameters the ledger needs at apply time.
    pub fn ledger_params(&self) -> LedgerParams {
        LedgerParams {
            stake_unit: self.stake_unit,
            unbond_blocks: self.unbond_blocks,
        }
    }
}
