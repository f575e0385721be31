//! Misbehavior detection and penalties.
//!
//! The slashing manager watches committed blocks and finality votes. It
//! keeps a short-term memory of `(validator, height) -> block_hash` signed
//! pairs to detect equivocation (two distinct hashes signed at one height)
//! and a sliding attendance window to detect validators that keep missing
//! their proposal slots. Detected misbehavior becomes an [`Evidence`]
//! record; penalties are requested through the ledger's public contract,
//! never applied behind its back.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ledger::Ledger;
use crate::types::{Address, Evidence, EvidenceKind, Fraction, Hash256, Vote};

/// Tuning for misbehavior detection and penalties.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SlashingParams {
    /// Stake fraction burned on a double sign.
    pub double_sign_fraction: Fraction,
    /// Jail term (in blocks) for a double sign.
    pub double_sign_jail_blocks: u64,
    /// Stake fraction burned for excessive missed blocks.
    pub miss_fraction: Fraction,
    /// Jail term (in blocks) for excessive missed blocks.
    pub miss_jail_blocks: u64,
    /// Width of the attendance window, in heights.
    pub miss_window: u64,
    /// Miss ratio over the window that triggers evidence.
    pub miss_threshold: Fraction,
    /// Minimum observations of a validator before the ratio is judged.
    pub miss_min_observations: u64,
}

impl Default for SlashingParams {
    fn default() -> Self {
        SlashingParams {
            double_sign_fraction: Fraction::new(1, 20),
            double_sign_jail_blocks: 10_000,
            miss_fraction: Fraction::new(1, 100),
            miss_jail_blocks: 1_000,
            miss_window: 100,
            miss_threshold: Fraction::new(1, 2),
            miss_min_observations: 10,
        }
    }
}

/// One attendance observation: was the expected proposer the actual one?
#[derive(Clone, Copy, Debug)]
struct Attendance {
    height: u64,
    validator: Address,
    missed: bool,
}

/// Watches block and vote observations and produces evidence.
#[derive(Clone, Debug)]
pub struct SlashingManager {
    params: SlashingParams,
    /// Short-term memory of signed `(validator, height)` pairs.
    signed_at: BTreeMap<(Address, u64), Hash256>,
    /// Sliding window of proposer attendance.
    attendance: VecDeque<Attendance>,
    /// Every evidence record produced so far.
    evidence: Vec<Evidence>,
}

impl SlashingManager {
    /// Creates a manager with the given parameters.
    pub fn new(params: SlashingParams) -> Self {
        SlashingManager {
            params,
            signed_at: BTreeMap::new(),
            attendance: VecDeque::new(),
            evidence: Vec::new(),
        }
    }

    /// Returns the parameters in force.
    pub fn params(&self) -> &SlashingParams {
        &self.params
    }

    /// All evidence produced so far, oldest first.
    pub fn evidence(&self) -> &[Evidence] {
        &self.evidence
    }

    /// Records externally produced evidence.
    pub fn submit_evidence(&mut self, evidence: Evidence) {
        self.evidence.push(evidence);
    }

    /// Observes a committed block.
    ///
    /// Checks the proposer's signed pair for equivocation, records the
    /// attendance of the expected proposer, and returns any evidence
    /// produced at this height.
    pub fn observe_block(
        &mut self,
        height: u64,
        block_hash: Hash256,
        proposer: Address,
        expected: Option<Address>,
        timestamp: u64,
    ) -> Vec<Evidence> {
        let mut produced = Vec::new();

        if let Some(ev) = self.note_signed_pair(proposer, height, block_hash, timestamp) {
            produced.push(ev);
        }

        if let Some(expected) = expected {
            let missed = expected != proposer;
            self.attendance.push_back(Attendance {
                height,
                validator: expected,
                missed,
            });
            self.prune(height);

            if missed {
                if let Some(ev) = self.check_miss_ratio(expected, height, timestamp) {
                    produced.push(ev);
                }
            }
        }

        self.evidence.extend(produced.iter().cloned());
        produced
    }

    /// Observes a finality vote; a vote conflicting with any other signed
    /// pair at the same height is equivocation.
    pub fn observe_vote(&mut self, vote: &Vote) -> Option<Evidence> {
        let ev = self.note_signed_pair(vote.validator, vote.height, vote.block_hash, vote.timestamp);
        if let Some(ev) = &ev {
            self.evidence.push(ev.clone());
        }
        ev
    }

    /// Applies the penalty for an evidence record through the ledger.
    ///
    /// Returns the amount burned.
    pub fn apply_penalty(
        &self,
        ledger: &mut Ledger,
        evidence: &Evidence,
        current_height: u64,
    ) -> u64 {
        let (fraction, jail_blocks, reason) = match evidence.kind {
            EvidenceKind::DoubleSign => (
                self.params.double_sign_fraction,
                self.params.double_sign_jail_blocks,
                "double sign",
            ),
            EvidenceKind::MissedBlocks => (
                self.params.miss_fraction,
                self.params.miss_jail_blocks,
                "missed blocks",
            ),
        };

        let burned = ledger.slash_validator(&evidence.validator, fraction, reason);
        ledger.jail_validator(&evidence.validator, current_height + jail_blocks);
        burned
    }

    fn note_signed_pair(
        &mut self,
        validator: Address,
        height: u64,
        block_hash: Hash256,
        timestamp: u64,
    ) -> Option<Evidence> {
        match self.signed_at.get(&(validator, height)) {
            Some(first) if *first != block_hash => {
                tracing::warn!(
                    validator = %validator,
                    height,
                    "equivocation: two distinct hashes signed at one height"
                );
                let mut data = Map::new();
                data.insert("first_hash".to_string(), Value::String(first.to_hex()));
                data.insert(
                    "second_hash".to_string(),
                    Value::String(block_hash.to_hex()),
                );
                Some(Evidence {
                    kind: EvidenceKind::DoubleSign,
                    validator,
                    height,
                    timestamp,
                    data,
                })
            }
            Some(_) => None,
            None => {
                self.signed_at.insert((validator, height), block_hash);
                None
            }
        }
    }

    fn check_miss_ratio(
        &mut self,
        validator: Address,
        height: u64,
        timestamp: u64,
    ) -> Option<Evidence> {
        let (observations, misses) = self
            .attendance
            .iter()
            .filter(|a| a.validator == validator)
            .fold((0u64, 0u64), |(obs, miss), a| {
                (obs + 1, miss + u64::from(a.missed))
            });

        if observations < self.params.miss_min_observations {
            return None;
        }
        if !self.params.miss_threshold.reached_by(misses, observations) {
            return None;
        }

        tracing::warn!(
            validator = %validator,
            misses,
            observations,
            "miss ratio over threshold"
        );

        // Reset the validator's window so one offense yields one evidence.
        self.attendance.retain(|a| a.validator != validator);

        let mut data = Map::new();
        data.insert("misses".to_string(), Value::from(misses));
        data.insert("observations".to_string(), Value::from(observations));
        Some(Evidence {
            kind: EvidenceKind::MissedBlocks,
            validator,
            height,
            timestamp,
            data,
        })
    }

    fn prune(&mut self, current_height: u64) {
        let cutoff = current_height.saturating_sub(self.params.miss_window);
        while matches!(self.attendance.front(), Some(a) if a.height < cutoff) {
            self.attendance.pop_front();
        }
        // The equivocation memory shares the window: pairs older than the
        // window can no longer conflict with live observations.
        self.signed_at.retain(|(_, h), _| *h >= cutoff);
    }
}
