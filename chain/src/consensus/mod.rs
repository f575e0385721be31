//! Consensus kernel and related abstractions.
//!
//! This module provides a modular, testable consensus layer consisting of:
//!
//! - protocol parameters ([`config::ConsensusParams`]),
//! - the stake-weighted proposer selector ([`pos::ProposerSelector`]),
//! - the supermajority finality tracker ([`finality::FinalityTracker`]),
//! - misbehavior detection and penalties ([`slashing::SlashingManager`]),
//! - the mempool ([`mempool::Mempool`]),
//! - the storage seam ([`store::ChainStore`]), and
//! - the chain driver tying them together ([`engine::Blockchain`]).

pub mod config;
pub mod engine;
pub mod error;
pub mod finality;
pub mod mempool;
pub mod pos;
pub mod slashing;
pub mod store;

pub use config::ConsensusParams;
pub use engine::Blockchain;
pub use error::ChainError;
pub use finality::FinalityTracker;
pub use mempool::Mempool;
pub use pos::ProposerSelector;
pub use slashing::{SlashingManager, SlashingParams};
pub use store::{ChainMetadata, ChainStore, StorageError};
