//! Chain library crate.
//!
//! This crate provides the core building blocks of a stake-weighted
//! replicated ledger:
//!
//! - strongly-typed domain types (`types`),
//! - canonical encoding, hashing and signatures (`crypto`),
//! - the deterministic account/validator state machine (`ledger`),
//! - the consensus kernel: proposer selection, finality, slashing and the
//!   chain driver (`consensus`),
//! - storage backends (`storage`),
//! - Prometheus-based metrics (`metrics`),
//! - and a top-level node configuration (`config`).
//!
//! Higher-level binaries can compose these pieces to build validator
//! nodes, simulators, and experiment harnesses.

pub mod config;
pub mod consensus;
pub mod crypto;
pub mod ledger;
pub mod metrics;
pub mod storage;
pub mod types;

// Re-export top-level configuration types.
pub use config::{ChainConfig, GenesisAccount, GenesisConfig, GenesisValidator, MetricsConfig};

// Re-export "core" consensus types.
pub use consensus::{
    Blockchain, ChainError, ChainMetadata, ChainStore, ConsensusParams, FinalityTracker, Mempool,
    ProposerSelector, SlashingManager, SlashingParams, StorageError,
};

// Re-export crypto primitives.
pub use crypto::{KeyPair, hash_value, merkle_root, verify_signature, verify_value_signature};

// Re-export the ledger state machine.
pub use ledger::{Account, Ledger, LedgerParams, LedgerSnapshot, TxError};

// Re-export storage backends.
pub use storage::{InMemoryStore, RocksDbConfig, RocksDbStore};

// Re-export metrics registry and exporter.
pub use metrics::{ChainMetrics, MetricsRegistry, run_prometheus_http_server};

// Re-export domain types at the crate root for convenience.
pub use types::*;

/// Type alias for the default persistent store backend.
pub type DefaultStore = RocksDbStore;

/// Type alias for the default chain driver stack.
///
/// This uses [`DefaultStore`] (RocksDB); tests typically instantiate
/// `Blockchain<InMemoryStore>` instead.
pub type DefaultBlockchain = Blockchain<DefaultStore>;
