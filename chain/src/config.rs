//! Top-level configuration for a chain node.
//!
//! This module aggregates configuration for:
//!
//! - consensus parameters (`ConsensusParams`) and slashing tuning,
//! - storage (RocksDB path and creation flags),
//! - the metrics exporter (enable flag + listen address),
//!
//! plus the genesis file format that seeds a fresh chain. The goal is a
//! single `ChainConfig` struct that the node binary can construct from
//! defaults, a config file, or environment variables as needed.

use std::net::SocketAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::consensus::{ConsensusParams, SlashingParams};
use crate::storage::RocksDbConfig;
use crate::types::{Address, Fraction, PublicKey};

/// Configuration for the Prometheus metrics exporter.
#[derive(Clone, Debug)]
pub struct MetricsConfig {
    /// Whether to run a `/metrics` HTTP exporter.
    pub enabled: bool,
    /// Address to bind the metrics HTTP server to.
    pub listen_addr: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        // Safe to unwrap: this is a fixed, valid address literal.
        let addr: SocketAddr = "127.0.0.1:9898"
            .parse()
            .expect("hard-coded metrics listen address should parse");
        MetricsConfig {
            enabled: true,
            listen_addr: addr,
        }
    }
}

/// Top-level configuration for a chain node.
#[derive(Clone, Debug, Default)]
pub struct ChainConfig {
    /// Human-readable chain identifier (e.g. `"ledger-mainnet-1"`).
    pub chain_id: String,
    pub consensus: ConsensusParams,
    pub slashing: SlashingParams,
    pub storage: RocksDbConfig,
    pub metrics: MetricsConfig,
}

/// One genesis balance allocation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenesisAccount {
    pub address: Address,
    pub balance: u64,
}

/// One genesis validator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenesisValidator {
    pub address: Address,
    pub public_key: PublicKey,
    pub stake: u64,
    pub commission_rate: Fraction,
}

/// The genesis file: everything needed to seed block 0.
///
/// Loaded from JSON; the consensus and slashing parameters recorded here are
/// chain-wide constants for the life of the chain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenesisConfig {
    pub chain_id: String,
    /// Genesis wall-clock time, seconds since the Unix epoch.
    pub genesis_time: u64,
    /// Initial balance allocations.
    pub allocations: Vec<GenesisAccount>,
    /// Initial validator set; stakes here are minted, not debited.
    pub validators: Vec<GenesisValidator>,
    pub params: ConsensusParams,
    pub slashing: SlashingParams,
}

impl GenesisConfig {
    /// Builds a minimal local devnet genesis with no allocations.
    pub fn devnet(chain_id: &str, genesis_time: u64) -> Self {
        GenesisConfig {
            chain_id: chain_id.to_string(),
            genesis_time,
            allocations: Vec::new(),
            validators: Vec::new(),
            params: ConsensusParams::default(),
            slashing: SlashingParams::default(),
        }
    }

    /// Loads a genesis file from disk.
    pub fn load(path: &Path) -> Result<Self, std::io::Error> {
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}
