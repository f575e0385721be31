// src/main.rs
//
// Minimal validator node that wires up the chain library:
//
// - RocksDB-backed storage
// - genesis bootstrap (from GENESIS_FILE, or a single-validator devnet)
// - stake-weighted proposer selection + supermajority finality
// - Prometheus metrics exporter on /metrics
// - a proposal loop that assembles, signs, imports and votes on blocks.

use std::{
    path::PathBuf,
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use tracing::{error, info, warn};

use chain::{
    Blockchain, ChainConfig, ConsensusParams, Fraction, GenesisAccount, GenesisConfig,
    GenesisValidator, KeyPair, MetricsRegistry, RocksDbStore, Vote, run_prometheus_http_server,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "chain=info".to_string()),
        )
        .init();

    if let Err(err) = run_node().await {
        error!("fatal error: {err}");
        std::process::exit(1);
    }
}

async fn run_node() -> Result<(), String> {
    let mut cfg = ChainConfig::default();
    cfg.chain_id = std::env::var("CHAIN_ID").unwrap_or_else(|_| "ledger-devnet-1".to_string());
    if let Ok(dir) = std::env::var("CHAIN_DATA_DIR") {
        cfg.storage.path = dir;
    }

    // ---------------------------
    // Validator identity
    // ---------------------------

    // VALIDATOR_SEED derives a deterministic keypair; fine for devnets,
    // replace with a real key file for anything that matters.
    let seed = std::env::var("VALIDATOR_SEED").unwrap_or_else(|_| "demo-validator".to_string());
    let keypair = KeyPair::from_seed(&seed);
    info!(address = %keypair.address(), "validator identity loaded");

    // ---------------------------
    // Metrics registry + exporter
    // ---------------------------

    let metrics = Arc::new(
        MetricsRegistry::new().map_err(|e| format!("failed to initialise metrics registry: {e}"))?,
    );

    if cfg.metrics.enabled {
        let metrics_clone = metrics.clone();
        let addr = cfg.metrics.listen_addr;
        tokio::spawn(async move {
            if let Err(e) = run_prometheus_http_server(metrics_clone, addr).await {
                error!("metrics HTTP server error: {e}");
            }
        });
        info!("metrics exporter listening on http://{addr}/metrics");
    }

    // ---------------------------
    // Storage + chain driver
    // ---------------------------

    let store = RocksDbStore::open(&cfg.storage)
        .map_err(|e| format!("failed to open RocksDB store at {}: {e}", cfg.storage.path))?;

    let mut chain = Blockchain::open(cfg.consensus.clone(), cfg.slashing.clone(), store)
        .map_err(|e| format!("failed to open chain: {e}"))?;

    if chain.height().is_none() {
        let genesis = match std::env::var("GENESIS_FILE") {
            Ok(path) => GenesisConfig::load(&PathBuf::from(&path))
                .map_err(|e| format!("failed to load genesis file {path}: {e}"))?,
            Err(_) => devnet_genesis(&cfg.chain_id, &cfg.consensus, &keypair),
        };
        let hash = chain
            .init_genesis(&genesis)
            .map_err(|e| format!("failed to initialize genesis: {e}"))?;
        info!(chain_id = %genesis.chain_id, block = %hash, "chain bootstrapped from genesis");
    }

    info!(
        height = chain.height().unwrap_or(0),
        validators = chain.active_validators().len(),
        "node starting"
    );

    // ---------------------------
    // Main proposal loop
    // ---------------------------

    let block_interval = cfg.consensus.block_time_secs;
    loop {
        let timestamp = current_unix_timestamp();
        let start = std::time::Instant::now();

        match chain.next_proposer() {
            Some(proposer) if proposer == keypair.address() => {
                match chain.propose_block(&keypair, timestamp) {
                    Ok((hash, block)) => {
                        metrics
                            .chain
                            .block_apply_seconds
                            .observe(start.elapsed().as_secs_f64());
                        metrics
                            .chain
                            .transactions_applied_total
                            .inc_by(block.transactions.len() as u64);
                        info!(
                            height = block.height,
                            block = %hash,
                            txs = block.transactions.len(),
                            "proposed block"
                        );

                        // Vote for our own block so a single-validator
                        // devnet still finalizes.
                        let vote =
                            Vote::new(keypair.address(), block.height, hash, timestamp)
                                .sign(&keypair);
                        if let Err(e) = chain.submit_vote(vote) {
                            warn!("vote rejected: {e}");
                        }
                    }
                    Err(e) => {
                        metrics.chain.blocks_rejected_total.inc();
                        error!("failed to propose block: {e}");
                        if chain.is_halted() {
                            return Err("chain halted; operator intervention required".to_string());
                        }
                    }
                }
            }
            Some(other) => {
                // Someone else's slot; without networking there is nothing
                // to receive, so just report it.
                info!(proposer = %other, "waiting out a foreign proposal slot");
            }
            None => {
                // No proposer means no chain progress, ever; treat it as
                // fatal rather than spinning.
                error!("{}", chain::ChainError::Stalled);
                return Err(chain::ChainError::Stalled.to_string());
            }
        }

        if let Some(finalized) = chain.finality().finalized_height() {
            metrics.chain.finalized_height.set(finalized as i64);
        }
        metrics
            .chain
            .mempool_size
            .set(chain.pending_transactions() as i64);

        tokio::time::sleep(Duration::from_secs(block_interval)).await;
    }
}

/// Builds a single-validator genesis so a fresh devnet node can run alone.
fn devnet_genesis(chain_id: &str, params: &ConsensusParams, keypair: &KeyPair) -> GenesisConfig {
    let genesis_time = current_unix_timestamp();
    GenesisConfig {
        chain_id: chain_id.to_string(),
        genesis_time,
        allocations: vec![GenesisAccount {
            address: keypair.address(),
            balance: 1_000_000 * 100_000_000,
        }],
        validators: vec![GenesisValidator {
            address: keypair.address(),
            public_key: keypair.public_key(),
            stake: params.min_stake,
            commission_rate: Fraction::new(1, 10),
        }],
        params: params.clone(),
        slashing: Default::default(),
    }
}

/// Returns the current wall-clock time as seconds since Unix epoch.
///
/// On error (system clock before epoch) this falls back to 0.
fn current_unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_secs()
}
