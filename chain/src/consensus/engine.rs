//! Chain driver: the one place every component meets.
//!
//! The driver wires together:
//!
//! - the [`Ledger`] state machine it exclusively owns,
//! - a [`ChainStore`] for persistence,
//! - the [`ProposerSelector`] for stake-weighted leadership,
//! - the [`FinalityTracker`] for supermajority finalization, and
//! - the [`SlashingManager`] for misbehavior detection.
//!
//! It exposes mempool admission, block assembly, the validation pipeline and
//! the commit protocol. Blocks apply against a scratch clone of the ledger;
//! a block either commits in full (block, state, metadata, in that order) or
//! leaves no trace. A finality violation halts the driver permanently until
//! an operator intervenes.

use crate::crypto::encoding::hash_value;
use crate::crypto::keys::{KeyPair, address_from_public_key};
use crate::ledger::Ledger;
use crate::types::{Address, Block, Hash256, Transaction, ValidatorInfo, Vote};

use super::config::ConsensusParams;
use super::error::ChainError;
use super::finality::FinalityTracker;
use super::mempool::Mempool;
use super::pos::ProposerSelector;
use super::slashing::{SlashingManager, SlashingParams};
use super::store::{ChainMetadata, ChainStore};
use crate::config::GenesisConfig;

/// The chain driver.
///
/// Generic over the storage backend `S`, so tests run against the in-memory
/// store and nodes against RocksDB.
pub struct Blockchain<S: ChainStore> {
    params: ConsensusParams,
    store: S,
    ledger: Ledger,
    selector: ProposerSelector,
    finality: FinalityTracker,
    slashing: SlashingManager,
    mempool: Mempool,
    latest: Option<Block>,
    genesis_time: Option<u64>,
    halted: bool,
}

impl<S: ChainStore> Blockchain<S> {
    /// Opens a chain on top of a store, recovering persisted state.
    ///
    /// A fresh store yields an uninitialized chain awaiting
    /// [`Blockchain::init_genesis`]. If a crash left a block persisted
    /// beyond the metadata height (the commit marker is written last), that
    /// block is replayed against the loaded state.
    pub fn open(
        params: ConsensusParams,
        slashing_params: SlashingParams,
        store: S,
    ) -> Result<Self, ChainError> {
        let mut chain = Blockchain {
            ledger: Ledger::new(params.ledger_params()),
            selector: ProposerSelector::new(params.min_stake),
            finality: FinalityTracker::new(params.finality_depth, params.supermajority_threshold),
            slashing: SlashingManager::new(slashing_params),
            mempool: Mempool::new(),
            latest: None,
            genesis_time: None,
            halted: false,
            params,
            store,
        };

        let Some(metadata) = chain.store.load_metadata()? else {
            return Ok(chain);
        };

        let snapshot = chain
            .store
            .load_state()?
            .ok_or(super::store::StorageError::CorruptedMeta(
                "metadata present but state missing",
            ))?;
        chain.ledger = Ledger::from_snapshot(snapshot, chain.params.ledger_params());
        chain.latest = Some(
            chain
                .store
                .load_block(metadata.height)?
                .ok_or(super::store::StorageError::CorruptedMeta(
                    "metadata present but latest block missing",
                ))?,
        );
        chain.genesis_time = metadata.genesis_time;
        chain.sync_selector();

        // Torn commit: a block persisted past the metadata height was never
        // fully committed. Depending on where the crash hit, the state slot
        // may or may not already include that block.
        if let Some(orphan) = chain.store.load_block(metadata.height + 1)? {
            if !orphan.state_root.is_zero() && chain.ledger.state_root() == orphan.state_root {
                // Crash fell between save_state and save_metadata: the state
                // is already applied, only the commit marker is stale.
                tracing::warn!(height = orphan.height, "repairing stale commit marker");
                chain.store.save_metadata(&ChainMetadata {
                    height: orphan.height,
                    latest_hash: orphan.hash,
                    genesis_time: chain.genesis_time,
                })?;
                chain.latest = Some(orphan);
                chain.sync_selector();
            } else {
                tracing::warn!(
                    height = orphan.height,
                    "replaying block persisted beyond the commit marker"
                );
                chain.add_block(orphan)?;
            }
        }

        Ok(chain)
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns a mutable reference to the underlying store.
    ///
    /// This is mainly useful for tests and tooling (e.g. checkpoints);
    /// consensus writes should go through [`Blockchain::add_block`].
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Seeds an empty chain from a genesis configuration.
    ///
    /// Credits the initial allocations, installs the initial validator set,
    /// and persists an unsigned genesis block at height 0 with a zero parent
    /// hash. Returns the genesis block hash.
    pub fn init_genesis(&mut self, genesis: &GenesisConfig) -> Result<Hash256, ChainError> {
        if self.latest.is_some() {
            return Err(ChainError::Validation(
                "chain is already initialized".to_string(),
            ));
        }

        for allocation in &genesis.allocations {
            self.ledger.credit(allocation.address, allocation.balance);
        }
        for validator in &genesis.validators {
            self.ledger.register_validator(ValidatorInfo::new(
                validator.address,
                validator.public_key.clone(),
                validator.stake,
                validator.commission_rate,
                genesis.genesis_time,
            ));
        }

        let mut block = Block::new(
            0,
            Hash256::zero(),
            genesis.genesis_time,
            Address([0u8; crate::types::ADDRESS_LEN]),
            Vec::new(),
        );
        block.state_root = self.ledger.state_root();
        block.app_hash = block.state_root;
        block.validator_set_hash = self.validator_set_hash(&self.ledger, 0);
        block.next_validator_set_hash = self.validator_set_hash(&self.ledger, 1);
        block.consensus_hash = hash_value(&self.params);
        block.hash = block.compute_hash();

        self.store.save_block(&block)?;
        self.store.save_state(&self.ledger.to_snapshot())?;
        self.store.save_metadata(&ChainMetadata {
            height: 0,
            latest_hash: block.hash,
            genesis_time: Some(genesis.genesis_time),
        })?;

        self.genesis_time = Some(genesis.genesis_time);
        let hash = block.hash;
        self.latest = Some(block);
        self.sync_selector();

        tracing::info!(chain_id = %genesis.chain_id, block = %hash, "genesis initialized");
        Ok(hash)
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Current chain height; `None` before genesis.
    pub fn height(&self) -> Option<u64> {
        self.latest.as_ref().map(|b| b.height)
    }

    /// The latest committed block.
    pub fn latest_block(&self) -> Option<&Block> {
        self.latest.as_ref()
    }

    /// Read-only view of the committed ledger.
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Read-only view of the finality tracker.
    pub fn finality(&self) -> &FinalityTracker {
        &self.finality
    }

    /// Evidence records produced by the slashing manager.
    pub fn slashing(&self) -> &SlashingManager {
        &self.slashing
    }

    /// Returns `(balance, nonce)` for an address.
    pub fn balance(&self, address: &Address) -> (u64, u64) {
        let account = self.ledger.account(address);
        (account.balance, account.nonce)
    }

    /// Loads a block by height from the store.
    pub fn block_by_height(&self, height: u64) -> Result<Option<Block>, ChainError> {
        Ok(self.store.load_block(height)?)
    }

    /// Loads a block by hash from the store.
    pub fn block_by_hash(&self, hash: &Hash256) -> Result<Option<Block>, ChainError> {
        Ok(self.store.load_block_by_hash(hash)?)
    }

    /// Validators active at the next height.
    pub fn active_validators(&self) -> Vec<ValidatorInfo> {
        let next = self.height().map_or(0, |h| h + 1);
        self.ledger.active_validators(self.params.min_stake, next)
    }

    /// Number of transactions waiting in the mempool.
    pub fn pending_transactions(&self) -> usize {
        self.mempool.len()
    }

    /// Whether a finality violation halted the driver.
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// The proposer selected for the next height, if any validator is
    /// eligible.
    pub fn next_proposer(&self) -> Option<Address> {
        let next = self.height().map_or(0, |h| h + 1);
        self.selector.select_proposer(next, &self.selection_seed())
    }

    // ------------------------------------------------------------------
    // Mempool admission
    // ------------------------------------------------------------------

    /// Admits a transaction into the mempool.
    ///
    /// The signature must verify and the signing key must own the sender
    /// address; duplicates by txid are silently dropped. Returns `true` when
    /// the transaction was queued.
    pub fn add_transaction(&self, tx: Transaction) -> bool {
        if !tx.verify_signature() || address_from_public_key(&tx.sender_pubkey) != tx.sender {
            tracing::debug!(txid = %tx.txid(), "rejected transaction with bad signature");
            return false;
        }
        self.mempool.add(tx)
    }

    // ------------------------------------------------------------------
    // Block assembly
    // ------------------------------------------------------------------

    /// Assembles an unsigned block on top of the latest block.
    ///
    /// Drains up to `max_txs_per_block` pending transactions in FIFO order
    /// and fills in every header commitment, including the post-application
    /// state root. The caller signs the result and feeds it back through
    /// [`Blockchain::add_block`].
    pub fn create_block(&self, proposer: Address, timestamp: u64) -> Result<Block, ChainError> {
        if self.halted {
            return Err(ChainError::Halted);
        }
        let latest = self.latest.as_ref().ok_or(ChainError::NotInitialized)?;

        let transactions = self.mempool.select_for_block(self.params.max_txs_per_block);
        let mut block = Block::new(
            latest.height + 1,
            latest.hash,
            timestamp,
            proposer,
            transactions,
        );
        block.total_fees = block.transactions.iter().map(|tx| tx.fee).sum();
        block.block_reward = self.params.block_reward;
        block.validator_set_hash = self.validator_set_hash(&self.ledger, block.height);
        block.consensus_hash = hash_value(&self.params);

        let (applied, _) = self.execute_block(&block)?;
        block.state_root = applied.state_root();
        block.app_hash = block.state_root;
        block.next_validator_set_hash = self.validator_set_hash(&applied, block.height + 1);

        Ok(block)
    }

    /// Assembles, signs and imports a block in one step.
    ///
    /// Convenience for the node's proposal loop; returns the new block hash
    /// and the block itself.
    pub fn propose_block(
        &mut self,
        keypair: &KeyPair,
        timestamp: u64,
    ) -> Result<(Hash256, Block), ChainError> {
        let block = self.create_block(keypair.address(), timestamp)?.sign(keypair);
        let hash = self.add_block(block.clone())?;
        Ok((hash, block))
    }

    // ------------------------------------------------------------------
    // Validation and commit
    // ------------------------------------------------------------------

    /// Validates and commits a block.
    ///
    /// The pipeline, in order: finality guard, height continuity, parent
    /// hash, proposer membership and activity, proposer signature, per
    /// transaction signatures, sandboxed application with a state-root
    /// check. On success the block is persisted (block, state, metadata),
    /// the committed ledger pointer swaps to the applied state, and the
    /// selector, slashing manager and finality tracker observe the commit.
    pub fn add_block(&mut self, block: Block) -> Result<Hash256, ChainError> {
        if self.halted {
            return Err(ChainError::Halted);
        }

        // Reorg guard before anything else: touching a finalized height is
        // fatal, not merely inconsistent.
        if !self.finality.can_reorg_to(block.height) {
            let finalized = self.finality.finalized_height().unwrap_or(0);
            self.halted = true;
            tracing::error!(
                height = block.height,
                finalized,
                "finality violation; halting the chain"
            );
            return Err(ChainError::FinalityViolation {
                height: block.height,
                finalized,
            });
        }

        let latest = self.latest.as_ref().ok_or(ChainError::NotInitialized)?;

        if block.height != latest.height + 1 {
            return Err(ChainError::Consistency {
                height: block.height,
                message: format!("expected height {}", latest.height + 1),
            });
        }
        if block.prev_hash != latest.hash {
            return Err(ChainError::Consistency {
                height: block.height,
                message: format!(
                    "prev_hash {} does not match latest {}",
                    block.prev_hash, latest.hash
                ),
            });
        }

        let proposer = self
            .ledger
            .validator(&block.proposer)
            .ok_or_else(|| ChainError::Validation(format!("unknown proposer {}", block.proposer)))?;
        if !proposer.is_active(block.height, self.params.min_stake) {
            return Err(ChainError::Validation(format!(
                "proposer {} is not active at height {}",
                block.proposer, block.height
            )));
        }

        if !block.verify_signature()
            || address_from_public_key(&block.proposer_pubkey) != block.proposer
        {
            return Err(ChainError::Validation("invalid proposer signature".to_string()));
        }
        for tx in &block.transactions {
            if !tx.verify_signature() || address_from_public_key(&tx.sender_pubkey) != tx.sender {
                return Err(ChainError::Validation(format!(
                    "invalid signature on tx {}",
                    tx.txid()
                )));
            }
        }

        // Sandboxed application: any failing transaction rejects the whole
        // block and leaves the committed ledger untouched.
        let (mut applied, fees) = self.execute_block(&block)?;

        if fees != block.total_fees {
            return Err(ChainError::Consistency {
                height: block.height,
                message: format!("total_fees {} but transactions carry {fees}", block.total_fees),
            });
        }
        if !block.state_root.is_zero() && applied.state_root() != block.state_root {
            return Err(ChainError::Consistency {
                height: block.height,
                message: format!(
                    "state root mismatch: claimed {}, computed {}",
                    block.state_root,
                    applied.state_root()
                ),
            });
        }

        // Misbehavior observers run on the sandbox so penalties land in the
        // same state that gets committed.
        let expected = self
            .selector
            .select_proposer(block.height, &self.selection_seed());
        let evidence = self.slashing.observe_block(
            block.height,
            block.hash,
            block.proposer,
            expected,
            block.timestamp,
        );
        for ev in &evidence {
            let burned = self.slashing.apply_penalty(&mut applied, ev, block.height);
            tracing::warn!(validator = %ev.validator, burned, "applied slashing penalty");
        }

        // Commit order is fixed: block, state, metadata. The metadata write
        // is the commit marker recovery keys off.
        self.store.save_block(&block)?;
        self.store.save_state(&applied.to_snapshot())?;
        self.store.save_metadata(&ChainMetadata {
            height: block.height,
            latest_hash: block.hash,
            genesis_time: self.genesis_time,
        })?;

        let txids: Vec<Hash256> = block.transactions.iter().map(|tx| tx.txid()).collect();
        self.mempool.remove(&txids);

        self.ledger = applied;
        self.selector.record_block(&block.proposer, block.timestamp);
        self.sync_selector();

        let hash = block.hash;
        let height = block.height;
        self.latest = Some(block);
        self.advance_finality()?;

        tracing::info!(height, block = %hash, "block committed");
        Ok(hash)
    }

    // ------------------------------------------------------------------
    // Votes and finality
    // ------------------------------------------------------------------

    /// Accepts a validator's finality vote.
    ///
    /// The vote signature is verified against the validator's registered
    /// public key. The slashing manager checks the signed pair for
    /// equivocation, then the vote enters the finality tracker and the voted
    /// block is finalized if depth and supermajority allow. Returns whether
    /// the vote was newly added.
    pub fn submit_vote(&mut self, vote: Vote) -> Result<bool, ChainError> {
        if self.halted {
            return Err(ChainError::Halted);
        }
        let current_height = self.height().ok_or(ChainError::NotInitialized)?;

        let validator = self
            .ledger
            .validator(&vote.validator)
            .ok_or_else(|| ChainError::Validation(format!("unknown validator {}", vote.validator)))?;
        if !vote.verify_signature(&validator.public_key) {
            return Err(ChainError::Validation("invalid vote signature".to_string()));
        }

        if let Some(ev) = self.slashing.observe_vote(&vote) {
            let burned = self
                .slashing
                .apply_penalty(&mut self.ledger, &ev, current_height);
            tracing::warn!(validator = %ev.validator, burned, "vote equivocation penalized");
            self.sync_selector();
        }

        let stakes = self
            .ledger
            .active_validator_stakes(self.params.min_stake, current_height);
        let added = self.finality.add_vote(vote.clone(), &stakes);
        self.finality
            .try_finalize_block(&vote.block_hash, vote.height, current_height, &stakes);
        Ok(added)
    }

    /// Tries to finalize every block deep enough below the tip.
    fn advance_finality(&mut self) -> Result<(), ChainError> {
        let Some(current_height) = self.height() else {
            return Ok(());
        };
        let stakes = self
            .ledger
            .active_validator_stakes(self.params.min_stake, current_height);

        let from = current_height.saturating_sub(self.params.finality_depth);
        for height in from..current_height {
            if self.finality.finalized_block(height).is_some() {
                continue;
            }
            if let Some(block) = self.store.load_block(height)? {
                self.finality
                    .try_finalize_block(&block.hash, height, current_height, &stakes);
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Proposer-selection seed: the hex form of the latest block hash,
    /// i.e. the parent hash of the block being selected for.
    fn selection_seed(&self) -> String {
        self.latest
            .as_ref()
            .map(|b| b.hash.to_hex())
            .unwrap_or_default()
    }

    /// Applies a block to a scratch clone of the committed ledger.
    ///
    /// Runs every transaction at the block's height, credits the proposer,
    /// records proposer bookkeeping and releases mature unbonding entries.
    /// Returns the applied ledger and the fee sum.
    fn execute_block(&self, block: &Block) -> Result<(Ledger, u64), ChainError> {
        let mut working = self.ledger.clone();
        let mut fees = 0u64;

        for tx in &block.transactions {
            working.apply_transaction(tx, block.height)?;
            fees += tx.fee;
        }

        working.apply_block_reward(&block.proposer, block.block_reward, fees);

        if let Some(expected) = self
            .selector
            .select_proposer(block.height, &self.selection_seed())
        {
            if expected != block.proposer {
                working.note_block_missed(&expected);
            }
        }
        working.note_block_proposed(&block.proposer);
        working.process_mature_unbonding(block.height);

        Ok((working, fees))
    }

    /// Hash of the validator set active at a height, in canonical order.
    fn validator_set_hash(&self, ledger: &Ledger, height: u64) -> Hash256 {
        let active = ledger.active_validators(self.params.min_stake, height);
        hash_value(&active)
    }

    fn sync_selector(&mut self) {
        let next = self.height().map_or(0, |h| h + 1);
        let active = self.ledger.active_validators(self.params.min_stake, next);
        self.selector.sync_validators(&active);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GenesisAccount, GenesisValidator};
    use crate::consensus::slashing::SlashingParams;
    use crate::consensus::store::StorageError;
    use crate::storage::InMemoryStore;
    use crate::types::{Fraction, TxType};

    const TS: u64 = 1_700_000_000;

    fn test_params() -> ConsensusParams {
        ConsensusParams {
            block_time_secs: 1,
            max_txs_per_block: 100,
            min_stake: 100,
            stake_unit: 1,
            unbond_blocks: 5,
            finality_depth: 3,
            supermajority_threshold: Fraction::new(2, 3),
            block_reward: 0,
        }
    }

    fn genesis(
        validators: &[(&KeyPair, u64)],
        allocations: &[(&KeyPair, u64)],
    ) -> GenesisConfig {
        GenesisConfig {
            chain_id: "ledger-test-1".to_string(),
            genesis_time: TS,
            allocations: allocations
                .iter()
                .map(|(kp, balance)| GenesisAccount {
                    address: kp.address(),
                    balance: *balance,
                })
                .collect(),
            validators: validators
                .iter()
                .map(|(kp, stake)| GenesisValidator {
                    address: kp.address(),
                    public_key: kp.public_key(),
                    stake: *stake,
                    commission_rate: Fraction::new(1, 10),
                })
                .collect(),
            params: test_params(),
            slashing: SlashingParams::default(),
        }
    }

    fn new_chain(genesis_cfg: &GenesisConfig) -> Blockchain<InMemoryStore> {
        let mut chain = Blockchain::open(
            genesis_cfg.params.clone(),
            genesis_cfg.slashing.clone(),
            InMemoryStore::new(),
        )
        .expect("open succeeds on a fresh store");
        chain.init_genesis(genesis_cfg).expect("genesis applies");
        chain
    }

    fn transfer(from: &KeyPair, to: &KeyPair, nonce: u64, amount: u64, fee: u64) -> Transaction {
        Transaction::new(
            from.address(),
            nonce,
            TxType::Transfer,
            amount,
            Some(to.address()),
            fee,
            TS,
        )
        .sign(from)
    }

    #[test]
    fn genesis_block_is_persisted_at_height_zero() {
        let validator = KeyPair::from_seed("val");
        let chain = new_chain(&genesis(&[(&validator, 100)], &[]));

        assert_eq!(chain.height(), Some(0));
        let block = chain.block_by_height(0).expect("load").expect("present");
        assert!(block.prev_hash.is_zero());
        assert_eq!(block.state_root, chain.ledger().state_root());
        assert_eq!(chain.active_validators().len(), 1);
    }

    #[test]
    fn transfer_and_nonce_end_to_end() {
        let validator = KeyPair::from_seed("val");
        let alice = KeyPair::from_seed("alice");
        let bob = KeyPair::from_seed("bob");
        let mut chain = new_chain(&genesis(&[(&validator, 100)], &[(&alice, 1_000)]));
        let supply = chain.ledger().total_supply();

        assert!(chain.add_transaction(transfer(&alice, &bob, 0, 200, 10)));
        let (hash, block) = chain.propose_block(&validator, TS + 6).expect("block applies");

        assert_eq!(chain.height(), Some(1));
        assert_eq!(block.transactions.len(), 1);
        assert_eq!(chain.balance(&alice.address()), (790, 1));
        assert_eq!(chain.balance(&bob.address()), (200, 0));
        // Fee landed on the proposer; zero reward keeps supply constant.
        assert_eq!(chain.balance(&validator.address()).0, 10);
        assert_eq!(chain.ledger().total_supply(), supply);
        assert_eq!(
            chain.block_by_hash(&hash).expect("load").expect("present").height,
            1
        );
        assert_eq!(chain.pending_transactions(), 0);
    }

    #[test]
    fn replayed_transaction_fails_with_nonce_mismatch() {
        let validator = KeyPair::from_seed("val");
        let alice = KeyPair::from_seed("alice");
        let bob = KeyPair::from_seed("bob");
        let mut chain = new_chain(&genesis(&[(&validator, 100)], &[(&alice, 1_000)]));

        let tx = transfer(&alice, &bob, 0, 200, 10);
        chain.add_transaction(tx.clone());
        chain.propose_block(&validator, TS + 6).expect("block applies");
        let root = chain.ledger().state_root();

        // The txid left the dedup set on commit, so the mempool re-admits;
        // the ledger must then reject the replay.
        assert!(chain.add_transaction(tx));
        let err = chain
            .propose_block(&validator, TS + 12)
            .expect_err("replayed tx poisons the block");
        assert!(matches!(
            err,
            ChainError::Protocol(crate::ledger::TxError::NonceMismatch { .. })
        ));
        assert_eq!(chain.height(), Some(1));
        assert_eq!(chain.ledger().state_root(), root);
    }

    #[test]
    fn unstaked_funds_return_after_the_unbonding_window() {
        let validator = KeyPair::from_seed("val");
        let alice = KeyPair::from_seed("alice");
        let mut chain = new_chain(&genesis(&[(&validator, 100)], &[(&alice, 1_000)]));

        let stake = Transaction::new(alice.address(), 0, TxType::Stake, 500, None, 10, TS)
            .sign(&alice);
        chain.add_transaction(stake);
        chain.propose_block(&validator, TS + 6).expect("stake block");
        assert_eq!(chain.balance(&alice.address()).0, 490);

        let unstake = Transaction::new(alice.address(), 1, TxType::Unstake, 500, None, 10, TS)
            .sign(&alice);
        chain.add_transaction(unstake);
        chain.propose_block(&validator, TS + 12).expect("unstake block");
        assert_eq!(chain.balance(&alice.address()).0, 480);
        assert_eq!(chain.ledger().unbonding_for(&alice.address()).len(), 1);

        // Unbonded at height 2, window 5: funds release with block 7.
        while chain.height().unwrap() < 7 {
            chain
                .propose_block(&validator, TS + 6 * (chain.height().unwrap() + 1))
                .expect("empty block applies");
        }

        assert_eq!(chain.balance(&alice.address()).0, 980);
        assert!(chain.ledger().unbonding_for(&alice.address()).is_empty());
    }

    #[test]
    fn finalization_and_reorg_guard() {
        let v1 = KeyPair::from_seed("v1");
        let v2 = KeyPair::from_seed("v2");
        let v3 = KeyPair::from_seed("v3");
        let mut chain = new_chain(&genesis(&[(&v1, 100), (&v2, 100), (&v3, 100)], &[]));

        let mut hash_at_4 = None;
        for height in 1..=7u64 {
            let (hash, _) = chain
                .propose_block(&v1, TS + 6 * height)
                .expect("block applies");
            if height == 4 {
                hash_at_4 = Some(hash);
            }
        }
        let hash_at_4 = hash_at_4.expect("height 4 was produced");

        // Stake 200 of 300 votes for the block at height 4.
        for voter in [&v1, &v2] {
            let vote = Vote::new(voter.address(), 4, hash_at_4, TS + 60).sign(voter);
            assert!(chain.submit_vote(vote).expect("vote accepted"));
        }

        assert!(chain.finality().is_block_final(&hash_at_4, 4));
        assert_eq!(chain.finality().finalized_height(), Some(4));

        // An alternate block at the finalized height is a fatal violation.
        let fork = Block::new(4, Hash256([9u8; 32]), TS + 99, v2.address(), Vec::new()).sign(&v2);
        let err = chain.add_block(fork).expect_err("fork rejected");
        assert!(matches!(err, ChainError::FinalityViolation { height: 4, .. }));
        assert!(chain.is_halted());

        // Halted means halted: every further mutation is refused.
        assert!(matches!(
            chain.propose_block(&v1, TS + 120),
            Err(ChainError::Halted)
        ));
    }

    #[test]
    fn height_and_parent_mismatches_are_consistency_errors() {
        let validator = KeyPair::from_seed("val");
        let mut chain = new_chain(&genesis(&[(&validator, 100)], &[]));
        chain.propose_block(&validator, TS + 6).expect("block applies");

        // Height gap.
        let gap = Block::new(
            5,
            chain.latest_block().unwrap().hash,
            TS + 12,
            validator.address(),
            Vec::new(),
        )
        .sign(&validator);
        assert!(matches!(
            chain.add_block(gap),
            Err(ChainError::Consistency { height: 5, .. })
        ));

        // Wrong parent.
        let wrong_parent = Block::new(
            2,
            Hash256([7u8; 32]),
            TS + 12,
            validator.address(),
            Vec::new(),
        )
        .sign(&validator);
        assert!(matches!(
            chain.add_block(wrong_parent),
            Err(ChainError::Consistency { height: 2, .. })
        ));

        assert_eq!(chain.height(), Some(1));
    }

    #[test]
    fn foreign_and_inactive_proposers_are_rejected() {
        let validator = KeyPair::from_seed("val");
        let stranger = KeyPair::from_seed("stranger");
        let mut chain = new_chain(&genesis(&[(&validator, 100)], &[]));

        let block = chain
            .create_block(stranger.address(), TS + 6)
            .map(|b| b.sign(&stranger));
        // Unknown proposer fails at membership, not at signature.
        match block {
            Ok(b) => assert!(matches!(chain.add_block(b), Err(ChainError::Validation(_)))),
            Err(e) => panic!("assembly should succeed: {e}"),
        }
    }

    #[test]
    fn tampered_state_root_is_rejected() {
        let validator = KeyPair::from_seed("val");
        let mut chain = new_chain(&genesis(&[(&validator, 100)], &[]));

        let mut block = chain
            .create_block(validator.address(), TS + 6)
            .expect("assembly succeeds");
        block.state_root = Hash256([3u8; 32]);
        let block = block.sign(&validator);

        assert!(matches!(
            chain.add_block(block),
            Err(ChainError::Consistency { .. })
        ));
    }

    #[test]
    fn equivocating_proposer_is_slashed_and_jailed() {
        let v1 = KeyPair::from_seed("v1");
        let v2 = KeyPair::from_seed("v2");
        let mut chain = new_chain(&genesis(&[(&v1, 1_000), (&v2, 1_000)], &[]));

        let (hash, block) = chain.propose_block(&v1, TS + 6).expect("block applies");

        // The proposer also signs a conflicting vote at the same height.
        let conflicting = Vote::new(v1.address(), block.height, Hash256([8u8; 32]), TS + 7)
            .sign(&v1);
        chain.submit_vote(conflicting).expect("vote processed");

        let v = chain.ledger().validator(&v1.address()).expect("registered");
        assert!(v.jailed);
        // 5% of 1_000 burned.
        assert_eq!(v.stake, 950);
        assert_eq!(chain.ledger().burned(), 50);
        assert!(
            chain
                .slashing()
                .evidence()
                .iter()
                .any(|e| e.validator == v1.address())
        );

        // The honest pair (same hash) is not evidence.
        let honest = Vote::new(v2.address(), block.height, hash, TS + 8).sign(&v2);
        chain.submit_vote(honest).expect("vote accepted");
        assert!(!chain.ledger().validator(&v2.address()).unwrap().jailed);
    }

    #[test]
    fn replay_from_genesis_is_byte_identical() {
        let validator = KeyPair::from_seed("val");
        let alice = KeyPair::from_seed("alice");
        let bob = KeyPair::from_seed("bob");
        let cfg = genesis(&[(&validator, 100)], &[(&alice, 10_000)]);

        let run = |chain: &mut Blockchain<InMemoryStore>| -> Vec<Hash256> {
            let txs = vec![
                transfer(&alice, &bob, 0, 500, 10),
                Transaction::new(alice.address(), 1, TxType::Stake, 1_000, None, 10, TS)
                    .sign(&alice),
                transfer(&alice, &bob, 2, 250, 10),
            ];
            let mut roots = Vec::new();
            for (i, tx) in txs.into_iter().enumerate() {
                chain.add_transaction(tx);
                chain
                    .propose_block(&validator, TS + 6 * (i as u64 + 1))
                    .expect("block applies");
                roots.push(chain.ledger().state_root());
            }
            roots
        };

        let mut a = new_chain(&cfg);
        let mut b = new_chain(&cfg);
        let roots_a = run(&mut a);
        let roots_b = run(&mut b);

        assert_eq!(roots_a, roots_b);
        assert_eq!(
            a.latest_block().unwrap().hash,
            b.latest_block().unwrap().hash
        );
    }

    #[test]
    fn recovery_replays_a_block_persisted_past_the_marker() {
        let validator = KeyPair::from_seed("val");
        let alice = KeyPair::from_seed("alice");
        let bob = KeyPair::from_seed("bob");
        let cfg = genesis(&[(&validator, 100)], &[(&alice, 1_000)]);
        let mut chain = new_chain(&cfg);

        chain.add_transaction(transfer(&alice, &bob, 0, 100, 0));
        let block = chain
            .create_block(validator.address(), TS + 6)
            .expect("assembly succeeds")
            .sign(&validator);

        // Simulate a crash right after save_block: the block is on disk but
        // state and metadata still point at genesis.
        let mut torn = chain.store().clone();
        torn.save_block(&block).expect("save block");

        let recovered = Blockchain::open(cfg.params.clone(), cfg.slashing.clone(), torn)
            .expect("recovery succeeds");
        assert_eq!(recovered.height(), Some(1));
        assert_eq!(recovered.balance(&bob.address()).0, 100);
        assert_eq!(recovered.ledger().state_root(), block.state_root);

        // And the repaired store is consistent on a second open.
        let again = Blockchain::open(
            cfg.params.clone(),
            cfg.slashing.clone(),
            recovered.store().clone(),
        )
        .expect("second open succeeds");
        assert_eq!(again.height(), Some(1));
    }

    #[test]
    fn recovery_repairs_a_stale_commit_marker() {
        let validator = KeyPair::from_seed("val");
        let alice = KeyPair::from_seed("alice");
        let cfg = genesis(&[(&validator, 100)], &[(&alice, 1_000)]);
        let mut chain = new_chain(&cfg);

        let block = chain
            .create_block(validator.address(), TS + 6)
            .expect("assembly succeeds")
            .sign(&validator);

        // Simulate a crash between save_state and save_metadata.
        let mut torn = chain.store().clone();
        torn.save_block(&block).expect("save block");
        let (applied, _) = chain.execute_block(&block).expect("sandbox apply");
        torn.save_state(&applied.to_snapshot()).expect("save state");

        let recovered = Blockchain::open(cfg.params.clone(), cfg.slashing.clone(), torn)
            .expect("recovery succeeds");
        assert_eq!(recovered.height(), Some(1));
        assert_eq!(recovered.ledger().state_root(), block.state_root);
        let meta = recovered
            .store()
            .load_metadata()
            .expect("load")
            .expect("present");
        assert_eq!(meta.height, 1);
    }

    #[test]
    fn open_fails_when_state_is_missing() {
        let validator = KeyPair::from_seed("val");
        let cfg = genesis(&[(&validator, 100)], &[]);
        let chain = new_chain(&cfg);

        let mut broken = InMemoryStore::new();
        let genesis_block = chain.block_by_height(0).expect("load").expect("present");
        broken.save_block(&genesis_block).expect("save block");
        broken
            .save_metadata(&ChainMetadata {
                height: 0,
                latest_hash: genesis_block.hash,
                genesis_time: Some(TS),
            })
            .expect("save metadata");

        let err = Blockchain::open(cfg.params.clone(), cfg.slashing.clone(), broken)
            .expect_err("open must fail");
        assert!(matches!(
            err,
            ChainError::Storage(StorageError::CorruptedMeta(_))
        ));
    }
}
