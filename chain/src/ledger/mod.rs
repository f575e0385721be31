//! Ledger: deterministic account/validator state and transaction application.
//!
//! The ledger owns four tables (accounts, validators, delegations and the
//! unbonding queue) and applies signed transactions to them under explicit
//! invariants:
//!
//! - the fee is deducted first and the sender nonce increments last, both
//!   exactly once per accepted transaction;
//! - a rejected transaction leaves the state byte-identical (application
//!   runs against a scratch copy that is only committed on success);
//! - every table iterates in sorted key order wherever the iteration can
//!   reach an observable output, so two replays of the same blocks produce
//!   the same state root at every height.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::crypto::encoding::hash_value;
use crate::crypto::keys::address_from_public_key;
use crate::types::{
    Address, Delegation, Fraction, Hash256, Transaction, TxType, UnbondingEntry, ValidatorInfo,
};

pub mod error;

pub use error::TxError;

/// Account state: balance, replay-protection nonce, and self-staked funds.
///
/// Accounts exist logically for every address; an entry is only materialized
/// while at least one field is nonzero.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub balance: u64,
    pub nonce: u64,
    pub staked: u64,
}

impl Account {
    /// Returns `true` when every field is zero (the account needs no entry).
    pub fn is_empty(&self) -> bool {
        self.balance == 0 && self.nonce == 0 && self.staked == 0
    }
}

/// Protocol parameters the ledger needs at apply time.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LedgerParams {
    /// Stake amounts must be multiples of this unit.
    pub stake_unit: u64,
    /// Heights between an UNSTAKE/UNDELEGATE and the release of the funds.
    pub unbond_blocks: u64,
}

impl Default for LedgerParams {
    fn default() -> Self {
        LedgerParams {
            stake_unit: 1,
            unbond_blocks: 1_814_400,
        }
    }
}

/// Serializable projection of the full ledger state.
///
/// This is the value persisted under `state:current` and the input of the
/// state root: accounts (nonzero only), validators and delegations in
/// sorted key order, and the unbonding queue in insertion order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub accounts: BTreeMap<Address, Account>,
    pub validators: BTreeMap<Address, ValidatorInfo>,
    pub delegations: Vec<Delegation>,
    pub unbonding: Vec<UnbondingEntry>,
}

/// The chain's state machine.
#[derive(Clone, Debug)]
pub struct Ledger {
    accounts: BTreeMap<Address, Account>,
    validators: BTreeMap<Address, ValidatorInfo>,
    delegations: BTreeMap<(Address, Address), Delegation>,
    unbonding: Vec<UnbondingEntry>,
    /// Funds permanently removed from supply by slashing. Session statistic;
    /// not part of the snapshot.
    burned: u64,
    params: LedgerParams,
}

impl Ledger {
    /// Creates an empty ledger with the given parameters.
    pub fn new(params: LedgerParams) -> Self {
        Ledger {
            accounts: BTreeMap::new(),
            validators: BTreeMap::new(),
            delegations: BTreeMap::new(),
            unbonding: Vec::new(),
            burned: 0,
            params,
        }
    }

    /// Rebuilds a ledger from a persisted snapshot.
    pub fn from_snapshot(snapshot: LedgerSnapshot, params: LedgerParams) -> Self {
        let delegations = snapshot
            .delegations
            .into_iter()
            .map(|d| ((d.delegator, d.validator), d))
            .collect();
        Ledger {
            accounts: snapshot.accounts,
            validators: snapshot.validators,
            delegations,
            unbonding: snapshot.unbonding,
            burned: 0,
            params,
        }
    }

    /// Returns the parameters this ledger applies transactions under.
    pub fn params(&self) -> &LedgerParams {
        &self.params
    }

    // ------------------------------------------------------------------
    // Account reads
    // ------------------------------------------------------------------

    /// Returns the account state for an address (all-zero if absent).
    pub fn account(&self, address: &Address) -> Account {
        self.accounts.get(address).copied().unwrap_or_default()
    }

    /// Returns the spendable balance of an address.
    pub fn balance_of(&self, address: &Address) -> u64 {
        self.account(address).balance
    }

    /// Returns the current nonce of an address.
    pub fn nonce_of(&self, address: &Address) -> u64 {
        self.account(address).nonce
    }

    /// Returns the self-staked amount of an address.
    pub fn staked_of(&self, address: &Address) -> u64 {
        self.account(address).staked
    }

    /// Credits an address, materializing the account if needed.
    ///
    /// Used for genesis allocations; consensus-path credits go through
    /// [`Ledger::apply_block_reward`] and unbonding maturation.
    pub fn credit(&mut self, address: Address, amount: u64) {
        self.accounts.entry(address).or_default().balance += amount;
    }

    // ------------------------------------------------------------------
    // Validator reads and registry
    // ------------------------------------------------------------------

    /// Returns a validator registry entry, if present.
    pub fn validator(&self, address: &Address) -> Option<&ValidatorInfo> {
        self.validators.get(address)
    }

    /// Returns all registered validators in address order.
    pub fn validators(&self) -> impl Iterator<Item = &ValidatorInfo> {
        self.validators.values()
    }

    /// Returns the validators active at `current_height`, ordered by
    /// descending total stake with the address as tie-break.
    pub fn active_validators(&self, min_stake: u64, current_height: u64) -> Vec<ValidatorInfo> {
        let mut active: Vec<ValidatorInfo> = self
            .validators
            .values()
            .filter(|v| v.is_active(current_height, min_stake))
            .cloned()
            .collect();
        active.sort_by(|a, b| {
            b.total_stake()
                .cmp(&a.total_stake())
                .then_with(|| a.address.cmp(&b.address))
        });
        active
    }

    /// Returns `address -> total_stake` for the active validator set, the
    /// shape the finality tracker consumes.
    pub fn active_validator_stakes(
        &self,
        min_stake: u64,
        current_height: u64,
    ) -> BTreeMap<Address, u64> {
        self.validators
            .values()
            .filter(|v| v.is_active(current_height, min_stake))
            .map(|v| (v.address, v.total_stake()))
            .collect()
    }

    /// Inserts a validator directly, bonding its self-stake.
    ///
    /// Genesis-only entry point; post-genesis validators are created through
    /// CREATE_VALIDATOR transactions.
    pub fn register_validator(&mut self, info: ValidatorInfo) {
        self.accounts.entry(info.address).or_default().staked += info.stake;
        self.validators.insert(info.address, info);
    }

    // ------------------------------------------------------------------
    // Transaction application
    // ------------------------------------------------------------------

    /// Applies a single transaction, atomically.
    ///
    /// Verifies the signature and key/address binding, checks the nonce,
    /// deducts the fee, dispatches on the transaction type and increments
    /// the nonce. On any error the ledger is left unchanged: the transaction
    /// runs against a scratch clone that replaces the live state only on
    /// success.
    pub fn apply_transaction(&mut self, tx: &Transaction, current_height: u64) -> Result<(), TxError> {
        let mut scratch = self.clone();
        scratch.apply_in_place(tx, current_height)?;
        *self = scratch;
        Ok(())
    }

    fn apply_in_place(&mut self, tx: &Transaction, current_height: u64) -> Result<(), TxError> {
        // The signature must verify AND the signing key must own the claimed
        // sender address, otherwise anyone could spend from a foreign account
        // with their own key.
        if !tx.verify_signature() || address_from_public_key(&tx.sender_pubkey) != tx.sender {
            return Err(TxError::InvalidSignature { txid: tx.txid() });
        }

        let nonce = self.nonce_of(&tx.sender);
        if nonce != tx.nonce {
            return Err(TxError::NonceMismatch {
                sender: tx.sender,
                expected: nonce,
                got: tx.nonce,
            });
        }

        // Fee comes out first, unconditionally for an accepted transaction.
        self.debit_balance(&tx.sender, tx.fee)?;

        match tx.tx_type {
            TxType::Transfer => self.apply_transfer(tx)?,
            TxType::Stake => self.apply_stake(tx)?,
            TxType::Unstake => self.apply_unstake(tx, current_height)?,
            TxType::Delegate => self.apply_delegate(tx)?,
            TxType::Undelegate => self.apply_undelegate(tx, current_height)?,
            TxType::CreateValidator => self.apply_create_validator(tx)?,
            TxType::EditValidator => self.apply_edit_validator(tx)?,
            TxType::Vote => {
                return Err(TxError::PolicyViolation(
                    "vote transactions are consensus messages, not state transitions".to_string(),
                ));
            }
        }

        // Nonce increments last, exactly once.
        self.accounts.entry(tx.sender).or_default().nonce += 1;
        Ok(())
    }

    fn debit_balance(&mut self, address: &Address, amount: u64) -> Result<(), TxError> {
        let account = self.accounts.entry(*address).or_default();
        if account.balance < amount {
            return Err(TxError::InsufficientBalance {
                address: *address,
                required: amount,
                available: account.balance,
            });
        }
        account.balance -= amount;
        Ok(())
    }

    fn apply_transfer(&mut self, tx: &Transaction) -> Result<(), TxError> {
        let recipient = tx.recipient.ok_or(TxError::MissingRecipient("transfer"))?;
        self.debit_balance(&tx.sender, tx.amount)?;
        self.accounts.entry(recipient).or_default().balance += tx.amount;
        Ok(())
    }

    fn apply_stake(&mut self, tx: &Transaction) -> Result<(), TxError> {
        if tx.amount == 0 {
            return Err(TxError::PolicyViolation(
                "stake amount must be positive".to_string(),
            ));
        }
        if tx.amount % self.params.stake_unit != 0 {
            return Err(TxError::PolicyViolation(format!(
                "stake must be a multiple of {}",
                self.params.stake_unit
            )));
        }
        self.debit_balance(&tx.sender, tx.amount)?;
        self.accounts.entry(tx.sender).or_default().staked += tx.amount;

        // A staking validator bonds onto its own registry entry.
        if let Some(validator) = self.validators.get_mut(&tx.sender) {
            validator.stake += tx.amount;
        }
        Ok(())
    }

    fn apply_unstake(&mut self, tx: &Transaction, current_height: u64) -> Result<(), TxError> {
        if tx.amount == 0 {
            return Err(TxError::PolicyViolation(
                "unstake amount must be positive".to_string(),
            ));
        }
        let staked = self.staked_of(&tx.sender);
        if staked < tx.amount {
            return Err(TxError::InsufficientStake {
                address: tx.sender,
                required: tx.amount,
                available: staked,
            });
        }

        self.accounts.entry(tx.sender).or_default().staked -= tx.amount;
        if let Some(validator) = self.validators.get_mut(&tx.sender) {
            validator.stake = validator.stake.saturating_sub(tx.amount);
        }

        // Funds are not returned here; they sit in the unbonding queue until
        // process_mature_unbonding releases them.
        self.unbonding.push(UnbondingEntry {
            address: tx.sender,
            validator: None,
            amount: tx.amount,
            completion_height: current_height + self.params.unbond_blocks,
            created_at: tx.timestamp,
        });
        Ok(())
    }

    fn apply_delegate(&mut self, tx: &Transaction) -> Result<(), TxError> {
        let validator_addr = tx.recipient.ok_or(TxError::MissingRecipient("delegate"))?;
        if !self.validators.contains_key(&validator_addr) {
            return Err(TxError::UnknownValidator {
                address: validator_addr,
            });
        }
        if tx.amount == 0 {
            return Err(TxError::PolicyViolation(
                "delegation amount must be positive".to_string(),
            ));
        }
        self.debit_balance(&tx.sender, tx.amount)?;

        self.delegations
            .entry((tx.sender, validator_addr))
            .and_modify(|d| d.amount += tx.amount)
            .or_insert_with(|| Delegation {
                delegator: tx.sender,
                validator: validator_addr,
                amount: tx.amount,
                created_at: tx.timestamp,
            });

        if let Some(validator) = self.validators.get_mut(&validator_addr) {
            validator.delegated_stake += tx.amount;
        }
        Ok(())
    }

    fn apply_undelegate(&mut self, tx: &Transaction, current_height: u64) -> Result<(), TxError> {
        let validator_addr = tx.recipient.ok_or(TxError::MissingRecipient("undelegate"))?;
        if !self.validators.contains_key(&validator_addr) {
            return Err(TxError::UnknownValidator {
                address: validator_addr,
            });
        }
        if tx.amount == 0 {
            return Err(TxError::PolicyViolation(
                "undelegation amount must be positive".to_string(),
            ));
        }

        let key = (tx.sender, validator_addr);
        let delegation = self.delegations.get_mut(&key).ok_or_else(|| {
            TxError::PolicyViolation(format!(
                "no delegation from {} to {validator_addr}",
                tx.sender
            ))
        })?;
        if delegation.amount < tx.amount {
            return Err(TxError::InsufficientStake {
                address: tx.sender,
                required: tx.amount,
                available: delegation.amount,
            });
        }

        delegation.amount -= tx.amount;
        if delegation.amount == 0 {
            self.delegations.remove(&key);
        }
        if let Some(validator) = self.validators.get_mut(&validator_addr) {
            validator.delegated_stake = validator.delegated_stake.saturating_sub(tx.amount);
        }

        // Undelegated funds unbond symmetrically with unstaking: held in the
        // queue, tagged with the validator they came from.
        self.unbonding.push(UnbondingEntry {
            address: tx.sender,
            validator: Some(validator_addr),
            amount: tx.amount,
            completion_height: current_height + self.params.unbond_blocks,
            created_at: tx.timestamp,
        });
        Ok(())
    }

    fn apply_create_validator(&mut self, tx: &Transaction) -> Result<(), TxError> {
        if self.validators.contains_key(&tx.sender) {
            return Err(TxError::DuplicateValidator { address: tx.sender });
        }

        let commission = match tx.data.get("commission_rate") {
            Some(raw) => serde_json::from_value::<Fraction>(raw.clone()).map_err(|_| {
                TxError::PolicyViolation("malformed commission_rate in data".to_string())
            })?,
            None => Fraction::new(1, 10),
        };
        if !commission.is_proper() {
            return Err(TxError::InvalidCommission { rate: commission });
        }

        let min_self_stake = tx
            .data
            .get("min_self_stake")
            .and_then(Value::as_u64)
            .unwrap_or(self.params.stake_unit);
        if tx.amount < min_self_stake {
            return Err(TxError::PolicyViolation(format!(
                "initial stake must be at least {min_self_stake}"
            )));
        }

        self.debit_balance(&tx.sender, tx.amount)?;
        self.accounts.entry(tx.sender).or_default().staked += tx.amount;
        self.validators.insert(
            tx.sender,
            ValidatorInfo::new(
                tx.sender,
                tx.sender_pubkey.clone(),
                tx.amount,
                commission,
                tx.timestamp,
            ),
        );
        Ok(())
    }

    fn apply_edit_validator(&mut self, tx: &Transaction) -> Result<(), TxError> {
        if !self.validators.contains_key(&tx.sender) {
            return Err(TxError::UnknownValidator { address: tx.sender });
        }

        if let Some(raw) = tx.data.get("commission_rate") {
            let commission = serde_json::from_value::<Fraction>(raw.clone()).map_err(|_| {
                TxError::PolicyViolation("malformed commission_rate in data".to_string())
            })?;
            if !commission.is_proper() {
                return Err(TxError::InvalidCommission { rate: commission });
            }
            if let Some(validator) = self.validators.get_mut(&tx.sender) {
                validator.commission_rate = commission;
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Block-level operations
    // ------------------------------------------------------------------

    /// Credits the proposer with the block reward plus collected fees.
    pub fn apply_block_reward(&mut self, proposer: &Address, reward: u64, fees: u64) {
        let total = reward + fees;
        if total > 0 {
            self.accounts.entry(*proposer).or_default().balance += total;
        }
    }

    /// Releases every mature unbonding entry back to its account.
    ///
    /// Returns the number of entries released. Order is irrelevant: amounts,
    /// not identities, are credited.
    pub fn process_mature_unbonding(&mut self, current_height: u64) -> usize {
        let mut released = 0;
        let mut remaining = Vec::with_capacity(self.unbonding.len());
        for entry in self.unbonding.drain(..) {
            if entry.is_mature(current_height) {
                self.accounts.entry(entry.address).or_default().balance += entry.amount;
                released += 1;
            } else {
                remaining.push(entry);
            }
        }
        self.unbonding = remaining;
        released
    }

    /// Burns `floor(total_stake * fraction)` of a validator's stake.
    ///
    /// Consumes the validator's proportional self-stake share first, then
    /// each delegation proportionally in delegator order; any rounding
    /// residue comes out of the remaining self-stake so the total burned is
    /// exact whenever the self-stake can absorb it. Delegations drained to
    /// zero are removed. Returns the amount actually burned.
    pub fn slash_validator(&mut self, address: &Address, fraction: Fraction, reason: &str) -> u64 {
        let Some(stake) = self.validators.get(address).map(|v| v.stake) else {
            return 0;
        };
        let total_stake = self
            .validators
            .get(address)
            .map(|v| v.total_stake())
            .unwrap_or(0);

        let total = fraction.mul_floor(total_stake);
        if total == 0 {
            return 0;
        }

        // Proportional share out of the self-stake first.
        let mut self_cut = fraction.mul_floor(stake).min(total);
        let mut remaining = total - self_cut;

        // Then each delegation proportionally, in delegator order.
        let ordered: Vec<(Address, Address)> = self
            .delegations
            .keys()
            .filter(|(_, v)| v == address)
            .copied()
            .collect();
        for key in ordered {
            if remaining == 0 {
                break;
            }
            let Some(delegation) = self.delegations.get_mut(&key) else {
                continue;
            };
            let cut = fraction.mul_floor(delegation.amount).min(remaining);
            delegation.amount -= cut;
            remaining -= cut;
            let drained = delegation.amount == 0;
            if drained {
                self.delegations.remove(&key);
            }
            if let Some(v) = self.validators.get_mut(address) {
                v.delegated_stake = v.delegated_stake.saturating_sub(cut);
            }
        }

        // Rounding residue comes out of what is left of the self-stake.
        if remaining > 0 {
            let extra = (stake - self_cut).min(remaining);
            self_cut += extra;
            remaining -= extra;
        }

        if let Some(v) = self.validators.get_mut(address) {
            v.stake -= self_cut;
        }
        let account = self.accounts.entry(*address).or_default();
        account.staked = account.staked.saturating_sub(self_cut);

        let burned = total - remaining;
        self.burned += burned;
        tracing::warn!(
            validator = %address,
            amount = burned,
            reason,
            "slashed validator stake"
        );
        burned
    }

    /// Credits a validator's lifetime proposal counter.
    ///
    /// Runs as part of deterministic block execution, so the counter is part
    /// of the state every replica agrees on.
    pub fn note_block_proposed(&mut self, address: &Address) {
        if let Some(validator) = self.validators.get_mut(address) {
            validator.total_blocks_proposed += 1;
        }
    }

    /// Records that a validator missed a height it was expected to propose.
    pub fn note_block_missed(&mut self, address: &Address) {
        if let Some(validator) = self.validators.get_mut(address) {
            validator.total_blocks_missed += 1;
        }
    }

    /// Jails a validator until the given height.
    pub fn jail_validator(&mut self, address: &Address, until_height: u64) {
        if let Some(validator) = self.validators.get_mut(address) {
            validator.jailed = true;
            validator.jailed_until = until_height;
            tracing::warn!(validator = %address, until = until_height, "jailed validator");
        }
    }

    /// Clears a validator's jail status.
    pub fn unjail_validator(&mut self, address: &Address) {
        if let Some(validator) = self.validators.get_mut(address) {
            validator.jailed = false;
            validator.jailed_until = 0;
        }
    }

    // ------------------------------------------------------------------
    // Snapshots and statistics
    // ------------------------------------------------------------------

    /// Builds the deterministic snapshot of the full state.
    pub fn to_snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            accounts: self
                .accounts
                .iter()
                .filter(|(_, acc)| !acc.is_empty())
                .map(|(addr, acc)| (*addr, *acc))
                .collect(),
            validators: self.validators.clone(),
            delegations: self.delegations.values().cloned().collect(),
            unbonding: self.unbonding.clone(),
        }
    }

    /// Returns the snapshot as a canonical JSON value.
    pub fn snapshot(&self) -> Value {
        crate::crypto::encoding::canonical_value(&self.to_snapshot())
    }

    /// Computes the state root: the hash of the canonical snapshot.
    pub fn state_root(&self) -> Hash256 {
        hash_value(&self.snapshot())
    }

    /// Total accounted value: balances + self-stakes + delegations +
    /// unbonding amounts. Conserved across transactions except for explicit
    /// mints (block rewards) and burns (slashing).
    pub fn total_supply(&self) -> u64 {
        let accounts: u64 = self
            .accounts
            .values()
            .map(|a| a.balance + a.staked)
            .sum();
        let delegated: u64 = self.delegations.values().map(|d| d.amount).sum();
        let unbonding: u64 = self.unbonding.iter().map(|u| u.amount).sum();
        accounts + delegated + unbonding
    }

    /// Total stake bonded behind validators (self + delegated).
    pub fn total_staked(&self) -> u64 {
        self.validators.values().map(|v| v.total_stake()).sum()
    }

    /// Bonded fraction of the total supply, in basis points.
    ///
    /// A reporting statistic, not a consensus input.
    pub fn staking_ratio_bps(&self) -> u64 {
        let supply = self.total_supply();
        if supply == 0 {
            return 0;
        }
        ((self.total_staked() as u128 * 10_000) / supply as u128) as u64
    }

    /// Funds burned by slashing since this ledger instance was built.
    pub fn burned(&self) -> u64 {
        self.burned
    }

    /// Unbonding entries waiting for an address.
    pub fn unbonding_for(&self, address: &Address) -> Vec<UnbondingEntry> {
        self.unbonding
            .iter()
            .filter(|e| e.address == *address)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::KeyPair;
    use serde_json::json;

    const TS: u64 = 1_700_000_000;

    fn params(unbond_blocks: u64) -> LedgerParams {
        LedgerParams {
            stake_unit: 1,
            unbond_blocks,
        }
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

    fn simple_tx(kp: &KeyPair, nonce: u64, tx_type: TxType, amount: u64, fee: u64) -> Transaction {
        Transaction::new(kp.address(), nonce, tx_type, amount, None, fee, TS).sign(kp)
    }

    fn create_validator_tx(kp: &KeyPair, nonce: u64, amount: u64) -> Transaction {
        Transaction::new(
            kp.address(),
            nonce,
            TxType::CreateValidator,
            amount,
            None,
            0,
            TS,
        )
        .with_data("commission_rate", json!({"num": 1, "den": 10}))
        .sign(kp)
    }

    #[test]
    fn transfer_moves_funds_and_bumps_nonce() {
        let alice = KeyPair::from_seed("alice");
        let bob = KeyPair::from_seed("bob");
        let mut ledger = Ledger::new(params(5));
        ledger.credit(alice.address(), 1_000);

        let supply_before = ledger.total_supply();
        ledger
            .apply_transaction(&transfer(&alice, &bob, 0, 200, 10), 1)
            .expect("transfer applies");

        assert_eq!(ledger.balance_of(&alice.address()), 790);
        assert_eq!(ledger.balance_of(&bob.address()), 200);
        assert_eq!(ledger.nonce_of(&alice.address()), 1);
        // The fee is in flight until apply_block_reward credits the
        // proposer; the ledger alone sees supply shrink by exactly the fee.
        assert_eq!(ledger.total_supply(), supply_before - 10);
    }

    #[test]
    fn replaying_a_transaction_is_a_nonce_mismatch() {
        let alice = KeyPair::from_seed("alice");
        let bob = KeyPair::from_seed("bob");
        let mut ledger = Ledger::new(params(5));
        ledger.credit(alice.address(), 1_000);

        let tx = transfer(&alice, &bob, 0, 200, 10);
        ledger.apply_transaction(&tx, 1).expect("first apply");
        let root = ledger.state_root();

        let err = ledger.apply_transaction(&tx, 1).expect_err("replay rejected");
        assert!(matches!(err, TxError::NonceMismatch { expected: 1, got: 0, .. }));
        // Rejection leaves the state byte-identical.
        assert_eq!(ledger.state_root(), root);
    }

    #[test]
    fn signature_must_match_sender_address() {
        let alice = KeyPair::from_seed("alice");
        let mallory = KeyPair::from_seed("mallory");
        let mut ledger = Ledger::new(params(5));
        ledger.credit(alice.address(), 1_000);

        // Mallory signs a spend of Alice's account with her own key.
        let mut tx = Transaction::new(
            alice.address(),
            0,
            TxType::Transfer,
            500,
            Some(mallory.address()),
            0,
            TS,
        );
        tx.sender_pubkey = mallory.public_key();
        tx.signature = mallory.sign_value(&tx.payload());

        let err = ledger.apply_transaction(&tx, 1).expect_err("rebinding rejected");
        assert!(matches!(err, TxError::InvalidSignature { .. }));
        assert_eq!(ledger.balance_of(&alice.address()), 1_000);
    }

    #[test]
    fn failed_dispatch_rolls_back_the_fee() {
        let alice = KeyPair::from_seed("alice");
        let bob = KeyPair::from_seed("bob");
        let mut ledger = Ledger::new(params(5));
        ledger.credit(alice.address(), 100);

        // Fee is affordable, amount is not; the whole application must
        // roll back, fee included.
        let err = ledger
            .apply_transaction(&transfer(&alice, &bob, 0, 500, 10), 1)
            .expect_err("insufficient balance");
        assert!(matches!(err, TxError::InsufficientBalance { .. }));
        assert_eq!(ledger.balance_of(&alice.address()), 100);
        assert_eq!(ledger.nonce_of(&alice.address()), 0);
    }

    #[test]
    fn stake_unstake_and_maturation() {
        let alice = KeyPair::from_seed("alice");
        let mut ledger = Ledger::new(params(5));
        ledger.credit(alice.address(), 1_000);

        ledger
            .apply_transaction(&simple_tx(&alice, 0, TxType::Stake, 500, 10), 1)
            .expect("stake applies");
        assert_eq!(ledger.balance_of(&alice.address()), 490);
        assert_eq!(ledger.staked_of(&alice.address()), 500);

        ledger
            .apply_transaction(&simple_tx(&alice, 1, TxType::Unstake, 500, 10), 2)
            .expect("unstake applies");
        assert_eq!(ledger.staked_of(&alice.address()), 0);
        // Funds are locked in unbonding, not returned.
        assert_eq!(ledger.balance_of(&alice.address()), 480);
        assert_eq!(ledger.unbonding_for(&alice.address()).len(), 1);
        assert_eq!(
            ledger.unbonding_for(&alice.address())[0].completion_height,
            7
        );

        assert_eq!(ledger.process_mature_unbonding(6), 0);
        assert_eq!(ledger.balance_of(&alice.address()), 480);

        assert_eq!(ledger.process_mature_unbonding(7), 1);
        assert_eq!(ledger.balance_of(&alice.address()), 980);
        assert!(ledger.unbonding_for(&alice.address()).is_empty());
    }

    #[test]
    fn unstake_beyond_staked_amount_is_rejected() {
        let alice = KeyPair::from_seed("alice");
        let mut ledger = Ledger::new(params(5));
        ledger.credit(alice.address(), 1_000);
        ledger
            .apply_transaction(&simple_tx(&alice, 0, TxType::Stake, 100, 0), 1)
            .expect("stake applies");

        let err = ledger
            .apply_transaction(&simple_tx(&alice, 1, TxType::Unstake, 200, 0), 2)
            .expect_err("over-unstake rejected");
        assert!(matches!(err, TxError::InsufficientStake { .. }));
    }

    #[test]
    fn stake_must_respect_the_unit() {
        let alice = KeyPair::from_seed("alice");
        let mut ledger = Ledger::new(LedgerParams {
            stake_unit: 100,
            unbond_blocks: 5,
        });
        ledger.credit(alice.address(), 1_000);

        let err = ledger
            .apply_transaction(&simple_tx(&alice, 0, TxType::Stake, 150, 0), 1)
            .expect_err("off-unit stake rejected");
        assert!(matches!(err, TxError::PolicyViolation(_)));

        ledger
            .apply_transaction(&simple_tx(&alice, 0, TxType::Stake, 200, 0), 1)
            .expect("on-unit stake applies");
    }

    #[test]
    fn delegate_then_slash_distributes_self_first() {
        let val = KeyPair::from_seed("validator");
        let del = KeyPair::from_seed("delegator");
        let mut ledger = Ledger::new(params(5));
        ledger.credit(val.address(), 1_000);
        ledger.credit(del.address(), 400);

        ledger
            .apply_transaction(&create_validator_tx(&val, 0, 1_000), 1)
            .expect("validator created");

        let delegate = Transaction::new(
            del.address(),
            0,
            TxType::Delegate,
            400,
            Some(val.address()),
            0,
            TS,
        )
        .sign(&del);
        ledger.apply_transaction(&delegate, 1).expect("delegation applies");

        let v = ledger.validator(&val.address()).expect("registered");
        assert_eq!(v.stake, 1_000);
        assert_eq!(v.delegated_stake, 400);
        assert_eq!(v.total_stake(), 1_400);

        let burned = ledger.slash_validator(&val.address(), Fraction::new(1, 10), "double sign");
        assert_eq!(burned, 140);

        let v = ledger.validator(&val.address()).expect("still registered");
        assert_eq!(v.stake, 900);
        assert_eq!(v.delegated_stake, 360);
        assert_eq!(ledger.staked_of(&val.address()), 900);
        assert_eq!(ledger.burned(), 140);
    }

    #[test]
    fn slash_removes_drained_delegations() {
        let val = KeyPair::from_seed("validator");
        let del = KeyPair::from_seed("delegator");
        let mut ledger = Ledger::new(params(5));
        ledger.credit(val.address(), 100);
        ledger.credit(del.address(), 50);

        ledger
            .apply_transaction(&create_validator_tx(&val, 0, 100), 1)
            .expect("validator created");
        let delegate = Transaction::new(
            del.address(),
            0,
            TxType::Delegate,
            50,
            Some(val.address()),
            0,
            TS,
        )
        .sign(&del);
        ledger.apply_transaction(&delegate, 1).expect("delegation applies");

        // Slashing everything drains and removes the delegation record.
        let burned = ledger.slash_validator(&val.address(), Fraction::new(1, 1), "equivocation");
        assert_eq!(burned, 150);
        let v = ledger.validator(&val.address()).expect("entry survives");
        assert_eq!(v.total_stake(), 0);
        assert!(ledger.to_snapshot().delegations.is_empty());
    }

    #[test]
    fn undelegate_unbonds_instead_of_refunding() {
        let val = KeyPair::from_seed("validator");
        let del = KeyPair::from_seed("delegator");
        let mut ledger = Ledger::new(params(5));
        ledger.credit(val.address(), 100);
        ledger.credit(del.address(), 300);

        ledger
            .apply_transaction(&create_validator_tx(&val, 0, 100), 1)
            .expect("validator created");
        let delegate = Transaction::new(
            del.address(),
            0,
            TxType::Delegate,
            300,
            Some(val.address()),
            0,
            TS,
        )
        .sign(&del);
        ledger.apply_transaction(&delegate, 1).expect("delegation applies");

        let undelegate = Transaction::new(
            del.address(),
            1,
            TxType::Undelegate,
            300,
            Some(val.address()),
            0,
            TS,
        )
        .sign(&del);
        ledger.apply_transaction(&undelegate, 2).expect("undelegation applies");

        // Balance untouched until maturation, symmetric with unstake.
        assert_eq!(ledger.balance_of(&del.address()), 0);
        let pending = ledger.unbonding_for(&del.address());
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].validator, Some(val.address()));
        assert_eq!(pending[0].completion_height, 7);

        ledger.process_mature_unbonding(7);
        assert_eq!(ledger.balance_of(&del.address()), 300);
    }

    #[test]
    fn duplicate_validator_is_rejected() {
        let val = KeyPair::from_seed("validator");
        let mut ledger = Ledger::new(params(5));
        ledger.credit(val.address(), 500);

        ledger
            .apply_transaction(&create_validator_tx(&val, 0, 100), 1)
            .expect("first registration");
        let err = ledger
            .apply_transaction(&create_validator_tx(&val, 1, 100), 1)
            .expect_err("second registration rejected");
        assert!(matches!(err, TxError::DuplicateValidator { .. }));
    }

    #[test]
    fn commission_must_be_proper() {
        let val = KeyPair::from_seed("validator");
        let mut ledger = Ledger::new(params(5));
        ledger.credit(val.address(), 500);

        let tx = Transaction::new(val.address(), 0, TxType::CreateValidator, 100, None, 0, TS)
            .with_data("commission_rate", json!({"num": 3, "den": 2}))
            .sign(&val);
        let err = ledger.apply_transaction(&tx, 1).expect_err("over-unity commission");
        assert!(matches!(err, TxError::InvalidCommission { .. }));
    }

    #[test]
    fn edit_validator_updates_commission_only_when_provided() {
        let val = KeyPair::from_seed("validator");
        let mut ledger = Ledger::new(params(5));
        ledger.credit(val.address(), 500);
        ledger
            .apply_transaction(&create_validator_tx(&val, 0, 100), 1)
            .expect("validator created");

        // No commission_rate key: a no-op edit.
        let noop = Transaction::new(val.address(), 1, TxType::EditValidator, 0, None, 0, TS)
            .sign(&val);
        ledger.apply_transaction(&noop, 1).expect("no-op edit applies");
        assert_eq!(
            ledger.validator(&val.address()).unwrap().commission_rate,
            Fraction::new(1, 10)
        );

        let edit = Transaction::new(val.address(), 2, TxType::EditValidator, 0, None, 0, TS)
            .with_data("commission_rate", json!({"num": 1, "den": 4}))
            .sign(&val);
        ledger.apply_transaction(&edit, 1).expect("edit applies");
        assert_eq!(
            ledger.validator(&val.address()).unwrap().commission_rate,
            Fraction::new(1, 4)
        );
    }

    #[test]
    fn vote_transactions_are_not_state_transitions() {
        let alice = KeyPair::from_seed("alice");
        let mut ledger = Ledger::new(params(5));
        ledger.credit(alice.address(), 100);

        let err = ledger
            .apply_transaction(&simple_tx(&alice, 0, TxType::Vote, 0, 0), 1)
            .expect_err("vote tx rejected");
        assert!(matches!(err, TxError::PolicyViolation(_)));
    }

    #[test]
    fn staking_validator_grows_its_registry_entry() {
        let val = KeyPair::from_seed("validator");
        let mut ledger = Ledger::new(params(5));
        ledger.credit(val.address(), 1_000);

        ledger
            .apply_transaction(&create_validator_tx(&val, 0, 400), 1)
            .expect("validator created");
        ledger
            .apply_transaction(&simple_tx(&val, 1, TxType::Stake, 100, 0), 2)
            .expect("top-up stake applies");

        let v = ledger.validator(&val.address()).expect("registered");
        assert_eq!(v.stake, 500);
        assert_eq!(ledger.staked_of(&val.address()), 500);
    }

    #[test]
    fn snapshot_filters_empty_accounts_and_sorts() {
        let alice = KeyPair::from_seed("alice");
        let bob = KeyPair::from_seed("bob");
        let mut ledger = Ledger::new(params(5));
        ledger.credit(alice.address(), 100);
        ledger.credit(bob.address(), 0); // materialized but empty

        let snap = ledger.to_snapshot();
        assert_eq!(snap.accounts.len(), 1);
        assert!(snap.accounts.contains_key(&alice.address()));
    }

    #[test]
    fn state_root_is_deterministic_and_roundtrips() {
        let alice = KeyPair::from_seed("alice");
        let bob = KeyPair::from_seed("bob");
        let mut ledger = Ledger::new(params(5));
        ledger.credit(alice.address(), 1_000);
        ledger
            .apply_transaction(&transfer(&alice, &bob, 0, 200, 10), 1)
            .expect("transfer applies");

        let root = ledger.state_root();
        assert_eq!(root, ledger.state_root());

        let rebuilt = Ledger::from_snapshot(ledger.to_snapshot(), params(5));
        assert_eq!(rebuilt.state_root(), root);
    }

    #[test]
    fn jail_and_unjail_gate_activity() {
        let val = KeyPair::from_seed("validator");
        let mut ledger = Ledger::new(params(5));
        ledger.credit(val.address(), 500);
        ledger
            .apply_transaction(&create_validator_tx(&val, 0, 500), 1)
            .expect("validator created");

        ledger.jail_validator(&val.address(), 100);
        assert!(ledger.active_validators(100, 50).is_empty());

        ledger.unjail_validator(&val.address());
        assert_eq!(ledger.active_validators(100, 50).len(), 1);
    }

    #[test]
    fn conservation_holds_across_a_mixed_sequence() {
        let alice = KeyPair::from_seed("alice");
        let bob = KeyPair::from_seed("bob");
        let val = KeyPair::from_seed("validator");
        let mut ledger = Ledger::new(params(3));
        ledger.credit(alice.address(), 10_000);
        ledger.credit(bob.address(), 5_000);
        ledger.credit(val.address(), 2_000);
        let initial = ledger.total_supply();

        let mut fees = 0;
        for (tx, height) in [
            (create_validator_tx(&val, 0, 2_000), 1u64),
            (transfer(&alice, &bob, 0, 1_000, 10), 1),
            (simple_tx(&alice, 1, TxType::Stake, 3_000, 10), 2),
            (
                Transaction::new(
                    bob.address(),
                    0,
                    TxType::Delegate,
                    500,
                    Some(val.address()),
                    10,
                    TS,
                )
                .sign(&bob),
                2,
            ),
            (simple_tx(&alice, 2, TxType::Unstake, 1_000, 10), 3),
        ] {
            fees += tx.fee;
            ledger.apply_transaction(&tx, height).expect("sequence applies");
        }

        // Fees only move once the proposer is credited.
        ledger.apply_block_reward(&val.address(), 0, fees);
        assert_eq!(ledger.total_supply(), initial);

        // A mint grows supply by exactly the reward...
        ledger.apply_block_reward(&val.address(), 50, 0);
        assert_eq!(ledger.total_supply(), initial + 50);

        // ...and a burn shrinks it by exactly the slashed amount.
        let burned = ledger.slash_validator(&val.address(), Fraction::new(1, 10), "missed blocks");
        assert_eq!(ledger.total_supply(), initial + 50 - burned);

        // Maturation moves value between tables without changing the total.
        ledger.process_mature_unbonding(10);
        assert_eq!(ledger.total_supply(), initial + 50 - burned);
    }
}
