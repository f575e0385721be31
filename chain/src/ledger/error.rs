//! Error kinds produced by transaction application.

use std::fmt;

use crate::types::{Address, Fraction, Hash256};

/// Reason a transaction was rejected by the ledger.
///
/// These are protocol-level rejections, returned as values and reported to
/// the submitter; none of them leaves the ledger in a modified state.
#[derive(Debug, Clone, PartialEq)]
pub enum TxError {
    /// Signature missing, malformed, not matching the payload, or the
    /// signing key does not own the claimed sender address.
    InvalidSignature { txid: Hash256 },
    /// Transaction nonce does not equal the sender's account nonce.
    NonceMismatch {
        sender: Address,
        expected: u64,
        got: u64,
    },
    /// Sender balance cannot cover the required amount.
    InsufficientBalance {
        address: Address,
        required: u64,
        available: u64,
    },
    /// Staked or delegated amount cannot cover the requested release.
    InsufficientStake {
        address: Address,
        required: u64,
        available: u64,
    },
    /// Operation requires a recipient and none was provided.
    MissingRecipient(&'static str),
    /// Referenced validator does not exist in the registry.
    UnknownValidator { address: Address },
    /// CREATE_VALIDATOR for an address that is already a validator.
    DuplicateValidator { address: Address },
    /// Commission rate outside `[0, 1]` or malformed in the data map.
    InvalidCommission { rate: Fraction },
    /// Any other protocol rule violation (zero amounts, stake-unit
    /// mismatches, votes submitted as transactions, ...).
    PolicyViolation(String),
}

impl fmt::Display for TxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxError::InvalidSignature { txid } => {
                write!(f, "invalid signature for tx {txid}")
            }
            TxError::NonceMismatch {
                sender,
                expected,
                got,
            } => write!(f, "invalid nonce for {sender}: expected {expected}, got {got}"),
            TxError::InsufficientBalance {
                address,
                required,
                available,
            } => write!(
                f,
                "insufficient balance for {address}: required {required}, available {available}"
            ),
            TxError::InsufficientStake {
                address,
                required,
                available,
            } => write!(
                f,
                "insufficient stake for {address}: required {required}, available {available}"
            ),
            TxError::MissingRecipient(op) => write!(f, "{op} requires a recipient"),
            TxError::UnknownValidator { address } => {
                write!(f, "validator not found: {address}")
            }
            TxError::DuplicateValidator { address } => {
                write!(f, "validator already exists: {address}")
            }
            TxError::InvalidCommission { rate } => {
                write!(f, "commission rate {rate} must lie between 0 and 1")
            }
            TxError::PolicyViolation(msg) => write!(f, "policy violation: {msg}"),
        }
    }
}

impl std::error::Error for TxError {}
