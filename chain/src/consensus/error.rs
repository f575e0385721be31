use std::fmt;

use crate::ledger::TxError;

use super::store::StorageError;

/// High-level errors surfaced by the chain driver.
///
/// The variants follow the error taxonomy of the protocol: validation and
/// protocol failures reject the offending input and leave the chain live;
/// consistency failures discard the block; a finality violation is fatal and
/// halts the driver until operator intervention; storage failures carry the
/// backend error.
#[derive(Debug)]
pub enum ChainError {
    /// Malformed input: bad address, bad signature, bad encoding.
    Validation(String),
    /// Transaction-level protocol rejection from the ledger.
    Protocol(TxError),
    /// Block does not fit the chain: height gap, prev-hash mismatch,
    /// state-root mismatch.
    Consistency { height: u64, message: String },
    /// Attempted reorganization at or below the finalized height. Fatal.
    FinalityViolation { height: u64, finalized: u64 },
    /// The driver refused the operation because a previous finality
    /// violation halted it.
    Halted,
    /// No active validator exists to propose; the chain is stalled.
    Stalled,
    /// Storage-related failure.
    Storage(StorageError),
    /// Operation requires an initialized chain (run genesis first).
    NotInitialized,
}

impl From<TxError> for ChainError {
    fn from(e: TxError) -> Self {
        ChainError::Protocol(e)
    }
}

impl From<StorageError> for ChainError {
    fn from(e: StorageError) -> Self {
        ChainError::Storage(e)
    }
}

impl fmt::Display for ChainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainError::Validation(msg) => write!(f, "invalid block: {msg}"),
            ChainError::Protocol(e) => write!(f, "transaction rejected: {e}"),
            ChainError::Consistency { height, message } => {
                write!(f, "inconsistent block at height {height}: {message}")
            }
            ChainError::FinalityViolation { height, finalized } => write!(
                f,
                "finality violation: block at height {height} conflicts with finalized height {finalized}"
            ),
            ChainError::Halted => {
                write!(f, "chain halted after a finality violation; operator intervention required")
            }
            ChainError::Stalled => write!(f, "no active validator available to propose"),
            ChainError::Storage(e) => write!(f, "{e}"),
            ChainError::NotInitialized => write!(f, "chain is not initialized; missing genesis"),
        }
    }
}

impl std::error::Error for ChainError {}
