//! Storage abstraction used by the chain driver.
//!
//! Implementations can be backed by in-memory maps or RocksDB. The driver
//! commits in a fixed order (block, then state, then metadata) and relies on
//! [`ChainStore::save_block`] writing the block record and its hash index
//! atomically as a pair.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ledger::LedgerSnapshot;
use crate::types::{Block, Hash256};

/// Chain-level metadata, persisted last on every commit.
///
/// The metadata height is the commit marker: a block persisted beyond it is
/// a torn write from a crash and gets replayed on startup.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChainMetadata {
    pub height: u64,
    pub latest_hash: Hash256,
    pub genesis_time: Option<u64>,
}

/// Storage-level error type.
#[derive(Debug)]
pub enum StorageError {
    /// Underlying backend failure (I/O, database error).
    Backend(String),
    /// Stored bytes failed to decode.
    Codec(String),
    /// Required column family was not found.
    MissingColumnFamily(&'static str),
    /// Corrupted or malformed metadata.
    CorruptedMeta(&'static str),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Backend(msg) => write!(f, "storage backend error: {msg}"),
            StorageError::Codec(msg) => write!(f, "storage codec error: {msg}"),
            StorageError::MissingColumnFamily(cf) => {
                write!(f, "missing column family: {cf}")
            }
            StorageError::CorruptedMeta(what) => write!(f, "corrupted metadata: {what}"),
        }
    }
}

impl std::error::Error for StorageError {}

/// Abstract persistent store for blocks, state and chain metadata.
pub trait ChainStore {
    /// Persists a block under its height and indexes its hash.
    ///
    /// The two writes are atomic as a pair: either both apply or neither.
    fn save_block(&mut self, block: &Block) -> Result<(), StorageError>;

    /// Loads a block by height, if present.
    fn load_block(&self, height: u64) -> Result<Option<Block>, StorageError>;

    /// Loads a block by hash, if present.
    fn load_block_by_hash(&self, hash: &Hash256) -> Result<Option<Block>, StorageError>;

    /// Persists the latest ledger snapshot (single slot).
    fn save_state(&mut self, snapshot: &LedgerSnapshot) -> Result<(), StorageError>;

    /// Loads the latest ledger snapshot, if present.
    fn load_state(&self) -> Result<Option<LedgerSnapshot>, StorageError>;

    /// Persists the chain metadata (single slot, written last on commit).
    fn save_metadata(&mut self, metadata: &ChainMetadata) -> Result<(), StorageError>;

    /// Loads the chain metadata, if present.
    fn load_metadata(&self) -> Result<Option<ChainMetadata>, StorageError>;

    /// Records a named copy-on-write reference to the current state.
    fn create_checkpoint(&mut self, name: &str, height: u64) -> Result<(), StorageError>;
}
