//! In-memory chain store.
//!
//! This implementation is useful for unit tests, benchmarks, and small
//! devnets. It keeps blocks in a `BTreeMap` keyed by height, a hash index
//! alongside, and single slots for the state snapshot and chain metadata.

use std::collections::{BTreeMap, HashMap};

use crate::consensus::store::{ChainMetadata, ChainStore, StorageError};
use crate::ledger::LedgerSnapshot;
use crate::types::{Block, Hash256};

/// In-memory implementation of [`ChainStore`].
#[derive(Clone, Debug, Default)]
pub struct InMemoryStore {
    blocks: BTreeMap<u64, Block>,
    hash_index: HashMap<Hash256, u64>,
    state: Option<LedgerSnapshot>,
    metadata: Option<ChainMetadata>,
    checkpoints: BTreeMap<String, u64>,
}

impl InMemoryStore {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        InMemoryStore::default()
    }

    /// Returns the number of blocks currently stored.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Returns `true` if no blocks are stored.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Returns the height a checkpoint was taken at, if present.
    pub fn checkpoint(&self, name: &str) -> Option<u64> {
        self.checkpoints.get(name).copied()
    }
}

impl ChainStore for InMemoryStore {
    fn save_block(&mut self, block: &Block) -> Result<(), StorageError> {
        // Both writes land in one mutation; the pair is trivially atomic.
        self.blocks.insert(block.height, block.clone());
        self.hash_index.insert(block.hash, block.height);
        Ok(())
    }

    fn load_block(&self, height: u64) -> Result<Option<Block>, StorageError> {
        Ok(self.blocks.get(&height).cloned())
    }

    fn load_block_by_hash(&self, hash: &Hash256) -> Result<Option<Block>, StorageError> {
        match self.hash_index.get(hash) {
            Some(height) => self.load_block(*height),
            None => Ok(None),
        }
    }

    fn save_state(&mut self, snapshot: &LedgerSnapshot) -> Result<(), StorageError> {
        self.state = Some(snapshot.clone());
        Ok(())
    }

    fn load_state(&self) -> Result<Option<LedgerSnapshot>, StorageError> {
        Ok(self.state.clone())
    }

    fn save_metadata(&mut self, metadata: &ChainMetadata) -> Result<(), StorageError> {
        self.metadata = Some(metadata.clone());
        Ok(())
    }

    fn load_metadata(&self) -> Result<Option<ChainMetadata>, StorageError> {
        Ok(self.metadata.clone())
    }

    fn create_checkpoint(&mut self, name: &str, height: u64) -> Result<(), StorageError> {
        self.checkpoints.insert(name.to_string(), height);
        Ok(())
    }
}
