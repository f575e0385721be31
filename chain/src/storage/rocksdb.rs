//! RocksDB-backed chain store.
//!
//! This implementation persists the chain in a RocksDB instance with
//! dedicated column families:
//!
//! - `"blocks"`:  `block:<decimal height>` -> canonical JSON of the block,
//!   plus the `meta:blockchain` metadata slot;
//! - `"indexes"`: `hash:<hex block hash>` -> decimal height;
//! - `"state"`:   the `state:current` snapshot slot and
//!   `checkpoint:<name>` references.
//!
//! The block record and its hash index are written through a single
//! `WriteBatch`, which is what makes the save-block pair atomic.

use std::{path::Path, sync::Arc};

use rocksdb::{BoundColumnFamily, ColumnFamilyDescriptor, DB, Options, WriteBatch};
use serde_json::json;

use crate::consensus::store::{ChainMetadata, ChainStore, StorageError};
use crate::ledger::LedgerSnapshot;
use crate::types::{Block, Hash256};

/// Configuration for [`RocksDbStore`].
#[derive(Clone, Debug)]
pub struct RocksDbConfig {
    /// Filesystem path to the RocksDB database directory.
    pub path: String,
    /// Whether to create the database and missing column families if they
    /// do not yet exist.
    pub create_if_missing: bool,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        RocksDbConfig {
            path: "data/chain-db".to_string(),
            create_if_missing: true,
        }
    }
}

impl From<rocksdb::Error> for StorageError {
    fn from(e: rocksdb::Error) -> Self {
        StorageError::Backend(e.to_string())
    }
}

/// RocksDB-backed implementation of [`ChainStore`].
pub struct RocksDbStore {
    db: DB,
}

impl RocksDbStore {
    /// Opens (or creates) a RocksDB-backed store at the given path.
    ///
    /// This sets up the `"blocks"`, `"indexes"` and `"state"` column
    /// families. The `"default"` column family is also created to keep
    /// RocksDB happy, but it is not currently used.
    pub fn open(cfg: &RocksDbConfig) -> Result<Self, StorageError> {
        let path = Path::new(&cfg.path);

        let mut opts = Options::default();
        opts.create_if_missing(cfg.create_if_missing);
        opts.create_missing_column_families(cfg.create_if_missing);

        let cfs = vec![
            ColumnFamilyDescriptor::new("default", Options::default()),
            ColumnFamilyDescriptor::new("blocks", Options::default()),
            ColumnFamilyDescriptor::new("indexes", Options::default()),
            ColumnFamilyDescriptor::new("state", Options::default()),
        ];

        let db = DB::open_cf_descriptors(&opts, path, cfs)?;
        Ok(RocksDbStore { db })
    }

    fn cf(&self, name: &'static str) -> Result<Arc<BoundColumnFamily<'_>>, StorageError> {
        self.db
            .cf_handle(name)
            .ok_or(StorageError::MissingColumnFamily(name))
    }

    fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, StorageError> {
        serde_json::to_vec(value).map_err(|e| StorageError::Codec(e.to_string()))
    }

    fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
        serde_json::from_slice(bytes).map_err(|e| StorageError::Codec(e.to_string()))
    }

    fn block_key(height: u64) -> Vec<u8> {
        format!("block:{height}").into_bytes()
    }

    fn hash_key(hash: &Hash256) -> Vec<u8> {
        format!("hash:{hash}").into_bytes()
    }
}

impl ChainStore for RocksDbStore {
    fn save_block(&mut self, block: &Block) -> Result<(), StorageError> {
        let cf_blocks = self.cf("blocks")?;
        let cf_indexes = self.cf("indexes")?;

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_blocks, Self::block_key(block.height), Self::encode(block)?);
        batch.put_cf(
            &cf_indexes,
            Self::hash_key(&block.hash),
            block.height.to_string().into_bytes(),
        );
        // One batch: the block record and its hash index commit together.
        self.db.write(batch)?;
        Ok(())
    }

    fn load_block(&self, height: u64) -> Result<Option<Block>, StorageError> {
        let cf = self.cf("blocks")?;
        match self.db.get_cf(&cf, Self::block_key(height))? {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn load_block_by_hash(&self, hash: &Hash256) -> Result<Option<Block>, StorageError> {
        let cf = self.cf("indexes")?;
        match self.db.get_cf(&cf, Self::hash_key(hash))? {
            Some(bytes) => {
                let text = String::from_utf8(bytes)
                    .map_err(|_| StorageError::CorruptedMeta("hash index not utf-8"))?;
                let height: u64 = text
                    .parse()
                    .map_err(|_| StorageError::CorruptedMeta("hash index not a height"))?;
                self.load_block(height)
            }
            None => Ok(None),
        }
    }

    fn save_state(&mut self, snapshot: &LedgerSnapshot) -> Result<(), StorageError> {
        let cf = self.cf("state")?;
        self.db
            .put_cf(&cf, b"state:current", Self::encode(snapshot)?)?;
        Ok(())
    }

    fn load_state(&self) -> Result<Option<LedgerSnapshot>, StorageError> {
        let cf = self.cf("state")?;
        match self.db.get_cf(&cf, b"state:current")? {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn save_metadata(&mut self, metadata: &ChainMetadata) -> Result<(), StorageError> {
        let cf = self.cf("blocks")?;
        self.db
            .put_cf(&cf, b"meta:blockchain", Self::encode(metadata)?)?;
        Ok(())
    }

    fn load_metadata(&self) -> Result<Option<ChainMetadata>, StorageError> {
        let cf = self.cf("blocks")?;
        match self.db.get_cf(&cf, b"meta:blockchain")? {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn create_checkpoint(&mut self, name: &str, height: u64) -> Result<(), StorageError> {
        let cf = self.cf("state")?;
        let key = format!("checkpoint:{name}").into_bytes();
        let value = json!({
            "name": name,
            "height": height,
            "state_key": "state:current",
        });
        self.db.put_cf(&cf, key, Self::encode(&value)?)?;
        tracing::info!(name, height, "created state checkpoint");
        Ok(())
    }
}
