//! Storage backends for the chain.
//!
//! This module provides concrete implementations of the
//! [`crate::consensus::store::ChainStore`] trait, including:
//!
//! - an in-memory store ([`mem::InMemoryStore`]) suitable for tests,
//! - a RocksDB-backed store ([`rocksdb::RocksDbStore`]) for persistent
//!   validator nodes.

pub mod mem;
pub mod rocksdb;

pub use mem::InMemoryStore;
pub use rocksdb::{RocksDbConfig, RocksDbStore};
