//! Pending-transaction pool.
//!
//! The mempool is the one structure touched by multiple contexts: submitters
//! add transactions while the driver selects batches for block assembly. It
//! is a mutex-protected FIFO with a txid set alongside for duplicate
//! suppression; adding is O(1), selecting the head batch is O(k).

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

use crate::types::{Hash256, Transaction};

#[derive(Debug, Default)]
struct MempoolInner {
    queue: VecDeque<Transaction>,
    seen: HashSet<Hash256>,
}

/// Mutex-protected FIFO of pending transactions.
#[derive(Debug, Default)]
pub struct Mempool {
    inner: Mutex<MempoolInner>,
}

impl Mempool {
    /// Creates an empty mempool.
    pub fn new() -> Self {
        Mempool::default()
    }

    /// Appends a transaction.
    ///
    /// Duplicates (by txid) are silently dropped and reported as `false`.
    /// Signature verification happens before admission, in the driver.
    pub fn add(&self, tx: Transaction) -> bool {
        let txid = tx.txid();
        let mut inner = self.inner.lock().expect("mempool mutex poisoned");
        if !inner.seen.insert(txid) {
            return false;
        }
        inner.queue.push_back(tx);
        true
    }

    /// Returns up to `max_txs` transactions from the head, in FIFO order.
    ///
    /// Non-destructive: entries stay queued until [`Mempool::remove`] is
    /// called with the txids of a committed block, so a rejected block does
    /// not lose its transactions.
    pub fn select_for_block(&self, max_txs: usize) -> Vec<Transaction> {
        let inner = self.inner.lock().expect("mempool mutex poisoned");
        inner.queue.iter().take(max_txs).cloned().collect()
    }

    /// Removes committed transactions from the queue and the dedup set.
    ///
    /// Dropping the txid from the dedup set is what lets a later replay
    /// reach the ledger and fail there with a nonce mismatch instead of
    /// being silently absorbed here.
    pub fn remove(&self, txids: &[Hash256]) {
        let mut inner = self.inner.lock().expect("mempool mutex poisoned");
        let drop: HashSet<Hash256> = txids.iter().copied().collect();
        inner.queue.retain(|tx| !drop.contains(&tx.txid()));
        for txid in &drop {
            inner.seen.remove(txid);
        }
    }

    /// Number of pending transactions.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("mempool mutex poisoned").queue.len()
    }

    /// Returns `true` when nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
