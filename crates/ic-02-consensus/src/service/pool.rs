//! Transaction pool
//!
//! Transactions seen by this node, in arrival order. A transaction becomes
//! *agreed* once its candidate reaches ALLCONFIRM; only agreed transactions
//! go into proposals. Finalized transactions are removed.

use parking_lot::RwLock;
use shared_types::{Hash, Transaction};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone)]
struct PoolEntry {
    tx: Transaction,
    sequence: u64,
    agreed: bool,
}

#[derive(Debug, Default)]
struct PoolInner {
    entries: HashMap<Hash, PoolEntry>,
    /// Arrival order.
    order: BTreeMap<u64, Hash>,
    next_sequence: u64,
}

/// Pending and agreed client transactions.
#[derive(Debug, Default)]
pub struct TransactionPool {
    inner: RwLock<PoolInner>,
}

impl TransactionPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if the transaction was already pooled.
    pub fn insert(&self, tx: Transaction) -> bool {
        let mut inner = self.inner.write();
        if inner.entries.contains_key(&tx.hash) {
            return false;
        }
        let sequence = inner.next_sequence;
        inner.next_sequence += 1;
        inner.order.insert(sequence, tx.hash);
        inner.entries.insert(
            tx.hash,
            PoolEntry {
                tx,
                sequence,
                agreed: false,
            },
        );
        true
    }

    pub fn get(&self, hash: &Hash) -> Option<Transaction> {
        self.inner.read().entries.get(hash).map(|e| e.tx.clone())
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.inner.read().entries.contains_key(hash)
    }

    /// Mark as eligible for proposals. `false` if not pooled.
    pub fn mark_agreed(&self, hash: &Hash) -> bool {
        match self.inner.write().entries.get_mut(hash) {
            Some(entry) => {
                entry.agreed = true;
                true
            }
            None => false,
        }
    }

    pub fn is_agreed(&self, hash: &Hash) -> bool {
        self.inner
            .read()
            .entries
            .get(hash)
            .is_some_and(|e| e.agreed)
    }

    /// Up to `limit` agreed transactions, oldest first.
    pub fn agreed(&self, limit: usize) -> Vec<Transaction> {
        let inner = self.inner.read();
        inner
            .order
            .values()
            .filter_map(|hash| inner.entries.get(hash))
            .filter(|e| e.agreed)
            .take(limit)
            .map(|e| e.tx.clone())
            .collect()
    }

    pub fn agreed_count(&self) -> usize {
        self.inner.read().entries.values().filter(|e| e.agreed).count()
    }

    pub fn remove(&self, hash: &Hash) -> Option<Transaction> {
        let mut inner = self.inner.write();
        let entry = inner.entries.remove(hash)?;
        inner.order.remove(&entry.sequence);
        Some(entry.tx)
    }

    /// Drop finalized transactions. Returns how many were pooled.
    pub fn remove_all(&self, hashes: &[Hash]) -> usize {
        hashes.iter().filter(|h| self.remove(h).is_some()).count()
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
