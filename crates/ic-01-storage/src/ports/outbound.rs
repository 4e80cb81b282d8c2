//! # Outbound Ports (Driven Ports)
//!
//! The ordered key/value store the ledger is persisted in.
//!
//! Production: `RocksDbStore` (feature `rocksdb`)
//! Testing: `MemoryStore`

use crate::domain::errors::StorageResult;

/// A key/value pair returned by iteration.
pub type KvPair = (Vec<u8>, Vec<u8>);

/// Iteration order over a key prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Forward,
    Reverse,
}

/// Read access shared by the store and its transactions.
pub trait KvRead {
    /// Get a value by key.
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;

    /// Check if a key exists.
    fn has(&self, key: &[u8]) -> StorageResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// All pairs whose key starts with `prefix`, ordered by key.
    fn iterate(&self, prefix: &[u8], direction: Direction) -> StorageResult<Vec<KvPair>>;
}

/// Write access inside a transaction.
pub trait StoreWrite: KvRead {
    /// Put a key/value pair, overwriting any existing value.
    fn set(&mut self, key: &[u8], value: &[u8]) -> StorageResult<()>;

    /// Insert-only put. Fails with `KeyExists` if the key is present.
    fn insert_new(&mut self, key: &[u8], value: &[u8]) -> StorageResult<()>;

    /// Delete a key. Deleting a missing key is not an error.
    fn delete(&mut self, key: &[u8]) -> StorageResult<()>;
}

/// An atomic unit of writes.
///
/// ## Atomicity Guarantee
///
/// Either ALL staged writes become visible on `commit`, or NONE do.
/// Dropping a transaction without committing discards it.
pub trait StoreTransaction: StoreWrite {
    /// Apply every staged write at once.
    fn commit(self: Box<Self>) -> StorageResult<()>;

    /// Drop every staged write.
    fn discard(self: Box<Self>);
}

/// The store itself, shared between tasks.
pub trait KeyValueStore: KvRead + Send + Sync {
    /// Put a single key/value pair.
    fn set(&self, key: &[u8], value: &[u8]) -> StorageResult<()>;

    /// Insert-only put. Fails with `KeyExists` if the key is present.
    fn insert_new(&self, key: &[u8], value: &[u8]) -> StorageResult<()>;

    /// Delete a key.
    fn delete(&self, key: &[u8]) -> StorageResult<()>;

    /// Begin an atomic transaction.
    fn open_transaction(&self) -> StorageResult<Box<dyn StoreTransaction + '_>>;
}
