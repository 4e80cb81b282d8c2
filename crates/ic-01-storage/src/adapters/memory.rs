//! In-memory store.
//!
//! Ordered by key (`BTreeMap`) so prefix iteration matches the RocksDB
//! adapter. Commits apply the whole overlay under one write lock.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::overlay::Overlay;
use crate::domain::errors::{display_key, StorageError, StorageResult};
use crate::ports::outbound::{
    Direction, KeyValueStore, KvPair, KvRead, StoreTransaction, StoreWrite,
};

type Map = BTreeMap<Vec<u8>, Vec<u8>>;

fn scan(map: &Map, prefix: &[u8]) -> Vec<KvPair> {
    map.range(prefix.to_vec()..)
        .take_while(|(k, _)| k.starts_with(prefix))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// In-memory key/value store. Clones share the same data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    data: Arc<RwLock<Map>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

impl KvRead for MemoryStore {
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.data.read().get(key).cloned())
    }

    fn iterate(&self, prefix: &[u8], direction: Direction) -> StorageResult<Vec<KvPair>> {
        let mut pairs = scan(&self.data.read(), prefix);
        if direction == Direction::Reverse {
            pairs.reverse();
        }
        Ok(pairs)
    }
}

impl KeyValueStore for MemoryStore {
    fn set(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.data.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn insert_new(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        let mut data = self.data.write();
        if data.contains_key(key) {
            return Err(StorageError::KeyExists {
                key: display_key(key),
            });
        }
        data.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> StorageResult<()> {
        self.data.write().remove(key);
        Ok(())
    }

    fn open_transaction(&self) -> StorageResult<Box<dyn StoreTransaction + '_>> {
        Ok(Box::new(MemoryTransaction {
            store: self,
            overlay: Overlay::default(),
        }))
    }
}

/// Transaction over a [`MemoryStore`].
pub struct MemoryTransaction<'a> {
    store: &'a MemoryStore,
    overlay: Overlay,
}

impl KvRead for MemoryTransaction<'_> {
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        match self.overlay.lookup(key) {
            Some(staged) => Ok(staged),
            None => self.store.get(key),
        }
    }

    fn iterate(&self, prefix: &[u8], direction: Direction) -> StorageResult<Vec<KvPair>> {
        let base = scan(&self.store.data.read(), prefix);
        Ok(self.overlay.merge(base, prefix, direction))
    }
}

impl StoreWrite for MemoryTransaction<'_> {
    fn set(&mut self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.overlay.put(key, value);
        Ok(())
    }

    fn insert_new(&mut self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        let exists = self.has(key)?;
        self.overlay.insert_new(key, value, exists)
    }

    fn delete(&mut self, key: &[u8]) -> StorageResult<()> {
        self.overlay.delete(key);
        Ok(())
    }
}

impl StoreTransaction for MemoryTransaction<'_> {
    fn commit(self: Box<Self>) -> StorageResult<()> {
        let staged = self.overlay.len();
        let mut data = self.store.data.write();
        for (key, value) in self.overlay.into_writes() {
            match value {
                Some(v) => {
                    data.insert(key, v);
                }
                None => {
                    data.remove(&key);
                }
            }
        }
        tracing::trace!(staged, "memory transaction committed");
        Ok(())
    }

    fn discard(self: Box<Self>) {
        tracing::trace!(staged = self.overlay.len(), "memory transaction discarded");
    }
}
