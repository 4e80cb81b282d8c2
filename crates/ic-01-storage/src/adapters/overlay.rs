//! Staged-write overlay shared by both transaction implementations.

use std::collections::BTreeMap;

use crate::domain::errors::{display_key, StorageError, StorageResult};
use crate::ports::outbound::{Direction, KvPair};

/// Staged writes: `Some(value)` for a put, `None` for a delete.
#[derive(Debug, Default)]
pub(crate) struct Overlay {
    staged: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl Overlay {
    /// `Some(Some(v))` staged put, `Some(None)` staged delete, `None` untouched.
    pub fn lookup(&self, key: &[u8]) -> Option<Option<Vec<u8>>> {
        self.staged.get(key).cloned()
    }

    pub fn put(&mut self, key: &[u8], value: &[u8]) {
        self.staged.insert(key.to_vec(), Some(value.to_vec()));
    }

    pub fn insert_new(&mut self, key: &[u8], value: &[u8], exists: bool) -> StorageResult<()> {
        if exists {
            return Err(StorageError::KeyExists {
                key: display_key(key),
            });
        }
        self.put(key, value);
        Ok(())
    }

    pub fn delete(&mut self, key: &[u8]) {
        self.staged.insert(key.to_vec(), None);
    }

    /// Merge committed `base` pairs (already prefix-filtered, forward order)
    /// with staged writes under `prefix`.
    pub fn merge(&self, base: Vec<KvPair>, prefix: &[u8], direction: Direction) -> Vec<KvPair> {
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = base.into_iter().collect();
        for (key, value) in self
            .staged
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
        {
            match value {
                Some(v) => {
                    merged.insert(key.clone(), v.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }
        let pairs = merged.into_iter();
        match direction {
            Direction::Forward => pairs.collect(),
            Direction::Reverse => pairs.rev().collect(),
        }
    }

    pub fn into_writes(self) -> impl Iterator<Item = (Vec<u8>, Option<Vec<u8>>)> {
        self.staged.into_iter()
    }

    pub fn len(&self) -> usize {
        self.staged.len()
    }
}
