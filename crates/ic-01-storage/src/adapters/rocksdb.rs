//! # RocksDB Storage Adapter
//!
//! Production implementation of the [`KeyValueStore`] port.
//!
//! ## Features
//!
//! - Atomic commits via `WriteBatch`
//! - Snappy compression
//! - Bloom filters for point lookups
//! - Optional fsync per write
//!
//! Transactions stage writes in memory and turn them into a single
//! `WriteBatch` on commit.

use parking_lot::RwLock;
use rocksdb::{IteratorMode, Options, WriteBatch, WriteOptions, DB};
use std::path::Path;
use std::sync::Arc;

use super::overlay::Overlay;
use crate::domain::errors::{display_key, StorageError, StorageResult};
use crate::ports::outbound::{
    Direction, KeyValueStore, KvPair, KvRead, StoreTransaction, StoreWrite,
};

/// RocksDB configuration
#[derive(Debug, Clone)]
pub struct RocksDbConfig {
    /// Path to the database directory
    pub path: String,
    /// Block cache size in bytes (default: 64MB)
    pub block_cache_size: usize,
    /// Write buffer size in bytes (default: 32MB)
    pub write_buffer_size: usize,
    /// Maximum number of write buffers (default: 3)
    pub max_write_buffer_number: i32,
    /// Enable fsync after each write (default: true for durability)
    pub sync_writes: bool,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            path: "./data/isaac".to_string(),
            block_cache_size: 64 * 1024 * 1024,
            write_buffer_size: 32 * 1024 * 1024,
            max_write_buffer_number: 3,
            sync_writes: true,
        }
    }
}

impl RocksDbConfig {
    /// Create config for testing (smaller buffers, no sync)
    pub fn for_testing(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            block_cache_size: 8 * 1024 * 1024,
            write_buffer_size: 4 * 1024 * 1024,
            max_write_buffer_number: 2,
            sync_writes: false,
        }
    }
}

/// RocksDB-backed key/value store
pub struct RocksDbStore {
    db: Arc<RwLock<DB>>,
    config: RocksDbConfig,
}

impl RocksDbStore {
    /// Open or create a RocksDB database
    pub fn open(config: RocksDbConfig) -> StorageResult<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);

        opts.set_write_buffer_size(config.write_buffer_size);
        opts.set_max_write_buffer_number(config.max_write_buffer_number);
        opts.set_compression_type(rocksdb::DBCompressionType::Snappy);

        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        block_opts.set_block_cache(&rocksdb::Cache::new_lru_cache(config.block_cache_size));
        opts.set_block_based_table_factory(&block_opts);

        let db = DB::open(&opts, &config.path)
            .map_err(|e| StorageError::database(format!("Failed to open RocksDB: {}", e)))?;

        tracing::info!(path = %config.path, "RocksDB store opened");

        Ok(Self {
            db: Arc::new(RwLock::new(db)),
            config,
        })
    }

    /// Open with default tuning at `path`
    pub fn open_default(path: impl AsRef<Path>) -> StorageResult<Self> {
        Self::open(RocksDbConfig {
            path: path.as_ref().to_string_lossy().to_string(),
            ..Default::default()
        })
    }

    fn write_options(&self) -> WriteOptions {
        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        write_opts
    }

    fn scan(&self, prefix: &[u8]) -> StorageResult<Vec<KvPair>> {
        let db = self.db.read();
        let mut results = Vec::new();
        let iter = db.iterator(IteratorMode::From(prefix, rocksdb::Direction::Forward));
        for item in iter {
            let (key, value) =
                item.map_err(|e| StorageError::database(format!("RocksDB scan failed: {}", e)))?;
            if !key.starts_with(prefix) {
                break;
            }
            results.push((key.to_vec(), value.to_vec()));
        }
        Ok(results)
    }
}

impl KvRead for RocksDbStore {
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        self.db
            .read()
            .get(key)
            .map_err(|e| StorageError::database(format!("RocksDB get failed: {}", e)))
    }

    fn has(&self, key: &[u8]) -> StorageResult<bool> {
        self.db
            .read()
            .get_pinned(key)
            .map(|v| v.is_some())
            .map_err(|e| StorageError::database(format!("RocksDB exists check failed: {}", e)))
    }

    fn iterate(&self, prefix: &[u8], direction: Direction) -> StorageResult<Vec<KvPair>> {
        let mut pairs = self.scan(prefix)?;
        if direction == Direction::Reverse {
            pairs.reverse();
        }
        Ok(pairs)
    }
}

impl KeyValueStore for RocksDbStore {
    fn set(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        let db = self.db.write();
        db.put_opt(key, value, &self.write_options())
            .map_err(|e| StorageError::database(format!("RocksDB put failed: {}", e)))
    }

    fn insert_new(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        // Holding the write lock makes the check-then-put atomic.
        let db = self.db.write();
        let exists = db
            .get_pinned(key)
            .map_err(|e| StorageError::database(format!("RocksDB get failed: {}", e)))?
            .is_some();
        if exists {
            return Err(StorageError::KeyExists {
                key: display_key(key),
            });
        }
        db.put_opt(key, value, &self.write_options())
            .map_err(|e| StorageError::database(format!("RocksDB put failed: {}", e)))
    }

    fn delete(&self, key: &[u8]) -> StorageResult<()> {
        let db = self.db.write();
        db.delete_opt(key, &self.write_options())
            .map_err(|e| StorageError::database(format!("RocksDB delete failed: {}", e)))
    }

    fn open_transaction(&self) -> StorageResult<Box<dyn StoreTransaction + '_>> {
        Ok(Box::new(RocksDbTransaction {
            store: self,
            overlay: Overlay::default(),
        }))
    }
}

/// Transaction over a [`RocksDbStore`].
pub struct RocksDbTransaction<'a> {
    store: &'a RocksDbStore,
    overlay: Overlay,
}

impl KvRead for RocksDbTransaction<'_> {
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        match self.overlay.lookup(key) {
            Some(staged) => Ok(staged),
            None => self.store.get(key),
        }
    }

    fn iterate(&self, prefix: &[u8], direction: Direction) -> StorageResult<Vec<KvPair>> {
        let base = self.store.scan(prefix)?;
        Ok(self.overlay.merge(base, prefix, direction))
    }
}

impl StoreWrite for RocksDbTransaction<'_> {
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

impl StoreTransaction for RocksDbTransaction<'_> {
    fn commit(self: Box<Self>) -> StorageResult<()> {
        let mut batch = WriteBatch::default();
        for (key, value) in self.overlay.into_writes() {
            match value {
                Some(v) => batch.put(&key, &v),
                None => batch.delete(&key),
            }
        }
        let write_opts = self.store.write_options();
        let db = self.store.db.write();
        db.write_opt(batch, &write_opts)
            .map_err(|e| StorageError::database(format!("RocksDB batch write failed: {}", e)))
    }

    fn discard(self: Box<Self>) {
        tracing::trace!(staged = self.overlay.len(), "rocksdb transaction discarded");
    }
}
