//! Ledger adapters
//!
//! Opens the configured store and exposes persisted accounts to the
//! consensus engine through its [`AccountReader`] port.

use ic_01_storage::{repository as repo, KeyValueStore, MemoryStore};
use ic_02_consensus::AccountReader;
use shared_types::{Account, Address};
use std::sync::Arc;

use crate::config::{ConfigError, StorageBackend, StorageConfig};
use crate::error::RuntimeResult;

/// Open the store for node `label`. RocksDB stores live under
/// `data_dir/<label>`.
#[cfg_attr(not(feature = "rocksdb"), allow(unused_variables))]
pub fn open_store(config: &StorageConfig, label: &str) -> RuntimeResult<Arc<dyn KeyValueStore>> {
    match config.backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        #[cfg(feature = "rocksdb")]
        StorageBackend::Rocksdb => {
            let path = config.data_dir.join(label);
            Ok(Arc::new(ic_01_storage::RocksDbStore::open_default(path)?))
        }
        #[cfg(not(feature = "rocksdb"))]
        StorageBackend::Rocksdb => Err(ConfigError::BackendUnavailable("rocksdb").into()),
    }
}

/// Account reader over committed ledger state.
#[derive(Clone)]
pub struct StorageAccountReader {
    store: Arc<dyn KeyValueStore>,
}

impl StorageAccountReader {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }
}

impl AccountReader for StorageAccountReader {
    fn get_account(&self, address: &Address) -> Result<Option<Account>, String> {
        repo::get_account(self.store.as_ref(), address).map_err(|e| e.to_string())
    }
}
