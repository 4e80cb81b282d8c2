//! # Ledger Storage (ic-01)
//!
//! Persistence port used by the finalizer and the account reader.
//!
//! ## Port
//!
//! An ordered key/value store with:
//! - `get` / `has` / ordered prefix iteration (forward or reverse)
//! - `set` / `insert_new` (insert-only) / `delete`
//! - atomic transactions: `open_transaction` → `commit` | `discard`
//!
//! Reads inside a transaction see the transaction's own staged writes.
//! Nothing staged is visible to other readers until `commit`.
//!
//! ## Key Layout
//!
//! | Prefix | Record |
//! |--------|--------|
//! | `bk-` | Block, by hash and by confirmed height |
//! | `bt-` | BlockTransaction, by hash, confirmed order, created order, source |
//! | `ba-` | Account (block account), by address |
//! | `bo-` | BlockOperation, by hash and by transaction |
//! | `th-` | TransactionHistory, by hash and created order |
//!
//! Values are JSON. Order components are big-endian so byte order matches
//! numeric order.
//!
//! ## Crate Structure (Hexagonal Architecture)
//!
//! - `domain/` - errors and key builders
//! - `ports/` - store traits
//! - `adapters/` - in-memory store, RocksDB store (feature `rocksdb`)
//! - `service/` - typed repositories over the port

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

pub use adapters::memory::MemoryStore;
#[cfg(feature = "rocksdb")]
pub use adapters::rocksdb::{RocksDbConfig, RocksDbStore};
pub use domain::errors::{StorageError, StorageResult};
pub use ports::outbound::{Direction, KeyValueStore, KvPair, KvRead, StoreTransaction, StoreWrite};
pub use service::repository;
