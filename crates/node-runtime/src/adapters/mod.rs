//! # Adapters
//!
//! - `memory_network`: in-process transport shared by devnet nodes and tests
//! - `ledger`: store selection and the storage-backed account reader

pub mod ledger;
pub mod memory_network;

pub use ledger::{open_store, StorageAccountReader};
pub use memory_network::{MemoryNetwork, MemoryTransport};
