//! Store adapters.

pub mod memory;
#[cfg(feature = "rocksdb")]
pub mod rocksdb;

mod overlay;
