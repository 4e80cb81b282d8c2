//! Adapters for the ISAAC engine ports

pub mod memory_accounts;

pub use memory_accounts::MemoryAccounts;
