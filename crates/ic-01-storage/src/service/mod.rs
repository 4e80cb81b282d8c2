//! Typed access to ledger records.

pub mod repository;
