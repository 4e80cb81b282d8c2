//! Ledger mutations applied inside one storage transaction.

pub mod apply;

pub use apply::{apply_block, apply_create_account, apply_payment, finish_transaction};
