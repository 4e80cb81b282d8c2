//! Error types for the finalizer

use ic_01_storage::StorageError;
use shared_types::TypesError;
use thiserror::Error;

/// Finalization errors. Any of them discards the whole block.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FinalizeError {
    /// The proposal does not build on the latest stored block
    #[error("Parent mismatch: proposal builds on {expected}, latest block is {found}")]
    ParentMismatch { expected: String, found: String },

    /// A proposed transaction was not supplied
    #[error("Transaction {hash} missing from finalization input")]
    MissingTransaction { hash: String },

    /// The transaction is already part of a block
    #[error("Transaction {hash} already confirmed")]
    AlreadyConfirmed { hash: String },

    #[error("Source account {address} not found")]
    SourceMissing { address: String },

    #[error("Target account {address} not found")]
    TargetMissing { address: String },

    #[error("Account {address} already exists")]
    AccountExists { address: String },

    /// Transaction checkpoint differs from the source account's
    #[error("Checkpoint mismatch for {address}")]
    CheckpointMismatch { address: String },

    #[error("Insufficient balance on {address}: {balance} < {cost}")]
    InsufficientBalance {
        address: String,
        balance: u64,
        cost: u64,
    },

    #[error("Balance overflow on {address}")]
    Overflow { address: String },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Types(#[from] TypesError),
}

/// Result type for finalization
pub type FinalizeResult<T> = Result<T, FinalizeError>;
