//! # Domain Errors
//!
//! Error types for the ledger storage layer.

use thiserror::Error;

/// Errors that can occur during storage operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// `insert_new` on a key that already exists.
    #[error("Key already exists: {key}")]
    KeyExists { key: String },

    /// A block with this hash is already stored.
    #[error("Block already exists: {hash}")]
    BlockExists { hash: String },

    /// A record an index points to is missing.
    #[error("Dangling index {index} -> {key}")]
    DanglingIndex { index: String, key: String },

    /// Backend I/O error.
    #[error("Database error: {message}")]
    DatabaseError { message: String },

    /// JSON encoding or decoding failed.
    #[error("Serialization error: {message}")]
    SerializationError { message: String },

    /// The transaction was already committed or discarded.
    #[error("Transaction closed")]
    TransactionClosed,
}

impl StorageError {
    pub fn database(e: impl std::fmt::Display) -> Self {
        StorageError::DatabaseError {
            message: e.to_string(),
        }
    }

    pub fn serialization(e: impl std::fmt::Display) -> Self {
        StorageError::SerializationError {
            message: e.to_string(),
        }
    }
}

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Printable form of a raw key: ascii prefix up to the first non-printable
/// byte, hex for the rest.
pub fn display_key(key: &[u8]) -> String {
    let split = key
        .iter()
        .position(|b| !(b.is_ascii_alphanumeric() || *b == b'-'))
        .unwrap_or(key.len());
    let (prefix, rest) = key.split_at(split);
    format!("{}{}", String::from_utf8_lossy(prefix), hex::encode(rest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_key() {
        assert_eq!(display_key(b"ba-"), "ba-");
        assert_eq!(display_key(&[b'b', b'k', b'-', 0xff, 0x01]), "bk-ff01");
    }
}
