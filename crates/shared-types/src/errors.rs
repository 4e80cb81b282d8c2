//! # Error Types
//!
//! Errors raised while building, encoding or verifying shared entities.

use thiserror::Error;

/// Errors produced by primitives in this crate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypesError {
    /// Canonical encoding of a record failed.
    #[error("Encoding failed: {0}")]
    Encoding(String),

    /// Stored hash does not match the hash of the body.
    #[error("Hash mismatch: expected {expected}, computed {computed}")]
    HashMismatch { expected: String, computed: String },

    /// Signature does not verify against the claimed key.
    #[error("Invalid signature from {0}")]
    InvalidSignature(String),

    /// Bytes are not a valid ed25519 public key.
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    /// Hex string could not be decoded to the expected length.
    #[error("Invalid hex for {what}: {reason}")]
    InvalidHex { what: &'static str, reason: String },
}

/// Result alias for this crate.
pub type TypesResult<T> = Result<T, TypesError>;
