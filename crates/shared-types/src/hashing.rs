//! Canonical encoding and hashing.
//!
//! Records are encoded with bincode (fixed field order, fixed-width
//! little-endian integers) before hashing with SHA-256. Two values with equal
//! bodies always produce equal hashes; any field change changes the hash.

use crate::{Hash, TypesError, TypesResult};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Deterministic byte encoding of a record.
pub fn canonical_bytes<T: Serialize>(value: &T) -> TypesResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| TypesError::Encoding(e.to_string()))
}

/// SHA-256 over the canonical encoding of `value`.
pub fn canonical_hash<T: Serialize>(value: &T) -> TypesResult<Hash> {
    let bytes = canonical_bytes(value)?;
    Ok(Sha256::digest(&bytes).into())
}

/// Message covered by a signature: `network_id || hash`.
pub fn signing_message(network_id: &[u8], hash: &Hash) -> Vec<u8> {
    let mut message = Vec::with_capacity(network_id.len() + hash.len());
    message.extend_from_slice(network_id);
    message.extend_from_slice(hash);
    message
}

/// First eight bytes of a hash as hex, for log fields.
pub fn short_hex(bytes: &[u8]) -> String {
    hex::encode(&bytes[..bytes.len().min(8)])
}
