//! # Shared Types Crate
//!
//! Primitive types and ledger entities shared by every ISAAC-Chain subsystem.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: All cross-subsystem types are defined here.
//! - **Canonical Hashing**: Every structured record is hashed through
//!   [`hashing::canonical_hash`], so `hash == H(body)` holds for ballots,
//!   transactions and blocks alike.
//! - **Network-bound Signatures**: Signatures always cover
//!   `(network_id, hash)`, never the raw body.

pub mod entities;
pub mod errors;
pub mod hashing;
pub mod keys;

pub use entities::*;
pub use errors::*;
pub use hashing::{canonical_bytes, canonical_hash, short_hex, signing_message};
pub use keys::KeyPair;
