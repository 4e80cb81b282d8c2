//! # ic-03-finalizer
//!
//! Applies an agreed round proposal to the ledger.
//!
//! ## Overview
//!
//! For every transaction of the proposal, in order:
//! - debit `fee + Σamount` from the source, checkpoint := transaction hash
//! - apply each operation (`CreateAccount`, `Payment`)
//! - write the block transaction, its operations and a history entry
//!
//! then write the block itself. All of it happens inside one storage
//! transaction:
//!
//! ```text
//! open_transaction ──► apply every tx ──► save block ──► commit
//!        │                    │                │
//!        └────────────────────┴──── error ─────┴──► discard (nothing visible)
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use ic_03_finalizer::{init_genesis, Finalizer};
//!
//! init_genesis(store.as_ref(), &genesis_address, 1_000_000)?;
//! let finalizer = Finalizer::new(store, telemetry);
//! let block = finalizer.finish_ballot(&proposal, &transactions)?;
//! ```

pub mod domain;
pub mod error;
pub mod service;

pub use domain::{apply_block, apply_create_account, apply_payment, finish_transaction};
pub use error::{FinalizeError, FinalizeResult};
pub use service::{genesis_block, init_genesis, Finalizer};
