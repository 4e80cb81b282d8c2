//! # ISAAC Test Suite
//!
//! Scenarios that need more than one crate: several validators, each with
//! its own store and runner, exchanging ballots over the in-process network.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── devnet.rs     # Harness: N runners on one MemoryNetwork
//!     └── flows.rs      # Finalization, rejection, liveness scenarios
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p isaac-tests
//! cargo test -p isaac-tests integration::flows::
//! ```

pub mod integration;
