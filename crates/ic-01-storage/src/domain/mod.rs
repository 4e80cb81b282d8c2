//! Storage domain: errors and key conventions.

pub mod errors;
pub mod keys;
