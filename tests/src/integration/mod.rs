//! Cross-crate validator scenarios.

pub mod devnet;
mod flows;

pub use devnet::{fast_config, Devnet, DevnetNode};
