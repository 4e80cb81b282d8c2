//! Ports for the ISAAC engine
//!
//! - inbound: the intake API exposed to the transport/runtime
//! - outbound: account state read by local validation

pub mod inbound;
pub mod outbound;

pub use inbound::*;
pub use outbound::*;
