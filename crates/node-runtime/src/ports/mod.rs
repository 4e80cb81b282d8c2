//! # Ports
//!
//! What the runtime needs from the outside world besides storage.

pub mod network;

pub use network::{MessageKind, NetworkMessage, Transport};
