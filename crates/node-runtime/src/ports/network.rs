//! Transport port
//!
//! Delivery is best effort. The engine assumes neither delivery nor ordering;
//! a lost ballot only costs a timeout.

use ic_02_consensus::Ballot;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};
use shared_types::{Address, Transaction};

use crate::error::{RuntimeError, RuntimeResult};

/// Type tag of an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageKind {
    /// A peer joined; payload is its address.
    Connect,
    /// A client transaction.
    Message,
    /// A signed ballot.
    Ballot,
}

/// Envelope carried by the transport: a tag and opaque payload bytes.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkMessage {
    pub kind: MessageKind,
    #[serde_as(as = "Bytes")]
    pub payload: Vec<u8>,
}

impl NetworkMessage {
    pub fn connect(address: &Address) -> RuntimeResult<Self> {
        Self::encode(MessageKind::Connect, address)
    }

    pub fn transaction(tx: &Transaction) -> RuntimeResult<Self> {
        Self::encode(MessageKind::Message, tx)
    }

    pub fn ballot(ballot: &Ballot) -> RuntimeResult<Self> {
        Self::encode(MessageKind::Ballot, ballot)
    }

    fn encode<T: Serialize>(kind: MessageKind, value: &T) -> RuntimeResult<Self> {
        let payload = serde_json::to_vec(value).map_err(RuntimeError::codec)?;
        Ok(Self { kind, payload })
    }

    /// Decode the payload, checking the tag first.
    pub fn decode<T: for<'de> Deserialize<'de>>(&self, expected: MessageKind) -> RuntimeResult<T> {
        if self.kind != expected {
            return Err(RuntimeError::Codec(format!(
                "expected {:?} payload, got {:?}",
                expected, self.kind
            )));
        }
        serde_json::from_slice(&self.payload).map_err(RuntimeError::codec)
    }
}

/// The node's view of the validator network.
pub trait Transport: Send + Sync {
    /// Address this transport sends as.
    fn address(&self) -> Address;

    /// Fan `message` out to every connected peer. Never blocks.
    fn broadcast(&self, message: NetworkMessage);

    /// Peers currently reachable, excluding this node.
    fn count_connected(&self) -> usize;

    /// Every other validator is reachable.
    fn all_connected(&self) -> bool;
}
