//! In-process network
//!
//! A [`MemoryNetwork`] is an explicitly constructed hub. Each node joins it
//! and gets a [`MemoryTransport`] plus the receiving end of its inbox. There
//! is no process-wide registry, so independent networks can run side by side
//! in one test binary.

use parking_lot::RwLock;
use shared_types::{Address, Transaction};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::error::RuntimeResult;
use crate::ports::{NetworkMessage, Transport};

type Inbox = mpsc::UnboundedSender<NetworkMessage>;

/// Hub connecting in-process nodes.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    peers: Arc<RwLock<BTreeMap<Address, Inbox>>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join as `address`. Existing peers get a `Connect` for the newcomer,
    /// and the newcomer gets one for each of them.
    ///
    /// `expected_peers` is how many other validators make the network
    /// complete, used by [`Transport::all_connected`].
    pub fn join(
        &self,
        address: Address,
        expected_peers: usize,
    ) -> RuntimeResult<(MemoryTransport, mpsc::UnboundedReceiver<NetworkMessage>)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let hello = NetworkMessage::connect(&address)?;
        {
            let mut peers = self.peers.write();
            for (peer, inbox) in peers.iter() {
                if *peer == address {
                    continue;
                }
                let _ = inbox.send(hello.clone());
                let _ = tx.send(NetworkMessage::connect(peer)?);
            }
            peers.insert(address, tx);
        }
        debug!(node = %address.short(), "Joined memory network");
        Ok((
            MemoryTransport {
                address,
                expected_peers,
                network: self.clone(),
            },
            rx,
        ))
    }

    /// Deliver a client transaction to one node.
    ///
    /// Returns `false` if the node is not on the network.
    pub fn submit(&self, to: &Address, tx: &Transaction) -> RuntimeResult<bool> {
        let message = NetworkMessage::transaction(tx)?;
        Ok(self
            .peers
            .read()
            .get(to)
            .is_some_and(|inbox| inbox.send(message).is_ok()))
    }

    /// Remove `address` from the hub. Its inbox closes once the last
    /// sender is gone.
    pub fn leave(&self, address: &Address) {
        self.peers.write().remove(address);
    }

    /// Nodes currently joined.
    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.read().is_empty()
    }
}

/// One node's handle on a [`MemoryNetwork`].
#[derive(Clone)]
pub struct MemoryTransport {
    address: Address,
    expected_peers: usize,
    network: MemoryNetwork,
}

impl MemoryTransport {
    pub fn network(&self) -> &MemoryNetwork {
        &self.network
    }

    pub fn leave(&self) {
        self.network.leave(&self.address);
    }
}

impl Transport for MemoryTransport {
    fn address(&self) -> Address {
        self.address
    }

    fn broadcast(&self, message: NetworkMessage) {
        let peers = self.network.peers.read();
        for (peer, inbox) in peers.iter() {
            if *peer == self.address {
                continue;
            }
            if inbox.send(message.clone()).is_err() {
                trace!(peer = %peer.short(), "Peer inbox closed");
            }
        }
    }

    fn count_connected(&self) -> usize {
        self.network
            .peers
            .read()
            .iter()
            .filter(|(peer, inbox)| **peer != self.address && !inbox.is_closed())
            .count()
    }

    fn all_connected(&self) -> bool {
        self.count_connected() >= self.expected_peers
    }
}
