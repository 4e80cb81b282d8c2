//! # Node Runner
//!
//! One validator: the consensus engine, the round/state driver, the
//! finalizer and the transport, run as three tasks.
//!
//! ```text
//!  transport inbox ──► intake loop ──ballots──► transport.broadcast
//!                           │
//!                           └──DriverRequest──► driver worker ──► finalizer
//!                                                   │
//!                                           one StateTimer
//!  sweeper ──► engine.sweep_expired (every interval)
//! ```
//!
//! The intake loop and the driver share only the engine, whose ballot boxes
//! are lock-guarded. `stop` signals all three tasks and waits for them.

use ic_01_storage::KeyValueStore;
use ic_02_consensus::{
    spawn_sweeper, AccountReader, Ballot, BallotState, BoxCounts, Isaac, IsaacApi, IsaacDependencies,
    IsaacState, ProposerSelector, SortedRoundRobin, ValidatorSet,
};
use ic_03_finalizer::{init_genesis, Finalizer};
use isaac_telemetry::NodeTelemetry;
use shared_types::{Address, KeyPair, Transaction};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument};

use crate::adapters::StorageAccountReader;
use crate::config::{DriverConfig, NodeConfig, SweeperConfig};
use crate::driver::{publish, DriverRequest, IsaacStateManager};
use crate::error::{RuntimeError, RuntimeResult};
use crate::ports::{MessageKind, NetworkMessage, Transport};

/// Engine type used by runtime nodes.
pub type NodeEngine = Isaac<StorageAccountReader>;

/// What a node is built from, besides its configuration.
pub struct NodeDependencies {
    pub keypair: KeyPair,
    pub validators: ValidatorSet,
    pub store: Arc<dyn KeyValueStore>,
    pub transport: Arc<dyn Transport>,
    pub inbox: mpsc::UnboundedReceiver<NetworkMessage>,
    pub telemetry: NodeTelemetry,
    /// Defaults to [`SortedRoundRobin`].
    pub selector: Option<Arc<dyn ProposerSelector>>,
}

/// Static identity of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    pub address: Address,
    pub network_id: String,
    pub validators: Vec<Address>,
}

/// Point-in-time status for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeStatus {
    pub address: Address,
    pub height: u64,
    pub round: u64,
    pub state: BallotState,
    pub boxes: BoxCounts,
    pub pool: usize,
    pub connected: usize,
}

pub struct NodeRunner {
    info: NodeInfo,
    engine: Arc<NodeEngine>,
    finalizer: Arc<Finalizer>,
    transport: Arc<dyn Transport>,
    sweeper: SweeperConfig,
    status: watch::Receiver<IsaacState>,
    pending: Option<(
        IsaacStateManager<StorageAccountReader>,
        mpsc::UnboundedReceiver<NetworkMessage>,
    )>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl NodeRunner {
    /// Build a node and write genesis if its store is empty.
    pub fn new(config: &NodeConfig, deps: NodeDependencies) -> RuntimeResult<Self> {
        let genesis = config.genesis.keypair()?;
        init_genesis(deps.store.as_ref(), &genesis.address(), config.genesis.balance)?;

        let address = deps.keypair.address();
        let info = NodeInfo {
            address,
            network_id: config.network_id.clone(),
            validators: deps.validators.sorted().to_vec(),
        };
        let engine = Arc::new(Isaac::new(IsaacDependencies {
            keypair: deps.keypair,
            validators: deps.validators,
            policy: config.policy()?,
            selector: deps.selector.unwrap_or_else(|| Arc::new(SortedRoundRobin)),
            accounts: Arc::new(StorageAccountReader::new(Arc::clone(&deps.store))),
            telemetry: deps.telemetry.clone(),
            config: config.isaac_config(),
        })?);
        let finalizer = Arc::new(Finalizer::new(deps.store, deps.telemetry));
        Ok(Self::assemble(
            info,
            engine,
            finalizer,
            deps.transport,
            deps.inbox,
            config.driver_config(),
            config.sweeper,
        ))
    }

    fn assemble(
        info: NodeInfo,
        engine: Arc<NodeEngine>,
        finalizer: Arc<Finalizer>,
        transport: Arc<dyn Transport>,
        inbox: mpsc::UnboundedReceiver<NetworkMessage>,
        driver_config: DriverConfig,
        sweeper: SweeperConfig,
    ) -> Self {
        let (driver, status) = IsaacStateManager::new(
            Arc::clone(&engine),
            Arc::clone(&finalizer),
            Arc::clone(&transport),
            driver_config,
        );
        let (shutdown, _) = watch::channel(false);
        Self {
            info,
            engine,
            finalizer,
            transport,
            sweeper,
            status,
            pending: Some((driver, inbox)),
            shutdown,
            tasks: Vec::new(),
        }
    }

    /// Spawn the intake loop, the driver and the sweeper.
    pub fn start(&mut self) -> RuntimeResult<()> {
        let (driver, inbox) = self.pending.take().ok_or(RuntimeError::AlreadyStarted)?;
        let span = self.engine.telemetry().span().clone();
        let (requests, requests_rx) = mpsc::unbounded_channel();

        self.tasks.push(tokio::spawn(
            driver
                .run(requests_rx, self.shutdown.subscribe())
                .instrument(span.clone()),
        ));
        // Peers that joined before this node started are already counted.
        let _ = requests.send(DriverRequest::Connected);
        self.tasks.push(tokio::spawn(
            intake_loop(
                Arc::clone(&self.engine),
                Arc::clone(&self.transport),
                inbox,
                requests,
                self.shutdown.subscribe(),
            )
            .instrument(span.clone()),
        ));
        self.tasks.push(spawn_sweeper(
            Arc::clone(&self.engine),
            Duration::from_millis(self.sweeper.interval_ms),
            Duration::from_millis(self.sweeper.retention_ms),
            self.shutdown.subscribe(),
        ));

        span.in_scope(|| info!(validators = self.info.validators.len(), "Node started"));
        Ok(())
    }

    /// Signal every task and wait until all of them have finished.
    pub async fn stop(&mut self) {
        self.shutdown.send_replace(true);
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!(error = %e, "Node task ended abnormally");
            }
        }
        self.engine
            .telemetry()
            .span()
            .in_scope(|| info!("Node stopped"));
    }

    pub fn is_running(&self) -> bool {
        !self.tasks.is_empty()
    }

    pub fn node(&self) -> &NodeInfo {
        &self.info
    }

    pub fn consensus(&self) -> &Arc<NodeEngine> {
        &self.engine
    }

    pub fn connection_manager(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn finalizer(&self) -> &Arc<Finalizer> {
        &self.finalizer
    }

    /// Latest driver position.
    pub fn position(&self) -> IsaacState {
        *self.status.borrow()
    }

    /// Follow driver positions.
    pub fn subscribe(&self) -> watch::Receiver<IsaacState> {
        self.status.clone()
    }

    pub fn status(&self) -> NodeStatus {
        let position = self.position();
        NodeStatus {
            address: self.info.address,
            height: position.round.block_height,
            round: position.round.number,
            state: position.state,
            boxes: self.engine.box_counts(),
            pool: self.engine.pool().len(),
            connected: self.transport.count_connected(),
        }
    }
}

impl Drop for NodeRunner {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

async fn intake_loop<A: AccountReader + 'static>(
    engine: Arc<Isaac<A>>,
    transport: Arc<dyn Transport>,
    mut inbox: mpsc::UnboundedReceiver<NetworkMessage>,
    requests: mpsc::UnboundedSender<DriverRequest>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let message = tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
            message = inbox.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };
        if let Some(request) = intake(engine.as_ref(), transport.as_ref(), message).await {
            if requests.send(request).is_err() {
                break;
            }
        }
    }
    debug!("Intake stopped");
}

/// Handle one inbound message. Returns what the driver must hear about.
pub async fn intake<A: AccountReader>(
    engine: &Isaac<A>,
    transport: &dyn Transport,
    message: NetworkMessage,
) -> Option<DriverRequest> {
    let result = match message.kind {
        MessageKind::Connect => {
            match message.decode::<Address>(MessageKind::Connect) {
                Ok(peer) => debug!(peer = %peer.short(), "Peer connected"),
                Err(e) => warn!(error = %e, "Malformed connect message"),
            }
            return Some(DriverRequest::Connected);
        }
        MessageKind::Message => match message.decode::<Transaction>(MessageKind::Message) {
            Ok(tx) => engine.receive_message(tx).await,
            Err(e) => {
                warn!(error = %e, "Malformed transaction message");
                return None;
            }
        },
        MessageKind::Ballot => match message.decode::<Ballot>(MessageKind::Ballot) {
            Ok(ballot) => engine.receive_ballot(ballot).await,
            Err(e) => {
                warn!(error = %e, "Malformed ballot message");
                return None;
            }
        },
    };
    match result {
        Ok(outcome) => {
            let transitions = publish(transport, outcome);
            (!transitions.is_empty()).then_some(DriverRequest::Transitions(transitions))
        }
        Err(e) if e.is_benign() => {
            debug!(error = %e, "Intake: nothing to do");
            None
        }
        Err(e) => {
            warn!(error = %e, "Intake rejected message");
            None
        }
    }
}

#[cfg(test)]
mod tests;
