//! Driver scenarios against a real engine, finalizer and memory network.
//! Peers are joined to the network but silent; their inboxes show what the
//! driver broadcast.

use super::*;
use crate::adapters::{MemoryNetwork, StorageAccountReader};
use crate::config::{devnet_keypair, DriverConfig};
use crate::ports::{MessageKind, NetworkMessage};
use ic_01_storage::{repository as repo, KeyValueStore, MemoryStore};
use ic_02_consensus::{
    Ballot, BallotState, BoxKind, Candidate, CandidateRef, FixedProposer, Isaac, IsaacConfig,
    IsaacDependencies, IsaacState, Proposal, ProposerSelector, Round, SortedRoundRobin,
    ValidatorSet, VotingHole, VotingThresholdPolicy,
};
use ic_03_finalizer::{init_genesis, Finalizer};
use isaac_telemetry::NodeTelemetry;
use shared_types::{Block, KeyPair, Operation, Transaction, TransactionBody};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

const NET: &[u8] = b"test-net";

struct Harness {
    driver: IsaacStateManager<StorageAccountReader>,
    status: watch::Receiver<IsaacState>,
    engine: Arc<Isaac<StorageAccountReader>>,
    finalizer: Arc<Finalizer>,
    network: MemoryNetwork,
    keys: Vec<KeyPair>,
    peers: Vec<mpsc::UnboundedReceiver<NetworkMessage>>,
    _inbox: mpsc::UnboundedReceiver<NetworkMessage>,
    genesis: Block,
    rich: KeyPair,
}

fn driver_config() -> DriverConfig {
    DriverConfig {
        init_timeout: Duration::from_millis(2_000),
        sign_timeout: Duration::from_millis(2_000),
        accept_timeout: Duration::from_millis(2_000),
        propose_timeout: Duration::from_millis(1_000),
        min_proposal_transactions: 1,
    }
}

/// Node 0 of `n` validators, with `online` of the other validators joined.
fn harness(n: usize, online: usize, selector: Arc<dyn ProposerSelector>) -> Harness {
    let keys: Vec<KeyPair> = (0..n).map(devnet_keypair).collect();
    let validators = ValidatorSet::new(keys.iter().map(|k| k.address())).unwrap();
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let rich = KeyPair::from_seed([0xee; 32]);
    let genesis = init_genesis(store.as_ref(), &rich.address(), 1_000_000).unwrap();

    let network = MemoryNetwork::new();
    let (transport, inbox) = network.join(keys[0].address(), n - 1).unwrap();
    let peers = keys[1..=online]
        .iter()
        .map(|k| network.join(k.address(), n - 1).unwrap().1)
        .collect();

    let telemetry = NodeTelemetry::for_node("driver-test").unwrap();
    let engine = Arc::new(
        Isaac::new(IsaacDependencies {
            keypair: keys[0].clone(),
            validators,
            policy: VotingThresholdPolicy::new(100, 67, 67).unwrap(),
            selector,
            accounts: Arc::new(StorageAccountReader::new(Arc::clone(&store))),
            telemetry: telemetry.clone(),
            config: IsaacConfig {
                network_id: NET.to_vec(),
                transactions_limit: 10,
                base_fee: 10,
            },
        })
        .unwrap(),
    );
    let finalizer = Arc::new(Finalizer::new(store, telemetry));
    let (driver, status) = IsaacStateManager::new(
        Arc::clone(&engine),
        Arc::clone(&finalizer),
        Arc::new(transport),
        driver_config(),
    );
    Harness {
        driver,
        status,
        engine,
        finalizer,
        network,
        keys,
        peers,
        _inbox: inbox,
        genesis,
        rich,
    }
}

impl Harness {
    fn create_account(&self, target: &KeyPair) -> Transaction {
        let body = TransactionBody {
            source: self.rich.address(),
            fee: 10,
            checkpoint: [0u8; 32],
            operations: vec![Operation::CreateAccount {
                target: target.address(),
                amount: 100,
            }],
            created: 1,
        };
        Transaction::new(&self.rich, NET, body).unwrap()
    }

    fn first_round(&self) -> Round {
        Round::first(0, self.genesis.hash, 0)
    }

    fn peer_ballot(
        &self,
        signer: usize,
        round: Round,
        state: BallotState,
        vote: VotingHole,
        data: Option<Candidate>,
    ) -> Ballot {
        Ballot::sign(
            &self.keys[signer],
            NET,
            CandidateRef::Round(round),
            self.keys[1].address(),
            state,
            vote,
            data,
        )
        .unwrap()
    }
}

/// Ballots waiting in a peer inbox, skipping connect notices.
fn drain_ballots(inbox: &mut mpsc::UnboundedReceiver<NetworkMessage>) -> Vec<Ballot> {
    let mut ballots = Vec::new();
    while let Ok(message) = inbox.try_recv() {
        if message.kind == MessageKind::Ballot {
            ballots.push(message.decode(MessageKind::Ballot).unwrap());
        }
    }
    ballots
}

#[tokio::test]
async fn test_single_validator_finalizes_agreed_transaction() {
    let mut h = harness(1, 0, Arc::new(SortedRoundRobin));
    h.driver.handle(DriverRequest::Connected);
    assert!(h.driver.is_started());
    assert_eq!(
        h.driver.position(),
        IsaacState::new(h.first_round(), BallotState::Init)
    );
    assert_eq!(h.driver.armed().map(|d| d.kind), Some(TimerKind::Propose));

    let target = KeyPair::from_seed([7u8; 32]);
    let tx = h.create_account(&target);
    let outcome = h.engine.handle_message(tx.clone()).unwrap();
    assert!(outcome.transitions.iter().any(|t| t.is_agreed()));
    h.driver.handle(DriverRequest::Transitions(outcome.transitions));

    let block = h.finalizer.latest_block().unwrap().unwrap();
    assert_eq!(block.height(), 1);
    assert_eq!(block.header.transactions, vec![tx.hash]);
    assert_eq!(
        repo::get_account(h.finalizer.store().as_ref(), &target.address())
            .unwrap()
            .map(|a| a.balance),
        Some(100)
    );

    let position = h.driver.position();
    assert_eq!(position.round, Round::first(1, block.hash, 1));
    assert_eq!(position.state, BallotState::Init);
    assert_eq!(*h.status.borrow(), position);
    assert!(h.engine.pool().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_propose_timeout_produces_empty_block() {
    let h = harness(1, 0, Arc::new(SortedRoundRobin));
    let mut status = h.status.clone();
    let (requests, requests_rx) = mpsc::unbounded_channel();
    let (shutdown, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(h.driver.run(requests_rx, shutdown_rx));
    requests.send(DriverRequest::Connected).unwrap();

    tokio::time::timeout(
        Duration::from_secs(10),
        status.wait_for(|p| p.round.block_height >= 1),
    )
    .await
    .unwrap()
    .unwrap();
    let block = repo::get_block_by_height(h.finalizer.store().as_ref(), 1)
        .unwrap()
        .unwrap();
    assert!(block.header.transactions.is_empty());
    assert_eq!(block.header.prev_block_hash, h.genesis.hash);

    shutdown.send_replace(true);
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_silent_proposer_expires_each_state_once() {
    let mut h = harness(4, 3, Arc::new(FixedProposer(devnet_keypair(1).address())));
    let first = h.first_round();
    let engine = Arc::clone(&h.engine);
    let mut peers = std::mem::take(&mut h.peers);
    let status = h.status.clone();
    let (requests, requests_rx) = mpsc::unbounded_channel();
    let (shutdown, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(h.driver.run(requests_rx, shutdown_rx));
    requests.send(DriverRequest::Connected).unwrap();

    tokio::time::sleep(Duration::from_millis(2_100)).await;
    assert_eq!(*status.borrow(), IsaacState::new(first, BallotState::Sign));
    let sent = drain_ballots(&mut peers[0]);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].state(), BallotState::Sign);
    assert_eq!(sent[0].vote(), VotingHole::Exp);
    assert_eq!(drain_ballots(&mut peers[1]).len(), 1);

    tokio::time::sleep(Duration::from_millis(2_000)).await;
    assert_eq!(*status.borrow(), IsaacState::new(first, BallotState::Accept));
    let sent = drain_ballots(&mut peers[0]);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].state(), BallotState::Accept);

    // ACCEPT timeout abandons the round without another ballot.
    tokio::time::sleep(Duration::from_millis(2_000)).await;
    let position = *status.borrow();
    assert_eq!(position.round.number, 1);
    assert_eq!(position.round.block_height, 0);
    assert_eq!(position.state, BallotState::Init);
    assert!(drain_ballots(&mut peers[0]).is_empty());

    let timeouts = &engine.telemetry().metrics().timeouts_fired;
    for state in ["INIT", "SIGN", "ACCEPT"] {
        assert_eq!(timeouts.with_label_values(&[state]).get(), 1, "{state}");
    }

    shutdown.send_replace(true);
    task.await.unwrap();
}

#[tokio::test]
async fn test_rejected_round_moves_to_next_round() {
    let mut h = harness(4, 3, Arc::new(FixedProposer(devnet_keypair(1).address())));
    h.driver.handle(DriverRequest::Connected);
    let first = h.first_round();

    let proposal = Proposal {
        round: first,
        proposer: h.keys[1].address(),
        transactions: vec![],
        proposed: 0,
    };
    let init = h.peer_ballot(
        1,
        first,
        BallotState::Init,
        VotingHole::Yes,
        Some(Candidate::Proposal(proposal)),
    );
    let outcome = h.engine.handle_ballot(init).unwrap();
    assert_eq!(outcome.broadcasts.len(), 1, "node votes on the proposal");

    // Two YES, one NO, one outstanding: 100% INIT is out of reach.
    let no = h.peer_ballot(2, first, BallotState::Init, VotingHole::No, None);
    let transitions = h.engine.handle_ballot(no).unwrap().transitions;
    assert!(transitions.iter().any(|t| t.is_rejected()));
    h.driver.handle(DriverRequest::Transitions(transitions.clone()));

    let position = h.driver.position();
    assert_eq!(position.round, first.increased());
    assert_eq!(position.state, BallotState::Init);
    assert_eq!(
        h.engine.boxes().box_of(&CandidateRef::Round(first).hash()),
        Some(BoxKind::Reserved)
    );

    // Replaying the old round's settlement changes nothing.
    h.driver.handle(DriverRequest::Transitions(transitions));
    assert_eq!(h.driver.position(), position);
}

#[tokio::test]
async fn test_earlier_round_agreed_after_timeout_is_finalized() {
    let mut h = harness(4, 3, Arc::new(FixedProposer(devnet_keypair(1).address())));
    h.driver.handle(DriverRequest::Connected);
    let first = h.first_round();

    let proposal = Proposal {
        round: first,
        proposer: h.keys[1].address(),
        transactions: vec![],
        proposed: 0,
    };
    let init = h.peer_ballot(
        1,
        first,
        BallotState::Init,
        VotingHole::Yes,
        Some(Candidate::Proposal(proposal)),
    );
    let mut transitions = h.engine.handle_ballot(init).unwrap().transitions;
    for signer in [2, 3] {
        let vote = h.peer_ballot(signer, first, BallotState::Init, VotingHole::Yes, None);
        transitions.extend(h.engine.handle_ballot(vote).unwrap().transitions);
    }
    h.driver.handle(DriverRequest::Transitions(transitions));
    assert_eq!(h.driver.position(), IsaacState::new(first, BallotState::Sign));

    // SIGN and ACCEPT both time out locally.
    for state in [BallotState::Sign, BallotState::Accept] {
        h.driver.on_timeout(Deadline {
            position: h.driver.position(),
            kind: TimerKind::State(state),
        });
    }
    assert_eq!(h.driver.position().round, first.increased());

    // The other validators finished the round anyway.
    for state in [BallotState::Sign, BallotState::Accept] {
        for signer in 1..=3 {
            let vote = h.peer_ballot(signer, first, state, VotingHole::Yes, None);
            let transitions = h.engine.handle_ballot(vote).unwrap().transitions;
            h.driver.handle(DriverRequest::Transitions(transitions));
        }
    }

    let block = h.finalizer.latest_block().unwrap().unwrap();
    assert_eq!(block.height(), 1);
    assert_eq!(block.header.round, first.number);
    assert_eq!(
        h.driver.position().round,
        Round::first(1, block.hash, block.total_txs())
    );
}

#[tokio::test]
async fn test_waits_for_enough_peers() {
    let mut h = harness(4, 1, Arc::new(SortedRoundRobin));
    h.driver.handle(DriverRequest::Connected);
    assert!(!h.driver.is_started());
    assert_eq!(h.driver.position(), IsaacState::default());

    let _late: Vec<_> = h.keys[2..]
        .iter()
        .map(|k| h.network.join(k.address(), 3).unwrap())
        .collect();
    h.driver.handle(DriverRequest::Connected);
    assert!(h.driver.is_started());
    assert_eq!(h.driver.position().round, h.first_round());
}

#[tokio::test]
async fn test_stale_deadline_ignored() {
    let mut h = harness(4, 3, Arc::new(FixedProposer(devnet_keypair(1).address())));
    h.driver.handle(DriverRequest::Connected);
    let position = h.driver.position();

    h.driver.on_timeout(Deadline {
        position: IsaacState::default(),
        kind: TimerKind::State(BallotState::Init),
    });
    assert_eq!(h.driver.position(), position);
    assert!(drain_ballots(&mut h.peers[0]).is_empty());
}
