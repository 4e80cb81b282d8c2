//! # ISAAC State Manager
//!
//! The round/state driver. One sequential worker per node applies every
//! `(height, round, state)` change; requests come from the intake loop over
//! a channel and from the driver's own [`StateTimer`].
//!
//! ```text
//!            ┌──────── propose timer (proposer, not enough agreed txs)
//!            │
//! enter round ──► INIT ──timeout/EXP──► SIGN ──timeout/EXP──► ACCEPT ──timeout──► round + 1
//!                  │                     │                     │
//!                  └──── YES ───────────►└──── YES ───────────►└── YES ──► ALLCONFIRM
//!                                                                            │
//!                         finalize ok ──► height + 1, round 0 ◄──────────────┤
//!                         finalize err / NO anywhere ──► round + 1 ◄─────────┘
//! ```
//!
//! A position change is applied only if it is strictly later than the
//! current one (height, then round, then ballot state). Stale timers and
//! reordered transitions are dropped.

use ic_02_consensus::{
    AccountReader, BallotState, CandidateRef, IntakeOutcome, Isaac, IsaacState, Proposal, Round,
    Transition,
};
use ic_03_finalizer::Finalizer;
use isaac_telemetry::metric_inc;
use shared_types::{short_hex, Transaction};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace, warn};

use super::timers::{Deadline, StateTimer, TimerKind};
use crate::config::DriverConfig;
use crate::ports::{NetworkMessage, Transport};

/// Work handed to the driver by other tasks.
#[derive(Debug, Clone)]
pub enum DriverRequest {
    /// Peer connectivity changed.
    Connected,
    /// Settlements produced by ballot or message intake.
    Transitions(Vec<Transition>),
}

enum DriverEvent {
    Request(DriverRequest),
    Timeout(Deadline),
}

/// Broadcast the ballots of `outcome` and hand back its transitions.
pub fn publish(transport: &dyn Transport, outcome: IntakeOutcome) -> Vec<Transition> {
    for ballot in &outcome.broadcasts {
        match NetworkMessage::ballot(ballot) {
            Ok(message) => transport.broadcast(message),
            Err(e) => warn!(error = %e, "Dropping unencodable ballot"),
        }
    }
    outcome.transitions
}

pub struct IsaacStateManager<A: AccountReader> {
    engine: Arc<Isaac<A>>,
    finalizer: Arc<Finalizer>,
    transport: Arc<dyn Transport>,
    config: DriverConfig,
    position: IsaacState,
    started: bool,
    timer: StateTimer,
    status: watch::Sender<IsaacState>,
}

impl<A: AccountReader + 'static> IsaacStateManager<A> {
    /// The receiver follows every applied position.
    pub fn new(
        engine: Arc<Isaac<A>>,
        finalizer: Arc<Finalizer>,
        transport: Arc<dyn Transport>,
        config: DriverConfig,
    ) -> (Self, watch::Receiver<IsaacState>) {
        let (status, status_rx) = watch::channel(IsaacState::default());
        (
            Self {
                engine,
                finalizer,
                transport,
                config,
                position: IsaacState::default(),
                started: false,
                timer: StateTimer::new(),
                status,
            },
            status_rx,
        )
    }

    pub fn position(&self) -> IsaacState {
        self.position
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn armed(&self) -> Option<&Deadline> {
        self.timer.armed()
    }

    /// Drive until `shutdown` flips to `true`, its sender is dropped, or
    /// every request sender is gone.
    pub async fn run(
        mut self,
        mut requests: mpsc::UnboundedReceiver<DriverRequest>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        debug!("Driver running");
        loop {
            let event = tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
                request = requests.recv() => match request {
                    Some(request) => DriverEvent::Request(request),
                    None => break,
                },
                deadline = self.timer.fired() => DriverEvent::Timeout(deadline),
            };
            match event {
                DriverEvent::Request(request) => self.handle(request),
                DriverEvent::Timeout(deadline) => self.on_timeout(deadline),
            }
        }
        self.timer.disarm();
        info!(position = %self.position, "Driver stopped");
    }

    /// Apply one request.
    pub fn handle(&mut self, request: DriverRequest) {
        match request {
            DriverRequest::Connected => {
                let connected = self.transport.count_connected();
                self.engine.set_connected(connected);
                if !self.started {
                    self.try_start();
                }
            }
            DriverRequest::Transitions(transitions) => self.process(transitions),
        }
    }

    /// Apply a fired deadline. Deadlines armed for an earlier position are
    /// ignored.
    pub fn on_timeout(&mut self, deadline: Deadline) {
        if deadline.position != self.position {
            trace!(armed = %deadline.position, position = %self.position, "Stale timeout");
            return;
        }
        let metrics = self.engine.telemetry().metrics();
        metric_inc!(metrics.timeouts_fired, &[deadline.kind.as_str()]);
        let round = self.position.round;
        info!(
            height = round.block_height,
            round = round.number,
            timer = deadline.kind.as_str(),
            "Timeout"
        );

        let transitions = match deadline.kind {
            TimerKind::Propose => self.propose(),
            // ALLCONFIRM ballots are never taken from peers, so an unsettled
            // ACCEPT can only be abandoned.
            TimerKind::State(BallotState::Accept) => self.increase_round(),
            TimerKind::State(state) => self.expire(round, state),
        };
        self.process(transitions);
    }

    fn try_start(&mut self) {
        if !(self.engine.can_start() || self.transport.all_connected()) {
            debug!(
                connected = self.transport.count_connected(),
                needed = self.engine.threshold(BallotState::Init).saturating_sub(1),
                "Waiting for peers"
            );
            return;
        }
        let latest = match self.finalizer.latest_block() {
            Ok(Some(block)) => block,
            Ok(None) => {
                warn!("No genesis block; cannot start rounds");
                return;
            }
            Err(e) => {
                warn!(error = %e, "Cannot read latest block");
                return;
            }
        };
        self.started = true;
        info!(height = latest.height(), "Starting rounds");
        let transitions =
            self.enter_round(Round::first(latest.height(), latest.hash, latest.total_txs()));
        self.process(transitions);
    }

    /// Work through `transitions` and everything they lead to.
    fn process(&mut self, transitions: Vec<Transition>) {
        let mut queue: VecDeque<Transition> = transitions.into();
        while let Some(transition) = queue.pop_front() {
            queue.extend(self.on_transition(&transition));
        }
    }

    fn on_transition(&mut self, transition: &Transition) -> Vec<Transition> {
        let Some(round) = transition.subject.round().copied() else {
            // A newly agreed transaction may be what a waiting proposer needs.
            if transition.is_agreed() {
                return self.maybe_propose();
            }
            return Vec::new();
        };
        if round != self.position.round {
            // Votes kept arriving for a round this node timed out of, and the
            // rest of the network agreed on it.
            let position = self.position.round;
            if transition.is_agreed()
                && round.block_height == position.block_height
                && round.is_before(&position)
            {
                info!(
                    height = round.block_height,
                    round = round.number,
                    position = %self.position,
                    "Earlier round agreed"
                );
                return self.finalize(round, transition.proposal.clone());
            }
            trace!(candidate = %round, position = %self.position, "Transition for another round");
            return Vec::new();
        }
        if transition.is_agreed() {
            return self.finalize(round, transition.proposal.clone());
        }
        if transition.is_rejected() {
            info!(
                height = round.block_height,
                round = round.number,
                state = %transition.staging.previous_state,
                vote = %transition.staging.vote,
                "Round rejected"
            );
            return self.increase_round();
        }
        if self.advance(IsaacState::new(round, transition.staging.state)) {
            self.arm_state_timer();
        }
        Vec::new()
    }

    /// Move to `next` if it is strictly later.
    fn advance(&mut self, next: IsaacState) -> bool {
        if !next.is_later_than(&self.position) {
            trace!(next = %next, position = %self.position, "Dropping non-monotonic transition");
            return false;
        }
        debug!(from = %self.position, to = %next, "State changed");
        self.position = next;
        self.status.send_replace(next);
        true
    }

    fn arm_state_timer(&mut self) {
        let timeout = match self.position.state {
            BallotState::Init => self.config.init_timeout,
            BallotState::Sign => self.config.sign_timeout,
            BallotState::Accept => self.config.accept_timeout,
            BallotState::None | BallotState::AllConfirm => {
                self.timer.disarm();
                return;
            }
        };
        self.timer
            .arm(self.position, TimerKind::State(self.position.state), timeout);
    }

    fn enter_round(&mut self, round: Round) -> Vec<Transition> {
        let next = IsaacState::new(round, BallotState::Init);
        if !next.is_later_than(&self.position) {
            return Vec::new();
        }
        let start = self.engine.start_round(round);
        self.advance(next);

        // Held ballots for this height. `catch_up` below may repeat some of
        // their settlements; repeats are dropped as non-monotonic.
        let mut transitions = publish(self.transport.as_ref(), start.replayed);
        if self.engine.is_proposer(&round) {
            if self.engine.pool().agreed_count() >= self.config.min_proposal_transactions {
                transitions.extend(self.propose());
            } else {
                self.timer
                    .arm(self.position, TimerKind::Propose, self.config.propose_timeout);
            }
        } else {
            self.arm_state_timer();
        }
        transitions.extend(self.catch_up(round));
        transitions
    }

    /// Settlements this round reached before the driver entered it.
    fn catch_up(&self, round: Round) -> Vec<Transition> {
        let subject = CandidateRef::Round(round);
        let Some(result) = self.engine.boxes().snapshot(&subject.hash()) else {
            return Vec::new();
        };
        let proposal = result.data().and_then(|c| c.as_proposal().cloned());
        result
            .staging()
            .iter()
            .map(|staging| Transition {
                subject,
                staging: staging.clone(),
                proposal: proposal.clone(),
            })
            .collect()
    }

    fn increase_round(&mut self) -> Vec<Transition> {
        let next = self.position.round.increased();
        self.enter_round(next)
    }

    fn maybe_propose(&mut self) -> Vec<Transition> {
        let waiting = self
            .timer
            .armed()
            .is_some_and(|d| d.kind == TimerKind::Propose && d.position == self.position);
        if !waiting || self.engine.pool().agreed_count() < self.config.min_proposal_transactions {
            return Vec::new();
        }
        self.propose()
    }

    /// Propose for the current round, then move to SIGN.
    fn propose(&mut self) -> Vec<Transition> {
        let round = self.position.round;
        if self.position.state != BallotState::Init {
            return Vec::new();
        }
        let outcome = match self.engine.propose(round) {
            Ok(outcome) => outcome,
            Err(e) if e.is_benign() => {
                debug!(error = %e, "Proposal skipped");
                return Vec::new();
            }
            Err(e) => {
                warn!(error = %e, "Proposal failed");
                self.arm_state_timer();
                return Vec::new();
            }
        };
        let transitions = publish(self.transport.as_ref(), outcome);
        if self.advance(IsaacState::new(round, BallotState::Sign)) {
            self.arm_state_timer();
        }
        transitions
    }

    /// Vote EXP on the state after `state`, then move there.
    fn expire(&mut self, round: Round, state: BallotState) -> Vec<Transition> {
        let transitions = match self.engine.expire(round, state) {
            Ok(outcome) => publish(self.transport.as_ref(), outcome),
            Err(e) => {
                warn!(error = %e, state = %state, "Expiry ballot failed");
                Vec::new()
            }
        };
        if let Some(next) = state.next() {
            if self.advance(IsaacState::new(round, next)) {
                self.arm_state_timer();
            }
        }
        transitions
    }

    /// Write the agreed proposal, then open the next height. On failure the
    /// height stays and the round is retried.
    fn finalize(&mut self, round: Round, proposal: Option<Proposal>) -> Vec<Transition> {
        self.advance(IsaacState::new(round, BallotState::AllConfirm));
        self.timer.disarm();

        let proposal = proposal.or_else(|| {
            self.engine
                .candidate(&CandidateRef::Round(round).hash())
                .and_then(|c| c.as_proposal().cloned())
        });
        let Some(proposal) = proposal else {
            warn!(round = %round, "Agreed round without a known proposal");
            return self.increase_round();
        };
        let transactions: Option<Vec<Transaction>> = proposal
            .transactions
            .iter()
            .map(|hash| self.engine.pool().get(hash))
            .collect();
        let Some(transactions) = transactions else {
            warn!(round = %round, "Agreed proposal references transactions this node lacks");
            return self.increase_round();
        };

        match self.finalizer.finish_ballot(&proposal, &transactions) {
            Ok(block) => {
                let confirmed = self.engine.confirm_transactions(&proposal.transactions);
                debug!(
                    height = block.height(),
                    block = %short_hex(&block.hash),
                    confirmed,
                    "Pool trimmed"
                );
                self.enter_round(Round::first(block.height(), block.hash, block.total_txs()))
            }
            Err(e) => {
                warn!(round = %round, error = %e, "Finalization failed; retrying with next round");
                self.increase_round()
            }
        }
    }
}
