//! ISAAC engine
//!
//! Intake of client transactions and peer ballots. Every candidate
//! (transaction or round proposal) runs `INIT → SIGN → ACCEPT → ALLCONFIRM`:
//!
//! 1. The introducing node signs an INIT ballot carrying the payload.
//! 2. Every node that learns the payload validates it locally and signs its
//!    own INIT vote (YES, or NO on a local-validation failure).
//! 3. Each time a state settles YES the node signs the next state once.
//! 4. A NO/EXP decision closes the candidate.
//!
//! Nothing here broadcasts or blocks: intake returns the ballots to send
//! and the transitions that happened, and the caller (the round driver and
//! its transport) acts on them.

mod pool;
mod sweeper;


pub use pool::TransactionPool;
pub use sweeper::spawn_sweeper;

use async_trait::async_trait;
use isaac_telemetry::{log_ballot_event, metric_inc, NodeTelemetry};
use parking_lot::{Mutex, RwLock};
use shared_types::{now_millis, short_hex, Address, Hash, KeyPair, Transaction};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::domain::{
    Ballot, BallotBoxes, BallotState, BoxCounts, Candidate, CandidateRef, ConsensusError,
    ConsensusResult, HeldBallots, Proposal, ProposerSelector, Round, SweepReport, ValidatorSet,
    VotingHole, VotingStateStaging, VotingThresholdPolicy, MAX_HELD_ROUNDS,
};
use crate::ports::{AccountReader, IsaacApi};
use crate::validation::{
    check_ballot, check_proposal, check_transaction, BallotContext, ProposalContext,
    TransactionContext, Verdict,
};

/// Engine parameters.
#[derive(Debug, Clone)]
pub struct IsaacConfig {
    /// Prefixed to every signed hash.
    pub network_id: Vec<u8>,
    /// Maximum transactions per proposal.
    pub transactions_limit: usize,
    /// Minimum fee a transaction must carry.
    pub base_fee: u64,
}

impl Default for IsaacConfig {
    fn default() -> Self {
        Self {
            network_id: b"isaac-devnet".to_vec(),
            transactions_limit: 1000,
            base_fee: 10_000,
        }
    }
}

/// Everything the engine is built from.
pub struct IsaacDependencies<A> {
    pub keypair: KeyPair,
    pub validators: ValidatorSet,
    pub policy: VotingThresholdPolicy,
    pub selector: Arc<dyn ProposerSelector>,
    pub accounts: Arc<A>,
    pub telemetry: NodeTelemetry,
    pub config: IsaacConfig,
}

/// One settled state of one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub subject: CandidateRef,
    pub staging: VotingStateStaging,
    /// Proposal payload, for round candidates whose payload is known.
    pub proposal: Option<Proposal>,
}

impl Transition {
    pub fn is_round(&self) -> bool {
        self.subject.is_round()
    }

    /// Reached ALLCONFIRM.
    pub fn is_agreed(&self) -> bool {
        self.staging.state == BallotState::AllConfirm
    }

    /// Closed by NO or EXP.
    pub fn is_rejected(&self) -> bool {
        self.staging.vote.is_negative()
    }
}

/// What one intake call produced.
#[derive(Debug, Clone, Default)]
pub struct IntakeOutcome {
    /// Ballots signed by this node, to broadcast in order.
    pub broadcasts: Vec<Ballot>,
    pub transitions: Vec<Transition>,
}

impl IntakeOutcome {
    pub fn is_empty(&self) -> bool {
        self.broadcasts.is_empty() && self.transitions.is_empty()
    }

    /// Transitions of round candidates, in order.
    pub fn round_transitions(&self) -> impl Iterator<Item = &Transition> {
        self.transitions.iter().filter(|t| t.is_round())
    }

    /// Append `other` after what is already here.
    pub fn merge(&mut self, other: IntakeOutcome) {
        self.broadcasts.extend(other.broadcasts);
        self.transitions.extend(other.transitions);
    }
}

/// What entering a round did.
#[derive(Debug, Clone, Default)]
pub struct RoundStart {
    /// Round candidates from lower heights that were abandoned.
    pub closed: usize,
    /// Result of folding the ballots held for this height.
    pub replayed: IntakeOutcome,
}

/// The ISAAC consensus engine of one node.
pub struct Isaac<A: AccountReader> {
    keypair: KeyPair,
    address: Address,
    validators: ValidatorSet,
    policy: RwLock<VotingThresholdPolicy>,
    selector: Arc<dyn ProposerSelector>,
    accounts: Arc<A>,
    telemetry: NodeTelemetry,
    config: IsaacConfig,
    boxes: BallotBoxes,
    pool: TransactionPool,
    /// `None` until the first round is entered.
    current: RwLock<Option<Round>>,
    held: Mutex<HeldBallots>,
}

impl<A: AccountReader> Isaac<A> {
    /// Fails if the local node is not part of the validator set.
    pub fn new(deps: IsaacDependencies<A>) -> ConsensusResult<Self> {
        let address = deps.keypair.address();
        if !deps.validators.contains(&address) {
            return Err(ConsensusError::InvalidValidatorSet(format!(
                "local node {} is not a validator",
                address.short()
            )));
        }
        let mut policy = deps.policy;
        policy.set_validators(deps.validators.len());
        // One INIT, SIGN and ACCEPT ballot per validator.
        let held = HeldBallots::new(deps.validators.len() * 3, MAX_HELD_ROUNDS);

        Ok(Self {
            keypair: deps.keypair,
            address,
            validators: deps.validators,
            policy: RwLock::new(policy),
            selector: deps.selector,
            accounts: deps.accounts,
            telemetry: deps.telemetry,
            config: deps.config,
            boxes: BallotBoxes::new(),
            pool: TransactionPool::new(),
            current: RwLock::new(None),
            held: Mutex::new(held),
        })
    }

    // === ACCESSORS ===

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn network_id(&self) -> &[u8] {
        &self.config.network_id
    }

    pub fn config(&self) -> &IsaacConfig {
        &self.config
    }

    pub fn validators(&self) -> &ValidatorSet {
        &self.validators
    }

    pub fn telemetry(&self) -> &NodeTelemetry {
        &self.telemetry
    }

    pub fn pool(&self) -> &TransactionPool {
        &self.pool
    }

    pub fn boxes(&self) -> &BallotBoxes {
        &self.boxes
    }

    pub fn accounts(&self) -> &Arc<A> {
        &self.accounts
    }

    pub fn current_round(&self) -> Round {
        self.current.read().unwrap_or_default()
    }

    /// Ballots buffered for heights not reached yet.
    pub fn held_ballots(&self) -> usize {
        self.held.lock().len()
    }

    pub fn threshold(&self, state: BallotState) -> usize {
        self.policy.read().threshold(state)
    }

    pub fn set_connected(&self, count: usize) {
        self.policy.write().set_connected(count);
    }

    /// Enough peers are connected to reach the INIT threshold.
    pub fn can_start(&self) -> bool {
        self.policy.read().can_start()
    }

    pub fn expected_proposer(&self, round: &Round) -> Option<Address> {
        self.selector.select(self.validators.sorted(), round)
    }

    pub fn is_proposer(&self, round: &Round) -> bool {
        self.expected_proposer(round) == Some(self.address)
    }

    pub fn candidate(&self, hash: &Hash) -> Option<Candidate> {
        self.boxes.candidate_data(hash)
    }

    pub fn box_counts(&self) -> BoxCounts {
        self.boxes.counts()
    }

    // === INTAKE ===

    /// Introduce a client transaction. See [`IsaacApi::receive_message`].
    pub fn handle_message(&self, tx: Transaction) -> ConsensusResult<IntakeOutcome> {
        let _span = self.telemetry.span().enter();
        let hash = tx.hash;
        if self.boxes.is_live(&hash) {
            return Err(ConsensusError::KnownMessage(short_hex(&hash)));
        }
        tx.verify(&self.config.network_id)
            .map_err(|e| ConsensusError::Rejected(e.to_string()))?;

        let vote = self.vote_transaction(&tx)?;
        self.pool.insert(tx.clone());

        let subject = CandidateRef::Transaction(hash);
        let ballot = self.sign(
            subject,
            self.address,
            BallotState::Init,
            vote,
            Some(Candidate::Transaction(tx)),
        )?;
        log_ballot_event!(info, "Transaction introduced", subject, BallotState::Init, self.address.short(), vote = %vote);

        let mut outcome = IntakeOutcome::default();
        self.boxes.add_ballot(&ballot)?;
        outcome.broadcasts.push(ballot);
        self.resolve(&hash, &mut outcome)?;
        self.record_box_sizes();
        Ok(outcome)
    }

    /// Fold a peer ballot. See [`IsaacApi::receive_ballot`].
    pub fn handle_ballot(&self, ballot: Ballot) -> ConsensusResult<IntakeOutcome> {
        let _span = self.telemetry.span().enter();
        let metrics = self.telemetry.metrics();
        if ballot.node() == self.address {
            metrics.ballot_received("ignored");
            return Ok(IntakeOutcome::default());
        }

        let hash = ballot.candidate_hash();
        let checked = match self.hold_if_ahead(&ballot) {
            Ok(true) => {
                metrics.ballot_received("held");
                return Err(ConsensusError::Deferred(format!(
                    "held until {} is reached",
                    ballot.subject()
                )));
            }
            Ok(false) => check_ballot(&BallotContext {
                ballot: &ballot,
                network_id: &self.config.network_id,
                validators: &self.validators,
                current: self.current_round(),
                open: self.boxes.is_open(&hash),
            })
            .into_result(),
            Err(e) => Err(e),
        };
        if let Err(e) = checked {
            let outcome = if e.is_benign() { "deferred" } else { "rejected" };
            metrics.ballot_received(outcome);
            return Err(e);
        }

        if !ballot.subject().is_round()
            && ballot.state() != BallotState::Init
            && !self.boxes.has_message(&hash)
        {
            metrics.ballot_received("unknown");
            return Err(ConsensusError::UnknownCandidate(ballot.subject().to_string()));
        }

        let added = self.boxes.add_ballot(&ballot)?;
        metrics.ballot_received("accepted");
        log_ballot_event!(
            debug,
            "Ballot received",
            ballot.subject(),
            ballot.state(),
            ballot.node().short(),
            vote = %ballot.vote(),
            is_new = added.is_new
        );

        let mut outcome = IntakeOutcome::default();
        if added.payload_attached || added.promoted {
            self.vote_on_candidate(&hash, &mut outcome)?;
        }
        self.resolve(&hash, &mut outcome)?;
        self.record_box_sizes();
        Ok(outcome)
    }

    // === ROUND DRIVER HOOKS ===

    /// Enter `round`: round candidates from lower heights are closed, their
    /// running rounds dropped, and ballots held for this height are folded
    /// in.
    pub fn start_round(&self, round: Round) -> RoundStart {
        let ballots = {
            let mut held = self.held.lock();
            *self.current.write() = Some(round);
            held.take(&round)
        };
        let closed = self.boxes.close_stale_rounds(&round);

        let metrics = self.telemetry.metrics();
        metric_inc!(metrics.rounds_started);
        metrics.current_round.set(round.number as i64);
        metrics.chain_height.set(round.block_height as i64);
        self.record_box_sizes();

        info!(
            height = round.block_height,
            round = round.number,
            proposer = %self.expected_proposer(&round).map(|a| a.short()).unwrap_or_default(),
            closed,
            held = ballots.len(),
            "Round started"
        );

        let mut replayed = IntakeOutcome::default();
        for ballot in ballots {
            match self.handle_ballot(ballot) {
                Ok(outcome) => replayed.merge(outcome),
                Err(e) if e.is_benign() => {}
                Err(e) => debug!(error = %e, "Held ballot dropped"),
            }
        }
        RoundStart { closed, replayed }
    }

    /// Build, sign and register the proposal for `round` from agreed pool
    /// transactions. Only the selected proposer may call this.
    pub fn propose(&self, round: Round) -> ConsensusResult<IntakeOutcome> {
        let _span = self.telemetry.span().enter();
        if !self.is_proposer(&round) {
            return Err(ConsensusError::NotProposer {
                height: round.block_height,
                round: round.number,
            });
        }
        let subject = CandidateRef::Round(round);
        if self
            .boxes
            .is_voted(&subject.hash(), &self.address, BallotState::Init)
        {
            return Err(ConsensusError::KnownMessage(subject.to_string()));
        }

        let mut sources = HashSet::new();
        let mut transactions = Vec::new();
        for tx in self.pool.agreed(self.config.transactions_limit) {
            if sources.contains(&tx.source()) {
                continue;
            }
            if self.vote_transaction(&tx)? != VotingHole::Yes {
                debug!(tx = %short_hex(&tx.hash), "Skipping invalid agreed transaction");
                continue;
            }
            sources.insert(tx.source());
            transactions.push(tx.hash);
        }

        let proposal = Proposal {
            round,
            proposer: self.address,
            transactions,
            proposed: now_millis(),
        };
        info!(
            height = round.block_height,
            round = round.number,
            txs = proposal.transactions.len(),
            "Proposing"
        );
        let ballot = self.sign(
            subject,
            self.address,
            BallotState::Init,
            VotingHole::Yes,
            Some(Candidate::Proposal(proposal)),
        )?;

        let mut outcome = IntakeOutcome::default();
        self.boxes.add_ballot(&ballot)?;
        outcome.broadcasts.push(ballot);
        self.resolve(&subject.hash(), &mut outcome)?;
        self.record_box_sizes();
        Ok(outcome)
    }

    /// Local timeout at `state` of `round`: vote EXP on `state.next()`.
    ///
    /// Signs at most once per `(round, state)`; a repeat call yields an empty
    /// outcome.
    pub fn expire(&self, round: Round, state: BallotState) -> ConsensusResult<IntakeOutcome> {
        let _span = self.telemetry.span().enter();
        let mut outcome = IntakeOutcome::default();
        let Some(next) = state.next().filter(|s| s.is_voting()) else {
            return Ok(outcome);
        };
        let subject = CandidateRef::Round(round);
        let hash = subject.hash();
        if self.boxes.is_voted(&hash, &self.address, next) {
            return Ok(outcome);
        }
        let proposer = self.expected_proposer(&round).unwrap_or(self.address);
        let ballot = self.sign(subject, proposer, next, VotingHole::Exp, None)?;
        log_ballot_event!(info, "State expired", subject, next, self.address.short());

        self.boxes.add_ballot(&ballot)?;
        outcome.broadcasts.push(ballot);
        self.resolve(&hash, &mut outcome)?;
        self.record_box_sizes();
        Ok(outcome)
    }

    /// Drop finalized transactions from the pool.
    pub fn confirm_transactions(&self, hashes: &[Hash]) -> usize {
        self.pool.remove_all(hashes)
    }

    /// Run one expiry pass over the ballot boxes. Transactions whose
    /// candidate stalled are dropped from the pool.
    pub fn sweep_expired(&self, retention: Duration) -> SweepReport {
        let report = self
            .boxes
            .sweep(now_millis(), retention, |hash| self.pool.contains(hash));
        for hash in &report.demoted {
            if let Some(tx) = self.pool.remove(hash) {
                debug!(tx = %short_hex(&tx.hash), "Stalled transaction dropped");
            }
        }
        let metrics = self.telemetry.metrics();
        metrics.results_swept.inc_by(report.removed.len() as u64);
        self.record_box_sizes();
        if !report.removed.is_empty() || !report.demoted.is_empty() {
            debug!(
                removed = report.removed.len(),
                demoted = report.demoted.len(),
                "Swept ballot boxes"
            );
        }
        report
    }

    // === INTERNALS ===

    /// Buffer a round ballot for a height this node has not reached. The
    /// ballot is verified first so a forged one cannot take a slot.
    /// `Ok(false)` means it should go through normal intake.
    fn hold_if_ahead(&self, ballot: &Ballot) -> ConsensusResult<bool> {
        let Some(round) = ballot.subject().round().copied() else {
            return Ok(false);
        };
        let ahead = |current: Option<Round>| match current {
            Some(current) => round.block_height > current.block_height,
            None => true,
        };
        if !ahead(*self.current.read()) {
            return Ok(false);
        }
        check_ballot(&BallotContext {
            ballot,
            network_id: &self.config.network_id,
            validators: &self.validators,
            current: round,
            open: false,
        })
        .into_result()?;

        let mut held = self.held.lock();
        // The height may have been reached while the ballot was checked.
        if !ahead(*self.current.read()) {
            return Ok(false);
        }
        if !held.hold(round, ballot.clone()) {
            debug!(round = %round, node = %ballot.node().short(), "Held ballot dropped");
        }
        Ok(true)
    }

    fn sign(
        &self,
        subject: CandidateRef,
        proposer: Address,
        state: BallotState,
        vote: VotingHole,
        data: Option<Candidate>,
    ) -> ConsensusResult<Ballot> {
        let ballot = Ballot::sign(
            &self.keypair,
            &self.config.network_id,
            subject,
            proposer,
            state,
            vote,
            data,
        )?;
        metric_inc!(self.telemetry.metrics().ballots_broadcast);
        Ok(ballot)
    }

    fn vote_transaction(&self, tx: &Transaction) -> ConsensusResult<VotingHole> {
        let ctx = TransactionContext::load(
            tx,
            &self.config.network_id,
            self.config.base_fee,
            self.accounts.as_ref(),
        )?;
        let verdict = check_transaction(&ctx);
        if let Verdict::Reject(reason) | Verdict::Defer(reason) = &verdict {
            debug!(tx = %short_hex(&tx.hash), %reason, "Voting NO on transaction");
        }
        Ok(verdict.vote())
    }

    fn vote_proposal(&self, proposal: &Proposal) -> ConsensusResult<VotingHole> {
        let transactions: Vec<Option<Transaction>> = proposal
            .transactions
            .iter()
            .map(|hash| self.pool.get(hash))
            .collect();
        let mut verdicts = Vec::with_capacity(transactions.len());
        for tx in &transactions {
            verdicts.push(match tx {
                Some(tx) => match self.vote_transaction(tx)? {
                    VotingHole::Yes => Verdict::Accept,
                    _ => Verdict::Reject(format!("transaction {}", short_hex(&tx.hash))),
                },
                None => Verdict::Reject("unknown transaction".into()),
            });
        }
        let verdict = check_proposal(&ProposalContext {
            proposal,
            expected_proposer: self.expected_proposer(&proposal.round),
            current: self.current_round(),
            transactions_limit: self.config.transactions_limit,
            transactions,
            verdicts,
        });
        if let Verdict::Reject(reason) | Verdict::Defer(reason) = &verdict {
            warn!(round = %proposal.round, %reason, "Voting NO on proposal");
        }
        Ok(verdict.vote())
    }

    /// Sign this node's INIT vote on a candidate whose payload just arrived.
    fn vote_on_candidate(&self, hash: &Hash, outcome: &mut IntakeOutcome) -> ConsensusResult<()> {
        if self.boxes.is_voted(hash, &self.address, BallotState::Init) {
            return Ok(());
        }
        let Some(result) = self.boxes.snapshot(hash) else {
            return Ok(());
        };
        let Some(data) = result.data() else {
            return Ok(());
        };
        let vote = match data {
            Candidate::Transaction(tx) => {
                self.pool.insert(tx.clone());
                self.vote_transaction(tx)?
            }
            Candidate::Proposal(proposal) => self.vote_proposal(proposal)?,
        };
        let ballot = self.sign(
            *result.subject(),
            result.proposer(),
            BallotState::Init,
            vote,
            None,
        )?;
        self.boxes.add_ballot(&ballot)?;
        outcome.broadcasts.push(ballot);
        Ok(())
    }

    /// Settle the candidate as far as its votes allow, self-signing each
    /// newly reached voting state.
    fn resolve(&self, hash: &Hash, outcome: &mut IntakeOutcome) -> ConsensusResult<()> {
        loop {
            let policy = self.policy.read().clone();
            let Some(staging) = self.boxes.make_result(hash, &policy)? else {
                return Ok(());
            };
            let metrics = self.telemetry.metrics();
            metric_inc!(metrics.state_transitions, &[staging.state.as_str()]);
            log_ballot_event!(
                info,
                "Candidate settled",
                staging.subject,
                staging.previous_state,
                self.address.short(),
                vote = %staging.vote,
                next = %staging.state
            );

            let proposal = match staging.subject {
                CandidateRef::Round(_) => self
                    .boxes
                    .candidate_data(hash)
                    .and_then(|c| c.as_proposal().cloned()),
                CandidateRef::Transaction(tx_hash) => {
                    if staging.state == BallotState::AllConfirm {
                        self.pool.mark_agreed(&tx_hash);
                    } else if staging.vote.is_negative() {
                        self.pool.remove(&tx_hash);
                    }
                    None
                }
            };

            let closed = staging.is_closed();
            if staging.vote == VotingHole::Yes
                && staging.state.is_voting()
                && !self.boxes.is_voted(hash, &self.address, staging.state)
            {
                let ballot = self.sign(
                    staging.subject,
                    staging.proposer,
                    staging.state,
                    VotingHole::Yes,
                    None,
                )?;
                self.boxes.add_ballot(&ballot)?;
                outcome.broadcasts.push(ballot);
            }
            outcome.transitions.push(Transition {
                subject: staging.subject,
                staging,
                proposal,
            });
            if closed {
                return Ok(());
            }
        }
    }

    fn record_box_sizes(&self) {
        let counts = self.boxes.counts();
        self.telemetry
            .metrics()
            .set_box_sizes(counts.waiting, counts.voting, counts.reserved);
    }
}

#[async_trait]
impl<A: AccountReader> IsaacApi for Isaac<A> {
    async fn receive_message(&self, tx: Transaction) -> ConsensusResult<IntakeOutcome> {
        self.handle_message(tx)
    }

    async fn receive_ballot(&self, ballot: Ballot) -> ConsensusResult<IntakeOutcome> {
        self.handle_ballot(ballot)
    }
}
