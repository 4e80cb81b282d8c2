//! Validation pipelines
//!
//! Each pipeline is an ordered slice of plain check functions over a
//! read-only context. The first check that does not accept decides the
//! verdict. Contexts are loaded up front so every check is a pure function.
//!
//! - transaction checks decide this node's vote on a client transaction
//! - proposal checks decide the vote on a round proposal
//! - ballot checks gate peer ballots before they are tallied

use shared_types::{Account, Address, Hash, Operation, Transaction};
use std::collections::{HashMap, HashSet};

use crate::domain::{
    Ballot, BallotState, Candidate, ConsensusError, ConsensusResult, Proposal, Round,
    ValidatorSet, VotingHole,
};
use crate::ports::AccountReader;

/// Outcome of a validation pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    /// Well-formed input this node disagrees with, or malformed input.
    Reject(String),
    /// Not decidable now (stale or early); dropped without penalty.
    Defer(String),
}

impl Verdict {
    pub fn is_accept(&self) -> bool {
        matches!(self, Verdict::Accept)
    }

    /// Local vote implied by the verdict.
    pub fn vote(&self) -> VotingHole {
        match self {
            Verdict::Accept => VotingHole::Yes,
            Verdict::Reject(_) | Verdict::Defer(_) => VotingHole::No,
        }
    }

    pub fn into_result(self) -> ConsensusResult<()> {
        match self {
            Verdict::Accept => Ok(()),
            Verdict::Reject(reason) => Err(ConsensusError::Rejected(reason)),
            Verdict::Defer(reason) => Err(ConsensusError::Deferred(reason)),
        }
    }
}

/// A single check over a context.
pub type Check<C> = fn(&C) -> Verdict;

/// Run `checks` in order; the first non-accepting verdict wins.
pub fn run<C>(ctx: &C, checks: &[Check<C>]) -> Verdict {
    checks
        .iter()
        .map(|check| check(ctx))
        .find(|verdict| !verdict.is_accept())
        .unwrap_or(Verdict::Accept)
}

fn reject(reason: impl Into<String>) -> Verdict {
    Verdict::Reject(reason.into())
}

fn defer(reason: impl Into<String>) -> Verdict {
    Verdict::Defer(reason.into())
}

fn ensure(condition: bool, reason: impl FnOnce() -> String) -> Verdict {
    if condition {
        Verdict::Accept
    } else {
        Verdict::Reject(reason())
    }
}

// =============================================================================
// TRANSACTIONS
// =============================================================================

/// A transaction plus the account state it will be applied to.
#[derive(Debug, Clone)]
pub struct TransactionContext<'a> {
    pub tx: &'a Transaction,
    pub network_id: &'a [u8],
    pub base_fee: u64,
    pub source: Option<Account>,
    /// Whether each operation target currently exists.
    pub targets: HashMap<Address, bool>,
}

impl<'a> TransactionContext<'a> {
    /// Read the source and every target account from `accounts`.
    pub fn load<A: AccountReader + ?Sized>(
        tx: &'a Transaction,
        network_id: &'a [u8],
        base_fee: u64,
        accounts: &A,
    ) -> ConsensusResult<Self> {
        let read = |address: &Address| {
            accounts
                .get_account(address)
                .map_err(ConsensusError::AccountState)
        };
        let source = read(&tx.source())?;
        let mut targets = HashMap::new();
        for op in &tx.body.operations {
            let target = op.target();
            if !targets.contains_key(&target) {
                targets.insert(target, read(&target)?.is_some());
            }
        }
        Ok(Self {
            tx,
            network_id,
            base_fee,
            source,
            targets,
        })
    }
}

fn tx_has_operations(ctx: &TransactionContext<'_>) -> Verdict {
    ensure(!ctx.tx.body.operations.is_empty(), || {
        "transaction has no operations".into()
    })
}

fn tx_no_zero_amounts(ctx: &TransactionContext<'_>) -> Verdict {
    ensure(
        ctx.tx.body.operations.iter().all(|op| op.amount() > 0),
        || "operation amount is zero".into(),
    )
}

fn tx_cost_in_range(ctx: &TransactionContext<'_>) -> Verdict {
    ensure(ctx.tx.total_cost().is_some(), || {
        "transaction cost overflows".into()
    })
}

fn tx_signature(ctx: &TransactionContext<'_>) -> Verdict {
    match ctx.tx.verify(ctx.network_id) {
        Ok(()) => Verdict::Accept,
        Err(e) => reject(e.to_string()),
    }
}

fn tx_source_exists(ctx: &TransactionContext<'_>) -> Verdict {
    ensure(ctx.source.is_some(), || {
        format!("source account {} not found", ctx.tx.source().short())
    })
}

fn tx_checkpoint(ctx: &TransactionContext<'_>) -> Verdict {
    match &ctx.source {
        Some(account) if account.checkpoint != ctx.tx.body.checkpoint => {
            reject(format!("checkpoint mismatch for {}", account.address.short()))
        }
        _ => Verdict::Accept,
    }
}

fn tx_fee(ctx: &TransactionContext<'_>) -> Verdict {
    ensure(ctx.tx.body.fee >= ctx.base_fee, || {
        format!("fee {} below base fee {}", ctx.tx.body.fee, ctx.base_fee)
    })
}

fn tx_balance(ctx: &TransactionContext<'_>) -> Verdict {
    match (&ctx.source, ctx.tx.total_cost()) {
        (Some(account), Some(cost)) if account.balance < cost => reject(format!(
            "insufficient balance: {} < {}",
            account.balance, cost
        )),
        _ => Verdict::Accept,
    }
}

fn tx_targets(ctx: &TransactionContext<'_>) -> Verdict {
    let mut created = HashSet::new();
    for op in &ctx.tx.body.operations {
        let exists = ctx.targets.get(&op.target()).copied().unwrap_or(false);
        match op {
            Operation::CreateAccount { target, .. } => {
                if exists || !created.insert(*target) {
                    return reject(format!("account {} already exists", target.short()));
                }
            }
            Operation::Payment { target, .. } => {
                if !exists && !created.contains(target) {
                    return reject(format!("target account {} not found", target.short()));
                }
            }
        }
    }
    Verdict::Accept
}

/// Decide the local vote on a client transaction.
pub fn check_transaction(ctx: &TransactionContext<'_>) -> Verdict {
    run(
        ctx,
        &[
            tx_has_operations as Check<_>,
            tx_no_zero_amounts as Check<_>,
            tx_cost_in_range as Check<_>,
            tx_signature as Check<_>,
            tx_source_exists as Check<_>,
            tx_checkpoint as Check<_>,
            tx_fee as Check<_>,
            tx_balance as Check<_>,
            tx_targets as Check<_>,
        ],
    )
}

// =============================================================================
// PROPOSALS
// =============================================================================

/// A round proposal plus everything needed to vote on it.
#[derive(Debug, Clone)]
pub struct ProposalContext<'a> {
    pub proposal: &'a Proposal,
    /// Proposer selected for the proposal's round.
    pub expected_proposer: Option<Address>,
    /// This node's current round.
    pub current: Round,
    pub transactions_limit: usize,
    /// Pool lookups, in proposal order. `None` for unknown hashes.
    pub transactions: Vec<Option<Transaction>>,
    /// Individual transaction verdicts, in proposal order.
    pub verdicts: Vec<Verdict>,
}

fn proposal_proposer(ctx: &ProposalContext<'_>) -> Verdict {
    ensure(ctx.expected_proposer == Some(ctx.proposal.proposer), || {
        format!(
            "{} is not the proposer of round {}",
            ctx.proposal.proposer.short(),
            ctx.proposal.round
        )
    })
}

fn proposal_round(ctx: &ProposalContext<'_>) -> Verdict {
    let round = &ctx.proposal.round;
    if round.block_height != ctx.current.block_height || round.block_hash != ctx.current.block_hash
    {
        return reject(format!(
            "round {} is not on the current block {}",
            round, ctx.current.block_height
        ));
    }
    ensure(!round.is_before(&ctx.current), || {
        format!("round {} is older than {}", round, ctx.current)
    })
}

fn proposal_limit(ctx: &ProposalContext<'_>) -> Verdict {
    ensure(
        ctx.proposal.transactions.len() <= ctx.transactions_limit,
        || {
            format!(
                "{} transactions exceed the limit of {}",
                ctx.proposal.transactions.len(),
                ctx.transactions_limit
            )
        },
    )
}

fn proposal_unique_hashes(ctx: &ProposalContext<'_>) -> Verdict {
    let unique: HashSet<&Hash> = ctx.proposal.transactions.iter().collect();
    ensure(unique.len() == ctx.proposal.transactions.len(), || {
        "duplicate transaction in proposal".into()
    })
}

fn proposal_known(ctx: &ProposalContext<'_>) -> Verdict {
    ensure(ctx.transactions.iter().all(Option::is_some), || {
        "proposal references unknown transactions".into()
    })
}

fn proposal_unique_sources(ctx: &ProposalContext<'_>) -> Verdict {
    let mut sources = HashSet::new();
    for tx in ctx.transactions.iter().flatten() {
        if !sources.insert(tx.source()) {
            return reject(format!(
                "duplicate source {} in proposal",
                tx.source().short()
            ));
        }
    }
    Verdict::Accept
}

fn proposal_transactions_valid(ctx: &ProposalContext<'_>) -> Verdict {
    match ctx.verdicts.iter().find(|v| !v.is_accept()) {
        Some(Verdict::Reject(reason)) | Some(Verdict::Defer(reason)) => {
            reject(format!("invalid transaction in proposal: {}", reason))
        }
        _ => Verdict::Accept,
    }
}

/// Decide the local vote on a round proposal.
pub fn check_proposal(ctx: &ProposalContext<'_>) -> Verdict {
    run(
        ctx,
        &[
            proposal_proposer as Check<_>,
            proposal_round as Check<_>,
            proposal_limit as Check<_>,
            proposal_unique_hashes as Check<_>,
            proposal_known as Check<_>,
            proposal_unique_sources as Check<_>,
            proposal_transactions_valid as Check<_>,
        ],
    )
}

// =============================================================================
// BALLOTS
// =============================================================================

/// A peer ballot plus the local view needed to gate it.
#[derive(Debug, Clone, Copy)]
pub struct BallotContext<'a> {
    pub ballot: &'a Ballot,
    pub network_id: &'a [u8],
    pub validators: &'a ValidatorSet,
    pub current: Round,
    /// The ballot's candidate already has an undecided tally here.
    pub open: bool,
}

fn ballot_vote_set(ctx: &BallotContext<'_>) -> Verdict {
    ensure(ctx.ballot.vote() != VotingHole::NotYet, || {
        "vote not set".into()
    })
}

fn ballot_state_set(ctx: &BallotContext<'_>) -> Verdict {
    ensure(ctx.ballot.state() != BallotState::None, || {
        "ballot state NONE".into()
    })
}

fn ballot_hash(ctx: &BallotContext<'_>) -> Verdict {
    match ctx.ballot.verify_hash() {
        Ok(()) => Verdict::Accept,
        Err(e) => reject(e.to_string()),
    }
}

fn ballot_payload(ctx: &BallotContext<'_>) -> Verdict {
    match ctx.ballot.verify_payload() {
        Ok(()) => Verdict::Accept,
        Err(e) => reject(e.to_string()),
    }
}

fn ballot_known_validator(ctx: &BallotContext<'_>) -> Verdict {
    ensure(ctx.validators.contains(&ctx.ballot.node()), || {
        format!("{} is not a validator", ctx.ballot.node().short())
    })
}

fn ballot_signature(ctx: &BallotContext<'_>) -> Verdict {
    match ctx.ballot.verify_signature(ctx.network_id) {
        Ok(()) => Verdict::Accept,
        Err(e) => reject(e.to_string()),
    }
}

fn ballot_not_all_confirm(ctx: &BallotContext<'_>) -> Verdict {
    ensure(ctx.ballot.state() != BallotState::AllConfirm, || {
        "ALLCONFIRM ballots are never accepted from peers".into()
    })
}

fn ballot_round_current(ctx: &BallotContext<'_>) -> Verdict {
    let Some(round) = ctx.ballot.subject().round() else {
        return Verdict::Accept;
    };
    if round.block_height > ctx.current.block_height {
        return defer(format!("round {} is ahead of {}", round, ctx.current));
    }
    // An older round at this height keeps collecting votes until it settles,
    // so a node that timed out can still learn the outcome its peers reached.
    let same_height = round.block_height == ctx.current.block_height;
    if round.is_before(&ctx.current) && !(same_height && ctx.open) {
        return defer(format!("round {} is older than {}", round, ctx.current));
    }
    Verdict::Accept
}

fn ballot_payload_kind(ctx: &BallotContext<'_>) -> Verdict {
    match (&ctx.ballot.data, ctx.ballot.subject().is_round()) {
        (Some(Candidate::Transaction(_)), true) | (Some(Candidate::Proposal(_)), false) => {
            reject("payload kind does not match candidate")
        }
        _ => Verdict::Accept,
    }
}

/// Gate a peer ballot before it is tallied.
pub fn check_ballot(ctx: &BallotContext<'_>) -> Verdict {
    run(
        ctx,
        &[
            ballot_vote_set as Check<_>,
            ballot_state_set as Check<_>,
            ballot_hash as Check<_>,
            ballot_payload_kind as Check<_>,
            ballot_payload as Check<_>,
            ballot_known_validator as Check<_>,
            ballot_signature as Check<_>,
            ballot_not_all_confirm as Check<_>,
            ballot_round_current as Check<_>,
        ],
    )
}
