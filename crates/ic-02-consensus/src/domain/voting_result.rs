//! Per-candidate vote tally
//!
//! ## Decision rules
//!
//! For a state with threshold `T` over `N` validators:
//! - `YES` if yes-votes ≥ T
//! - `NO` if no-votes ≥ T (`EXP` counts as `NO`)
//! - forced `NO` (draw) if the nodes that have not voted can no longer lift
//!   either side to `T`: `N - (yes + no) < T - yes` and `N - (yes + no) < T - no`
//! - otherwise not yet decided
//!
//! `make_result` checks `ACCEPT`, `SIGN`, `INIT` in that order (never below
//! the current state) so a node that is behind jumps straight to the most
//! advanced settled state.

use shared_types::{now_millis, short_hex, Address, Hash};
use std::collections::{BTreeMap, HashMap};

use super::{
    Ballot, BallotState, Candidate, CandidateRef, ConsensusError, ConsensusResult,
    VotingHole, VotingThresholdPolicy,
};

/// One recorded state transition of a VotingResult.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VotingStateStaging {
    pub subject: CandidateRef,
    pub proposer: Address,
    /// State that was decided.
    pub previous_state: BallotState,
    /// State after the decision (`previous_state.next()` on YES, unchanged on NO).
    pub state: BallotState,
    pub vote: VotingHole,
    pub epoch: u32,
}

impl VotingStateStaging {
    /// The decision closed the candidate.
    pub fn is_closed(&self) -> bool {
        self.vote.is_negative() || self.state == BallotState::AllConfirm
    }
}

/// Tally for one candidate.
#[derive(Debug, Clone)]
pub struct VotingResult {
    subject: CandidateRef,
    proposer: Address,
    state: BallotState,
    closed: bool,
    closed_at: Option<u64>,
    /// Incremented each time a closed candidate is reopened.
    epoch: u32,
    votes: BTreeMap<BallotState, HashMap<Address, VotingHole>>,
    staging: Vec<VotingStateStaging>,
    data: Option<Candidate>,
}

impl VotingResult {
    /// New tally seeded from the first ballot seen for the candidate.
    pub fn new(ballot: &Ballot) -> ConsensusResult<Self> {
        let mut result = Self {
            subject: *ballot.subject(),
            proposer: ballot.proposer(),
            state: BallotState::Init,
            closed: false,
            closed_at: None,
            epoch: 0,
            votes: BTreeMap::new(),
            staging: Vec::new(),
            data: None,
        };
        result.add(ballot)?;
        Ok(result)
    }

    pub fn subject(&self) -> &CandidateRef {
        &self.subject
    }

    pub fn hash(&self) -> Hash {
        self.subject.hash()
    }

    pub fn proposer(&self) -> Address {
        self.proposer
    }

    /// State currently being voted on.
    pub fn state(&self) -> BallotState {
        self.state
    }

    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    pub fn data(&self) -> Option<&Candidate> {
        self.data.as_ref()
    }

    pub fn staging(&self) -> &[VotingStateStaging] {
        &self.staging
    }

    pub fn latest_staging(&self) -> Option<&VotingStateStaging> {
        self.staging.last()
    }

    pub fn closed_at(&self) -> Option<u64> {
        self.closed_at
    }

    /// Closed by a negative decision, or agreed.
    pub fn is_closed(&self) -> bool {
        self.closed || self.state == BallotState::AllConfirm
    }

    /// Closed by a negative decision.
    pub fn is_rejected(&self) -> bool {
        self.closed
    }

    /// Record `ballot`'s vote. Last vote wins per `(state, node)`.
    ///
    /// Returns `true` if the ballot attached the candidate payload.
    pub fn add(&mut self, ballot: &Ballot) -> ConsensusResult<bool> {
        let hash = ballot.candidate_hash();
        if hash != self.hash() {
            return Err(ConsensusError::HashMismatch {
                ballot: short_hex(&hash),
                result: short_hex(&self.hash()),
            });
        }
        self.votes
            .entry(ballot.state())
            .or_default()
            .insert(ballot.node(), ballot.vote());

        match (&self.data, &ballot.data) {
            (None, Some(data)) => {
                self.data = Some(data.clone());
                // The introducing ballot names the real proposer.
                self.proposer = ballot.proposer();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Vote recorded for `node` at `state`.
    pub fn vote_of(&self, node: &Address, state: BallotState) -> Option<VotingHole> {
        self.votes.get(&state).and_then(|v| v.get(node)).copied()
    }

    pub fn is_voted(&self, node: &Address, state: BallotState) -> bool {
        self.vote_of(node, state).is_some()
    }

    /// `(yes, no)` counts at `state`; `EXP` counts as no.
    pub fn count(&self, state: BallotState) -> (usize, usize) {
        let Some(votes) = self.votes.get(&state) else {
            return (0, 0);
        };
        votes.values().fold((0, 0), |(yes, no), vote| match vote {
            VotingHole::Yes => (yes + 1, no),
            VotingHole::No | VotingHole::Exp => (yes, no + 1),
            VotingHole::NotYet => (yes, no),
        })
    }

    fn negative_outcome(&self, state: BallotState) -> VotingHole {
        let all_expired = self
            .votes
            .get(&state)
            .map(|v| {
                v.values().any(|h| *h == VotingHole::Exp)
                    && v.values().all(|h| *h != VotingHole::No)
            })
            .unwrap_or(false);
        if all_expired {
            VotingHole::Exp
        } else {
            VotingHole::No
        }
    }

    /// Decide `state` against the policy. `(NOT-YET, false)` when undecided
    /// or when thresholds are disabled.
    pub fn check_threshold(
        &self,
        state: BallotState,
        policy: &VotingThresholdPolicy,
    ) -> (VotingHole, bool) {
        let threshold = policy.threshold(state);
        if threshold < 1 {
            return (VotingHole::NotYet, false);
        }
        let (yes, no) = self.count(state);
        if yes >= threshold {
            return (VotingHole::Yes, true);
        }
        if no >= threshold {
            return (self.negative_outcome(state), true);
        }
        let remaining = policy.validators().saturating_sub(yes + no);
        if remaining < threshold - yes && remaining < threshold - no {
            return (VotingHole::No, true);
        }
        (VotingHole::NotYet, false)
    }

    /// Highest settled state at or above the current one.
    pub fn make_result(&self, policy: &VotingThresholdPolicy) -> Option<(BallotState, VotingHole)> {
        if self.is_closed() {
            return None;
        }
        BallotState::VOTING
            .iter()
            .rev()
            .filter(|s| **s >= self.state)
            .find_map(|s| match self.check_threshold(*s, policy) {
                (vote, true) => Some((*s, vote)),
                _ => None,
            })
    }

    /// Apply a decision for `state`. YES advances to `state.next()`; NO/EXP
    /// closes without advancing.
    pub fn change_state(
        &mut self,
        vote: VotingHole,
        state: BallotState,
    ) -> ConsensusResult<VotingStateStaging> {
        if state < self.state {
            return Err(ConsensusError::StateRegression {
                from: self.state,
                to: state,
            });
        }
        let previous_state = state;
        match vote {
            VotingHole::Yes => {
                self.state = state.next().unwrap_or(BallotState::AllConfirm);
            }
            VotingHole::No | VotingHole::Exp => {
                self.state = state;
                self.closed = true;
                self.closed_at = Some(now_millis());
            }
            VotingHole::NotYet => {
                return Err(ConsensusError::Rejected("cannot apply NOT-YET".into()));
            }
        }
        let staging = VotingStateStaging {
            subject: self.subject,
            proposer: self.proposer,
            previous_state,
            state: self.state,
            vote,
            epoch: self.epoch,
        };
        self.staging.push(staging.clone());
        Ok(staging)
    }

    /// Force-close without a vote decision (round abandoned).
    pub fn abandon(&mut self) {
        if !self.is_closed() {
            self.closed = true;
            self.closed_at = Some(now_millis());
        }
    }

    /// Reopen a rejected candidate for a new epoch. Votes at or above the
    /// current state are dropped so the new epoch starts clean there.
    pub fn reopen(&mut self) {
        self.epoch += 1;
        self.closed = false;
        self.closed_at = None;
        let from = self.state;
        self.votes.retain(|state, _| *state < from);
    }
}
