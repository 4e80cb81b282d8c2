//! Ballots for heights this node has not reached yet
//!
//! The first node to finalize a block moves on and its peers start hearing
//! about the next height (the proposer's INIT among it) before they have
//! committed the current one. Those ballots wait here, per round, and are
//! handed back when the node enters that height.

use shared_types::Hash;
use std::collections::BTreeMap;

use super::{Ballot, Round};

/// Rounds buffered at once.
pub const MAX_HELD_ROUNDS: usize = 16;

#[derive(Debug)]
struct HeldRound {
    round: Round,
    ballots: Vec<Ballot>,
}

/// Bounded per-round buffer of early ballots.
#[derive(Debug)]
pub struct HeldBallots {
    rounds: BTreeMap<(u64, u64, Hash), HeldRound>,
    per_round: usize,
    max_rounds: usize,
}

impl HeldBallots {
    /// `per_round` caps ballots kept for any one round.
    pub fn new(per_round: usize, max_rounds: usize) -> Self {
        Self {
            rounds: BTreeMap::new(),
            per_round,
            max_rounds,
        }
    }

    /// Buffer `ballot` for `round`. Returns `false` if it was dropped: a
    /// repeat of a `(node, state)` already held, or no room left.
    pub fn hold(&mut self, round: Round, ballot: Ballot) -> bool {
        let key = (round.block_height, round.number, round.hash());
        if !self.rounds.contains_key(&key) && self.rounds.len() >= self.max_rounds {
            return false;
        }
        let held = self.rounds.entry(key).or_insert_with(|| HeldRound {
            round,
            ballots: Vec::new(),
        });
        let repeat = held
            .ballots
            .iter()
            .any(|b| b.node() == ballot.node() && b.state() == ballot.state());
        if repeat || held.ballots.len() >= self.per_round {
            return false;
        }
        held.ballots.push(ballot);
        true
    }

    /// Ballots for `current`'s height at or after `current`, in round then
    /// arrival order. Rounds already behind `current` are discarded; later
    /// heights stay buffered.
    pub fn take(&mut self, current: &Round) -> Vec<Ballot> {
        let later = self
            .rounds
            .split_off(&(current.block_height + 1, 0, [0u8; 32]));
        let reached = std::mem::replace(&mut self.rounds, later);
        reached
            .into_values()
            .filter(|held| !held.round.is_before(current))
            .flat_map(|held| held.ballots)
            .collect()
    }

    /// Ballots currently buffered.
    pub fn len(&self) -> usize {
        self.rounds.values().map(|r| r.ballots.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.rounds.is_empty()
    }

    pub fn rounds(&self) -> usize {
        self.rounds.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BallotState, CandidateRef, VotingHole};
    use shared_types::KeyPair;

    const NET: &[u8] = b"test-net";

    fn ballot(key: &KeyPair, round: Round, state: BallotState) -> Ballot {
        Ballot::sign(
            key,
            NET,
            CandidateRef::Round(round),
            key.address(),
            state,
            VotingHole::Yes,
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_take_returns_reached_height_only() {
        let a = KeyPair::from_seed([1u8; 32]);
        let b = KeyPair::from_seed([2u8; 32]);
        let next = Round::first(5, [5u8; 32], 0);
        let after = Round::first(6, [6u8; 32], 0);
        let mut held = HeldBallots::new(8, MAX_HELD_ROUNDS);

        assert!(held.hold(next, ballot(&a, next, BallotState::Init)));
        assert!(held.hold(next, ballot(&b, next, BallotState::Init)));
        assert!(held.hold(next.increased(), ballot(&a, next.increased(), BallotState::Init)));
        assert!(held.hold(after, ballot(&a, after, BallotState::Init)));
        assert_eq!(held.len(), 4);

        // Entering round 1 of height 5 discards round 0 of it.
        let replay = held.take(&next.increased());
        assert_eq!(replay.len(), 1);
        assert_eq!(replay[0].subject(), &CandidateRef::Round(next.increased()));
        assert_eq!(held.rounds(), 1);

        let replay = held.take(&after);
        assert_eq!(replay.len(), 1);
        assert!(held.is_empty());
    }

    #[test]
    fn test_hold_is_bounded() {
        let a = KeyPair::from_seed([1u8; 32]);
        let b = KeyPair::from_seed([2u8; 32]);
        let round = Round::first(5, [5u8; 32], 0);
        let mut held = HeldBallots::new(2, 2);

        assert!(held.hold(round, ballot(&a, round, BallotState::Init)));
        // Same node and state again.
        assert!(!held.hold(round, ballot(&a, round, BallotState::Init)));
        assert!(held.hold(round, ballot(&a, round, BallotState::Sign)));
        // Round full.
        assert!(!held.hold(round, ballot(&b, round, BallotState::Init)));

        let other = Round::first(6, [6u8; 32], 0);
        assert!(held.hold(other, ballot(&a, other, BallotState::Init)));
        let third = Round::first(7, [7u8; 32], 0);
        assert!(!held.hold(third, ballot(&a, third, BallotState::Init)));
        assert_eq!(held.rounds(), 2);
        assert_eq!(held.len(), 3);
    }
}
