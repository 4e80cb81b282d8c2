//! Rounds and the per-node `(height, round, state)` position

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use shared_types::{Address, Hash};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use super::{BallotState, VotingHole};

/// One consensus instance: round number on top of a parent block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Round {
    pub number: u64,
    pub block_height: u64,
    pub block_hash: Hash,
    pub total_txs: u64,
}

impl Round {
    /// First round on top of the given parent block.
    pub fn first(block_height: u64, block_hash: Hash, total_txs: u64) -> Self {
        Self {
            number: 0,
            block_height,
            block_hash,
            total_txs,
        }
    }

    /// Identity of the round. Fixed-width big-endian fields, so equal rounds
    /// always hash equal.
    pub fn hash(&self) -> Hash {
        let mut hasher = Sha256::new();
        hasher.update(self.number.to_be_bytes());
        hasher.update(self.block_height.to_be_bytes());
        hasher.update(self.block_hash);
        hasher.update(self.total_txs.to_be_bytes());
        hasher.finalize().into()
    }

    /// Same parent, round number + 1.
    pub fn increased(&self) -> Self {
        Self {
            number: self.number + 1,
            ..*self
        }
    }

    /// `(block_height, number)` ordering.
    pub fn position(&self) -> (u64, u64) {
        (self.block_height, self.number)
    }

    /// True if `self` is at an earlier height, or the same height and an
    /// earlier round number.
    pub fn is_before(&self, other: &Round) -> bool {
        self.position() < other.position()
    }
}

impl fmt::Display for Round {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.block_height, self.number)
    }
}

/// Bookkeeping for one in-flight round, owned by `BallotBoxes`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningRound {
    pub round: Round,
    pub proposer: Address,
    /// Transactions of the proposal, once the proposal payload is known.
    pub transactions: Vec<Hash>,
    /// Per-node vote on the round ballot, by state.
    pub voted: HashMap<BallotState, HashMap<Address, VotingHole>>,
}

impl RunningRound {
    pub fn new(round: Round, proposer: Address) -> Self {
        Self {
            round,
            proposer,
            transactions: Vec::new(),
            voted: HashMap::new(),
        }
    }

    pub fn record(&mut self, state: BallotState, node: Address, vote: VotingHole) {
        self.voted.entry(state).or_default().insert(node, vote);
    }

    pub fn references(&self, hash: &Hash) -> bool {
        self.transactions.contains(hash)
    }
}

/// Position of the round/state driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IsaacState {
    pub round: Round,
    pub state: BallotState,
}

impl IsaacState {
    pub fn new(round: Round, state: BallotState) -> Self {
        Self { round, state }
    }

    /// Ordering key: height, then round number, then ballot state.
    fn key(&self) -> (u64, u64, BallotState) {
        (self.round.block_height, self.round.number, self.state)
    }

    /// Strictly later than `other`. Transitions that are not later are
    /// dropped by the driver.
    pub fn is_later_than(&self, other: &IsaacState) -> bool {
        self.cmp_position(other) == Ordering::Greater
    }

    pub fn cmp_position(&self, other: &IsaacState) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl fmt::Display for IsaacState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.round, self.state)
    }
}
