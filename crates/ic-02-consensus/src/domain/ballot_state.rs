//! Ballot states and votes

use serde::{Deserialize, Serialize};
use std::fmt;

/// Protocol state of a ballot, totally ordered:
/// `NONE < INIT < SIGN < ACCEPT < ALLCONFIRM`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum BallotState {
    #[default]
    None,
    Init,
    Sign,
    Accept,
    AllConfirm,
}

impl BallotState {
    /// States that are decided by a vote threshold.
    pub const VOTING: [BallotState; 3] = [BallotState::Init, BallotState::Sign, BallotState::Accept];

    /// Successor state. `ALLCONFIRM` is terminal.
    pub fn next(self) -> Option<BallotState> {
        match self {
            BallotState::None => Some(BallotState::Init),
            BallotState::Init => Some(BallotState::Sign),
            BallotState::Sign => Some(BallotState::Accept),
            BallotState::Accept => Some(BallotState::AllConfirm),
            BallotState::AllConfirm => None,
        }
    }

    pub fn is_voting(self) -> bool {
        Self::VOTING.contains(&self)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BallotState::None => "NONE",
            BallotState::Init => "INIT",
            BallotState::Sign => "SIGN",
            BallotState::Accept => "ACCEPT",
            BallotState::AllConfirm => "ALLCONFIRM",
        }
    }
}

impl fmt::Display for BallotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A vote.
///
/// `NOT-YET` is never broadcast. `EXP` is only produced locally on timeout
/// and counts toward the `NO` side of a tally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING-KEBAB-CASE")]
pub enum VotingHole {
    #[default]
    NotYet,
    Yes,
    No,
    Exp,
}

impl VotingHole {
    /// `NO` or `EXP`.
    pub fn is_negative(self) -> bool {
        matches!(self, VotingHole::No | VotingHole::Exp)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VotingHole::NotYet => "NOT-YET",
            VotingHole::Yes => "YES",
            VotingHole::No => "NO",
            VotingHole::Exp => "EXP",
        }
    }
}

impl fmt::Display for VotingHole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
