//! Error types for the ISAAC engine

use super::BallotState;
use shared_types::TypesError;

/// Consensus error types
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConsensusError {
    #[error("Known message: {0}")]
    KnownMessage(String),

    #[error("Ballot references unknown candidate {0}")]
    UnknownCandidate(String),

    #[error("Ballot for {ballot} folded into result for {result}")]
    HashMismatch { ballot: String, result: String },

    #[error("Ballot rejected: {0}")]
    Rejected(String),

    #[error("Ballot deferred: {0}")]
    Deferred(String),

    #[error("State regression: {from} -> {to}")]
    StateRegression { from: BallotState, to: BallotState },

    #[error("Invalid threshold for {state}: {percent}% not in (0,100]")]
    InvalidThreshold { state: BallotState, percent: u8 },

    #[error("Invalid validator set: {0}")]
    InvalidValidatorSet(String),

    #[error("Not the proposer of round {round} at height {height}")]
    NotProposer { height: u64, round: u64 },

    #[error("Account state unavailable: {0}")]
    AccountState(String),

    #[error(transparent)]
    Types(#[from] TypesError),
}

impl ConsensusError {
    /// Outcomes that signal "nothing to do" rather than a faulty peer.
    pub fn is_benign(&self) -> bool {
        matches!(
            self,
            ConsensusError::KnownMessage(_)
                | ConsensusError::UnknownCandidate(_)
                | ConsensusError::Deferred(_)
        )
    }
}

/// Result type for consensus operations
pub type ConsensusResult<T> = Result<T, ConsensusError>;
