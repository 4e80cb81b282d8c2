//! Domain layer for the ISAAC ballot protocol
//!
//! Leaf-first:
//! - ballot_state: `BallotState`, `VotingHole`
//! - round: `Round`, `RunningRound`, `IsaacState`
//! - candidate: `Candidate` sum type and its `CandidateRef`
//! - ballot: signed per-node votes
//! - threshold: `VotingThresholdPolicy`
//! - voting_result: per-candidate tally
//! - ballot_box: Waiting / Voting / Reserved lifecycle
//! - held_ballots: early ballots for heights not reached yet
//! - proposer: round proposer selection
//! - validator: the fixed validator set

mod ballot;
mod ballot_box;
mod ballot_state;
mod candidate;
mod error;
mod held_ballots;
mod proposer;
mod round;
mod threshold;
mod validator;
mod voting_result;

pub use ballot::*;
pub use ballot_box::*;
pub use ballot_state::*;
pub use candidate::*;
pub use error::*;
pub use held_ballots::*;
pub use proposer::*;
pub use round::*;
pub use threshold::*;
pub use validator::*;
pub use voting_result::*;
