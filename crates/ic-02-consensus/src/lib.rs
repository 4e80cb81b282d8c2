//! # ic-02-consensus
//!
//! ISAAC ballot protocol for a permissioned validator set.
//!
//! ## Architecture
//!
//! Every candidate (a client transaction, or a proposer's block proposal for
//! a round) is agreed in four ballot states:
//!
//! ```text
//!   INIT ──threshold──► SIGN ──threshold──► ACCEPT ──threshold──► ALLCONFIRM
//!     │                   │                    │
//!     └──── NO / EXP ─────┴────── NO / EXP ────┴──► closed (Reserved)
//! ```
//!
//! Each node signs one ballot per state per candidate. A state settles when
//! its [`VotingThresholdPolicy`] count of YES (or NO) votes is reached, or
//! when the draw rule shows that neither side can still get there.
//!
//! ### Layout
//!
//! - `domain`: ballots, tallies, the ballot boxes, thresholds, rounds
//! - `validation`: ordered check pipelines returning a [`Verdict`]
//! - `service`: the [`Isaac`] engine, the transaction pool, the sweeper
//! - `ports`: [`IsaacApi`] (inbound) and [`AccountReader`] (outbound)
//! - `adapters`: in-memory account state
//!
//! The engine never broadcasts and never touches timers. It returns the
//! ballots to send and the transitions that happened; the node runtime's
//! round driver owns the clock.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ic_02_consensus::{Isaac, IsaacDependencies, IsaacApi};
//!
//! let engine = Isaac::new(deps)?;
//! engine.start_round(round);
//! let outcome = engine.receive_message(tx).await?;
//! for ballot in outcome.broadcasts {
//!     transport.broadcast(&ballot);
//! }
//! ```

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;
pub mod validation;

pub use adapters::MemoryAccounts;
pub use domain::{
    AddOutcome, Ballot, BallotBody, BallotBoxes, BallotState, BoxCounts, BoxKind, Candidate,
    CandidateRef, ConsensusError, ConsensusResult, FixedProposer, HeldBallots, IsaacState,
    Proposal,
    ProposerSelector, Round, RunningRound, SortedRoundRobin, SweepReport, ValidatorSet,
    VotingHole, VotingResult, VotingStateStaging, VotingThresholdPolicy,
};
pub use ports::{AccountReader, IsaacApi};
pub use service::{
    spawn_sweeper, IntakeOutcome, Isaac, IsaacConfig, IsaacDependencies, RoundStart,
    TransactionPool, Transition,
};
pub use validation::Verdict;
