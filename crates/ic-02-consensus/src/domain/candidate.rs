//! Candidate messages
//!
//! A ballot votes on exactly one candidate: a client transaction or a
//! round proposal. The payload is resolved into this closed sum type once,
//! at intake.

use serde::{Deserialize, Serialize};
use shared_types::{short_hex, Address, Hash, Transaction};
use std::fmt;

use super::Round;

/// A proposer's block candidate for one round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub round: Round,
    pub proposer: Address,
    pub transactions: Vec<Hash>,
    /// Proposer's clock when the proposal was made; stamped on the block so
    /// every node commits the same header.
    pub proposed: u64,
}

/// Payload introduced by the first ballot for a candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Candidate {
    Transaction(Transaction),
    Proposal(Proposal),
}

impl Candidate {
    pub fn subject(&self) -> CandidateRef {
        match self {
            Candidate::Transaction(tx) => CandidateRef::Transaction(tx.hash),
            Candidate::Proposal(p) => CandidateRef::Round(p.round),
        }
    }

    pub fn hash(&self) -> Hash {
        self.subject().hash()
    }

    pub fn as_transaction(&self) -> Option<&Transaction> {
        match self {
            Candidate::Transaction(tx) => Some(tx),
            Candidate::Proposal(_) => None,
        }
    }

    pub fn as_proposal(&self) -> Option<&Proposal> {
        match self {
            Candidate::Proposal(p) => Some(p),
            Candidate::Transaction(_) => None,
        }
    }
}

/// What a ballot is about, without the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CandidateRef {
    Transaction(Hash),
    Round(Round),
}

impl CandidateRef {
    /// Key of the candidate's VotingResult. A round candidate is keyed by
    /// the round hash.
    pub fn hash(&self) -> Hash {
        match self {
            CandidateRef::Transaction(h) => *h,
            CandidateRef::Round(r) => r.hash(),
        }
    }

    pub fn round(&self) -> Option<&Round> {
        match self {
            CandidateRef::Round(r) => Some(r),
            CandidateRef::Transaction(_) => None,
        }
    }

    pub fn is_round(&self) -> bool {
        matches!(self, CandidateRef::Round(_))
    }
}

impl fmt::Display for CandidateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CandidateRef::Transaction(h) => write!(f, "tx:{}", short_hex(h)),
            CandidateRef::Round(r) => write!(f, "round:{}", r),
        }
    }
}
