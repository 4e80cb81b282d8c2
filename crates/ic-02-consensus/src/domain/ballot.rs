//! Ballots
//!
//! A ballot is one node's signed vote on one candidate at one state. Only
//! the ballot that introduces a candidate carries its payload (`data`).
//!
//! `hash == H(canonical(body))` and the signature covers
//! `(network_id, hash)`. Ballots are never mutated after signing; a new vote
//! or state means a new ballot.

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};
use shared_types::{canonical_hash, now_millis, Address, Hash, KeyPair, Signature};

use super::{BallotState, Candidate, CandidateRef, ConsensusError, ConsensusResult, VotingHole};

/// The signed part of a ballot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotBody {
    pub candidate: CandidateRef,
    /// Originator of the candidate (transaction introducer or round proposer).
    pub proposer: Address,
    /// The voting node.
    pub node_key: Address,
    pub state: BallotState,
    pub voting_hole: VotingHole,
    /// Signing time (millis).
    pub confirmed: u64,
}

/// A signed vote.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ballot {
    pub hash: Hash,
    #[serde_as(as = "Bytes")]
    pub signature: Signature,
    pub body: BallotBody,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Candidate>,
}

impl Ballot {
    /// Build, hash and sign a ballot as `keypair`.
    pub fn sign(
        keypair: &KeyPair,
        network_id: &[u8],
        candidate: CandidateRef,
        proposer: Address,
        state: BallotState,
        vote: VotingHole,
        data: Option<Candidate>,
    ) -> ConsensusResult<Self> {
        let body = BallotBody {
            candidate,
            proposer,
            node_key: keypair.address(),
            state,
            voting_hole: vote,
            confirmed: now_millis(),
        };
        let hash = canonical_hash(&body)?;
        let signature = keypair.sign_hash(network_id, &hash);
        Ok(Self {
            hash,
            signature,
            body,
            data,
        })
    }

    /// Hash of the VotingResult this ballot belongs to.
    pub fn candidate_hash(&self) -> Hash {
        self.body.candidate.hash()
    }

    pub fn subject(&self) -> &CandidateRef {
        &self.body.candidate
    }

    pub fn state(&self) -> BallotState {
        self.body.state
    }

    pub fn vote(&self) -> VotingHole {
        self.body.voting_hole
    }

    pub fn node(&self) -> Address {
        self.body.node_key
    }

    pub fn proposer(&self) -> Address {
        self.body.proposer
    }

    /// `hash == H(body)`.
    pub fn verify_hash(&self) -> ConsensusResult<()> {
        let computed = canonical_hash(&self.body)?;
        if computed != self.hash {
            return Err(ConsensusError::Rejected(format!(
                "ballot hash mismatch for {}",
                self.body.candidate
            )));
        }
        Ok(())
    }

    /// Signature against `node_key` over `(network_id, hash)`.
    pub fn verify_signature(&self, network_id: &[u8]) -> ConsensusResult<()> {
        self.body
            .node_key
            .verify_hash(network_id, &self.hash, &self.signature)
            .map_err(|e| ConsensusError::Rejected(e.to_string()))
    }

    /// Payload, if present, must hash to the referenced candidate.
    pub fn verify_payload(&self) -> ConsensusResult<()> {
        match &self.data {
            Some(data) if data.subject() != self.body.candidate => Err(ConsensusError::Rejected(
                format!("payload does not match {}", self.body.candidate),
            )),
            Some(Candidate::Transaction(tx)) => tx
                .verify_hash()
                .map_err(|e| ConsensusError::Rejected(e.to_string())),
            _ => Ok(()),
        }
    }

    /// Every structural check a ballot must pass before it is tallied.
    pub fn verify(&self, network_id: &[u8]) -> ConsensusResult<()> {
        if self.body.voting_hole == VotingHole::NotYet {
            return Err(ConsensusError::Rejected("vote not set".into()));
        }
        if self.body.state == BallotState::None {
            return Err(ConsensusError::Rejected("ballot state NONE".into()));
        }
        self.verify_hash()?;
        self.verify_payload()?;
        self.verify_signature(network_id)
    }
}
