//! Proposer selection

use shared_types::Address;

use super::Round;

/// Picks the proposer of a round. Pluggable so tests can force one.
pub trait ProposerSelector: Send + Sync {
    /// `validators` is sorted ascending. `None` only when it is empty.
    fn select(&self, validators: &[Address], round: &Round) -> Option<Address>;
}

/// `sorted(validators)[round.number % len]`
#[derive(Debug, Clone, Copy, Default)]
pub struct SortedRoundRobin;

impl ProposerSelector for SortedRoundRobin {
    fn select(&self, validators: &[Address], round: &Round) -> Option<Address> {
        if validators.is_empty() {
            return None;
        }
        let index = (round.number % validators.len() as u64) as usize;
        validators.get(index).copied()
    }
}

/// Always the same proposer.
#[derive(Debug, Clone, Copy)]
pub struct FixedProposer(pub Address);

impl ProposerSelector for FixedProposer {
    fn select(&self, _validators: &[Address], _round: &Round) -> Option<Address> {
        Some(self.0)
    }
}
