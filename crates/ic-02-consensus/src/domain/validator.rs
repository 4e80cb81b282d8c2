//! Validator set
//!
//! Fixed for the lifetime of a node.

use shared_types::Address;
use std::collections::HashSet;

use super::{ConsensusError, ConsensusResult};

/// Validator addresses, kept sorted for proposer selection.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidatorSet {
    sorted: Vec<Address>,
    /// Quick lookup by address
    lookup: HashSet<Address>,
}

impl ValidatorSet {
    /// Fails on duplicate or malformed keys.
    pub fn new(validators: impl IntoIterator<Item = Address>) -> ConsensusResult<Self> {
        let mut sorted = Vec::new();
        let mut lookup = HashSet::new();
        for address in validators {
            address
                .validate()
                .map_err(|e| ConsensusError::InvalidValidatorSet(e.to_string()))?;
            if !lookup.insert(address) {
                return Err(ConsensusError::InvalidValidatorSet(format!(
                    "duplicate validator {}",
                    address
                )));
            }
            sorted.push(address);
        }
        sorted.sort();
        Ok(Self { sorted, lookup })
    }

    pub fn len(&self) -> usize {
        self.sorted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sorted.is_empty()
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.lookup.contains(address)
    }

    /// Addresses in ascending byte order.
    pub fn sorted(&self) -> &[Address] {
        &self.sorted
    }
}
