//! Vote thresholds
//!
//! `threshold(state) = ceil(validators * percent(state) / 100)`

use super::{BallotState, ConsensusError, ConsensusResult};

/// Per-state agreement percentages applied to the validator count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VotingThresholdPolicy {
    init: u8,
    sign: u8,
    accept: u8,
    validators: usize,
    connected: usize,
}

impl VotingThresholdPolicy {
    /// Fails if any percentage is outside `(0, 100]`.
    pub fn new(init: u8, sign: u8, accept: u8) -> ConsensusResult<Self> {
        for (state, percent) in [
            (BallotState::Init, init),
            (BallotState::Sign, sign),
            (BallotState::Accept, accept),
        ] {
            if percent == 0 || percent > 100 {
                return Err(ConsensusError::InvalidThreshold { state, percent });
            }
        }
        Ok(Self {
            init,
            sign,
            accept,
            validators: 0,
            connected: 0,
        })
    }

    pub fn set_validators(&mut self, count: usize) {
        self.validators = count;
    }

    /// Number of peers currently connected (excluding this node).
    pub fn set_connected(&mut self, count: usize) {
        self.connected = count;
    }

    pub fn validators(&self) -> usize {
        self.validators
    }

    pub fn connected(&self) -> usize {
        self.connected
    }

    pub fn percent(&self, state: BallotState) -> Option<u8> {
        match state {
            BallotState::Init => Some(self.init),
            BallotState::Sign => Some(self.sign),
            BallotState::Accept => Some(self.accept),
            BallotState::None | BallotState::AllConfirm => None,
        }
    }

    /// Absolute vote count needed to settle `state`. Zero (checks disabled)
    /// until the validator count is known, and for non-voting states.
    pub fn threshold(&self, state: BallotState) -> usize {
        match self.percent(state) {
            Some(percent) => (self.validators * percent as usize).div_ceil(100),
            None => 0,
        }
    }

    /// Enough peers are connected to reach the INIT threshold.
    pub fn can_start(&self) -> bool {
        let needed = self.threshold(BallotState::Init);
        needed > 0 && self.connected + 1 >= needed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_invalid_percentages_rejected() {
        assert!(VotingThresholdPolicy::new(0, 67, 67).is_err());
        assert!(VotingThresholdPolicy::new(100, 101, 67).is_err());
        assert!(VotingThresholdPolicy::new(100, 67, 100).is_ok());
    }

    #[test]
    fn test_thresholds_round_up() {
        let mut policy = VotingThresholdPolicy::new(100, 60, 60).unwrap();
        policy.set_validators(5);
        assert_eq!(policy.threshold(BallotState::Init), 5);
        assert_eq!(policy.threshold(BallotState::Sign), 3);
        assert_eq!(policy.threshold(BallotState::Accept), 3);

        policy = VotingThresholdPolicy::new(100, 67, 67).unwrap();
        policy.set_validators(4);
        // 4 * 0.67 = 2.68
        assert_eq!(policy.threshold(BallotState::Sign), 3);
    }

    #[test]
    fn test_unset_validators_disable_thresholds() {
        let policy = VotingThresholdPolicy::new(100, 67, 67).unwrap();
        assert_eq!(policy.threshold(BallotState::Init), 0);
        assert!(!policy.can_start());
    }

    #[test]
    fn test_can_start_counts_self() {
        let mut policy = VotingThresholdPolicy::new(100, 67, 67).unwrap();
        policy.set_validators(3);
        policy.set_connected(1);
        assert!(!policy.can_start());
        policy.set_connected(2);
        assert!(policy.can_start());
    }

    proptest! {
        #[test]
        fn prop_threshold_is_ceiling(n in 1usize..200, p in 1u8..=100) {
            let mut policy = VotingThresholdPolicy::new(p, p, p).unwrap();
            policy.set_validators(n);
            let t = policy.threshold(BallotState::Sign);
            prop_assert!(t * 100 >= n * p as usize);
            prop_assert!((t - 1) * 100 < n * p as usize);
            prop_assert!(t >= 1 && t <= n);
        }
    }
}
