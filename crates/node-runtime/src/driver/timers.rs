//! Per-state timer
//!
//! The driver owns exactly one [`StateTimer`]. Arming it replaces whatever
//! was armed before, so a node never has more than one outstanding timeout.

use ic_02_consensus::{BallotState, IsaacState};
use std::pin::Pin;
use std::time::Duration;
use tokio::time::{sleep_until, Instant, Sleep};

/// What a deadline is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Proposer waiting for enough agreed transactions.
    Propose,
    /// Waiting for `state` to settle.
    State(BallotState),
}

impl TimerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimerKind::Propose => "PROPOSE",
            TimerKind::State(state) => state.as_str(),
        }
    }
}

/// An armed timeout and the driver position it was armed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    pub position: IsaacState,
    pub kind: TimerKind,
}

pub struct StateTimer {
    sleep: Pin<Box<Sleep>>,
    armed: Option<Deadline>,
}

impl StateTimer {
    pub fn new() -> Self {
        Self {
            sleep: Box::pin(sleep_until(Instant::now())),
            armed: None,
        }
    }

    /// Arm for `position`, replacing any previous deadline.
    pub fn arm(&mut self, position: IsaacState, kind: TimerKind, after: Duration) {
        self.sleep.as_mut().reset(Instant::now() + after);
        self.armed = Some(Deadline { position, kind });
    }

    pub fn disarm(&mut self) -> Option<Deadline> {
        self.armed.take()
    }

    pub fn armed(&self) -> Option<&Deadline> {
        self.armed.as_ref()
    }

    /// Resolves when the armed deadline passes; pending forever while
    /// disarmed. Cancel-safe: dropping the future keeps the deadline armed.
    pub async fn fired(&mut self) -> Deadline {
        if self.armed.is_none() {
            return std::future::pending().await;
        }
        self.sleep.as_mut().await;
        match self.armed.take() {
            Some(deadline) => deadline,
            None => std::future::pending().await,
        }
    }
}

impl Default for StateTimer {
    fn default() -> Self {
        Self::new()
    }
}
