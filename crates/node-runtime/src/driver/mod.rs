//! Round/state driver: the [`IsaacStateManager`] worker and its timer.

pub mod state_manager;
pub mod timers;

pub use state_manager::{publish, DriverRequest, IsaacStateManager};
pub use timers::{Deadline, StateTimer, TimerKind};

#[cfg(test)]
mod tests;
