//! Expiry sweeper
//!
//! Periodically expires settled candidates so the ballot boxes stay bounded.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, Instrument};

use super::Isaac;
use crate::ports::AccountReader;

/// Run [`Isaac::sweep_expired`] every `interval` until `shutdown` flips to
/// `true` (or its sender is dropped).
pub fn spawn_sweeper<A>(
    engine: Arc<Isaac<A>>,
    interval: Duration,
    retention: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()>
where
    A: AccountReader + 'static,
{
    let span = engine.telemetry().span().clone();
    tokio::spawn(
        async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        engine.sweep_expired(retention);
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            debug!("Sweeper stopped");
                            return;
                        }
                    }
                }
            }
        }
        .instrument(span),
    )
}
