//! Prometheus metrics for an ISAAC validator node.
//!
//! All metrics follow the naming convention: `isaac_<area>_<metric>_<unit>`
//!
//! Each node owns its own [`Registry`]; several nodes running in one process
//! (tests, devnet) never share counters.
//!
//! ## Metric Types
//!
//! - **Counter**: ballots received/broadcast, transitions, rounds, blocks
//! - **Gauge**: current height and round, ballot box sizes
//! - **Histogram**: block finalization duration

use prometheus::{
    exponential_buckets, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge,
    IntGaugeVec, Opts, Registry, TextEncoder,
};

use crate::TelemetryError;

/// Metrics of one validator node.
#[derive(Clone)]
pub struct ConsensusMetrics {
    registry: Registry,

    /// Ballots received, by outcome (accepted/known/rejected/deferred/ignored)
    pub ballots_received: IntCounterVec,
    /// Ballots signed by this node and handed to the transport
    pub ballots_broadcast: IntCounter,
    /// VotingResult transitions, by resulting state
    pub state_transitions: IntCounterVec,
    /// Rounds entered by the state driver
    pub rounds_started: IntCounter,
    /// Ballot-state timeouts that fired, by state
    pub timeouts_fired: IntCounterVec,
    /// Blocks written by the finalizer
    pub blocks_finalized: IntCounter,
    /// Finalization attempts that were discarded
    pub finalization_failures: IntCounter,
    /// VotingResults removed by the expiry sweeper
    pub results_swept: IntCounter,
    /// Latest confirmed block height
    pub chain_height: IntGauge,
    /// Current round number
    pub current_round: IntGauge,
    /// Ballot box sizes, by box (waiting/voting/reserved)
    pub ballot_boxes: IntGaugeVec,
    /// Time spent in a finalization storage transaction
    pub finalize_duration: Histogram,
}

impl ConsensusMetrics {
    /// Create and register all metrics in a fresh registry.
    pub fn new() -> Result<Self, TelemetryError> {
        let registry = Registry::new();
        let err = |e: prometheus::Error| TelemetryError::MetricsInit(e.to_string());

        let ballots_received = IntCounterVec::new(
            Opts::new("isaac_ballots_received_total", "Ballots received from peers"),
            &["outcome"],
        )
        .map_err(err)?;
        let ballots_broadcast = IntCounter::new(
            "isaac_ballots_broadcast_total",
            "Ballots signed and broadcast by this node",
        )
        .map_err(err)?;
        let state_transitions = IntCounterVec::new(
            Opts::new(
                "isaac_state_transitions_total",
                "Voting result state transitions",
            ),
            &["state"],
        )
        .map_err(err)?;
        let rounds_started =
            IntCounter::new("isaac_rounds_started_total", "Rounds entered").map_err(err)?;
        let timeouts_fired = IntCounterVec::new(
            Opts::new("isaac_timeouts_fired_total", "Ballot-state timeouts fired"),
            &["state"],
        )
        .map_err(err)?;
        let blocks_finalized =
            IntCounter::new("isaac_blocks_finalized_total", "Blocks finalized").map_err(err)?;
        let finalization_failures = IntCounter::new(
            "isaac_finalization_failures_total",
            "Finalization attempts discarded",
        )
        .map_err(err)?;
        let results_swept = IntCounter::new(
            "isaac_results_swept_total",
            "Voting results removed by the expiry sweeper",
        )
        .map_err(err)?;
        let chain_height =
            IntGauge::new("isaac_chain_height", "Latest confirmed block height").map_err(err)?;
        let current_round =
            IntGauge::new("isaac_current_round", "Current round number").map_err(err)?;
        let ballot_boxes = IntGaugeVec::new(
            Opts::new("isaac_ballot_box_size", "Candidates per ballot box"),
            &["box"],
        )
        .map_err(err)?;
        let finalize_duration = Histogram::with_opts(
            HistogramOpts::new(
                "isaac_finalize_duration_seconds",
                "Time spent writing a finalized block",
            )
            .buckets(exponential_buckets(0.0001, 2.0, 12).map_err(err)?),
        )
        .map_err(err)?;

        registry
            .register(Box::new(ballots_received.clone()))
            .map_err(err)?;
        registry
            .register(Box::new(ballots_broadcast.clone()))
            .map_err(err)?;
        registry
            .register(Box::new(state_transitions.clone()))
            .map_err(err)?;
        registry
            .register(Box::new(rounds_started.clone()))
            .map_err(err)?;
        registry
            .register(Box::new(timeouts_fired.clone()))
            .map_err(err)?;
        registry
            .register(Box::new(blocks_finalized.clone()))
            .map_err(err)?;
        registry
            .register(Box::new(finalization_failures.clone()))
            .map_err(err)?;
        registry
            .register(Box::new(results_swept.clone()))
            .map_err(err)?;
        registry
            .register(Box::new(chain_height.clone()))
            .map_err(err)?;
        registry
            .register(Box::new(current_round.clone()))
            .map_err(err)?;
        registry
            .register(Box::new(ballot_boxes.clone()))
            .map_err(err)?;
        registry
            .register(Box::new(finalize_duration.clone()))
            .map_err(err)?;

        Ok(Self {
            registry,
            ballots_received,
            ballots_broadcast,
            state_transitions,
            rounds_started,
            timeouts_fired,
            blocks_finalized,
            finalization_failures,
            results_swept,
            chain_height,
            current_round,
            ballot_boxes,
            finalize_duration,
        })
    }

    /// Count one received ballot under `outcome`.
    pub fn ballot_received(&self, outcome: &str) {
        self.ballots_received.with_label_values(&[outcome]).inc();
    }

    /// Record the three ballot box sizes.
    pub fn set_box_sizes(&self, waiting: usize, voting: usize, reserved: usize) {
        self.ballot_boxes
            .with_label_values(&["waiting"])
            .set(waiting as i64);
        self.ballot_boxes
            .with_label_values(&["voting"])
            .set(voting as i64);
        self.ballot_boxes
            .with_label_values(&["reserved"])
            .set(reserved as i64);
    }

    /// Encode this node's metrics in the Prometheus text format.
    pub fn gather(&self) -> Result<String, TelemetryError> {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&families, &mut buffer)
            .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
    }
}

/// Timer guard for automatic histogram observation.
pub struct HistogramTimer {
    histogram: Histogram,
    start: std::time::Instant,
}

impl HistogramTimer {
    /// Start a new timer for the given histogram.
    pub fn new(histogram: &Histogram) -> Self {
        Self {
            histogram: histogram.clone(),
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for HistogramTimer {
    fn drop(&mut self) {
        self.histogram.observe(self.start.elapsed().as_secs_f64());
    }
}

/// Start timing for a histogram. Observation happens on drop.
#[macro_export]
macro_rules! time_histogram {
    ($histogram:expr) => {
        $crate::metrics::HistogramTimer::new(&$histogram)
    };
}
