//! # ISAAC Telemetry
//!
//! Logging and metrics for ISAAC validator nodes.
//!
//! ## Components
//!
//! - **Logging**: `tracing` subscriber, pretty or JSON, filtered by `EnvFilter`
//! - **Metrics**: Prometheus counters and gauges, one registry per node
//!
//! No global registry is used. Every node is handed a [`NodeTelemetry`]
//! (its span plus its [`ConsensusMetrics`]) when it is constructed.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use isaac_telemetry::{init_logging, NodeTelemetry, TelemetryConfig};
//!
//! let config = TelemetryConfig::from_env();
//! init_logging(&config)?;
//! let telemetry = NodeTelemetry::new(&config, "node-1")?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `ISAAC_SERVICE_NAME` | `isaac-node` | Service name in logs |
//! | `ISAAC_LOG_LEVEL` | `info` | Log level filter (falls back to `RUST_LOG`) |
//! | `ISAAC_JSON_LOGS` | `false` | JSON log lines |
//! | `ISAAC_CONSOLE_OUTPUT` | `true` | Write logs to stdout |
//! | `ISAAC_NETWORK` | `devnet` | Network name |

mod config;
mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use logging::init_logging;
pub use metrics::{ConsensusMetrics, HistogramTimer};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Per-node telemetry handle.
///
/// Cheap to clone; clones share the same metrics.
#[derive(Clone)]
pub struct NodeTelemetry {
    span: tracing::Span,
    metrics: ConsensusMetrics,
}

impl NodeTelemetry {
    /// Telemetry for the node identified by `node` (usually its short address).
    pub fn new(config: &TelemetryConfig, node: &str) -> Result<Self, TelemetryError> {
        let span = tracing::info_span!(
            "node",
            service = %config.service_name,
            network = %config.network,
            node = %node,
        );
        Ok(Self {
            span,
            metrics: ConsensusMetrics::new()?,
        })
    }

    /// Telemetry with default config, for tests and embedded nodes.
    pub fn for_node(node: &str) -> Result<Self, TelemetryError> {
        Self::new(&TelemetryConfig::default(), node)
    }

    /// Span that node tasks run inside.
    pub fn span(&self) -> &tracing::Span {
        &self.span
    }

    pub fn metrics(&self) -> &ConsensusMetrics {
        &self.metrics
    }
}

impl std::fmt::Debug for NodeTelemetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeTelemetry").finish_non_exhaustive()
    }
}

/// Convenience macro for recording a metric increment.
#[macro_export]
macro_rules! metric_inc {
    ($metric:expr) => {
        $metric.inc()
    };
    ($metric:expr, $labels:expr) => {
        $metric.with_label_values($labels).inc()
    };
}
