//! Structured logging.
//!
//! Two output formats share one filter:
//! - pretty, ANSI-colored lines for development
//! - JSON lines (`timestamp`, `level`, `target`, `fields`, span list) for
//!   log shippers
//!
//! Every node also gets its own span carrying `service`, `network` and
//! `node` so lines from several in-process nodes stay distinguishable.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{TelemetryConfig, TelemetryError};

/// Install the process-wide subscriber.
///
/// Only the binary calls this. Library code and tests log through whatever
/// subscriber is installed (or none).
pub fn init_logging(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter = EnvFilter::try_new(&config.log_level)
        .or_else(|_| EnvFilter::try_from_default_env())
        .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;

    if !config.console_output {
        tracing_subscriber::registry()
            .with(env_filter)
            .try_init()
            .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;
        return Ok(());
    }

    if config.json_logs {
        let json_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(json_layer)
            .try_init()
            .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .with_ansi(true);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;
    }

    tracing::info!(
        service = %config.service_name,
        network = %config.network,
        json = config.json_logs,
        "Logging initialized"
    );

    Ok(())
}

/// Log an event with the component name attached.
#[macro_export]
macro_rules! log_event {
    (info, $component:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::info!(component = $component, $($($field)*,)? $msg)
    };
    (warn, $component:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::warn!(component = $component, $($($field)*,)? $msg)
    };
    (error, $component:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::error!(component = $component, $($($field)*,)? $msg)
    };
    (debug, $component:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::debug!(component = $component, $($($field)*,)? $msg)
    };
}

/// Log a ballot-related event with standard fields.
#[macro_export]
macro_rules! log_ballot_event {
    ($level:ident, $msg:expr, $subject:expr, $state:expr, $node:expr $(, $($field:tt)*)?) => {
        tracing::$level!(
            component = "isaac",
            subject = %$subject,
            state = %$state,
            from = %$node,
            $($($field)*,)?
            $msg
        )
    };
}

/// Log a block-related event with standard fields.
#[macro_export]
macro_rules! log_block_event {
    ($level:ident, $component:expr, $msg:expr, $height:expr, $hash:expr $(, $($field:tt)*)?) => {
        tracing::$level!(
            component = $component,
            block_height = $height,
            block_hash = %$hash,
            $($($field)*,)?
            $msg
        )
    };
}
