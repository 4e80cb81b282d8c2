//! Telemetry configuration from environment variables.

use serde::Deserialize;
use std::env;

/// Configuration for logging and metrics.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Service name attached to every log line
    pub service_name: String,

    /// Log level filter (trace, debug, info, warn, error) or a full
    /// `EnvFilter` directive
    pub log_level: String,

    /// Whether to enable console output
    pub console_output: bool,

    /// Whether to enable JSON formatted logs
    pub json_logs: bool,

    /// Network name (devnet, testnet, ...)
    pub network: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "isaac-node".to_string(),
            log_level: "info".to_string(),
            console_output: true,
            json_logs: false,
            network: "devnet".to_string(),
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `ISAAC_SERVICE_NAME`: Service name (default: isaac-node)
    /// - `ISAAC_LOG_LEVEL` or `RUST_LOG`: Log filter (default: info)
    /// - `ISAAC_CONSOLE_OUTPUT`: Enable console output (default: true)
    /// - `ISAAC_JSON_LOGS`: Enable JSON logs (default: false, true in containers)
    /// - `ISAAC_NETWORK`: Network name (default: devnet)
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply environment overrides on top of `self`.
    pub fn with_env_overrides(mut self) -> Self {
        let is_container =
            env::var("KUBERNETES_SERVICE_HOST").is_ok() || env::var("DOCKER_CONTAINER").is_ok();

        if let Ok(name) = env::var("ISAAC_SERVICE_NAME") {
            self.service_name = name;
        }
        if let Ok(level) = env::var("ISAAC_LOG_LEVEL").or_else(|_| env::var("RUST_LOG")) {
            self.log_level = level;
        }
        if let Ok(v) = env::var("ISAAC_CONSOLE_OUTPUT") {
            self.console_output = parse_flag(&v);
        }
        match env::var("ISAAC_JSON_LOGS") {
            Ok(v) => self.json_logs = parse_flag(&v),
            Err(_) if is_container => self.json_logs = true,
            Err(_) => {}
        }
        if let Ok(network) = env::var("ISAAC_NETWORK") {
            self.network = network;
        }
        self
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TelemetryConfig::default();
        assert_eq!(config.service_name, "isaac-node");
        assert_eq!(config.log_level, "info");
        assert!(config.console_output);
        assert!(!config.json_logs);
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("TRUE"));
        assert!(parse_flag("1"));
        assert!(!parse_flag("false"));
        assert!(!parse_flag("0"));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: TelemetryConfig = serde_json::from_str(r#"{"json_logs": true}"#).unwrap();
        assert!(config.json_logs);
        assert_eq!(config.network, "devnet");
    }
}
