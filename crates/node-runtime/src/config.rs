//! # Node Configuration
//!
//! Loaded from the JSON file named by `ISAAC_CONFIG` (defaults otherwise),
//! then overridden from the environment:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `ISAAC_NETWORK_ID` | `network_id` |
//! | `ISAAC_DATA_DIR` | `storage.data_dir` |
//! | `ISAAC_DEVNET_NODES` | `devnet.nodes` |
//!
//! A configuration that fails [`NodeConfig::validate`] is the only fatal
//! error a node has.

use ic_02_consensus::{IsaacConfig, VotingThresholdPolicy};
use isaac_telemetry::TelemetryConfig;
use serde::Deserialize;
use shared_types::KeyPair;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config {path}: {message}")]
    Read { path: String, message: String },

    #[error("Cannot parse config {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Invalid {field}: {message}")]
    Invalid { field: &'static str, message: String },

    #[error("Storage backend {0} is not compiled in")]
    BackendUnavailable(&'static str),
}

impl ConfigError {
    fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            message: message.into(),
        }
    }
}

/// Complete node configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub network_id: String,
    pub thresholds: ThresholdConfig,
    pub timeouts: TimeoutConfig,
    pub block: BlockConfig,
    pub sweeper: SweeperConfig,
    pub storage: StorageConfig,
    pub genesis: GenesisConfig,
    pub devnet: DevnetConfig,
    pub telemetry: TelemetryConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            network_id: "isaac-devnet".to_string(),
            thresholds: ThresholdConfig::default(),
            timeouts: TimeoutConfig::default(),
            block: BlockConfig::default(),
            sweeper: SweeperConfig::default(),
            storage: StorageConfig::default(),
            genesis: GenesisConfig::default(),
            devnet: DevnetConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

/// Percent of validators needed to settle each state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub init: u8,
    pub sign: u8,
    pub accept: u8,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            init: 100,
            sign: 67,
            accept: 67,
        }
    }
}

/// Per-state timeouts, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub init: u64,
    pub sign: u64,
    pub accept: u64,
    /// How long a proposer waits for agreed transactions before proposing
    /// whatever it has.
    pub propose: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            init: 2_000,
            sign: 2_000,
            accept: 2_000,
            propose: 1_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BlockConfig {
    pub transactions_limit: usize,
    pub min_proposal_transactions: usize,
    pub base_fee: u64,
}

impl Default for BlockConfig {
    fn default() -> Self {
        Self {
            transactions_limit: 1_000,
            min_proposal_transactions: 1,
            base_fee: 10_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SweeperConfig {
    pub interval_ms: u64,
    pub retention_ms: u64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval_ms: 5_000,
            retention_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Rocksdb,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            data_dir: PathBuf::from("./data"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GenesisConfig {
    pub balance: u64,
    /// Hex seed of the account funded at genesis.
    pub account_seed: String,
}

impl Default for GenesisConfig {
    fn default() -> Self {
        Self {
            balance: 10_000_000_000_000,
            account_seed: hex::encode([0xeeu8; 32]),
        }
    }
}

impl GenesisConfig {
    pub fn keypair(&self) -> Result<KeyPair, ConfigError> {
        KeyPair::from_hex_seed(&self.account_seed)
            .map_err(|e| ConfigError::invalid("genesis.account_seed", e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DevnetConfig {
    pub nodes: usize,
    /// Hex seeds of the validators. Empty means derive one per node.
    pub validator_seeds: Vec<String>,
}

impl Default for DevnetConfig {
    fn default() -> Self {
        Self {
            nodes: 4,
            validator_seeds: Vec::new(),
        }
    }
}

impl DevnetConfig {
    /// Validator key pairs, in node order.
    pub fn keypairs(&self) -> Result<Vec<KeyPair>, ConfigError> {
        if self.validator_seeds.is_empty() {
            return Ok((0..self.nodes).map(devnet_keypair).collect());
        }
        self.validator_seeds
            .iter()
            .map(|seed| {
                KeyPair::from_hex_seed(seed)
                    .map_err(|e| ConfigError::invalid("devnet.validator_seeds", e.to_string()))
            })
            .collect()
    }
}

/// Deterministic key for devnet node `index`.
pub fn devnet_keypair(index: usize) -> KeyPair {
    let mut seed = [0u8; 32];
    seed[..8].copy_from_slice(&(index as u64 + 1).to_be_bytes());
    seed[8..16].copy_from_slice(b"isaacdev");
    KeyPair::from_seed(seed)
}

impl NodeConfig {
    /// Defaults (or the `ISAAC_CONFIG` file), environment overrides, then
    /// validation.
    pub fn load() -> Result<Self, ConfigError> {
        let config = match std::env::var("ISAAC_CONFIG") {
            Ok(path) if !path.is_empty() => Self::from_file(path)?,
            _ => Self::default(),
        };
        let config = config.with_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_json(&raw).map_err(|e| match e {
            ConfigError::Parse { message, .. } => ConfigError::Parse {
                path: path.display().to_string(),
                message,
            },
            other => other,
        })
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(raw).map_err(|e| ConfigError::Parse {
            path: "<inline>".into(),
            message: e.to_string(),
        })
    }

    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        if let Ok(id) = std::env::var("ISAAC_NETWORK_ID") {
            self.network_id = id;
        }
        if let Ok(dir) = std::env::var("ISAAC_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(dir);
        }
        if let Ok(nodes) = std::env::var("ISAAC_DEVNET_NODES") {
            self.devnet.nodes = nodes
                .parse()
                .map_err(|_| ConfigError::invalid("ISAAC_DEVNET_NODES", nodes.clone()))?;
        }
        self.telemetry = self.telemetry.with_env_overrides();
        Ok(self)
    }

    /// Fails on thresholds outside `(0,100]`, zero timeouts, a zero
    /// transaction limit and malformed keys.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.network_id.is_empty() {
            return Err(ConfigError::invalid("network_id", "empty"));
        }
        self.policy()?;
        let t = &self.timeouts;
        for (field, value) in [
            ("timeouts.init", t.init),
            ("timeouts.sign", t.sign),
            ("timeouts.accept", t.accept),
            ("timeouts.propose", t.propose),
            ("sweeper.interval_ms", self.sweeper.interval_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::invalid(field, "must be positive"));
            }
        }
        if self.block.transactions_limit == 0 {
            return Err(ConfigError::invalid("block.transactions_limit", "must be positive"));
        }
        if self.block.min_proposal_transactions > self.block.transactions_limit {
            return Err(ConfigError::invalid(
                "block.min_proposal_transactions",
                "exceeds transactions_limit",
            ));
        }
        if self.devnet.nodes == 0 {
            return Err(ConfigError::invalid("devnet.nodes", "must be positive"));
        }
        let keys = self.devnet.keypairs()?;
        if !self.devnet.validator_seeds.is_empty() && keys.len() != self.devnet.nodes {
            return Err(ConfigError::invalid(
                "devnet.validator_seeds",
                format!("{} seeds for {} nodes", keys.len(), self.devnet.nodes),
            ));
        }
        self.genesis.keypair()?;
        Ok(())
    }

    pub fn policy(&self) -> Result<VotingThresholdPolicy, ConfigError> {
        let t = &self.thresholds;
        VotingThresholdPolicy::new(t.init, t.sign, t.accept)
            .map_err(|e| ConfigError::invalid("thresholds", e.to_string()))
    }

    pub fn isaac_config(&self) -> IsaacConfig {
        IsaacConfig {
            network_id: self.network_id.as_bytes().to_vec(),
            transactions_limit: self.block.transactions_limit,
            base_fee: self.block.base_fee,
        }
    }

    pub fn driver_config(&self) -> DriverConfig {
        DriverConfig {
            init_timeout: Duration::from_millis(self.timeouts.init),
            sign_timeout: Duration::from_millis(self.timeouts.sign),
            accept_timeout: Duration::from_millis(self.timeouts.accept),
            propose_timeout: Duration::from_millis(self.timeouts.propose),
            min_proposal_transactions: self.block.min_proposal_transactions,
        }
    }
}

/// What the round/state driver needs from the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverConfig {
    pub init_timeout: Duration,
    pub sign_timeout: Duration,
    pub accept_timeout: Duration,
    pub propose_timeout: Duration,
    pub min_proposal_transactions: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        NodeConfig::default().driver_config()
    }
}
