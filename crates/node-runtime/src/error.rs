//! Runtime errors

use ic_01_storage::StorageError;
use ic_02_consensus::ConsensusError;
use ic_03_finalizer::FinalizeError;
use isaac_telemetry::TelemetryError;
use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Consensus(#[from] ConsensusError),

    #[error(transparent)]
    Finalize(#[from] FinalizeError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Node already started")]
    AlreadyStarted,
}

impl RuntimeError {
    pub fn codec(e: impl std::fmt::Display) -> Self {
        RuntimeError::Codec(e.to_string())
    }
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;
