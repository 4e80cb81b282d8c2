//! # isaac-node
//!
//! Devnet binary: runs `devnet.nodes` validators in one process on a shared
//! memory network until Ctrl-C.
//!
//! ```text
//! ISAAC_DEVNET_NODES=4 ISAAC_LOG_LEVEL=info cargo run --bin isaac-node
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use ic_02_consensus::ValidatorSet;
use isaac_telemetry::{init_logging, NodeTelemetry};
use node_runtime::{open_store, MemoryNetwork, NodeConfig, NodeDependencies, NodeRunner};
use tracing::info;

const STATUS_INTERVAL: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    let config = NodeConfig::load().context("Invalid node configuration")?;
    init_logging(&config.telemetry).context("Failed to initialize logging")?;

    let keys = config.devnet.keypairs()?;
    let validators = ValidatorSet::new(keys.iter().map(|k| k.address()))
        .context("Invalid validator set")?;
    let genesis = config.genesis.keypair()?;

    info!("===========================================");
    info!("  ISAAC devnet");
    info!("  network: {}", config.network_id);
    info!("  validators: {}", keys.len());
    info!("  genesis account: {}", genesis.address());
    info!("===========================================");

    let network = MemoryNetwork::new();
    let mut runners = Vec::with_capacity(keys.len());
    for (index, keypair) in keys.into_iter().enumerate() {
        let label = format!("node-{index}");
        let address = keypair.address();
        let store = open_store(&config.storage, &label)
            .with_context(|| format!("Failed to open store for {label}"))?;
        let (transport, inbox) = network.join(address, validators.len() - 1)?;
        let telemetry = NodeTelemetry::new(&config.telemetry, &address.short())?;
        let mut runner = NodeRunner::new(
            &config,
            NodeDependencies {
                keypair,
                validators: validators.clone(),
                store,
                transport: Arc::new(transport),
                inbox,
                telemetry,
                selector: None,
            },
        )
        .with_context(|| format!("Failed to build {label}"))?;
        runner.start()?;
        runners.push(runner);
    }

    let mut ticker = tokio::time::interval(STATUS_INTERVAL);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for runner in &runners {
                    let status = runner.status();
                    info!(
                        node = %status.address.short(),
                        height = status.height,
                        round = status.round,
                        state = %status.state,
                        pool = status.pool,
                        waiting = status.boxes.waiting,
                        voting = status.boxes.voting,
                        reserved = status.boxes.reserved,
                        "Status"
                    );
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                break;
            }
        }
    }

    info!("Shutting down");
    for runner in &mut runners {
        runner.stop().await;
    }
    Ok(())
}
