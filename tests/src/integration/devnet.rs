//! # Devnet Harness
//!
//! Builds `validators` nodes from the deterministic devnet keys and joins
//! the first `online` of them to one [`MemoryNetwork`]. The rest stay in the
//! validator set but never speak, which is how liveness with a silent
//! validator is exercised.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use ic_01_storage::{repository as repo, KeyValueStore, MemoryStore};
use ic_02_consensus::ValidatorSet;
use isaac_telemetry::NodeTelemetry;
use node_runtime::{devnet_keypair, MemoryNetwork, NodeConfig, NodeDependencies, NodeRunner};
use shared_types::{Address, Block, Hash, Operation, Transaction, TransactionBody};

const POLL: Duration = Duration::from_millis(25);

/// Short timeouts so rounds turn over quickly in real time.
pub fn fast_config(network_id: &str) -> NodeConfig {
    let mut config = NodeConfig::default();
    config.network_id = network_id.to_string();
    config.timeouts.init = 300;
    config.timeouts.sign = 300;
    config.timeouts.accept = 300;
    config.timeouts.propose = 150;
    config.block.base_fee = 10;
    config.sweeper.interval_ms = 100;
    config
}

pub struct DevnetNode {
    pub runner: NodeRunner,
    pub store: Arc<dyn KeyValueStore>,
}

pub struct Devnet {
    pub config: NodeConfig,
    pub network: MemoryNetwork,
    pub nodes: Vec<DevnetNode>,
}

impl Devnet {
    pub fn build(config: NodeConfig, validators: usize, online: usize) -> Result<Self> {
        let keys: Vec<_> = (0..validators).map(devnet_keypair).collect();
        let set = ValidatorSet::new(keys.iter().map(|k| k.address()))?;
        let network = MemoryNetwork::new();

        let mut nodes = Vec::with_capacity(online);
        for (index, keypair) in keys.into_iter().take(online).enumerate() {
            let label = format!("{}-node-{index}", config.network_id);
            let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
            let (transport, inbox) = network.join(keypair.address(), validators - 1)?;
            let runner = NodeRunner::new(
                &config,
                NodeDependencies {
                    keypair,
                    validators: set.clone(),
                    store: Arc::clone(&store),
                    transport: Arc::new(transport),
                    inbox,
                    telemetry: NodeTelemetry::for_node(&label)?,
                    selector: None,
                },
            )
            .with_context(|| format!("Failed to build {label}"))?;
            nodes.push(DevnetNode { runner, store });
        }

        Ok(Self {
            config,
            network,
            nodes,
        })
    }

    pub fn start(&mut self) -> Result<()> {
        for node in &mut self.nodes {
            node.runner.start()?;
        }
        Ok(())
    }

    pub async fn stop(&mut self) {
        for node in &mut self.nodes {
            node.runner.stop().await;
        }
    }

    pub fn submit(&self, node: usize, tx: &Transaction) -> Result<bool> {
        let address = self.nodes[node].runner.node().address;
        Ok(self.network.submit(&address, tx)?)
    }

    /// A transaction from the genesis account, chained on its current
    /// checkpoint as node 0 sees it.
    pub fn genesis_transaction(&self, operations: Vec<Operation>) -> Result<Transaction> {
        let genesis = self.config.genesis.keypair()?;
        let account = repo::get_account(self.nodes[0].store.as_ref(), &genesis.address())?
            .ok_or_else(|| anyhow!("genesis account missing"))?;
        let body = TransactionBody {
            source: genesis.address(),
            fee: self.config.block.base_fee,
            checkpoint: account.checkpoint,
            operations,
            created: shared_types::now_millis(),
        };
        Ok(Transaction::new(
            &genesis,
            self.config.network_id.as_bytes(),
            body,
        )?)
    }

    pub fn create_account(&self, target: Address, amount: u64) -> Result<Transaction> {
        self.genesis_transaction(vec![Operation::CreateAccount { target, amount }])
    }

    pub fn confirmed_everywhere(&self, hash: &Hash) -> bool {
        self.nodes.iter().all(|node| {
            repo::block_transaction_exists(node.store.as_ref(), hash).unwrap_or(false)
        })
    }

    pub fn confirmed_anywhere(&self, hash: &Hash) -> bool {
        self.nodes.iter().any(|node| {
            repo::block_transaction_exists(node.store.as_ref(), hash).unwrap_or(false)
        })
    }

    /// Lowest committed height across the online nodes.
    pub fn min_height(&self) -> u64 {
        self.nodes
            .iter()
            .filter_map(|node| repo::latest_block(node.store.as_ref()).ok().flatten())
            .map(|block| block.height())
            .min()
            .unwrap_or(0)
    }

    pub fn block_at(&self, node: usize, height: u64) -> Result<Option<Block>> {
        Ok(repo::get_block_by_height(
            self.nodes[node].store.as_ref(),
            height,
        )?)
    }

    pub fn balance(&self, node: usize, address: &Address) -> Result<Option<u64>> {
        Ok(repo::get_account(self.nodes[node].store.as_ref(), address)?.map(|a| a.balance))
    }

    /// Poll `condition` until it holds or `limit` elapses.
    pub async fn wait_until(&self, limit: Duration, condition: impl Fn(&Self) -> bool) -> bool {
        tokio::time::timeout(limit, async {
            while !condition(self) {
                tokio::time::sleep(POLL).await;
            }
        })
        .await
        .is_ok()
    }
}
