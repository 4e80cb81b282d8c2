//! Finalizer service
//!
//! One storage transaction per block. Commit on success, discard on any
//! error, so a failed block leaves no trace in the store.

use ic_01_storage::{repository as repo, KeyValueStore};
use ic_02_consensus::Proposal;
use isaac_telemetry::{log_block_event, metric_inc, HistogramTimer, NodeTelemetry};
use shared_types::{short_hex, Account, Address, Block, BlockHeader, Transaction};
use std::sync::Arc;
use tracing::warn;

use crate::domain::apply_block;
use crate::error::{FinalizeError, FinalizeResult};

/// Writes agreed proposals to the ledger.
pub struct Finalizer {
    store: Arc<dyn KeyValueStore>,
    telemetry: NodeTelemetry,
}

impl Finalizer {
    pub fn new(store: Arc<dyn KeyValueStore>, telemetry: NodeTelemetry) -> Self {
        Self { store, telemetry }
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    /// Highest stored block.
    pub fn latest_block(&self) -> FinalizeResult<Option<Block>> {
        Ok(repo::latest_block(self.store.as_ref())?)
    }

    /// Apply `proposal` with its `transactions` (in proposal order) and
    /// write the new block, all-or-nothing.
    pub fn finish_ballot(
        &self,
        proposal: &Proposal,
        transactions: &[Transaction],
    ) -> FinalizeResult<Block> {
        let metrics = self.telemetry.metrics();
        let _timer = HistogramTimer::new(&metrics.finalize_duration);

        let mut txn = self.store.open_transaction()?;
        let result = apply_block(&mut *txn, proposal, transactions);
        let block = match result {
            Ok(block) => block,
            Err(e) => {
                txn.discard();
                metric_inc!(metrics.finalization_failures);
                warn!(round = %proposal.round, error = %e, "Finalization discarded");
                return Err(e);
            }
        };
        if let Err(e) = txn.commit() {
            metric_inc!(metrics.finalization_failures);
            warn!(round = %proposal.round, error = %e, "Finalization commit failed");
            return Err(e.into());
        }

        metric_inc!(metrics.blocks_finalized);
        metrics.chain_height.set(block.height() as i64);
        log_block_event!(
            info,
            "finalizer",
            "Block finalized",
            block.height(),
            short_hex(&block.hash),
            round = proposal.round.number,
            txs = block.header.transactions.len()
        );
        Ok(block)
    }
}

/// The height-0 block. Deterministic, so every node derives the same hash.
pub fn genesis_block(genesis: &Address) -> FinalizeResult<Block> {
    Ok(Block::new(BlockHeader {
        height: 0,
        prev_block_hash: [0u8; 32],
        round: 0,
        proposer: *genesis,
        transactions: Vec::new(),
        total_txs: 0,
        confirmed: 0,
    })?)
}

/// Write the genesis block and fund `genesis` with `balance`, unless a
/// block already exists. Returns the latest block either way.
///
/// The genesis account's checkpoint is the zero hash.
pub fn init_genesis(
    store: &dyn KeyValueStore,
    genesis: &Address,
    balance: u64,
) -> FinalizeResult<Block> {
    if let Some(latest) = repo::latest_block(store)? {
        return Ok(latest);
    }
    let block = genesis_block(genesis)?;
    let mut txn = store.open_transaction()?;
    let written = repo::save_account(&mut *txn, &Account::new(*genesis, balance, [0u8; 32]))
        .and_then(|_| repo::save_block(&mut *txn, &block));
    match written {
        Ok(()) => txn.commit()?,
        Err(e) => {
            txn.discard();
            return Err(FinalizeError::Storage(e));
        }
    }
    log_block_event!(
        info,
        "finalizer",
        "Genesis written",
        0u64,
        short_hex(&block.hash),
        balance = balance
    );
    Ok(block)
}
