//! # Ledger Repositories
//!
//! Typed reads and writes of ledger records over the store port.
//!
//! Readers accept anything implementing [`KvRead`] (the store or an open
//! transaction); writers accept a [`StoreWrite`] so they can only run inside
//! a transaction. Primary records are written with `insert_new`, so
//! replaying the same block twice fails instead of silently overwriting.

use serde::de::DeserializeOwned;
use serde::Serialize;
use shared_types::{
    Account, Address, Block, BlockOperation, BlockTransaction, Hash, TransactionHistory,
};

use crate::domain::errors::{display_key, StorageError, StorageResult};
use crate::domain::keys;
use crate::ports::outbound::{Direction, KvRead, StoreWrite};

// =============================================================================
// JSON HELPERS
// =============================================================================

fn get_json<T: DeserializeOwned, R: KvRead + ?Sized>(
    reader: &R,
    key: &[u8],
) -> StorageResult<Option<T>> {
    match reader.get(key)? {
        Some(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(StorageError::serialization),
        None => Ok(None),
    }
}

fn encode<T: Serialize>(value: &T) -> StorageResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(StorageError::serialization)
}

fn index_target(index_key: &[u8], value: &[u8]) -> StorageResult<Hash> {
    value.try_into().map_err(|_| StorageError::DanglingIndex {
        index: display_key(index_key),
        key: hex::encode(value),
    })
}

/// Follow every index entry under `prefix` to its primary record.
fn resolve_index<T, R, F>(
    reader: &R,
    prefix: &[u8],
    direction: Direction,
    primary_key: F,
) -> StorageResult<Vec<T>>
where
    T: DeserializeOwned,
    R: KvRead + ?Sized,
    F: Fn(&Hash) -> Vec<u8>,
{
    let mut out = Vec::new();
    for (index_key, value) in reader.iterate(prefix, direction)? {
        let hash = index_target(&index_key, &value)?;
        let key = primary_key(&hash);
        let record = get_json(reader, &key)?.ok_or_else(|| StorageError::DanglingIndex {
            index: display_key(&index_key),
            key: display_key(&key),
        })?;
        out.push(record);
    }
    Ok(out)
}

// =============================================================================
// BLOCKS
// =============================================================================

/// Store a new block and its confirmed-height index.
pub fn save_block<W: StoreWrite + ?Sized>(writer: &mut W, block: &Block) -> StorageResult<()> {
    writer
        .insert_new(&keys::block(&block.hash), &encode(block)?)
        .map_err(|e| match e {
            StorageError::KeyExists { .. } => StorageError::BlockExists {
                hash: hex::encode(block.hash),
            },
            other => other,
        })?;
    writer.set(&keys::block_confirmed(block.height()), &block.hash)
}

pub fn get_block<R: KvRead + ?Sized>(reader: &R, hash: &Hash) -> StorageResult<Option<Block>> {
    get_json(reader, &keys::block(hash))
}

pub fn get_block_by_height<R: KvRead + ?Sized>(
    reader: &R,
    height: u64,
) -> StorageResult<Option<Block>> {
    let index_key = keys::block_confirmed(height);
    match reader.get(&index_key)? {
        Some(value) => get_block(reader, &index_target(&index_key, &value)?),
        None => Ok(None),
    }
}

/// Highest confirmed block, if any block is stored.
pub fn latest_block<R: KvRead + ?Sized>(reader: &R) -> StorageResult<Option<Block>> {
    let latest = reader
        .iterate(&keys::block_confirmed_prefix(), Direction::Reverse)?
        .into_iter()
        .next();
    match latest {
        Some((index_key, value)) => get_block(reader, &index_target(&index_key, &value)?),
        None => Ok(None),
    }
}

/// Blocks in confirmed order.
pub fn list_blocks<R: KvRead + ?Sized>(
    reader: &R,
    direction: Direction,
) -> StorageResult<Vec<Block>> {
    resolve_index(
        reader,
        &keys::block_confirmed_prefix(),
        direction,
        keys::block,
    )
}

// =============================================================================
// ACCOUNTS
// =============================================================================

pub fn save_account<W: StoreWrite + ?Sized>(writer: &mut W, account: &Account) -> StorageResult<()> {
    writer.set(&keys::block_account(&account.address), &encode(account)?)
}

pub fn get_account<R: KvRead + ?Sized>(
    reader: &R,
    address: &Address,
) -> StorageResult<Option<Account>> {
    get_json(reader, &keys::block_account(address))
}

pub fn account_exists<R: KvRead + ?Sized>(reader: &R, address: &Address) -> StorageResult<bool> {
    reader.has(&keys::block_account(address))
}

// =============================================================================
// BLOCK TRANSACTIONS
// =============================================================================

/// Store a block transaction with its confirmed, created and source indexes.
pub fn save_block_transaction<W: StoreWrite + ?Sized>(
    writer: &mut W,
    tx: &BlockTransaction,
) -> StorageResult<()> {
    writer.insert_new(&keys::block_transaction(&tx.hash), &encode(tx)?)?;
    writer.set(
        &keys::block_transaction_confirmed(tx.block_height, tx.index),
        &tx.hash,
    )?;
    writer.set(
        &keys::block_transaction_created(tx.created, &tx.hash),
        &tx.hash,
    )?;
    writer.set(
        &keys::block_transaction_source(&tx.source, tx.block_height, tx.index),
        &tx.hash,
    )
}

pub fn get_block_transaction<R: KvRead + ?Sized>(
    reader: &R,
    hash: &Hash,
) -> StorageResult<Option<BlockTransaction>> {
    get_json(reader, &keys::block_transaction(hash))
}

pub fn block_transaction_exists<R: KvRead + ?Sized>(reader: &R, hash: &Hash) -> StorageResult<bool> {
    reader.has(&keys::block_transaction(hash))
}

/// Transactions of the block at `height`, in block order.
pub fn block_transactions_in_block<R: KvRead + ?Sized>(
    reader: &R,
    height: u64,
) -> StorageResult<Vec<BlockTransaction>> {
    resolve_index(
        reader,
        &keys::block_transaction_confirmed_height_prefix(height),
        Direction::Forward,
        keys::block_transaction,
    )
}

/// Every confirmed transaction sent by `source`.
pub fn block_transactions_by_source<R: KvRead + ?Sized>(
    reader: &R,
    source: &Address,
    direction: Direction,
) -> StorageResult<Vec<BlockTransaction>> {
    resolve_index(
        reader,
        &keys::block_transaction_source_prefix(source),
        direction,
        keys::block_transaction,
    )
}

/// Every confirmed transaction in client creation order.
pub fn block_transactions_by_created<R: KvRead + ?Sized>(
    reader: &R,
    direction: Direction,
) -> StorageResult<Vec<BlockTransaction>> {
    resolve_index(
        reader,
        &keys::block_transaction_created_prefix(),
        direction,
        keys::block_transaction,
    )
}

// =============================================================================
// OPERATIONS
// =============================================================================

pub fn save_block_operation<W: StoreWrite + ?Sized>(
    writer: &mut W,
    op: &BlockOperation,
) -> StorageResult<()> {
    writer.insert_new(&keys::block_operation(&op.hash), &encode(op)?)?;
    writer.set(&keys::block_operation_tx(&op.tx_hash, op.index), &op.hash)
}

pub fn get_block_operation<R: KvRead + ?Sized>(
    reader: &R,
    hash: &Hash,
) -> StorageResult<Option<BlockOperation>> {
    get_json(reader, &keys::block_operation(hash))
}

/// Operations of one transaction, in transaction order.
pub fn operations_of<R: KvRead + ?Sized>(
    reader: &R,
    tx_hash: &Hash,
) -> StorageResult<Vec<BlockOperation>> {
    resolve_index(
        reader,
        &keys::block_operation_tx_prefix(tx_hash),
        Direction::Forward,
        keys::block_operation,
    )
}

// =============================================================================
// HISTORY
// =============================================================================

/// Insert or update a history entry. The created index is stable across
/// updates because `created` never changes.
pub fn save_history<W: StoreWrite + ?Sized>(
    writer: &mut W,
    history: &TransactionHistory,
) -> StorageResult<()> {
    writer.set(&keys::transaction_history(&history.hash), &encode(history)?)?;
    writer.set(
        &keys::transaction_history_created(history.created, &history.hash),
        &history.hash,
    )
}

pub fn get_history<R: KvRead + ?Sized>(
    reader: &R,
    hash: &Hash,
) -> StorageResult<Option<TransactionHistory>> {
    get_json(reader, &keys::transaction_history(hash))
}

pub fn list_history<R: KvRead + ?Sized>(
    reader: &R,
    direction: Direction,
) -> StorageResult<Vec<TransactionHistory>> {
    resolve_index(
        reader,
        &keys::transaction_history_created_prefix(),
        direction,
        keys::transaction_history,
    )
}
