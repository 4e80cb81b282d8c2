//! Key builders.
//!
//! Every record type owns a two-letter prefix; secondary indexes extend it
//! with a short tag. Index values are the primary key's hash.

use shared_types::{Address, Hash};

pub const BLOCK: &[u8] = b"bk-";
pub const BLOCK_TRANSACTION: &[u8] = b"bt-";
pub const BLOCK_ACCOUNT: &[u8] = b"ba-";
pub const BLOCK_OPERATION: &[u8] = b"bo-";
pub const TRANSACTION_HISTORY: &[u8] = b"th-";

const BY_HASH: &[u8] = b"hash-";
const BY_CONFIRMED: &[u8] = b"conf-";
const BY_CREATED: &[u8] = b"crea-";
const BY_SOURCE: &[u8] = b"srce-";
const BY_TX: &[u8] = b"txn-";

fn key(parts: &[&[u8]]) -> Vec<u8> {
    let len = parts.iter().map(|p| p.len()).sum();
    let mut out = Vec::with_capacity(len);
    for part in parts {
        out.extend_from_slice(part);
    }
    out
}

// ---- blocks -----------------------------------------------------------------

pub fn block(hash: &Hash) -> Vec<u8> {
    key(&[BLOCK, BY_HASH, hash])
}

pub fn block_confirmed(height: u64) -> Vec<u8> {
    key(&[BLOCK, BY_CONFIRMED, &height.to_be_bytes()])
}

pub fn block_confirmed_prefix() -> Vec<u8> {
    key(&[BLOCK, BY_CONFIRMED])
}

// ---- block transactions -----------------------------------------------------

pub fn block_transaction(hash: &Hash) -> Vec<u8> {
    key(&[BLOCK_TRANSACTION, BY_HASH, hash])
}

pub fn block_transaction_confirmed(height: u64, index: u32) -> Vec<u8> {
    key(&[
        BLOCK_TRANSACTION,
        BY_CONFIRMED,
        &height.to_be_bytes(),
        &index.to_be_bytes(),
    ])
}

/// All block transactions of block `height`, in block order.
pub fn block_transaction_confirmed_height_prefix(height: u64) -> Vec<u8> {
    key(&[BLOCK_TRANSACTION, BY_CONFIRMED, &height.to_be_bytes()])
}

pub fn block_transaction_confirmed_prefix() -> Vec<u8> {
    key(&[BLOCK_TRANSACTION, BY_CONFIRMED])
}

pub fn block_transaction_created(created: u64, hash: &Hash) -> Vec<u8> {
    key(&[BLOCK_TRANSACTION, BY_CREATED, &created.to_be_bytes(), hash])
}

pub fn block_transaction_created_prefix() -> Vec<u8> {
    key(&[BLOCK_TRANSACTION, BY_CREATED])
}

pub fn block_transaction_source(source: &Address, height: u64, index: u32) -> Vec<u8> {
    key(&[
        BLOCK_TRANSACTION,
        BY_SOURCE,
        source.as_bytes(),
        &height.to_be_bytes(),
        &index.to_be_bytes(),
    ])
}

pub fn block_transaction_source_prefix(source: &Address) -> Vec<u8> {
    key(&[BLOCK_TRANSACTION, BY_SOURCE, source.as_bytes()])
}

// ---- accounts ---------------------------------------------------------------

pub fn block_account(address: &Address) -> Vec<u8> {
    key(&[BLOCK_ACCOUNT, address.as_bytes()])
}

// ---- operations -------------------------------------------------------------

pub fn block_operation(hash: &Hash) -> Vec<u8> {
    key(&[BLOCK_OPERATION, BY_HASH, hash])
}

pub fn block_operation_tx(tx_hash: &Hash, index: u32) -> Vec<u8> {
    key(&[BLOCK_OPERATION, BY_TX, tx_hash, &index.to_be_bytes()])
}

pub fn block_operation_tx_prefix(tx_hash: &Hash) -> Vec<u8> {
    key(&[BLOCK_OPERATION, BY_TX, tx_hash])
}

// ---- history ----------------------------------------------------------------

pub fn transaction_history(hash: &Hash) -> Vec<u8> {
    key(&[TRANSACTION_HISTORY, BY_HASH, hash])
}

pub fn transaction_history_created(created: u64, hash: &Hash) -> Vec<u8> {
    key(&[TRANSACTION_HISTORY, BY_CREATED, &created.to_be_bytes(), hash])
}

pub fn transaction_history_created_prefix() -> Vec<u8> {
    key(&[TRANSACTION_HISTORY, BY_CREATED])
}
