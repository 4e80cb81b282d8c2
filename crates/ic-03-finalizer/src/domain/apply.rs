//! Apply functions
//!
//! Everything here writes through a [`StoreWrite`], normally an open
//! storage transaction. Callers commit or discard; nothing in this module
//! does either.

use ic_01_storage::{repository as repo, StoreWrite};
use ic_02_consensus::Proposal;
use shared_types::{
    short_hex, Account, Address, Block, BlockHeader, BlockOperation,
    BlockTransaction, Operation, Transaction, TransactionHistory, TransactionStatus,
};

use crate::error::{FinalizeError, FinalizeResult};

fn addr(address: &Address) -> String {
    address.short()
}

/// `CreateAccount`: the target must not exist yet. It starts with `amount`
/// and the creating transaction as checkpoint.
pub fn apply_create_account<W: StoreWrite + ?Sized>(
    writer: &mut W,
    tx: &Transaction,
    target: &Address,
    amount: u64,
) -> FinalizeResult<()> {
    if repo::account_exists(&*writer, target)? {
        return Err(FinalizeError::AccountExists {
            address: addr(target),
        });
    }
    repo::save_account(writer, &Account::new(*target, amount, tx.hash))?;
    Ok(())
}

/// `Payment`: credit an existing target.
pub fn apply_payment<W: StoreWrite + ?Sized>(
    writer: &mut W,
    target: &Address,
    amount: u64,
) -> FinalizeResult<()> {
    let mut account =
        repo::get_account(&*writer, target)?.ok_or_else(|| FinalizeError::TargetMissing {
            address: addr(target),
        })?;
    account.balance = account
        .balance
        .checked_add(amount)
        .ok_or_else(|| FinalizeError::Overflow {
            address: addr(target),
        })?;
    repo::save_account(writer, &account)?;
    Ok(())
}

fn apply_operation<W: StoreWrite + ?Sized>(
    writer: &mut W,
    tx: &Transaction,
    op: &Operation,
) -> FinalizeResult<()> {
    match op {
        Operation::CreateAccount { target, amount } => {
            apply_create_account(writer, tx, target, *amount)
        }
        Operation::Payment { target, amount } => apply_payment(writer, target, *amount),
    }
}

/// Apply one transaction of `block` at position `index`.
///
/// Debits `fee + Σamount` from the source and moves its checkpoint to the
/// transaction hash, applies each operation, then writes the block
/// transaction, its operations and a confirmed history entry.
pub fn finish_transaction<W: StoreWrite + ?Sized>(
    writer: &mut W,
    block: &Block,
    index: u32,
    tx: &Transaction,
) -> FinalizeResult<BlockTransaction> {
    if repo::block_transaction_exists(&*writer, &tx.hash)? {
        return Err(FinalizeError::AlreadyConfirmed {
            hash: short_hex(&tx.hash),
        });
    }
    let source_address = tx.source();
    let mut source =
        repo::get_account(&*writer, &source_address)?.ok_or_else(|| FinalizeError::SourceMissing {
            address: addr(&source_address),
        })?;
    if source.checkpoint != tx.body.checkpoint {
        return Err(FinalizeError::CheckpointMismatch {
            address: addr(&source_address),
        });
    }
    let (amount, cost) = match (tx.total_amount(), tx.total_cost()) {
        (Some(amount), Some(cost)) => (amount, cost),
        _ => {
            return Err(FinalizeError::Overflow {
                address: addr(&source_address),
            })
        }
    };
    if source.balance < cost {
        return Err(FinalizeError::InsufficientBalance {
            address: addr(&source_address),
            balance: source.balance,
            cost,
        });
    }
    source.balance -= cost;
    source.checkpoint = tx.hash;
    repo::save_account(writer, &source)?;

    let mut operations = Vec::with_capacity(tx.body.operations.len());
    for (op_index, op) in tx.body.operations.iter().enumerate() {
        apply_operation(writer, tx, op)?;
        let record = BlockOperation::from_operation(tx, op_index as u32, op)?;
        repo::save_block_operation(writer, &record)?;
        operations.push(record.hash);
    }

    let record = BlockTransaction {
        hash: tx.hash,
        block_hash: block.hash,
        block_height: block.height(),
        index,
        source: source_address,
        fee: tx.body.fee,
        amount,
        operations,
        created: tx.body.created,
        confirmed: block.header.confirmed,
    };
    repo::save_block_transaction(writer, &record)?;
    repo::save_history(
        writer,
        &TransactionHistory {
            hash: tx.hash,
            source: source_address,
            status: TransactionStatus::Confirmed,
            block_height: Some(block.height()),
            created: tx.body.created,
            confirmed: Some(block.header.confirmed),
        },
    )?;
    Ok(record)
}

/// Apply an agreed proposal and write its block.
///
/// `transactions` must be the proposal's transactions in proposal order.
/// The block record is written last.
pub fn apply_block<W: StoreWrite + ?Sized>(
    writer: &mut W,
    proposal: &Proposal,
    transactions: &[Transaction],
) -> FinalizeResult<Block> {
    let round = &proposal.round;
    let parent = repo::latest_block(&*writer)?;
    let parent_matches = parent
        .as_ref()
        .is_some_and(|b| b.hash == round.block_hash && b.height() == round.block_height);
    if !parent_matches {
        return Err(FinalizeError::ParentMismatch {
            expected: format!("{}@{}", short_hex(&round.block_hash), round.block_height),
            found: parent
                .map(|b| format!("{}@{}", short_hex(&b.hash), b.height()))
                .unwrap_or_else(|| "none".into()),
        });
    }

    for (hash, tx) in proposal.transactions.iter().zip(transactions) {
        if *hash != tx.hash {
            return Err(FinalizeError::MissingTransaction {
                hash: short_hex(hash),
            });
        }
    }
    if let Some(missing) = proposal.transactions.get(transactions.len()) {
        return Err(FinalizeError::MissingTransaction {
            hash: short_hex(missing),
        });
    }

    let block = Block::new(BlockHeader {
        height: round.block_height + 1,
        prev_block_hash: round.block_hash,
        round: round.number,
        proposer: proposal.proposer,
        transactions: proposal.transactions.clone(),
        total_txs: round.total_txs + proposal.transactions.len() as u64,
        confirmed: proposal.proposed,
    })?;

    for (index, tx) in transactions.iter().take(proposal.transactions.len()).enumerate() {
        finish_transaction(writer, &block, index as u32, tx)?;
    }
    repo::save_block(writer, &block)?;
    Ok(block)
}
