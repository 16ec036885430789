use std::ops::AddAssign;

use alloy_primitives::U256;
use rusqlite::{params, Transaction as SqlTransaction};
use tracing::debug;

use crate::error::CoreError;
use crate::types::{BlockBundle, InternalTransfer, Transaction, UnifiedTransfer};

use super::{checkpoint, Ledger};

/// Rows touched by one committed batch. Blocks count upserts; the other
/// fields count rows that did not exist before.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteStats {
    pub blocks: u64,
    pub transactions: u64,
    pub internal_transfers: u64,
    pub ledger_rows: u64,
}

impl AddAssign for WriteStats {
    fn add_assign(&mut self, other: Self) {
        self.blocks += other.blocks;
        self.transactions += other.transactions;
        self.internal_transfers += other.internal_transfers;
        self.ledger_rows += other.ledger_rows;
    }
}

fn amount(value: &U256) -> String {
    value.to_string()
}

impl Ledger {
    /// Write every bundle and advance `stream_id` to `last_block`, all in
    /// one SQLite transaction. Nothing is persisted on error.
    pub fn commit_batch(
        &mut self,
        stream_id: &str,
        last_block: u64,
        bundles: &[BlockBundle],
    ) -> Result<WriteStats, CoreError> {
        let tx = self.conn.transaction()?;
        let mut stats = WriteStats::default();
        for bundle in bundles {
            write_bundle(&tx, bundle, &mut stats)?;
        }
        checkpoint::save(&tx, stream_id, last_block)?;
        tx.commit()?;
        debug!(stream_id, last_block, ?stats, "batch committed");
        Ok(stats)
    }
}

fn write_bundle(
    tx: &SqlTransaction<'_>,
    bundle: &BlockBundle,
    stats: &mut WriteStats,
) -> Result<(), CoreError> {
    let block = &bundle.block;
    stats.blocks += tx
        .prepare_cached(
            "INSERT INTO blocks (number, hash, timestamp) VALUES (?1, ?2, ?3)
             ON CONFLICT (number) DO UPDATE
             SET hash = excluded.hash, timestamp = excluded.timestamp",
        )?
        .execute(params![block.number, block.hash.as_slice(), block.timestamp])?
        as u64;

    for transaction in &block.transactions {
        stats.transactions += insert_transaction(tx, transaction)?;
    }
    for transfer in &bundle.internal_transfers {
        stats.internal_transfers += insert_internal(tx, transfer)?;
    }
    for row in bundle.ledger_rows() {
        stats.ledger_rows += insert_ledger_row(tx, &row)?;
    }
    Ok(())
}

fn insert_transaction(tx: &SqlTransaction<'_>, t: &Transaction) -> Result<u64, CoreError> {
    let inserted = tx
        .prepare_cached(
            "INSERT INTO transactions (
                 hash, block_number, from_address, to_address, value, success, gas_used,
                 gas_price, max_fee_per_gas, max_priority_fee_per_gas, effective_gas_price)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT (hash) DO NOTHING",
        )?
        .execute(params![
            t.hash.as_slice(),
            t.block_number,
            t.from.as_slice(),
            t.to.as_ref().map(|a| a.as_slice()),
            amount(&t.value),
            t.success,
            t.gas_used,
            t.gas_price.as_ref().map(amount),
            t.max_fee_per_gas.as_ref().map(amount),
            t.max_priority_fee_per_gas.as_ref().map(amount),
            t.effective_gas_price.as_ref().map(amount),
        ])?;
    Ok(inserted as u64)
}

fn insert_internal(tx: &SqlTransaction<'_>, t: &InternalTransfer) -> Result<u64, CoreError> {
    let inserted = tx
        .prepare_cached(
            "INSERT INTO internal_transfers
                 (tx_hash, trace_index, depth, from_address, to_address, value)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (tx_hash, trace_index) DO NOTHING",
        )?
        .execute(params![
            t.tx_hash.as_slice(),
            t.trace_index,
            t.depth,
            t.from.as_slice(),
            t.to.as_ref().map(|a| a.as_slice()),
            amount(&t.value),
        ])?;
    Ok(inserted as u64)
}

fn insert_ledger_row(tx: &SqlTransaction<'_>, row: &UnifiedTransfer) -> Result<u64, CoreError> {
    let inserted = tx
        .prepare_cached(
            "INSERT INTO value_transfers
                 (block_number, tx_hash, idx, from_address, to_address, value, source)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT (tx_hash, idx) DO NOTHING",
        )?
        .execute(params![
            row.block_number,
            row.tx_hash.as_slice(),
            row.idx,
            row.from.as_slice(),
            row.to.as_ref().map(|a| a.as_slice()),
            amount(&row.value),
            row.source.as_str(),
        ])?;
    Ok(inserted as u64)
}
