//! Domain types for the transfer ledger.
//!
//! These are the decoded, storage-ready shapes: full blocks with their
//! transactions, internal value transfers recovered from call traces, and
//! the unified ledger rows derived from both.

use std::fmt;

use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};

// ==============================================================================
// Blocks and Transactions
// ==============================================================================

/// A block with its full transaction list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub number: u64,
    pub hash: B256,
    /// Unix seconds.
    pub timestamp: u64,
    pub transactions: Vec<Transaction>,
}

/// A top-level transaction.
///
/// `success` and `gas_used` stay `None` when receipts are not resolved;
/// consumers must treat that as "unknown", not as failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub hash: B256,
    pub block_number: u64,
    pub from: Address,
    /// `None` for contract creations.
    pub to: Option<Address>,
    pub value: U256,
    pub success: Option<bool>,
    pub gas_used: Option<u64>,
    pub gas_price: Option<U256>,
    pub max_fee_per_gas: Option<U256>,
    pub max_priority_fee_per_gas: Option<U256>,
    pub effective_gas_price: Option<U256>,
}

/// Outcome fields taken from a transaction receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiptInfo {
    pub success: Option<bool>,
    pub gas_used: u64,
    pub effective_gas_price: Option<U256>,
}

impl Transaction {
    pub fn apply_receipt(&mut self, receipt: ReceiptInfo) {
        self.success = receipt.success;
        self.gas_used = Some(receipt.gas_used);
        self.effective_gas_price = receipt.effective_gas_price;
    }
}

// ==============================================================================
// Internal Transfers
// ==============================================================================

/// A non-zero value movement executed inside a transaction's call tree.
///
/// `trace_index` starts at 1 and counts value-moving frames of the
/// transaction in depth-first pre-order. `depth` is the frame's call-path
/// length (1 for direct sub-calls of the top-level call).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InternalTransfer {
    pub tx_hash: B256,
    pub trace_index: u32,
    pub depth: u32,
    pub from: Address,
    pub to: Option<Address>,
    pub value: U256,
}

// ==============================================================================
// Unified Ledger
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferSource {
    TopLevel,
    Internal,
}

impl TransferSource {
    /// Stored representation; downstream SQL filters on these literals.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TopLevel => "tx",
            Self::Internal => "trace",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "tx" => Some(Self::TopLevel),
            "trace" => Some(Self::Internal),
            _ => None,
        }
    }
}

impl fmt::Display for TransferSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the canonical transfer ledger, keyed by `(tx_hash, idx)`.
///
/// `idx = 0` is reserved for the transaction's own value; internal transfers
/// take `idx = trace_index` (always ≥ 1).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnifiedTransfer {
    pub block_number: u64,
    pub tx_hash: B256,
    pub idx: u32,
    pub from: Address,
    pub to: Option<Address>,
    pub value: U256,
    pub source: TransferSource,
}

impl UnifiedTransfer {
    /// Ledger row for a transaction's own value, or `None` if it moved nothing.
    pub fn top_level(tx: &Transaction) -> Option<Self> {
        if tx.value.is_zero() {
            return None;
        }
        Some(Self {
            block_number: tx.block_number,
            tx_hash: tx.hash,
            idx: 0,
            from: tx.from,
            to: tx.to,
            value: tx.value,
            source: TransferSource::TopLevel,
        })
    }

    /// Ledger row for an internal transfer, or `None` for a zero value.
    pub fn internal(block_number: u64, transfer: &InternalTransfer) -> Option<Self> {
        if transfer.value.is_zero() || transfer.trace_index == 0 {
            return None;
        }
        Some(Self {
            block_number,
            tx_hash: transfer.tx_hash,
            idx: transfer.trace_index,
            from: transfer.from,
            to: transfer.to,
            value: transfer.value,
            source: TransferSource::Internal,
        })
    }
}

// ==============================================================================
// Batch Payload
// ==============================================================================

/// Everything fetched for one block, ready for the write phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockBundle {
    pub block: Block,
    pub internal_transfers: Vec<InternalTransfer>,
}

impl BlockBundle {
    /// All ledger rows this block contributes, top-level rows first.
    pub fn ledger_rows(&self) -> Vec<UnifiedTransfer> {
        let top = self
            .block
            .transactions
            .iter()
            .filter_map(UnifiedTransfer::top_level);
        let internal = self
            .internal_transfers
            .iter()
            .filter_map(|t| UnifiedTransfer::internal(self.block.number, t));
        top.chain(internal).collect()
    }
}
