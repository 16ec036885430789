//! Shared test helpers for `ledgerfill-core` unit tests.
//!
//! Consolidates builders for blocks, transactions, traces and call frames so
//! that tests across modules share a single source of truth for dummy data.

use alloy_primitives::{Address, B256, U256};

use crate::rpc::types::{BlockTrace, CallFrame, TraceAction, TraceResult};
use crate::types::{Block, InternalTransfer, Transaction};

/// Timestamp of block 0 in synthetic chains; blocks are 2 seconds apart.
pub const GENESIS_TIMESTAMP: u64 = 1_700_000_000;

// ==============================================================================
// Identifier Helpers
// ==============================================================================

/// Create a deterministic hash from a single distinguishing byte.
pub fn hash_from_byte(b: u8) -> B256 {
    let mut bytes = [0u8; 32];
    bytes[0] = b;
    B256::from(bytes)
}

/// Create a deterministic address from a single distinguishing byte.
pub fn addr(b: u8) -> Address {
    Address::repeat_byte(b)
}

// ==============================================================================
// Block and Transaction Builders
// ==============================================================================

pub fn make_tx(hash: B256, block_number: u64, from: Address, to: Option<Address>, value: u64) -> Transaction {
    Transaction {
        hash,
        block_number,
        from,
        to,
        value: U256::from(value),
        success: None,
        gas_used: None,
        gas_price: Some(U256::from(1_000_000_000u64)),
        max_fee_per_gas: None,
        max_priority_fee_per_gas: None,
        effective_gas_price: None,
    }
}

/// Build a block whose hash and timestamp derive from its number.
pub fn make_block(number: u64, transactions: Vec<Transaction>) -> Block {
    let mut hash = [0xbbu8; 32];
    hash[24..].copy_from_slice(&number.to_be_bytes());
    Block {
        number,
        hash: B256::from(hash),
        timestamp: GENESIS_TIMESTAMP + number * 2,
        transactions,
    }
}

/// Hash of the `i`-th transaction in block `number`, unique across blocks.
pub fn tx_hash_in(number: u64, i: u8) -> B256 {
    let mut bytes = [0u8; 32];
    bytes[0] = 0x7a;
    bytes[1] = i;
    bytes[24..].copy_from_slice(&number.to_be_bytes());
    B256::from(bytes)
}

pub fn make_internal(tx_hash: B256, trace_index: u32, from: Address, to: Address, value: u64) -> InternalTransfer {
    InternalTransfer {
        tx_hash,
        trace_index,
        depth: 1,
        from,
        to: Some(to),
        value: U256::from(value),
    }
}

// ==============================================================================
// Trace Builders
// ==============================================================================

pub fn call_frame(from: Address, to: Address, value: u64, calls: Vec<CallFrame>) -> CallFrame {
    CallFrame {
        kind: "CALL".into(),
        from,
        to: Some(to),
        value: Some(U256::from(value)),
        calls,
    }
}

pub fn call_trace(tx_hash: B256, path: &[u64], from: Address, to: Address, value: u64) -> BlockTrace {
    BlockTrace {
        action: TraceAction {
            from: Some(from),
            to: Some(to),
            value: Some(U256::from(value)),
            call_type: Some("call".into()),
            ..TraceAction::default()
        },
        result: Some(TraceResult::default()),
        trace_address: path.to_vec(),
        transaction_hash: Some(tx_hash),
        kind: "call".into(),
    }
}
