//! Wire shapes of the JSON-RPC responses the engine consumes.
//!
//! Quantities arrive as `0x`-prefixed hex strings; they are decoded into
//! `alloy_primitives` integers here and converted into the domain model
//! from `crate::types` before leaving the RPC layer. Trace payloads are
//! handed to the trace extractor as-is.

use alloy_primitives::{Address, B256, U256, U64};
use serde::Deserialize;

use crate::error::CoreError;
use crate::types::{Block, ReceiptInfo, Transaction};

// ==============================================================================
// Blocks
// ==============================================================================

/// `eth_getBlockByNumber(n, true)` result.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RpcBlock {
    pub number: U64,
    pub hash: B256,
    pub timestamp: U64,
    #[serde(default)]
    pub transactions: Vec<RpcTransaction>,
}

/// `eth_getBlockByNumber(n, false)` result, reduced to what range
/// resolution needs.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RpcBlockHeader {
    pub timestamp: U64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RpcTransaction {
    pub hash: B256,
    pub from: Address,
    #[serde(default)]
    pub to: Option<Address>,
    pub value: U256,
    #[serde(default)]
    pub gas_price: Option<U256>,
    #[serde(default)]
    pub max_fee_per_gas: Option<U256>,
    #[serde(default)]
    pub max_priority_fee_per_gas: Option<U256>,
}

impl RpcBlock {
    pub(crate) fn into_block(self, requested: u64) -> Result<Block, CoreError> {
        let number = self.number.to::<u64>();
        if number != requested {
            return Err(CoreError::InvalidData(format!(
                "requested block {requested}, endpoint returned block {number}"
            )));
        }

        let transactions = self
            .transactions
            .into_iter()
            .map(|tx| Transaction {
                hash: tx.hash,
                block_number: number,
                from: tx.from,
                to: tx.to,
                value: tx.value,
                success: None,
                gas_used: None,
                gas_price: tx.gas_price,
                max_fee_per_gas: tx.max_fee_per_gas,
                max_priority_fee_per_gas: tx.max_priority_fee_per_gas,
                effective_gas_price: None,
            })
            .collect();

        Ok(Block {
            number,
            hash: self.hash,
            timestamp: self.timestamp.to::<u64>(),
            transactions,
        })
    }
}

// ==============================================================================
// Receipts
// ==============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RpcReceipt {
    /// Absent on pre-Byzantium receipts.
    #[serde(default)]
    pub status: Option<U64>,
    pub gas_used: U64,
    #[serde(default)]
    pub effective_gas_price: Option<U256>,
}

impl From<RpcReceipt> for ReceiptInfo {
    fn from(raw: RpcReceipt) -> Self {
        Self {
            success: raw.status.map(|s| s.to::<u64>() == 1),
            gas_used: raw.gas_used.to::<u64>(),
            effective_gas_price: raw.effective_gas_price,
        }
    }
}

// ==============================================================================
// Traces
// ==============================================================================

/// One entry of a `trace_block` result (OpenEthereum/Erigon trace format).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockTrace {
    #[serde(default)]
    pub action: TraceAction,
    #[serde(default)]
    pub result: Option<TraceResult>,
    /// Call path from the transaction's root frame; empty for the root.
    #[serde(default)]
    pub trace_address: Vec<u64>,
    /// `None` for block and uncle rewards.
    #[serde(default)]
    pub transaction_hash: Option<B256>,
    /// `call`, `create`, `suicide`, `reward`.
    #[serde(rename = "type", default)]
    pub kind: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceAction {
    #[serde(default)]
    pub from: Option<Address>,
    #[serde(default)]
    pub to: Option<Address>,
    #[serde(default)]
    pub value: Option<U256>,
    #[serde(default)]
    pub call_type: Option<String>,
    // selfdestruct fields
    #[serde(default)]
    pub address: Option<Address>,
    #[serde(default)]
    pub refund_address: Option<Address>,
    #[serde(default)]
    pub balance: Option<U256>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TraceResult {
    /// Created contract address for `create` traces.
    #[serde(default)]
    pub address: Option<Address>,
}

/// A frame of a `debug_traceTransaction` call tree (`callTracer`).
#[derive(Debug, Clone, Deserialize)]
pub struct CallFrame {
    /// `CALL`, `DELEGATECALL`, `CREATE2`, `SELFDESTRUCT`, ...
    #[serde(rename = "type", default)]
    pub kind: String,
    pub from: Address,
    #[serde(default)]
    pub to: Option<Address>,
    #[serde(default)]
    pub value: Option<U256>,
    #[serde(default)]
    pub calls: Vec<CallFrame>,
}
