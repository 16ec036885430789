//! EVM JSON-RPC abstraction layer.
//!
//! Defines the [`EthRpc`] trait and provides an HTTP JSON-RPC
//! implementation ([`HttpRpcClient`]) plus a test mock (`mock::MockRpc`).

mod http_adapter;
#[cfg(test)]
pub mod mock;
pub mod retry;
pub mod types;

pub use http_adapter::{HttpRpcClient, RpcOptions};
pub use types::{BlockTrace, CallFrame};

use alloy_primitives::B256;
use async_trait::async_trait;

use crate::error::CoreError;
use crate::types::{Block, ReceiptInfo};

/// The subset of Ethereum JSON-RPC methods the backfill engine needs.
///
/// Implementations own transport concerns: retries, rate limiting, and
/// response decoding.
#[async_trait]
pub trait EthRpc: Send + Sync {
    /// Current chain tip.
    async fn block_number(&self) -> Result<u64, CoreError>;

    /// Fetch a block with full transaction objects.
    async fn get_block(&self, number: u64) -> Result<Block, CoreError>;

    /// Fetch only the block timestamp (header lookup, no transactions).
    async fn get_block_timestamp(&self, number: u64) -> Result<u64, CoreError>;

    /// Fetch receipt outcome fields. `None` when the node has no receipt.
    async fn get_receipt(&self, tx_hash: &B256) -> Result<Option<ReceiptInfo>, CoreError>;

    /// Bulk per-block trace (`trace_block`).
    async fn trace_block(&self, number: u64) -> Result<Vec<BlockTrace>, CoreError>;

    /// Recursive call tree for one transaction (`debug_traceTransaction`
    /// with the call tracer).
    async fn trace_transaction(&self, tx_hash: &B256) -> Result<CallFrame, CoreError>;
}
