use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use alloy_primitives::B256;
use async_trait::async_trait;

use crate::error::{CoreError, RpcError};
use crate::types::{Block, ReceiptInfo};

use super::types::{BlockTrace, CallFrame};
use super::EthRpc;

/// A mock EVM RPC backend for testing. Serves canned blocks, receipts and
/// traces from maps populated via the builder pattern, and can be told to
/// fail selected calls.
pub struct MockRpc {
    tip: u64,
    blocks: HashMap<u64, Block>,
    /// Timestamps for blocks that only exist for range resolution.
    timestamps: HashMap<u64, u64>,
    receipts: HashMap<B256, ReceiptInfo>,
    block_traces: HashMap<u64, Vec<BlockTrace>>,
    call_frames: HashMap<B256, CallFrame>,
    trace_block_supported: bool,
    failing_trace_blocks: HashSet<u64>,
    failing_blocks: HashSet<u64>,
    failing_tx_traces: HashSet<B256>,
    malformed_tx_traces: HashSet<B256>,
    latency: HashMap<u64, Duration>,
    pub block_calls: AtomicUsize,
    pub timestamp_calls: AtomicUsize,
    pub receipt_calls: AtomicUsize,
    pub trace_block_calls: AtomicUsize,
    pub trace_tx_calls: AtomicUsize,
}

impl MockRpc {
    pub fn builder() -> MockRpcBuilder {
        MockRpcBuilder {
            tip: None,
            blocks: HashMap::new(),
            timestamps: HashMap::new(),
            receipts: HashMap::new(),
            block_traces: HashMap::new(),
            call_frames: HashMap::new(),
            trace_block_supported: true,
            failing_trace_blocks: HashSet::new(),
            failing_blocks: HashSet::new(),
            failing_tx_traces: HashSet::new(),
            malformed_tx_traces: HashSet::new(),
            latency: HashMap::new(),
        }
    }

    fn method_not_found(method: &str) -> CoreError {
        CoreError::Rpc(RpcError::Server {
            code: -32601,
            message: format!("the method {method} does not exist/is not available"),
        })
    }

    fn internal_failure(what: String) -> CoreError {
        CoreError::Rpc(RpcError::RetriesExhausted {
            method: what,
            attempts: 6,
            last: Box::new(RpcError::HttpStatus {
                status: 429,
                body: "too many requests".into(),
            }),
        })
    }
}

pub struct MockRpcBuilder {
    tip: Option<u64>,
    blocks: HashMap<u64, Block>,
    timestamps: HashMap<u64, u64>,
    receipts: HashMap<B256, ReceiptInfo>,
    block_traces: HashMap<u64, Vec<BlockTrace>>,
    call_frames: HashMap<B256, CallFrame>,
    trace_block_supported: bool,
    failing_trace_blocks: HashSet<u64>,
    failing_blocks: HashSet<u64>,
    failing_tx_traces: HashSet<B256>,
    malformed_tx_traces: HashSet<B256>,
    latency: HashMap<u64, Duration>,
}

impl MockRpcBuilder {
    pub fn with_block(mut self, block: Block) -> Self {
        self.blocks.insert(block.number, block);
        self
    }

    pub fn with_timestamps(mut self, timestamps: impl IntoIterator<Item = (u64, u64)>) -> Self {
        self.timestamps.extend(timestamps);
        self
    }

    pub fn with_receipt(mut self, tx_hash: B256, receipt: ReceiptInfo) -> Self {
        self.receipts.insert(tx_hash, receipt);
        self
    }

    pub fn with_block_traces(mut self, number: u64, traces: Vec<BlockTrace>) -> Self {
        self.block_traces.insert(number, traces);
        self
    }

    pub fn with_call_frame(mut self, tx_hash: B256, frame: CallFrame) -> Self {
        self.call_frames.insert(tx_hash, frame);
        self
    }

    pub fn with_tip(mut self, tip: u64) -> Self {
        self.tip = Some(tip);
        self
    }

    /// Make every `trace_block` call fail as "method not found".
    pub fn without_trace_block(mut self) -> Self {
        self.trace_block_supported = false;
        self
    }

    pub fn failing_trace_block(mut self, number: u64) -> Self {
        self.failing_trace_blocks.insert(number);
        self
    }

    pub fn failing_block(mut self, number: u64) -> Self {
        self.failing_blocks.insert(number);
        self
    }

    pub fn failing_tx_trace(mut self, tx_hash: B256) -> Self {
        self.failing_tx_traces.insert(tx_hash);
        self
    }

    /// Answer the call trace for `tx_hash` with an undecodable body.
    pub fn malformed_tx_trace(mut self, tx_hash: B256) -> Self {
        self.malformed_tx_traces.insert(tx_hash);
        self
    }

    /// Delay the response for `number` so completion order differs from
    /// request order.
    pub fn with_latency(mut self, number: u64, latency: Duration) -> Self {
        self.latency.insert(number, latency);
        self
    }

    pub fn build(self) -> MockRpc {
        let highest_block = self.blocks.keys().copied().max().unwrap_or(0);
        let highest_ts = self.timestamps.keys().copied().max().unwrap_or(0);
        MockRpc {
            tip: self.tip.unwrap_or(highest_block.max(highest_ts)),
            blocks: self.blocks,
            timestamps: self.timestamps,
            receipts: self.receipts,
            block_traces: self.block_traces,
            call_frames: self.call_frames,
            trace_block_supported: self.trace_block_supported,
            failing_trace_blocks: self.failing_trace_blocks,
            failing_blocks: self.failing_blocks,
            failing_tx_traces: self.failing_tx_traces,
            malformed_tx_traces: self.malformed_tx_traces,
            latency: self.latency,
            block_calls: AtomicUsize::new(0),
            timestamp_calls: AtomicUsize::new(0),
            receipt_calls: AtomicUsize::new(0),
            trace_block_calls: AtomicUsize::new(0),
            trace_tx_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl EthRpc for MockRpc {
    async fn block_number(&self) -> Result<u64, CoreError> {
        Ok(self.tip)
    }

    async fn get_block(&self, number: u64) -> Result<Block, CoreError> {
        self.block_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency.get(&number) {
            tokio::time::sleep(*latency).await;
        }
        if self.failing_blocks.contains(&number) {
            return Err(Self::internal_failure(format!("eth_getBlockByNumber({number})")));
        }
        self.blocks
            .get(&number)
            .cloned()
            .ok_or(CoreError::BlockNotFound(number))
    }

    async fn get_block_timestamp(&self, number: u64) -> Result<u64, CoreError> {
        self.timestamp_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(ts) = self.timestamps.get(&number) {
            return Ok(*ts);
        }
        self.blocks
            .get(&number)
            .map(|b| b.timestamp)
            .ok_or(CoreError::BlockNotFound(number))
    }

    async fn get_receipt(&self, tx_hash: &B256) -> Result<Option<ReceiptInfo>, CoreError> {
        self.receipt_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.receipts.get(tx_hash).copied())
    }

    async fn trace_block(&self, number: u64) -> Result<Vec<BlockTrace>, CoreError> {
        self.trace_block_calls.fetch_add(1, Ordering::SeqCst);
        if !self.trace_block_supported {
            return Err(Self::method_not_found("trace_block"));
        }
        if self.failing_trace_blocks.contains(&number) {
            return Err(Self::internal_failure(format!("trace_block({number})")));
        }
        Ok(self.block_traces.get(&number).cloned().unwrap_or_default())
    }

    async fn trace_transaction(&self, tx_hash: &B256) -> Result<CallFrame, CoreError> {
        self.trace_tx_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_tx_traces.contains(tx_hash) {
            return Err(Self::internal_failure(format!("debug_traceTransaction({tx_hash})")));
        }
        if self.malformed_tx_traces.contains(tx_hash) {
            return Err(CoreError::Rpc(RpcError::InvalidResponse(
                "decode JSON-RPC response: EOF while parsing an object".into(),
            )));
        }
        self.call_frames.get(tx_hash).cloned().ok_or_else(|| {
            CoreError::Rpc(RpcError::Server {
                code: -32000,
                message: format!("transaction {tx_hash} not found"),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::*;

    #[tokio::test]
    async fn tip_defaults_to_highest_known_block() {
        let rpc = MockRpc::builder()
            .with_block(make_block(5, Vec::new()))
            .with_timestamps([(9, 900)])
            .build();
        assert_eq!(rpc.block_number().await.expect("tip"), 9);

        let rpc = MockRpc::builder()
            .with_block(make_block(5, Vec::new()))
            .with_tip(100)
            .build();
        assert_eq!(rpc.block_number().await.expect("tip"), 100);
    }

    #[tokio::test]
    async fn unsupported_trace_block_reports_method_not_found() {
        let rpc = MockRpc::builder().without_trace_block().build();
        let err = rpc.trace_block(1).await.unwrap_err();
        assert!(matches!(
            err,
            CoreError::Rpc(RpcError::Server { code: -32601, .. })
        ));
        assert_eq!(rpc.trace_block_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_receipt_is_none() {
        let rpc = MockRpc::builder().build();
        assert!(rpc.get_receipt(&hash_from_byte(1)).await.expect("receipt lookup").is_none());
    }
}
