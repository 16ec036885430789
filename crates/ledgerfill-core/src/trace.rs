//! Internal value-transfer extraction.
//!
//! Two provider APIs can reveal value moved inside a transaction:
//! - `trace_block` returns every call frame of a block in one response;
//! - `debug_traceTransaction` with the call tracer returns one transaction's
//!   call tree.
//!
//! Which one is used is decided once at startup ([`TraceStrategy::resolve`])
//! and re-evaluated per block when the bulk call fails. Both paths emit the
//! same rows: root frames and `delegatecall` frames are skipped, and each
//! remaining non-zero frame gets the next per-transaction index in
//! depth-first pre-order, starting at 1.

use std::collections::HashMap;
use std::time::Duration;

use alloy_primitives::{Address, B256, U256};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{CoreError, RpcError};
use crate::rpc::{BlockTrace, CallFrame, EthRpc};
use crate::types::{Block, InternalTransfer};

/// Operator-facing trace switches.
#[derive(Debug, Clone, Default)]
pub struct TraceSettings {
    pub enabled: bool,
    /// Try `trace_block` before anything else.
    pub use_block_trace: bool,
    /// Fall back to per-transaction call traces when `trace_block` fails.
    pub fallback: bool,
    /// Pause after each per-transaction trace call.
    pub call_delay: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceStrategy {
    /// Internal transfers are not requested.
    Disabled,
    /// Bulk `trace_block`; per-block fallback when `fallback` is set.
    BlockTrace { fallback: bool },
    /// Per-transaction `debug_traceTransaction`.
    CallTracer,
    /// Requested, but no usable trace API. Internal transfers are not
    /// recorded.
    Unavailable,
}

impl TraceStrategy {
    /// Pick a strategy, probing `trace_block` at the chain tip when it is
    /// allowed.
    pub async fn resolve(rpc: &dyn EthRpc, settings: &TraceSettings) -> Result<Self, CoreError> {
        if !settings.enabled {
            return Ok(Self::Disabled);
        }
        if !settings.use_block_trace {
            return Ok(Self::CallTracer);
        }

        let tip = rpc.block_number().await?;
        match rpc.trace_block(tip).await {
            Ok(_) => Ok(Self::BlockTrace {
                fallback: settings.fallback,
            }),
            Err(err) if settings.fallback => {
                warn!(
                    category = "capability",
                    error = %err,
                    "trace_block unsupported; using per-transaction call traces"
                );
                Ok(Self::CallTracer)
            }
            Err(err) => {
                warn!(
                    category = "capability",
                    error = %err,
                    "trace_block unsupported and fallback disabled; internal transfers will not be recorded"
                );
                Ok(Self::Unavailable)
            }
        }
    }
}

// ==============================================================================
// Extractor
// ==============================================================================

/// Shared by every fetch worker. With a non-zero call delay, per-transaction
/// trace calls are paced across all workers, not just within one block.
pub struct TraceExtractor {
    strategy: TraceStrategy,
    call_delay: Duration,
    /// Held through one trace call and the delay that follows it.
    pacing: Mutex<()>,
}

impl TraceExtractor {
    pub fn new(strategy: TraceStrategy, call_delay: Duration) -> Self {
        Self {
            strategy,
            call_delay,
            pacing: Mutex::new(()),
        }
    }

    pub fn disabled() -> Self {
        Self::new(TraceStrategy::Disabled, Duration::ZERO)
    }

    pub fn strategy(&self) -> TraceStrategy {
        self.strategy
    }

    /// Internal transfers of `block`, in per-transaction index order.
    ///
    /// Capability failures degrade per the strategy and are logged; only
    /// malformed payloads are returned as errors.
    pub async fn extract(
        &self,
        rpc: &dyn EthRpc,
        block: &Block,
    ) -> Result<Vec<InternalTransfer>, CoreError> {
        match self.strategy {
            TraceStrategy::Disabled | TraceStrategy::Unavailable => Ok(Vec::new()),
            TraceStrategy::CallTracer => self.per_transaction(rpc, block).await,
            TraceStrategy::BlockTrace { fallback } => match rpc.trace_block(block.number).await {
                Ok(traces) => transfers_from_block_traces(&traces),
                Err(err) if is_malformed_payload(&err) => Err(err),
                Err(err) if fallback => {
                    info!(
                        category = "capability",
                        block = block.number,
                        error = %err,
                        "trace_block failed; falling back to per-transaction call traces"
                    );
                    self.per_transaction(rpc, block).await
                }
                Err(err) => {
                    warn!(
                        category = "capability",
                        block = block.number,
                        error = %err,
                        "trace_block failed; internal transfers skipped for block"
                    );
                    Ok(Vec::new())
                }
            },
        }
    }

    async fn per_transaction(
        &self,
        rpc: &dyn EthRpc,
        block: &Block,
    ) -> Result<Vec<InternalTransfer>, CoreError> {
        let mut transfers = Vec::new();
        for tx in &block.transactions {
            let _turn = if self.call_delay.is_zero() {
                None
            } else {
                Some(self.pacing.lock().await)
            };
            match rpc.trace_transaction(&tx.hash).await {
                Ok(root) => transfers.extend(flatten_call_tree(tx.hash, &root)),
                Err(err) if is_malformed_payload(&err) => return Err(err),
                Err(err) => {
                    warn!(
                        category = "capability",
                        block = block.number,
                        tx = %tx.hash,
                        error = %err,
                        "call trace failed; internal transfers skipped for transaction"
                    );
                }
            }
            if !self.call_delay.is_zero() {
                tokio::time::sleep(self.call_delay).await;
            }
        }
        debug!(
            block = block.number,
            txs = block.transactions.len(),
            transfers = transfers.len(),
            "per-transaction traces collected"
        );
        Ok(transfers)
    }
}

/// Responses the provider did send but that cannot be understood. These
/// fail the batch; every other trace failure is a capability gap.
fn is_malformed_payload(err: &CoreError) -> bool {
    matches!(
        err,
        CoreError::InvalidData(_) | CoreError::Rpc(RpcError::InvalidResponse(_))
    )
}

// ==============================================================================
// Call Tree Flattening
// ==============================================================================

/// Walk a call tree depth-first (pre-order, children left to right) with an
/// explicit stack and collect every value-moving sub-call.
pub fn flatten_call_tree(tx_hash: B256, root: &CallFrame) -> Vec<InternalTransfer> {
    let mut transfers = Vec::new();
    let mut next_index = 1u32;
    let mut stack: Vec<(&CallFrame, u32)> = root.calls.iter().rev().map(|c| (c, 1)).collect();

    while let Some((frame, depth)) = stack.pop() {
        let value = frame.value.unwrap_or(U256::ZERO);
        if !value.is_zero() && !frame.kind.eq_ignore_ascii_case("DELEGATECALL") {
            transfers.push(InternalTransfer {
                tx_hash,
                trace_index: next_index,
                depth,
                from: frame.from,
                to: frame.to,
                value,
            });
            next_index += 1;
        }
        stack.extend(frame.calls.iter().rev().map(|c| (c, depth + 1)));
    }

    transfers
}

/// Convert a `trace_block` result into internal transfers.
pub fn transfers_from_block_traces(
    traces: &[BlockTrace],
) -> Result<Vec<InternalTransfer>, CoreError> {
    let mut next_index: HashMap<B256, u32> = HashMap::new();
    let mut transfers = Vec::new();

    for trace in traces {
        let Some(tx_hash) = trace.transaction_hash else {
            continue;
        };
        if trace.trace_address.is_empty() {
            continue;
        }
        let Some((from, to, value)) = trace_value_movement(trace, tx_hash)? else {
            continue;
        };

        let index = next_index.entry(tx_hash).or_insert(1);
        transfers.push(InternalTransfer {
            tx_hash,
            trace_index: *index,
            depth: trace.trace_address.len() as u32,
            from,
            to,
            value,
        });
        *index += 1;
    }

    Ok(transfers)
}

fn trace_value_movement(
    trace: &BlockTrace,
    tx_hash: B256,
) -> Result<Option<(Address, Option<Address>, U256)>, CoreError> {
    let action = &trace.action;
    let (from, to, value) = match trace.kind.as_str() {
        "suicide" => (action.address, action.refund_address, action.balance),
        "create" => (
            action.from,
            trace.result.as_ref().and_then(|r| r.address),
            action.value,
        ),
        _ => {
            if action
                .call_type
                .as_deref()
                .is_some_and(|t| t.eq_ignore_ascii_case("delegatecall"))
            {
                return Ok(None);
            }
            (action.from, action.to, action.value)
        }
    };

    let value = value.unwrap_or(U256::ZERO);
    if value.is_zero() {
        return Ok(None);
    }
    let from = from.ok_or_else(|| {
        CoreError::InvalidData(format!(
            "{} trace in {tx_hash} moves value without a sender",
            trace.kind
        ))
    })?;
    Ok(Some((from, to, value)))
}
