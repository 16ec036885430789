use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use alloy_primitives::{B256, U64};
use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::{header, Url};
use serde::de::DeserializeOwned;
use tokio::sync::Semaphore;
use tracing::{debug, trace};

use crate::error::{CoreError, RpcError};
use crate::types::{Block, ReceiptInfo};

use super::super::retry::{retry_network_faults, retry_overload, RetryPolicy};
use super::super::types::{BlockTrace, CallFrame, RpcBlock, RpcBlockHeader, RpcReceipt};
use super::super::EthRpc;
use super::connection::parse_connection;
use super::protocol::{block_tag, decode_response, decode_result, parse_jsonrpc_error, JsonRpcRequest};

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Tuning knobs for [`HttpRpcClient`].
#[derive(Debug, Clone)]
pub struct RpcOptions {
    /// Outbound requests per second; `None` disables the limiter.
    pub requests_per_second: Option<u32>,
    /// Cap on concurrently outstanding HTTP requests.
    pub max_in_flight: usize,
    pub request_timeout: Duration,
    pub overload_retry: RetryPolicy,
    pub lookup_retry: RetryPolicy,
}

impl Default for RpcOptions {
    fn default() -> Self {
        Self {
            requests_per_second: None,
            max_in_flight: 12,
            request_timeout: Duration::from_secs(90),
            overload_retry: RetryPolicy::overload(),
            lookup_retry: RetryPolicy::lookup(),
        }
    }
}

/// EVM JSON-RPC client over HTTP(S).
///
/// A single instance is shared by every fetch worker; the semaphore caps
/// how many requests are on the wire at once regardless of how many
/// workers are waiting.
pub struct HttpRpcClient {
    client: reqwest::Client,
    url: Url,
    in_flight: Semaphore,
    limiter: Option<DirectRateLimiter>,
    overload_retry: RetryPolicy,
    lookup_retry: RetryPolicy,
    next_id: AtomicU64,
}

impl HttpRpcClient {
    pub fn new(connection: &str, options: RpcOptions) -> Result<Self, CoreError> {
        if options.max_in_flight == 0 {
            return Err(CoreError::InvalidConfig(
                "max in-flight requests must be at least 1".to_owned(),
            ));
        }
        let url = parse_connection(connection)?;

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(options.request_timeout)
            .pool_max_idle_per_host(options.max_in_flight)
            .tcp_nodelay(true)
            .build()
            .map_err(|e| CoreError::InvalidConfig(format!("build HTTP client: {e}")))?;

        let limiter = match options.requests_per_second {
            None => None,
            Some(limit) => {
                let limit = NonZeroU32::new(limit).ok_or_else(|| {
                    CoreError::InvalidConfig("requests per second must be at least 1".to_owned())
                })?;
                Some(RateLimiter::direct(Quota::per_second(limit)))
            }
        };

        Ok(Self {
            client,
            url,
            in_flight: Semaphore::new(options.max_in_flight),
            limiter,
            overload_retry: options.overload_retry,
            lookup_retry: options.lookup_retry,
            next_id: AtomicU64::new(initial_request_id()),
        })
    }

    async fn wait_for_rate_limit(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }

    /// One HTTP round trip, no retries.
    async fn send_once(
        &self,
        method: &str,
        params: &[serde_json::Value],
    ) -> Result<serde_json::Value, RpcError> {
        let _permit = self
            .in_flight
            .acquire()
            .await
            .map_err(|_| RpcError::InvalidResponse("request pool closed".to_owned()))?;
        self.wait_for_rate_limit().await;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(
            rpc.id = id,
            rpc.method = method,
            rpc.params = params.len(),
            "rpc call"
        );
        let req = JsonRpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };

        let response = self
            .client
            .post(self.url.clone())
            .header(header::CONTENT_TYPE, "application/json")
            .json(&req)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        debug!(rpc.id = id, rpc.method = method, %status, body_len = body.len(), "rpc response");
        trace!(rpc.id = id, rpc.method = method, body = %body, "rpc response body");

        if !status.is_success() {
            return Err(RpcError::HttpStatus {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        let decoded = decode_response(&body).map_err(|e| {
            RpcError::InvalidResponse(format!(
                "decode JSON-RPC response: {e}; body={}",
                truncate_body(&body)
            ))
        })?;
        if let Some(err) = decoded.error {
            return Err(parse_jsonrpc_error(err));
        }
        Ok(decoded.result.unwrap_or(serde_json::Value::Null))
    }

    /// Raw JSON-RPC call under the overload retry budget.
    pub async fn call(
        &self,
        method: &str,
        params: Vec<serde_json::Value>,
    ) -> Result<serde_json::Value, RpcError> {
        retry_overload(&self.overload_retry, method, || {
            self.send_once(method, &params)
        })
        .await
    }

    async fn call_typed<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<serde_json::Value>,
    ) -> Result<T, CoreError> {
        let raw = self.call(method, params).await?;
        decode_result(raw)
            .map_err(|e| CoreError::InvalidData(format!("invalid {method} result: {e}")))
    }
}

#[async_trait]
impl EthRpc for HttpRpcClient {
    async fn block_number(&self) -> Result<u64, CoreError> {
        let tip: U64 = self.call_typed("eth_blockNumber", Vec::new()).await?;
        Ok(tip.to::<u64>())
    }

    async fn get_block(&self, number: u64) -> Result<Block, CoreError> {
        retry_network_faults(&self.lookup_retry, "eth_getBlockByNumber", || async {
            let raw: Option<RpcBlock> = self
                .call_typed(
                    "eth_getBlockByNumber",
                    vec![serde_json::json!(block_tag(number)), serde_json::json!(true)],
                )
                .await?;
            raw.ok_or(CoreError::BlockNotFound(number))?
                .into_block(number)
        })
        .await
    }

    async fn get_block_timestamp(&self, number: u64) -> Result<u64, CoreError> {
        retry_network_faults(&self.lookup_retry, "eth_getBlockByNumber", || async {
            let raw: Option<RpcBlockHeader> = self
                .call_typed(
                    "eth_getBlockByNumber",
                    vec![serde_json::json!(block_tag(number)), serde_json::json!(false)],
                )
                .await?;
            let header = raw.ok_or(CoreError::BlockNotFound(number))?;
            Ok(header.timestamp.to::<u64>())
        })
        .await
    }

    async fn get_receipt(&self, tx_hash: &B256) -> Result<Option<ReceiptInfo>, CoreError> {
        retry_network_faults(&self.lookup_retry, "eth_getTransactionReceipt", || async {
            let raw: Option<RpcReceipt> = self
                .call_typed(
                    "eth_getTransactionReceipt",
                    vec![serde_json::json!(tx_hash.to_string())],
                )
                .await?;
            Ok(raw.map(ReceiptInfo::from))
        })
        .await
    }

    async fn trace_block(&self, number: u64) -> Result<Vec<BlockTrace>, CoreError> {
        let traces: Option<Vec<BlockTrace>> = self
            .call_typed("trace_block", vec![serde_json::json!(block_tag(number))])
            .await?;
        Ok(traces.unwrap_or_default())
    }

    async fn trace_transaction(&self, tx_hash: &B256) -> Result<CallFrame, CoreError> {
        self.call_typed(
            "debug_traceTransaction",
            vec![
                serde_json::json!(tx_hash.to_string()),
                serde_json::json!({ "tracer": "callTracer" }),
            ],
        )
        .await
    }
}

fn initial_request_id() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(1)
}

const MAX_ERROR_BODY: usize = 512;

fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY {
        return body.to_owned();
    }
    let mut end = MAX_ERROR_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &body[..end])
}
