//! Retry classification and backoff policies.
//!
//! Two independent budgets exist:
//! - the overload budget, applied to every JSON-RPC call, retries only
//!   provider capacity signals (HTTP 429 and the overload error codes);
//! - the lookup budget, applied around block and receipt fetches, retries
//!   plain network faults (connection failures, gateway errors).
//!
//! Every other failure surfaces immediately.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::error::{CoreError, RpcError};

/// JSON-RPC error codes providers use to signal overload rather than a
/// defective request: `-32005` (limit exceeded) and `-32603` (internal
/// error, returned by several gateways under load).
pub const OVERLOAD_ERROR_CODES: [i64; 2] = [-32005, -32603];

/// What to do with a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Backoff,
    Fail,
}

pub fn classify(err: &RpcError) -> Disposition {
    match err {
        RpcError::HttpStatus { status: 429, .. } => Disposition::Backoff,
        RpcError::Server { code, .. } if OVERLOAD_ERROR_CODES.contains(code) => {
            Disposition::Backoff
        }
        _ => Disposition::Fail,
    }
}

pub fn is_network_fault(err: &CoreError) -> bool {
    matches!(
        err,
        CoreError::Rpc(RpcError::Transport(_))
            | CoreError::Rpc(RpcError::HttpStatus {
                status: 502 | 503 | 504,
                ..
            })
    )
}

// ==============================================================================
// Policies
// ==============================================================================

/// Bounded exponential backoff: `base * 2^attempt`, clamped to
/// `[min_delay, max_delay]`, plus uniform jitter in `[0, jitter]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub jitter: Duration,
}

impl RetryPolicy {
    pub const fn overload() -> Self {
        Self {
            max_attempts: 6,
            base_delay: Duration::from_secs(1),
            min_delay: Duration::ZERO,
            max_delay: Duration::from_secs(5),
            jitter: Duration::from_millis(200),
        }
    }

    pub const fn lookup() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            min_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            jitter: Duration::ZERO,
        }
    }

    /// Delay before retrying after the zero-based `attempt` failed.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.min(16);
        let backoff = self
            .base_delay
            .saturating_mul(factor)
            .clamp(self.min_delay, self.max_delay.max(self.min_delay));
        if self.jitter.is_zero() {
            return backoff;
        }
        let jitter_ms = rand::thread_rng().gen_range(0..=self.jitter.as_millis() as u64);
        backoff + Duration::from_millis(jitter_ms)
    }
}

// ==============================================================================
// Runners
// ==============================================================================

/// Run `op` under the overload budget.
///
/// Only failures classified as [`Disposition::Backoff`] are retried; once
/// the budget is spent the last failure is wrapped in
/// [`RpcError::RetriesExhausted`].
pub async fn retry_overload<T, F, Fut>(
    policy: &RetryPolicy,
    method: &str,
    mut op: F,
) -> Result<T, RpcError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RpcError>>,
{
    let mut attempt = 0;
    loop {
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if classify(&err) == Disposition::Fail {
            return Err(err);
        }

        attempt += 1;
        if attempt >= policy.max_attempts {
            return Err(RpcError::RetriesExhausted {
                method: method.to_owned(),
                attempts: attempt,
                last: Box::new(err),
            });
        }

        let delay = policy.delay_for(attempt - 1);
        warn!(
            category = "rate_limit",
            rpc.method = method,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "provider overloaded; backing off"
        );
        tokio::time::sleep(delay).await;
    }
}

/// Run `op` under the lookup budget, retrying only network faults.
pub async fn retry_network_faults<T, F, Fut>(
    policy: &RetryPolicy,
    what: &str,
    mut op: F,
) -> Result<T, CoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CoreError>>,
{
    let mut attempt = 0;
    loop {
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        attempt += 1;
        if !is_network_fault(&err) || attempt >= policy.max_attempts {
            return Err(err);
        }

        let delay = policy.delay_for(attempt - 1);
        warn!(
            category = "network",
            what,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "network fault; retrying lookup"
        );
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn overloaded() -> RpcError {
        RpcError::Server {
            code: -32005,
            message: "limit exceeded".into(),
        }
    }

    fn gateway_error() -> CoreError {
        CoreError::Rpc(RpcError::HttpStatus {
            status: 503,
            body: "unavailable".into(),
        })
    }

    #[test]
    fn classify_separates_capacity_from_request_defects() {
        let too_many = RpcError::HttpStatus {
            status: 429,
            body: String::new(),
        };
        assert_eq!(classify(&too_many), Disposition::Backoff);
        assert_eq!(classify(&overloaded()), Disposition::Backoff);
        assert_eq!(
            classify(&RpcError::Server {
                code: -32603,
                message: "internal error".into()
            }),
            Disposition::Backoff
        );

        assert_eq!(
            classify(&RpcError::Server {
                code: -32601,
                message: "method not found".into()
            }),
            Disposition::Fail
        );
        assert_eq!(
            classify(&RpcError::Server {
                code: -32602,
                message: "invalid params".into()
            }),
            Disposition::Fail
        );
        assert_eq!(
            classify(&RpcError::HttpStatus {
                status: 500,
                body: String::new()
            }),
            Disposition::Fail
        );
        assert_eq!(
            classify(&RpcError::InvalidResponse("garbage".into())),
            Disposition::Fail
        );
    }

    #[test]
    fn network_faults_exclude_server_errors_and_exhaustion() {
        assert!(is_network_fault(&gateway_error()));
        assert!(!is_network_fault(&CoreError::Rpc(overloaded())));
        assert!(!is_network_fault(&CoreError::BlockNotFound(1)));
        assert!(!is_network_fault(&CoreError::Rpc(
            RpcError::RetriesExhausted {
                method: "eth_getBlockByNumber".into(),
                attempts: 6,
                last: Box::new(overloaded()),
            }
        )));
    }

    #[test]
    fn overload_delay_is_capped_with_bounded_jitter() {
        let policy = RetryPolicy::overload();
        for attempt in 0..10 {
            let delay = policy.delay_for(attempt);
            let floor = Duration::from_secs(1)
                .saturating_mul(1 << attempt)
                .min(Duration::from_secs(5));
            assert!(delay >= floor, "attempt {attempt}: {delay:?} < {floor:?}");
            assert!(delay <= floor + Duration::from_millis(200));
        }
    }

    #[test]
    fn lookup_delay_clamps_between_one_and_ten_seconds() {
        let policy = RetryPolicy::lookup();
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(4), Duration::from_secs(10));
        assert_eq!(policy.delay_for(30), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn overload_retries_until_success() {
        let calls = AtomicU32::new(0);
        let result = retry_overload(&RetryPolicy::overload(), "eth_blockNumber", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 3 {
                Err(overloaded())
            } else {
                Ok(42u64)
            }
        })
        .await;

        assert_eq!(result.expect("fourth attempt succeeds"), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn overload_budget_is_bounded() {
        let calls = AtomicU32::new(0);
        let err = retry_overload(&RetryPolicy::overload(), "trace_block", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(RpcError::HttpStatus {
                status: 429,
                body: "slow down".into(),
            })
        })
        .await
        .expect_err("budget must run out");

        assert_eq!(calls.load(Ordering::SeqCst), 6);
        assert!(matches!(
            err,
            RpcError::RetriesExhausted { attempts: 6, ref method, .. } if method == "trace_block"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn request_defects_fail_fast() {
        let calls = AtomicU32::new(0);
        let err = retry_overload(&RetryPolicy::overload(), "trace_block", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(RpcError::Server {
                code: -32601,
                message: "the method trace_block does not exist".into(),
            })
        })
        .await
        .expect_err("must not retry");

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, RpcError::Server { code: -32601, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn lookup_retries_network_faults_only() {
        let calls = AtomicU32::new(0);
        let value = retry_network_faults(&RetryPolicy::lookup(), "block 7", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(gateway_error())
            } else {
                Ok("block")
            }
        })
        .await
        .expect("third attempt succeeds");
        assert_eq!(value, "block");
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let calls = AtomicU32::new(0);
        let err = retry_network_faults(&RetryPolicy::lookup(), "block 8", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(CoreError::BlockNotFound(8))
        })
        .await
        .expect_err("data errors are not retried");
        assert!(matches!(err, CoreError::BlockNotFound(8)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn lookup_gives_up_after_five_attempts() {
        let calls = AtomicU32::new(0);
        let err = retry_network_faults(&RetryPolicy::lookup(), "receipt", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(gateway_error())
        })
        .await
        .expect_err("budget must run out");
        assert!(is_network_fault(&err));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }
}
