//! Native JSON-RPC client for EVM-compatible endpoints.
//!
//! Implements [`EthRpc`](super::EthRpc) over JSON-RPC using `reqwest`, with
//! a bounded in-flight request budget, optional request rate limiting, and
//! the retry policies from [`super::retry`].

mod client;
mod connection;
mod protocol;

pub use client::{HttpRpcClient, RpcOptions};
