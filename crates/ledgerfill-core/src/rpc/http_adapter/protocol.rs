use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::RpcError;

#[derive(serde::Serialize)]
pub(super) struct JsonRpcRequest<'a> {
    pub(super) jsonrpc: &'static str,
    pub(super) id: u64,
    pub(super) method: &'a str,
    pub(super) params: &'a [serde_json::Value],
}

#[derive(serde::Deserialize)]
pub(super) struct JsonRpcResponse {
    #[serde(default)]
    pub(super) result: Option<serde_json::Value>,
    #[serde(default)]
    pub(super) error: Option<serde_json::Value>,
}

/// Parse a JSON-RPC error value into a structured `RpcError`.
///
/// JSON-RPC 2.0 defines errors as `{"code": <int>, "message": <string>}`.
/// If the error value matches that shape, we produce a `Server` error so the
/// retry classifier can inspect the code; otherwise we fall back to
/// `NonStandardError` with the raw JSON.
pub(super) fn parse_jsonrpc_error(err: serde_json::Value) -> RpcError {
    #[derive(serde::Deserialize)]
    struct JsonRpcError {
        code: i64,
        #[serde(default)]
        message: String,
    }

    match serde_json::from_value::<JsonRpcError>(err.clone()) {
        Ok(parsed) => RpcError::Server {
            code: parsed.code,
            message: parsed.message,
        },
        Err(_) => RpcError::NonStandardError(err.to_string()),
    }
}

/// Decode a response envelope without serde_json's nesting limit.
///
/// Call-tracer results nest one JSON object per call frame and EVM call
/// depth reaches 1024, far past the default limit of 128. The stack grows
/// on the heap as needed instead.
pub(super) fn decode_response(body: &str) -> Result<JsonRpcResponse, serde_json::Error> {
    let mut de = serde_json::Deserializer::from_str(body);
    de.disable_recursion_limit();
    let response = JsonRpcResponse::deserialize(serde_stacker::Deserializer::new(&mut de))?;
    de.end()?;
    Ok(response)
}

/// Convert a decoded `result` into its typed shape, growing the stack for
/// deeply nested values.
pub(super) fn decode_result<T: DeserializeOwned>(raw: serde_json::Value) -> Result<T, serde_json::Error> {
    T::deserialize(serde_stacker::Deserializer::new(raw))
}

/// Hex quantity encoding for block-number parameters.
pub(super) fn block_tag(number: u64) -> String {
    format!("0x{number:x}")
}
