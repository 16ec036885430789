use std::fmt;

/// Failures talking to the remote JSON-RPC endpoint.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("HTTP transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP status {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("JSON-RPC error {code}: {message}")]
    Server { code: i64, message: String },

    /// The response body could not be decoded.
    #[error("invalid JSON-RPC response: {0}")]
    InvalidResponse(String),

    #[error("non-standard JSON-RPC error: {0}")]
    NonStandardError(String),

    #[error("{method}: gave up after {attempts} attempts ({last})")]
    RetriesExhausted {
        method: String,
        attempts: u32,
        last: Box<RpcError>,
    },
}

/// Lifecycle of one batch inside the backfill orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Pending,
    Fetching,
    Writing,
    Committed,
    Failed,
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Fetching => write!(f, "fetching"),
            Self::Writing => write!(f, "writing"),
            Self::Committed => write!(f, "committed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error("block {0} not found")]
    BlockNotFound(u64),

    #[error("invalid chain data: {0}")]
    InvalidData(String),

    #[error("storage failure: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("batch {start}-{end} failed while {state}: {source}")]
    BatchFailed {
        start: u64,
        end: u64,
        state: BatchState,
        #[source]
        source: Box<CoreError>,
    },
}
