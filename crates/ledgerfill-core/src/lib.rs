pub mod backfill;
pub mod error;
pub mod fetch;
pub mod progress;
pub mod range;
pub mod receipts;
pub mod rpc;
pub mod store;
pub mod trace;
pub mod types;

#[cfg(test)]
mod test_util;

pub use backfill::{plan_range, Backfill, BackfillConfig, BackfillReport};
pub use error::{BatchState, CoreError, RpcError};
pub use range::{BlockRange, RangeSelector};
pub use store::{Ledger, WriteStats};
pub use trace::{TraceExtractor, TraceSettings, TraceStrategy};
