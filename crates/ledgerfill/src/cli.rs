use std::path::PathBuf;
use std::time::Duration;

use clap::builder::RangedU64ValueParser;
use clap::{ArgGroup, Parser};

use ledgerfill_core::fetch::FetchOptions;
use ledgerfill_core::receipts::ReceiptMode;
use ledgerfill_core::rpc::RpcOptions;
use ledgerfill_core::{BackfillConfig, RangeSelector, TraceSettings};

/// ledgerfill: backfill native-value transfers from an EVM JSON-RPC
/// endpoint into a SQLite ledger.
#[derive(Parser, Debug)]
#[command(version, about)]
#[command(group(ArgGroup::new("range").required(true).args(["days", "start_block"])))]
pub struct Cli {
    /// JSON-RPC endpoint (http or https).
    #[arg(long, env = "LEDGERFILL_RPC_URL")]
    pub rpc_url: String,

    /// SQLite database file.
    #[arg(long, default_value = "ledger.db", env = "LEDGERFILL_DB")]
    pub db: PathBuf,

    /// Sync blocks from the last N days up to the chain tip.
    #[arg(long)]
    pub days: Option<u64>,

    /// First block to sync.
    #[arg(long)]
    pub start_block: Option<u64>,

    /// Last block to sync (defaults to the chain tip).
    #[arg(long)]
    pub end_block: Option<u64>,

    /// Blocks per atomic batch.
    #[arg(long, default_value = "500", value_parser = RangedU64ValueParser::<u64>::new().range(1..))]
    pub batch_blocks: u64,

    /// Record internal transfers from call traces.
    #[arg(long)]
    pub with_traces: bool,

    /// Never use `trace_block`; trace every transaction individually.
    #[arg(long)]
    pub no_traceblock: bool,

    /// Fall back to per-transaction traces when `trace_block` fails.
    #[arg(long)]
    pub fallback_debug: bool,

    /// Seconds to pause after each per-transaction trace call.
    #[arg(long, default_value = "0", value_parser = parse_sleep)]
    pub sleep: Duration,

    /// Continue after the stored checkpoint.
    #[arg(long)]
    pub resume: bool,

    /// Skip receipt lookups; transaction outcome and gas stay unknown.
    #[arg(long)]
    pub no_receipts: bool,

    /// Blocks fetched in parallel.
    #[arg(long, default_value = "12", value_parser = RangedU64ValueParser::<usize>::new().range(1..))]
    pub concurrency: usize,

    /// Progress line every N blocks within a batch (0 = batch end only).
    #[arg(long, default_value = "500")]
    pub log_every: u64,

    /// Checkpoint stream this run advances.
    #[arg(long, default_value = "main")]
    pub stream_id: String,

    /// Cap on outbound requests per second.
    #[arg(long)]
    pub rpc_rps: Option<u32>,

    /// Cap on concurrent outbound requests (defaults to --concurrency).
    #[arg(long, value_parser = RangedU64ValueParser::<usize>::new().range(1..))]
    pub max_in_flight: Option<usize>,
}

fn parse_sleep(raw: &str) -> Result<Duration, String> {
    let secs: f64 = raw.parse().map_err(|e| format!("{e}"))?;
    Duration::try_from_secs_f64(secs).map_err(|_| format!("`{raw}` is not a non-negative number of seconds"))
}

impl Cli {
    pub fn range_selector(&self) -> RangeSelector {
        match (self.days, self.start_block) {
            (Some(days), _) => RangeSelector::Days {
                days,
                end: self.end_block,
            },
            (None, start) => RangeSelector::Blocks {
                start: start.unwrap_or(0),
                end: self.end_block,
            },
        }
    }

    pub fn trace_settings(&self) -> TraceSettings {
        TraceSettings {
            enabled: self.with_traces,
            use_block_trace: !self.no_traceblock,
            fallback: self.fallback_debug,
            call_delay: self.sleep,
        }
    }

    pub fn rpc_options(&self) -> RpcOptions {
        RpcOptions {
            requests_per_second: self.rpc_rps,
            max_in_flight: self.max_in_flight.unwrap_or(self.concurrency),
            ..RpcOptions::default()
        }
    }

    pub fn backfill_config(&self) -> BackfillConfig {
        BackfillConfig {
            batch_blocks: self.batch_blocks,
            fetch: FetchOptions {
                concurrency: self.concurrency,
                receipts: if self.no_receipts {
                    ReceiptMode::Skip
                } else {
                    ReceiptMode::Fetch
                },
                log_every: self.log_every,
            },
            stream_id: self.stream_id.clone(),
        }
    }
}
