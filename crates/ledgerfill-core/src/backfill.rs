//! Batch-by-batch backfill of a block range into the ledger.
//!
//! Batches run strictly in ascending order. Each one is fetched in full,
//! then written together with its checkpoint in one SQLite transaction.
//! A failing batch regresses the checkpoint to just before its start and
//! ends the run; there is no batch-level retry.

use std::time::Instant;

use tracing::{debug, error, info};

use crate::error::{BatchState, CoreError};
use crate::fetch::{fetch_range, FetchOptions};
use crate::progress::format_duration;
use crate::range::BlockRange;
use crate::rpc::EthRpc;
use crate::store::{Ledger, WriteStats};
use crate::trace::TraceExtractor;

#[derive(Debug, Clone)]
pub struct BackfillConfig {
    pub batch_blocks: u64,
    pub fetch: FetchOptions,
    /// Checkpoint row this run advances.
    pub stream_id: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillReport {
    pub batches: u64,
    pub blocks: u64,
    pub stats: WriteStats,
}

/// Apply `--resume`: skip what the checkpoint says is already committed.
///
/// `None` means the whole range is already synced.
pub fn plan_range(
    ledger: &Ledger,
    stream_id: &str,
    range: BlockRange,
    resume: bool,
) -> Result<Option<BlockRange>, CoreError> {
    if !resume {
        return Ok(Some(range));
    }
    let checkpoint = ledger.checkpoint(stream_id)?;
    let planned = range.resume_after(checkpoint);
    info!(
        category = "progress",
        stream_id,
        ?checkpoint,
        requested = %range,
        planned = ?planned.map(|r| r.to_string()),
        "resume planned"
    );
    Ok(planned)
}

pub struct Backfill<'a> {
    rpc: &'a dyn EthRpc,
    ledger: &'a mut Ledger,
    traces: TraceExtractor,
    config: BackfillConfig,
}

impl<'a> Backfill<'a> {
    pub fn new(
        rpc: &'a dyn EthRpc,
        ledger: &'a mut Ledger,
        traces: TraceExtractor,
        config: BackfillConfig,
    ) -> Self {
        Self {
            rpc,
            ledger,
            traces,
            config,
        }
    }

    /// Process every batch of `range`, stopping at the first failure.
    pub async fn run(&mut self, range: BlockRange) -> Result<BackfillReport, CoreError> {
        if self.config.batch_blocks == 0 || self.config.fetch.concurrency == 0 {
            return Err(CoreError::InvalidConfig(
                "batch size and concurrency must be at least 1".into(),
            ));
        }

        let total_batches = range.block_count().div_ceil(self.config.batch_blocks);
        info!(
            category = "progress",
            range = %range,
            blocks = range.block_count(),
            batches = total_batches,
            strategy = ?self.traces.strategy(),
            "backfill started"
        );

        let started = Instant::now();
        let mut report = BackfillReport::default();
        for (i, batch) in range.batches(self.config.batch_blocks).enumerate() {
            let stats = self.run_batch(batch).await?;
            report.batches += 1;
            report.blocks += batch.block_count();
            report.stats += stats;
            info!(
                category = "progress",
                batch = %batch,
                n = i + 1,
                of = total_batches,
                new_txs = stats.transactions,
                new_internal = stats.internal_transfers,
                new_ledger_rows = stats.ledger_rows,
                "batch committed"
            );
        }

        info!(
            category = "progress",
            range = %range,
            batches = report.batches,
            blocks = report.blocks,
            elapsed = %format_duration(started.elapsed()),
            "backfill complete"
        );
        Ok(report)
    }

    async fn run_batch(&mut self, batch: BlockRange) -> Result<WriteStats, CoreError> {
        let mut state = BatchState::Pending;
        debug!(batch = %batch, %state);

        let outcome = async {
            state = BatchState::Fetching;
            debug!(batch = %batch, %state);
            let bundles = fetch_range(self.rpc, batch, &self.config.fetch, &self.traces).await?;

            state = BatchState::Writing;
            debug!(batch = %batch, %state, bundles = bundles.len());
            self.ledger
                .commit_batch(&self.config.stream_id, batch.end, &bundles)
        }
        .await;

        match outcome {
            Ok(stats) => {
                debug!(batch = %batch, state = %BatchState::Committed);
                Ok(stats)
            }
            Err(source) => {
                error!(
                    category = "failure",
                    batch = %batch,
                    during = %state,
                    error = %source,
                    "batch failed; rolled back"
                );
                if let Err(regress_err) = self
                    .ledger
                    .regress_checkpoint(&self.config.stream_id, batch.start)
                {
                    error!(
                        category = "failure",
                        batch = %batch,
                        error = %regress_err,
                        "could not regress checkpoint"
                    );
                }
                Err(CoreError::BatchFailed {
                    start: batch.start,
                    end: batch.end,
                    state,
                    source: Box::new(source),
                })
            }
        }
    }
}
