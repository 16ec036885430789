//! Parallel block retrieval.
//!
//! Each block is fetched as a bundle (block, receipts, internal transfers)
//! by one worker; up to `concurrency` workers run at once. Bundles are
//! returned in completion order, which is not necessarily ascending.

use futures::stream::{self, StreamExt};
use tracing::debug;

use crate::error::CoreError;
use crate::progress::Progress;
use crate::range::BlockRange;
use crate::receipts::{resolve_receipts, ReceiptMode};
use crate::rpc::EthRpc;
use crate::trace::TraceExtractor;
use crate::types::BlockBundle;

#[derive(Debug, Clone, Copy)]
pub struct FetchOptions {
    pub concurrency: usize,
    pub receipts: ReceiptMode,
    /// Progress line every N blocks; 0 disables intermediate lines.
    pub log_every: u64,
}

/// Fetch one block with everything the writer needs for it.
pub async fn fetch_bundle(
    rpc: &dyn EthRpc,
    number: u64,
    receipts: ReceiptMode,
    traces: &TraceExtractor,
) -> Result<BlockBundle, CoreError> {
    let mut block = rpc.get_block(number).await?;
    resolve_receipts(rpc, &mut block, receipts).await?;
    let internal_transfers = traces.extract(rpc, &block).await?;
    debug!(
        block = number,
        txs = block.transactions.len(),
        internal = internal_transfers.len(),
        "block fetched"
    );
    Ok(BlockBundle {
        block,
        internal_transfers,
    })
}

/// Fetch every block of `range`.
///
/// The first failure aborts the whole range: outstanding fetches are
/// dropped and no partial result is returned.
pub async fn fetch_range(
    rpc: &dyn EthRpc,
    range: BlockRange,
    options: &FetchOptions,
    traces: &TraceExtractor,
) -> Result<Vec<BlockBundle>, CoreError> {
    let mut progress = Progress::new(range.block_count(), options.log_every);
    let mut bundles = Vec::new();

    let mut in_flight = stream::iter(range.blocks())
        .map(|number| fetch_bundle(rpc, number, options.receipts, traces))
        .buffer_unordered(options.concurrency.max(1));

    while let Some(result) = in_flight.next().await {
        bundles.push(result?);
        progress.tick();
    }

    // Final line unless the last tick already logged it.
    if options.log_every == 0 || progress.done() % options.log_every != 0 {
        progress.report();
    }
    Ok(bundles)
}
