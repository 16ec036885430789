//! Block ranges: resolution from wall-clock windows, resume planning and
//! batching.

use std::fmt;

use tracing::debug;

use crate::error::CoreError;
use crate::rpc::EthRpc;

/// Initial distance of the step-back probe from the tip; doubles each step.
const INITIAL_STEP_BACK: u64 = 1024;

pub const SECONDS_PER_DAY: u64 = 86_400;

/// An inclusive block range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRange {
    pub start: u64,
    pub end: u64,
}

impl BlockRange {
    /// `None` when `start > end`.
    pub fn new(start: u64, end: u64) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    pub fn block_count(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn blocks(&self) -> std::ops::RangeInclusive<u64> {
        self.start..=self.end
    }

    /// Split into consecutive batches of at most `size` blocks, ascending.
    pub fn batches(&self, size: u64) -> impl Iterator<Item = BlockRange> {
        let size = size.max(1);
        let end = self.end;
        let mut next = Some(self.start);
        std::iter::from_fn(move || {
            let start = next?;
            let batch_end = start.saturating_add(size - 1).min(end);
            next = batch_end.checked_add(1).filter(|n| *n <= end);
            Some(BlockRange {
                start,
                end: batch_end,
            })
        })
    }

    /// Apply a checkpoint: continue after it if it lies inside or past the
    /// range start. `None` when nothing is left.
    pub fn resume_after(self, checkpoint: Option<u64>) -> Option<Self> {
        match checkpoint {
            Some(last) if last >= self.start => Self::new(last.checked_add(1)?, self.end),
            _ => Some(self),
        }
    }
}

impl fmt::Display for BlockRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

// ==============================================================================
// Time-window Resolution
// ==============================================================================

/// How the operator asked for the range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeSelector {
    /// Blocks whose timestamp lies within the last N days.
    Days { days: u64, end: Option<u64> },
    /// Explicit start.
    Blocks { start: u64, end: Option<u64> },
}

impl RangeSelector {
    /// Turn the selection into a concrete range against the chain at `tip`.
    /// A missing end defaults to the tip.
    ///
    /// `Ok(None)` means there is nothing to sync (the window is newer than
    /// the tip). A start past the end is a configuration error.
    pub async fn resolve(
        self,
        rpc: &dyn EthRpc,
        tip: u64,
        now: u64,
    ) -> Result<Option<BlockRange>, CoreError> {
        let (start, end) = match self {
            Self::Days { days, end } => {
                let cutoff = cutoff_for_days(now, days);
                let start = first_block_at_or_after(rpc, tip, cutoff).await?;
                debug!(days, cutoff, ?start, tip, "resolved time window");
                match start {
                    Some(start) => (start, end),
                    None => return Ok(None),
                }
            }
            Self::Blocks { start, end } => (start, end),
        };

        let end = end.unwrap_or(tip);
        BlockRange::new(start, end).map(Some).ok_or_else(|| {
            CoreError::InvalidConfig(format!("start block {start} is after end block {end}"))
        })
    }
}

/// Unix timestamp `days` days before `now`.
pub fn cutoff_for_days(now: u64, days: u64) -> u64 {
    now.saturating_sub(days.saturating_mul(SECONDS_PER_DAY))
}

/// Earliest block in `[0, tip]` whose timestamp is at or after `cutoff`.
///
/// Steps back from the tip with a doubling stride until a block older than
/// the cutoff is found, then binary-searches the bracket. Assumes
/// timestamps never decrease with block number. Returns `None` when even
/// the tip is older than the cutoff.
pub async fn first_block_at_or_after(
    rpc: &dyn EthRpc,
    tip: u64,
    cutoff: u64,
) -> Result<Option<u64>, CoreError> {
    if rpc.get_block_timestamp(tip).await? < cutoff {
        return Ok(None);
    }

    // Invariant: ts(upper) >= cutoff; ts(lower) < cutoff once found.
    let mut upper = tip;
    let mut step = INITIAL_STEP_BACK;
    let lower = loop {
        if upper == 0 {
            return Ok(Some(0));
        }
        let probe = upper.saturating_sub(step);
        let ts = rpc.get_block_timestamp(probe).await?;
        debug!(probe, ts, cutoff, "step-back probe");
        if ts < cutoff {
            break probe;
        }
        upper = probe;
        step = step.saturating_mul(2);
    };

    let mut lower = lower;
    while upper - lower > 1 {
        let mid = lower + (upper - lower) / 2;
        if rpc.get_block_timestamp(mid).await? < cutoff {
            lower = mid;
        } else {
            upper = mid;
        }
    }
    Ok(Some(upper))
}
