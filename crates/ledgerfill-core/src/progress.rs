use std::time::{Duration, Instant};

use tracing::info;

/// Block-level progress of one batch, reported as `done/total` with rate
/// and ETA.
pub struct Progress {
    total: u64,
    done: u64,
    log_every: u64,
    started: Instant,
}

impl Progress {
    pub fn new(total: u64, log_every: u64) -> Self {
        Self {
            total,
            done: 0,
            log_every,
            started: Instant::now(),
        }
    }

    /// Count one finished block, logging every `log_every` blocks.
    pub fn tick(&mut self) {
        self.done += 1;
        if self.log_every > 0 && self.done % self.log_every == 0 {
            self.report();
        }
    }

    pub fn done(&self) -> u64 {
        self.done
    }

    pub fn report(&self) {
        info!(category = "progress", "{}", self.line(self.started.elapsed()));
    }

    fn line(&self, elapsed: Duration) -> String {
        let secs = elapsed.as_secs_f64();
        let rate = if secs > 0.0 {
            self.done as f64 / secs
        } else {
            0.0
        };
        let eta = if rate > 0.0 {
            Duration::from_secs_f64(self.total.saturating_sub(self.done) as f64 / rate)
        } else {
            Duration::ZERO
        };
        format!(
            "{}/{} blocks | {rate:.2} blk/s | elapsed {} | ETA {}",
            self.done,
            self.total,
            format_duration(elapsed),
            format_duration(eta)
        )
    }
}

/// `1h 2m 3s`, `4m 5s`, or `6s`.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let (h, rem) = (secs / 3600, secs % 3600);
    let (m, s) = (rem / 60, rem % 60);
    if h > 0 {
        format!("{h}h {m}m {s}s")
    } else if m > 0 {
        format!("{m}m {s}s")
    } else {
        format!("{s}s")
    }
}
