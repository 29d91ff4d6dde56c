//! Debounced progress reporting for long tree operations

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::info;

/// Minimum interval between progress lines
const REPORT_INTERVAL: Duration = Duration::from_secs(5);

/// Counts completed work items and periodically logs
/// `<op> <artifact>: <done>/<total> (<pct>%)`.
///
/// Shared across worker threads; emission is debounced so a fast run logs
/// nothing and a long one logs every few seconds.
pub struct ProgressReporter {
    label: String,
    total: u64,
    done: AtomicU64,
    last_report: Mutex<Instant>,
    started: Instant,
}

impl ProgressReporter {
    pub fn new(label: impl Into<String>, total: u64) -> Self {
        let now = Instant::now();
        Self {
            label: label.into(),
            total,
            done: AtomicU64::new(0),
            last_report: Mutex::new(now),
            started: now,
        }
    }

    /// Record one completed item, logging if the debounce interval elapsed
    pub fn increment(&self) {
        let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;

        let Ok(mut last) = self.last_report.try_lock() else {
            // Another worker is reporting right now
            return;
        };
        if last.elapsed() < REPORT_INTERVAL {
            return;
        }
        *last = Instant::now();

        info!("{}: {}/{} ({}%)", self.label, done, self.total, self.percent(done));
    }

    /// Log the final count unconditionally
    pub fn finish(&self) {
        let done = self.done.load(Ordering::Relaxed);
        info!(
            "{}: {}/{} files in {:.1}s",
            self.label,
            done,
            self.total,
            self.started.elapsed().as_secs_f64()
        );
    }

    /// Completed item count so far
    pub fn done(&self) -> u64 {
        self.done.load(Ordering::Relaxed)
    }

    fn percent(&self, done: u64) -> u64 {
        if self.total == 0 {
            return 100;
        }
        done * 100 / self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_increments() {
        let progress = ProgressReporter::new("restoring cargo", 10);
        for _ in 0..7 {
            progress.increment();
        }
        assert_eq!(progress.done(), 7);
    }

    #[test]
    fn percent_handles_zero_total() {
        let progress = ProgressReporter::new("seeding npm", 0);
        assert_eq!(progress.percent(0), 100);
    }

    #[test]
    fn percent_rounds_down() {
        let progress = ProgressReporter::new("storing cargo", 3);
        assert_eq!(progress.percent(1), 33);
        assert_eq!(progress.percent(3), 100);
    }
}
