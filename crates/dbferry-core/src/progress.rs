//! Predictive progress estimation.
//!
//! Long dump/restore phases have no hard deadline; progress is predicted
//! from bytes processed versus elapsed time instead. The estimator has a
//! stated contract: reported percent is monotonic, stays strictly below
//! 100 until [`ProgressEstimator::finish`] is called, then snaps to
//! exactly 100.

use std::time::{Duration, Instant};

/// Highest percent reported before a phase actually completes.
const PROGRESS_CEILING: f64 = 99.0;

/// Size-based progress estimator for one phase.
#[derive(Debug, Clone)]
pub struct ProgressEstimator {
    total_bytes: u64,
    processed_bytes: u64,
    started: Instant,
    best_percent: f64,
    finished: bool,
}

impl ProgressEstimator {
    /// Create an estimator for a phase transferring `total_bytes`.
    pub fn new(total_bytes: u64) -> Self {
        Self {
            total_bytes,
            processed_bytes: 0,
            started: Instant::now(),
            best_percent: 0.0,
            finished: false,
        }
    }

    /// Record the cumulative bytes processed so far.
    ///
    /// A smaller value than previously recorded is ignored.
    pub fn record(&mut self, processed_bytes: u64) {
        if processed_bytes > self.processed_bytes {
            self.processed_bytes = processed_bytes;
        }
    }

    /// Bytes processed so far.
    pub fn processed_bytes(&self) -> u64 {
        self.processed_bytes
    }

    /// Current percent estimate.
    pub fn percent(&mut self) -> f64 {
        if self.finished {
            return 100.0;
        }
        let raw = if self.total_bytes == 0 {
            0.0
        } else {
            (self.processed_bytes as f64 / self.total_bytes as f64) * 100.0
        };
        self.best_percent = self.best_percent.max(raw.min(PROGRESS_CEILING));
        self.best_percent
    }

    /// Observed throughput, if any bytes have moved.
    pub fn throughput_bytes_per_sec(&self) -> Option<f64> {
        let elapsed = self.started.elapsed().as_secs_f64();
        if elapsed <= 0.0 || self.processed_bytes == 0 {
            return None;
        }
        Some(self.processed_bytes as f64 / elapsed)
    }

    /// Predicted time remaining, from throughput so far.
    pub fn estimated_remaining(&self) -> Option<Duration> {
        let throughput = self.throughput_bytes_per_sec()?;
        let remaining = self.total_bytes.saturating_sub(self.processed_bytes);
        Some(Duration::from_secs_f64(remaining as f64 / throughput))
    }

    /// Snap the estimate to exactly 100.
    pub fn finish(&mut self) {
        self.finished = true;
    }

    /// Whether `finish` has been called.
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}
