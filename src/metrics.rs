// Performance metrics module
//
// Lightweight counters for monitoring search throughput and persistence

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Search metrics
///
/// Uses atomic operations so the search worker can record while other
/// threads read. One instance is shared by an
/// [`ExecutionController`](crate::state::ExecutionController) and its worker.
#[derive(Debug)]
pub struct Metrics {
    /// Search steps explored, as of the latest progress sample
    pub steps_explored: AtomicU64,

    /// Solutions found, as of the latest progress sample
    pub solutions_found: AtomicU64,

    /// Number of progress samples published
    pub progress_samples: AtomicU64,

    /// Number of checkpoints written
    pub checkpoints_written: AtomicU64,

    /// Number of failed checkpoint writes or deletes
    pub checkpoint_failures: AtomicU64,

    /// Wall time spent searching in milliseconds
    pub search_time_ms: AtomicU64,

    /// Creation time
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            steps_explored: AtomicU64::new(0),
            solutions_found: AtomicU64::new(0),
            progress_samples: AtomicU64::new(0),
            checkpoints_written: AtomicU64::new(0),
            checkpoint_failures: AtomicU64::new(0),
            search_time_ms: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a progress sample
    pub fn record_sample(&self, steps: u64, solutions: u64) {
        self.steps_explored.store(steps, Ordering::Relaxed);
        self.solutions_found.store(solutions, Ordering::Relaxed);
        self.progress_samples.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_checkpoint_written(&self) {
        self.checkpoints_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_checkpoint_failure(&self) {
        self.checkpoint_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the duration of a finished run
    pub fn record_search_time(&self, duration: Duration) {
        self.search_time_ms.fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    /// Get total uptime
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Steps per second over the recorded search time
    pub fn steps_per_second(&self) -> f64 {
        let ms = self.search_time_ms.load(Ordering::Relaxed);
        if ms > 0 {
            self.steps_explored.load(Ordering::Relaxed) as f64 * 1000.0 / ms as f64
        } else {
            0.0
        }
    }

    /// Log metrics summary
    pub fn log_summary(&self) {
        tracing::info!("=== Search Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Search: {} steps, {} solutions in {:.2}s ({:.0} steps/s)",
            self.steps_explored.load(Ordering::Relaxed),
            self.solutions_found.load(Ordering::Relaxed),
            self.search_time_ms.load(Ordering::Relaxed) as f64 / 1000.0,
            self.steps_per_second()
        );
        tracing::info!(
            "Progress samples: {}, checkpoints: {} written, {} failed",
            self.progress_samples.load(Ordering::Relaxed),
            self.checkpoints_written.load(Ordering::Relaxed),
            self.checkpoint_failures.load(Ordering::Relaxed)
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
