//! Sweep Metrics
//!
//! Thread-safe counters shared between the scheduler and the sweeps it runs.

use crate::sweep::RunResult;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Thread-safe metrics for tracking sweep runs
#[derive(Debug, Clone)]
pub struct SweepMetrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug)]
struct MetricsInner {
    /// Number of runs started
    runs_started: AtomicUsize,
    /// Number of runs ending in a non-zero exit status
    runs_failed: AtomicUsize,
    /// Number of runs the scheduler stopped waiting for
    runs_timed_out: AtomicUsize,
    /// Total files deleted
    files_deleted: AtomicUsize,
    /// Total directories pruned
    dirs_deleted: AtomicUsize,
    /// Total bytes freed
    bytes_freed: AtomicU64,
    /// Total duration in milliseconds
    total_duration_ms: AtomicU64,
}

impl Default for SweepMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl SweepMetrics {
    /// Create a new metrics tracker
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                runs_started: AtomicUsize::new(0),
                runs_failed: AtomicUsize::new(0),
                runs_timed_out: AtomicUsize::new(0),
                files_deleted: AtomicUsize::new(0),
                dirs_deleted: AtomicUsize::new(0),
                bytes_freed: AtomicU64::new(0),
                total_duration_ms: AtomicU64::new(0),
            }),
        }
    }

    /// Record a finished run
    pub fn record_run(&self, result: &RunResult) {
        self.inner.runs_started.fetch_add(1, Ordering::Relaxed);
        if !result.exit_status().is_success() {
            self.inner.runs_failed.fetch_add(1, Ordering::Relaxed);
        }
        self.inner
            .files_deleted
            .fetch_add(result.files_deleted, Ordering::Relaxed);
        self.inner
            .dirs_deleted
            .fetch_add(result.dirs_deleted, Ordering::Relaxed);
        self.inner
            .bytes_freed
            .fetch_add(result.bytes_freed, Ordering::Relaxed);
        self.inner
            .total_duration_ms
            .fetch_add(result.duration.as_millis() as u64, Ordering::Relaxed);
    }

    /// Record a run that ended without producing a result (panics)
    pub fn record_failure(&self) {
        self.inner.runs_started.fetch_add(1, Ordering::Relaxed);
        self.inner.runs_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record that the scheduler stopped waiting for a run. The run itself is
    /// recorded by [`record_run`](Self::record_run) once it finishes.
    pub fn record_timeout(&self) {
        self.inner.runs_timed_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn runs_started(&self) -> usize {
        self.inner.runs_started.load(Ordering::Relaxed)
    }

    pub fn runs_failed(&self) -> usize {
        self.inner.runs_failed.load(Ordering::Relaxed)
    }

    pub fn runs_timed_out(&self) -> usize {
        self.inner.runs_timed_out.load(Ordering::Relaxed)
    }

    pub fn files_deleted(&self) -> usize {
        self.inner.files_deleted.load(Ordering::Relaxed)
    }

    pub fn dirs_deleted(&self) -> usize {
        self.inner.dirs_deleted.load(Ordering::Relaxed)
    }

    pub fn bytes_freed(&self) -> u64 {
        self.inner.bytes_freed.load(Ordering::Relaxed)
    }

    pub fn total_duration_ms(&self) -> u64 {
        self.inner.total_duration_ms.load(Ordering::Relaxed)
    }

    /// Average run duration in milliseconds
    pub fn avg_duration_ms(&self) -> f64 {
        let runs = self.runs_started();
        if runs == 0 {
            0.0
        } else {
            self.total_duration_ms() as f64 / runs as f64
        }
    }

    /// Get a snapshot of current metrics
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            runs_started: self.runs_started(),
            runs_failed: self.runs_failed(),
            runs_timed_out: self.runs_timed_out(),
            files_deleted: self.files_deleted(),
            dirs_deleted: self.dirs_deleted(),
            bytes_freed: self.bytes_freed(),
            avg_duration_ms: self.avg_duration_ms(),
        }
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSummary {
    pub runs_started: usize,
    pub runs_failed: usize,
    pub runs_timed_out: usize,
    pub files_deleted: usize,
    pub dirs_deleted: usize,
    pub bytes_freed: u64,
    pub avg_duration_ms: f64,
}

impl MetricsSummary {
    /// Format bytes as MB with 2 decimal places
    fn format_mb(bytes: u64) -> String {
        format!("{:.2}", bytes as f64 / (1024.0 * 1024.0))
    }

    /// Log the metrics summary
    pub fn log(&self) {
        log::info!("=== Sweep Metrics Summary ===");
        log::info!(
            "Runs: {} started, {} failed, {} timed out",
            self.runs_started,
            self.runs_failed,
            self.runs_timed_out
        );
        log::info!(
            "Deleted: {} files, {} directories, {} MB freed",
            self.files_deleted,
            self.dirs_deleted,
            Self::format_mb(self.bytes_freed)
        );
        log::info!("Average run duration: {:.1} ms", self.avg_duration_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = SweepMetrics::new();
        assert_eq!(metrics.runs_started(), 0);
        assert_eq!(metrics.runs_failed(), 0);
        assert_eq!(metrics.avg_duration_ms(), 0.0);
    }

    #[test]
    fn test_failure_counter_is_shared_between_clones() {
        let metrics = SweepMetrics::new();
        let clone = metrics.clone();

        clone.record_failure();
        assert_eq!(metrics.runs_failed(), 1);
        assert_eq!(metrics.runs_started(), 1);
    }

    #[test]
    fn test_timeout_does_not_count_as_a_run() {
        let metrics = SweepMetrics::new();
        metrics.record_timeout();

        let summary = metrics.summary();
        assert_eq!(summary.runs_timed_out, 1);
        assert_eq!(summary.runs_started, 0);
        assert_eq!(summary.runs_failed, 0);
    }

    #[test]
    fn test_format_mb() {
        assert_eq!(MetricsSummary::format_mb(1024 * 1024), "1.00");
        assert_eq!(MetricsSummary::format_mb(0), "0.00");
    }
}
