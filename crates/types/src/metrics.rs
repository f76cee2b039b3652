//! Throughput snapshots.

use std::time::Duration;

/// Point-in-time view of the load counters.
///
/// Counters are monotonically non-decreasing across snapshots taken from the
/// same run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Successful submissions so far.
    pub success_count: u64,
    /// Failed submissions so far.
    pub failure_count: u64,
    /// Time since the run started, in microseconds.
    pub elapsed_micros: u64,
}

impl MetricsSnapshot {
    /// Total completed submissions.
    pub fn total(&self) -> u64 {
        self.success_count + self.failure_count
    }

    /// Elapsed time as a `Duration`.
    pub fn elapsed(&self) -> Duration {
        Duration::from_micros(self.elapsed_micros)
    }

    /// Successes per second between `previous` and `self`.
    ///
    /// Returns 0.0 when no time elapsed or when the counters did not advance.
    pub fn rate_since(&self, previous: &MetricsSnapshot) -> f64 {
        let delta_micros = self.elapsed_micros.saturating_sub(previous.elapsed_micros);
        if delta_micros == 0 {
            return 0.0;
        }
        let delta_success = self.success_count.saturating_sub(previous.success_count);
        delta_success as f64 * 1_000_000.0 / delta_micros as f64
    }

    /// Average successes per second since the start of the run.
    pub fn average_rate(&self) -> f64 {
        self.rate_since(&MetricsSnapshot::default())
    }
}
