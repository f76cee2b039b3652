//! Latency tracking for submitted transactions.
//!
//! Every submission records the time from `submit_transfer` to its terminal
//! outcome. The histogram is shared by all submission tasks behind a
//! `parking_lot::Mutex`, which is only held for the duration of one `record`.

use hdrhistogram::Histogram;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Shared time-to-outcome recorder. Clones record into the same histogram.
#[derive(Clone)]
pub struct LatencyRecorder {
    /// Latency histogram (microseconds).
    histogram: Arc<Mutex<Histogram<u64>>>,
}

impl Default for LatencyRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl LatencyRecorder {
    pub fn new() -> Self {
        Self {
            histogram: Arc::new(Mutex::new(
                Histogram::new(3).expect("3 significant figures is a valid precision"),
            )),
        }
    }

    /// Record one completed submission.
    #[inline]
    pub fn record(&self, latency: Duration) {
        let micros = latency.as_micros().min(u64::MAX as u128) as u64;
        // Histogram auto-resizes; recording only fails on a zero-width histogram.
        let _ = self.histogram.lock().record(micros);
    }

    /// Number of recorded samples.
    pub fn count(&self) -> u64 {
        self.histogram.lock().len()
    }

    /// Snapshot the current distribution.
    pub fn report(&self) -> LatencyReport {
        let histogram = self.histogram.lock().clone();
        LatencyReport { histogram }
    }
}

impl std::fmt::Debug for LatencyRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LatencyRecorder")
            .field("count", &self.count())
            .finish()
    }
}

/// Report containing latency measurements.
#[derive(Clone)]
pub struct LatencyReport {
    /// Latency histogram (values in microseconds).
    histogram: Histogram<u64>,
}

impl LatencyReport {
    pub fn p50_latency(&self) -> Duration {
        Duration::from_micros(self.histogram.value_at_quantile(0.50))
    }

    pub fn p90_latency(&self) -> Duration {
        Duration::from_micros(self.histogram.value_at_quantile(0.90))
    }

    pub fn p99_latency(&self) -> Duration {
        Duration::from_micros(self.histogram.value_at_quantile(0.99))
    }

    pub fn max_latency(&self) -> Duration {
        Duration::from_micros(self.histogram.max())
    }

    pub fn min_latency(&self) -> Duration {
        Duration::from_micros(self.histogram.min())
    }

    pub fn avg_latency(&self) -> Duration {
        Duration::from_micros(self.histogram.mean() as u64)
    }

    /// Number of samples in the report.
    pub fn samples(&self) -> u64 {
        self.histogram.len()
    }

    pub fn has_measurements(&self) -> bool {
        !self.histogram.is_empty()
    }

    /// Print a summary of the latency report.
    pub fn print_summary(&self) {
        println!("\n--- Latency (submit to outcome) ---");
        if !self.has_measurements() {
            println!("No latency measurements recorded.");
            return;
        }
        println!("Samples: {}", self.samples());
        println!("  P50:  {:?}", self.p50_latency());
        println!("  P90:  {:?}", self.p90_latency());
        println!("  P99:  {:?}", self.p99_latency());
        println!("  Max:  {:?}", self.max_latency());
        println!("  Avg:  {:?}", self.avg_latency());
        println!("  Min:  {:?}", self.min_latency());
    }
}

impl std::fmt::Debug for LatencyReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LatencyReport")
            .field("samples", &self.samples())
            .field("p50", &self.p50_latency())
            .field("p99", &self.p99_latency())
            .field("max", &self.max_latency())
            .finish()
    }
}
