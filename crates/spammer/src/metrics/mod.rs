//! Periodic throughput reporting.

use crate::driver::LoadCounters;
use loadgen_types::MetricsSnapshot;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Default sampling interval.
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// One reporter tick: the counters and the success rate since the previous tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThroughputSample {
    pub snapshot: MetricsSnapshot,
    /// Successes per second over the last interval.
    pub rate: f64,
}

impl std::fmt::Display for ThroughputSample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{:>3}s] success: {} | failure: {} | rate: {:.0} tx/s",
            self.snapshot.elapsed().as_secs(),
            self.snapshot.success_count,
            self.snapshot.failure_count,
            self.rate
        )
    }
}

/// Consumer of throughput samples.
pub trait MetricsSink: Send + 'static {
    fn emit(&mut self, sample: &ThroughputSample);
}

/// Prints one progress line per sample to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSink;

impl MetricsSink for ConsoleSink {
    fn emit(&mut self, sample: &ThroughputSample) {
        println!("{sample}");
    }
}

impl MetricsSink for mpsc::UnboundedSender<ThroughputSample> {
    fn emit(&mut self, sample: &ThroughputSample) {
        // Receiver gone means nobody is listening any more.
        let _ = self.send(*sample);
    }
}

impl MetricsSink for Vec<ThroughputSample> {
    fn emit(&mut self, sample: &ThroughputSample) {
        self.push(*sample);
    }
}

/// Samples [`LoadCounters`] at a fixed interval.
pub struct MetricsReporter {
    counters: Arc<LoadCounters>,
    interval: Duration,
}

impl MetricsReporter {
    pub fn new(counters: Arc<LoadCounters>) -> Self {
        Self {
            counters,
            interval: DEFAULT_REPORT_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Emit a sample every interval until cancelled, then hand the sink back.
    pub async fn run<S: MetricsSink>(self, mut sink: S, cancel: CancellationToken) -> S {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately.
        ticker.tick().await;
        let mut previous = self.counters.snapshot();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let snapshot = self.counters.snapshot();
                    let sample = ThroughputSample {
                        snapshot,
                        rate: snapshot.rate_since(&previous),
                    };
                    sink.emit(&sample);
                    previous = snapshot;
                }
            }
        }
        sink
    }

    /// Run on a background task.
    pub fn spawn<S: MetricsSink>(self, sink: S, cancel: CancellationToken) -> JoinHandle<S> {
        tokio::spawn(self.run(sink, cancel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_line() {
        let sample = ThroughputSample {
            snapshot: MetricsSnapshot {
                success_count: 1200,
                failure_count: 3,
                elapsed_micros: 5_400_000,
            },
            rate: 241.6,
        };
        assert_eq!(
            sample.to_string(),
            "[  5s] success: 1200 | failure: 3 | rate: 242 tx/s"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_per_interval() {
        let counters = Arc::new(LoadCounters::new());
        let cancel = CancellationToken::new();
        let reporter = MetricsReporter::new(Arc::clone(&counters))
            .with_interval(Duration::from_secs(1))
            .spawn(Vec::new(), cancel.clone());

        // Let the reporter take its baseline snapshot.
        tokio::time::sleep(Duration::from_millis(10)).await;

        for _ in 0..100 {
            counters.record(true);
        }
        tokio::time::sleep(Duration::from_millis(1500)).await;
        for _ in 0..50 {
            counters.record(true);
        }
        counters.record(false);
        tokio::time::sleep(Duration::from_secs(1)).await;

        cancel.cancel();
        let samples = reporter.await.unwrap();

        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].snapshot.success_count, 100);
        assert!((samples[0].rate - 100.0).abs() < 1.0, "rate was {}", samples[0].rate);
        assert_eq!(samples[1].snapshot.success_count, 150);
        assert_eq!(samples[1].snapshot.failure_count, 1);
        assert!((samples[1].rate - 50.0).abs() < 1.0, "rate was {}", samples[1].rate);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_rate_is_zero() {
        let counters = Arc::new(LoadCounters::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let handle = MetricsReporter::new(counters)
            .with_interval(Duration::from_millis(100))
            .spawn(tx, cancel.clone());

        let sample = rx.recv().await.unwrap();
        assert_eq!(sample.rate, 0.0);
        cancel.cancel();
        handle.await.unwrap();
    }
}
