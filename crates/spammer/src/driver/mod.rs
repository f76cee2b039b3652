//! Sustained load.
//!
//! Three modes share one set of [`LoadCounters`]:
//!
//! - **batch**: every account sends `unit` back to the root in one concurrent
//!   batch; the next batch starts when the previous one fully resolved
//! - **streaming**: one task per account, each submitting its next transfer
//!   as soon as the previous one resolved
//! - **reads**: repeated balance lookups of the root account
//!
//! All modes run until cancelled. In-flight submissions are abandoned on
//! cancellation; counters only ever reflect completed submissions.

use crate::accounts::AccountPool;
use crate::submission::SubmissionEngine;
use loadgen_types::{Address, Amount, MetricsSnapshot, TransferRequest, TxOutcome};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Which load pattern to drive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverMode {
    #[default]
    Batch,
    Streaming,
    Reads,
}

impl std::fmt::Display for DriverMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriverMode::Batch => f.write_str("batch"),
            DriverMode::Streaming => f.write_str("streaming"),
            DriverMode::Reads => f.write_str("reads"),
        }
    }
}

impl std::str::FromStr for DriverMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "batch" => Ok(DriverMode::Batch),
            "streaming" => Ok(DriverMode::Streaming),
            "reads" => Ok(DriverMode::Reads),
            other => Err(format!(
                "unknown mode '{other}' (expected batch, streaming or reads)"
            )),
        }
    }
}

/// Shared success/failure counters.
///
/// Updated by submission tasks and read lock-free by the metrics reporter.
/// Elapsed time follows the tokio clock, so paused-time tests see virtual time.
#[derive(Debug)]
pub struct LoadCounters {
    issued: AtomicU64,
    success: AtomicU64,
    failure: AtomicU64,
    start: Instant,
}

impl Default for LoadCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadCounters {
    /// Counters with the clock starting now.
    pub fn new() -> Self {
        Self {
            issued: AtomicU64::new(0),
            success: AtomicU64::new(0),
            failure: AtomicU64::new(0),
            start: Instant::now(),
        }
    }

    #[inline]
    pub fn record_issued(&self, count: u64) {
        self.issued.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn record(&self, success: bool) {
        if success {
            self.success.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failure.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn issued(&self) -> u64 {
        self.issued.load(Ordering::Relaxed)
    }

    pub fn success(&self) -> u64 {
        self.success.load(Ordering::Relaxed)
    }

    pub fn failure(&self) -> u64 {
        self.failure.load(Ordering::Relaxed)
    }

    /// When the counters started.
    pub fn start(&self) -> Instant {
        self.start
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            success_count: self.success(),
            failure_count: self.failure(),
            elapsed_micros: self.start.elapsed().as_micros() as u64,
        }
    }
}

/// Optional bounds on a driver run. Unbounded runs stop only on cancellation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverLimits {
    /// Batches in batch mode, lookups in reads mode.
    pub max_rounds: Option<u64>,
    /// Submissions per account in streaming mode.
    pub max_requests_per_account: Option<u64>,
}

/// What a driver run did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverSummary {
    pub mode: DriverMode,
    /// Completed batches (batch mode) or lookups (reads mode).
    pub rounds: u64,
    pub issued: u64,
    pub success: u64,
    pub failure: u64,
}

/// Drives sustained load through a [`SubmissionEngine`].
pub struct LoadDriver {
    engine: SubmissionEngine,
    counters: Arc<LoadCounters>,
    root: Address,
    unit: Amount,
    limits: DriverLimits,
}

impl LoadDriver {
    /// `root` receives every transfer; `unit` is the amount of each.
    pub fn new(
        engine: SubmissionEngine,
        counters: Arc<LoadCounters>,
        root: Address,
        unit: Amount,
    ) -> Self {
        Self {
            engine,
            counters,
            root,
            unit,
            limits: DriverLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: DriverLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn counters(&self) -> &Arc<LoadCounters> {
        &self.counters
    }

    /// Run `mode` until cancelled or a limit is reached.
    pub async fn run(
        &self,
        mode: DriverMode,
        pool: &AccountPool,
        cancel: CancellationToken,
    ) -> Result<DriverSummary, DriverError> {
        info!(
            %mode,
            accounts = pool.len(),
            unit = %self.unit,
            policy = %self.engine.policy(),
            "Starting sustained load"
        );
        let rounds = match mode {
            DriverMode::Batch => self.run_batch(pool, cancel).await?,
            DriverMode::Streaming => self.run_streaming(pool, cancel).await?,
            DriverMode::Reads => self.run_reads(cancel).await?,
        };
        Ok(self.summary(mode, rounds))
    }

    fn summary(&self, mode: DriverMode, rounds: u64) -> DriverSummary {
        DriverSummary {
            mode,
            rounds,
            issued: self.counters.issued(),
            success: self.counters.success(),
            failure: self.counters.failure(),
        }
    }

    fn connectivity_error(&self) -> DriverError {
        DriverError::Connectivity {
            endpoint: self.engine.client().describe(),
        }
    }

    /// One full-population batch per iteration. Returns completed batches.
    pub async fn run_batch(
        &self,
        pool: &AccountPool,
        cancel: CancellationToken,
    ) -> Result<u64, DriverError> {
        let mut rounds = 0u64;

        loop {
            if cancel.is_cancelled() || self.limits.max_rounds.is_some_and(|max| rounds >= max) {
                break;
            }

            let requests: Vec<TransferRequest> = pool
                .iter()
                .map(|sender| TransferRequest::new(Arc::clone(sender), self.root, self.unit))
                .collect();
            self.counters.record_issued(requests.len() as u64);

            let outcomes = tokio::select! {
                _ = cancel.cancelled() => break,
                outcomes = self.engine.submit_batch_detailed(&requests) => outcomes,
            };

            let mut disconnected = false;
            for outcome in &outcomes {
                self.counters.record(outcome.is_success());
                disconnected |= *outcome == TxOutcome::Disconnected;
            }
            rounds += 1;

            if disconnected {
                warn!(round = rounds, "Lost connectivity, halting batch load");
                return Err(self.connectivity_error());
            }
            debug!(
                round = rounds,
                success = outcomes.iter().filter(|o| o.is_success()).count(),
                batch = outcomes.len(),
                "Batch complete"
            );
        }

        Ok(rounds)
    }

    /// One perpetual submission task per account. Returns 0 rounds; progress
    /// is in the counters.
    pub async fn run_streaming(
        &self,
        pool: &AccountPool,
        cancel: CancellationToken,
    ) -> Result<u64, DriverError> {
        // Cancelled by the caller or by any task that loses connectivity.
        let halt = cancel.child_token();
        let mut tasks = JoinSet::new();

        for sender in pool.iter() {
            let engine = self.engine.clone();
            let counters = Arc::clone(&self.counters);
            let halt = halt.clone();
            let request = TransferRequest::new(Arc::clone(sender), self.root, self.unit);
            let limit = self.limits.max_requests_per_account;

            tasks.spawn(async move {
                let mut sent = 0u64;
                loop {
                    if halt.is_cancelled() || limit.is_some_and(|max| sent >= max) {
                        return false;
                    }
                    counters.record_issued(1);
                    let outcome = tokio::select! {
                        _ = halt.cancelled() => return false,
                        outcome = engine.submit(&request) => outcome,
                    };
                    counters.record(outcome.is_success());
                    sent += 1;

                    if outcome == TxOutcome::Disconnected {
                        halt.cancel();
                        return true;
                    }
                }
            });
        }

        let mut disconnected = false;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(lost) => disconnected |= lost,
                Err(e) => warn!(error = %e, "Streaming task failed"),
            }
        }

        if disconnected {
            warn!("Lost connectivity, halted streaming load");
            return Err(self.connectivity_error());
        }
        Ok(0)
    }

    /// Repeated balance lookups of the root account. Returns completed lookups.
    pub async fn run_reads(&self, cancel: CancellationToken) -> Result<u64, DriverError> {
        let client = self.engine.client();
        let mut reads = 0u64;

        loop {
            if cancel.is_cancelled() || self.limits.max_rounds.is_some_and(|max| reads >= max) {
                break;
            }
            self.counters.record_issued(1);
            let result = tokio::select! {
                _ = cancel.cancelled() => break,
                result = client.account_balance(&self.root) => result,
            };
            reads += 1;

            match result {
                Ok(_) => self.counters.record(true),
                Err(e) if e.is_connectivity() => {
                    self.counters.record(false);
                    warn!(error = %e, "Lost connectivity, halting reads");
                    return Err(self.connectivity_error());
                }
                Err(e) => {
                    self.counters.record(false);
                    debug!(error = %e, "Balance read failed");
                }
            }
            // An in-process ledger answers without ever suspending.
            tokio::task::yield_now().await;
        }

        Ok(reads)
    }
}

/// Errors that stop sustained load.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("Lost connectivity to {endpoint}")]
    Connectivity { endpoint: String },
}
