//! Spammer runner that wires funding, sustained load, and reporting together.

use crate::accounts::{AccountPool, AccountPoolError};
use crate::config::{ConfigError, SpammerConfig};
use crate::driver::{DriverError, DriverMode, LoadCounters, LoadDriver};
use crate::funding::{Funder, FundingError, FundingReport};
use crate::latency::{LatencyRecorder, LatencyReport};
use crate::metrics::{ConsoleSink, MetricsReporter, MetricsSink};
use crate::submission::SubmissionEngine;
use loadgen_ledger::{LedgerClient, LedgerError, MemoryLedger, MemoryLedgerConfig, RpcClient};
use loadgen_types::Identity;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Funds an account pool and then drives sustained load against one ledger.
pub struct Spammer {
    config: SpammerConfig,
    client: Arc<dyn LedgerClient>,
    root: Arc<Identity>,
    accounts: AccountPool,
    engine: SubmissionEngine,
    funding: Option<FundingReport>,
}

impl Spammer {
    /// Create a spammer for the configured endpoint.
    ///
    /// A `memory://` endpoint runs against an in-process ledger whose root
    /// account holds `funding_amount`.
    pub fn new(config: SpammerConfig) -> Result<Self, SpammerError> {
        config.validate()?;

        let client: Arc<dyn LedgerClient> = if config.is_dry_run() {
            let root = Identity::from_phrase(&config.root_phrase);
            let ledger = MemoryLedger::new(
                MemoryLedgerConfig::default().with_block_time(config.dry_run_block_time()),
            )
            .with_balance(root.address(), config.funding_amount);
            Arc::new(ledger)
        } else {
            let client = RpcClient::new(config.endpoint.clone())?
                .with_poll_interval(config.poll_interval());
            Arc::new(client)
        };

        Self::with_client(config, client)
    }

    /// Create a spammer with an explicit ledger client.
    pub fn with_client(
        config: SpammerConfig,
        client: Arc<dyn LedgerClient>,
    ) -> Result<Self, SpammerError> {
        config.validate()?;

        let accounts = AccountPool::derive(&config.account_seed, config.accounts)?;
        let root = Arc::new(Identity::from_phrase(&config.root_phrase));
        let engine = SubmissionEngine::new(Arc::clone(&client), config.finality)
            .with_timeout(config.submission_timeout());

        info!(
            endpoint = %client.describe(),
            accounts = accounts.len(),
            root = %root.address(),
            mode = %config.mode,
            finality = %config.finality,
            "Spammer configured"
        );

        Ok(Self {
            config,
            client,
            root,
            accounts,
            engine,
            funding: None,
        })
    }

    pub fn config(&self) -> &SpammerConfig {
        &self.config
    }

    pub fn accounts(&self) -> &AccountPool {
        &self.accounts
    }

    pub fn root(&self) -> &Arc<Identity> {
        &self.root
    }

    /// Result of the funding phase, once it ran.
    pub fn funding_report(&self) -> Option<&FundingReport> {
        self.funding.as_ref()
    }

    /// Wait for the ledger's health probe to succeed.
    pub async fn wait_for_ready(&self, timeout: Duration) -> Result<(), SpammerError> {
        let start = Instant::now();

        loop {
            match self.client.health().await {
                Ok(()) => {
                    info!(endpoint = %self.client.describe(), "Ledger ready");
                    return Ok(());
                }
                Err(e) if start.elapsed() >= timeout => {
                    warn!(error = %e, "Ledger not ready");
                    return Err(SpammerError::NotReady {
                        endpoint: self.client.describe(),
                        timeout,
                    });
                }
                Err(_) => tokio::time::sleep(Duration::from_millis(500)).await,
            }
        }
    }

    /// Fund the account pool with the configured strategy. Runs once; later
    /// calls return the first report.
    pub async fn fund(&mut self) -> Result<&FundingReport, SpammerError> {
        self.fund_until_cancelled(&CancellationToken::new()).await
    }

    /// Like [`fund`](Self::fund), but stops with [`FundingError::Cancelled`]
    /// once `cancel` fires. A cancelled run leaves the pool unmarked, so a
    /// later call funds again.
    pub async fn fund_until_cancelled(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<&FundingReport, SpammerError> {
        if self.funding.is_none() {
            let funder = Funder::new(self.engine.clone(), self.config.underfunding)
                .with_cancel(cancel.clone());
            let report = funder
                .fund(
                    self.config.funding,
                    &self.root,
                    &self.accounts,
                    self.config.funding_amount,
                    self.config.skip_funded_above,
                )
                .await?;
            self.funding = Some(report);
        }
        Ok(self.funding.get_or_insert_with(FundingReport::default))
    }

    /// Fund the pool unless the configured mode sends no transfers.
    pub async fn prepare(&mut self, cancel: &CancellationToken) -> Result<(), SpammerError> {
        if self.config.mode != DriverMode::Reads {
            self.fund_until_cancelled(cancel).await?;
        }
        Ok(())
    }

    /// Fund the pool, then run sustained load for `duration`.
    ///
    /// The clock starts once funding is done.
    pub async fn run_for(&mut self, duration: Duration) -> Result<SpammerReport, SpammerError> {
        let cancel = CancellationToken::new();
        self.prepare(&cancel).await?;
        spawn_cancel_after(duration, cancel.clone());
        self.run_until_cancelled(cancel).await
    }

    /// Run until the cancellation token is triggered, printing throughput
    /// lines to stdout.
    pub async fn run_until_cancelled(
        &mut self,
        cancel: CancellationToken,
    ) -> Result<SpammerReport, SpammerError> {
        self.run_with_sink(cancel, ConsoleSink).await
    }

    /// Run until cancelled, sending throughput samples to `sink`.
    ///
    /// Funding runs first unless [`prepare`](Self::prepare) already did it;
    /// sustained load then runs until `cancel` fires, a configured limit is
    /// reached, or connectivity is lost. Cancelling during funding returns
    /// [`FundingError::Cancelled`].
    pub async fn run_with_sink<S: MetricsSink>(
        &mut self,
        cancel: CancellationToken,
        sink: S,
    ) -> Result<SpammerReport, SpammerError> {
        self.prepare(&cancel).await?;

        let counters = Arc::new(LoadCounters::new());
        let latency = LatencyRecorder::new();
        let engine = self.engine.clone().with_latency_recorder(latency.clone());
        let driver = LoadDriver::new(
            engine,
            Arc::clone(&counters),
            self.root.address(),
            self.config.unit_amount,
        )
        .with_limits(self.config.driver_limits());

        let reporter_cancel = cancel.child_token();
        let reporter = MetricsReporter::new(Arc::clone(&counters))
            .with_interval(self.config.report_interval())
            .spawn(sink, reporter_cancel.clone());

        let result = driver.run(self.config.mode, &self.accounts, cancel).await;
        reporter_cancel.cancel();
        if let Err(e) = reporter.await {
            warn!(error = %e, "Metrics reporter task failed");
        }

        let summary = match result {
            Ok(summary) => summary,
            Err(e) => {
                warn!(
                    success = counters.success(),
                    failure = counters.failure(),
                    "Sustained load halted"
                );
                return Err(e.into());
            }
        };

        let snapshot = counters.snapshot();
        info!(
            issued = summary.issued,
            success = summary.success,
            failure = summary.failure,
            "Sustained load stopped"
        );

        Ok(SpammerReport {
            duration: snapshot.elapsed(),
            mode: summary.mode,
            rounds: summary.rounds,
            total_issued: summary.issued,
            total_success: summary.success,
            total_failure: summary.failure,
            avg_rate: snapshot.average_rate(),
            funding: self.funding.clone(),
            latency: latency.report(),
        })
    }
}

/// Cancel `cancel` once `duration` has passed.
pub fn spawn_cancel_after(duration: Duration, cancel: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(duration) => cancel.cancel(),
            _ = cancel.cancelled() => {}
        }
    });
}

/// Report generated after a spammer run.
#[derive(Debug, Clone)]
pub struct SpammerReport {
    /// Duration of the sustained-load phase.
    pub duration: Duration,
    pub mode: DriverMode,
    /// Completed batches (batch mode) or reads (reads mode).
    pub rounds: u64,
    pub total_issued: u64,
    pub total_success: u64,
    pub total_failure: u64,
    /// Average successes per second.
    pub avg_rate: f64,
    /// Funding phase summary, if funding ran.
    pub funding: Option<FundingReport>,
    /// Submission latency during sustained load.
    pub latency: LatencyReport,
}

impl SpammerReport {
    /// Fraction of completed submissions that succeeded.
    pub fn success_ratio(&self) -> f64 {
        let completed = self.total_success + self.total_failure;
        if completed > 0 {
            self.total_success as f64 / completed as f64
        } else {
            0.0
        }
    }

    /// Print the report to stdout.
    pub fn print(&self) {
        println!("\n=== Spammer Report ===");
        println!("Mode: {}", self.mode);
        println!("Duration: {:?}", self.duration);
        if self.mode == DriverMode::Batch {
            println!("Batches: {}", self.rounds);
        }
        println!("Issued: {}", self.total_issued);
        println!("Success: {}", self.total_success);
        println!("Failure: {}", self.total_failure);
        println!("Success ratio: {:.2}%", self.success_ratio() * 100.0);
        println!("Avg rate: {:.2} tx/s", self.avg_rate);

        if let Some(ref funding) = self.funding {
            println!("\n--- Funding ---");
            match funding.strategy {
                None => println!("Skipped ({} accounts already funded)", funding.skipped_accounts),
                Some(strategy) => {
                    println!("Strategy: {strategy:?}");
                    println!("Rounds: {}", funding.rounds);
                    println!("Transfers: {}", funding.transfers);
                    println!("Retried: {}", funding.retried);
                    println!("Failed: {}", funding.failed);
                    if funding.starved > 0 {
                        println!("Not sent (unfunded sender): {}", funding.starved);
                    }
                    println!("Elapsed: {:?}", funding.elapsed);
                }
            }
        }

        if self.mode != DriverMode::Reads {
            self.latency.print_summary();
        }
    }
}

/// Errors that can occur during spamming.
#[derive(Debug, thiserror::Error)]
pub enum SpammerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Account derivation failed: {0}")]
    Accounts(#[from] AccountPoolError),

    #[error("Funding failed: {0}")]
    Funding(#[from] FundingError),

    #[error("Sustained load failed: {0}")]
    Driver(#[from] DriverError),

    #[error("Ledger client error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Ledger at {endpoint} not ready within {timeout:?}")]
    NotReady { endpoint: String, timeout: Duration },
}

impl SpammerError {
    /// Whether the run stopped because it was cancelled before load began.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SpammerError::Funding(FundingError::Cancelled))
    }
}
