//! Ledger load generator.
//!
//! # Usage
//!
//! ```bash
//! # Fund 1000 accounts and stream transfers until Ctrl+C
//! loadgen --endpoint http://127.0.0.1:9944 --accounts 1000 --mode streaming
//!
//! # Start from a configuration file, wait for finality, stop after 5 minutes
//! loadgen --config loadgen.toml --finality finalized --duration 300
//!
//! # Dry run against the in-process ledger
//! loadgen --endpoint memory:// --accounts 64 --duration 10
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use loadgen_spammer::{
    spawn_cancel_after, CompletionPolicy, DriverMode, FundingStrategy, Spammer, SpammerConfig,
};
use loadgen_types::Amount;
use std::path::PathBuf;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Ledger load generator
///
/// Funds a pool of sender accounts from a root account, then submits
/// transfers continuously and reports throughput.
#[derive(Parser, Debug)]
#[command(name = "loadgen")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Ledger endpoint URL, or memory:// for a dry run (overrides config)
    #[arg(long)]
    endpoint: Option<String>,

    /// Number of sender accounts (overrides config)
    #[arg(long)]
    accounts: Option<usize>,

    /// Load mode: batch, streaming or reads (overrides config)
    #[arg(long)]
    mode: Option<DriverMode>,

    /// Completion point: in_block or finalized (overrides config)
    #[arg(long, value_parser = parse_finality)]
    finality: Option<CompletionPolicy>,

    /// Funding strategy: cascade or direct (overrides config)
    #[arg(long, value_parser = parse_funding)]
    funding: Option<FundingStrategy>,

    /// Total amount distributed by the root account (overrides config)
    #[arg(long)]
    funding_amount: Option<Amount>,

    /// Amount of each load transfer (overrides config)
    #[arg(long)]
    unit_amount: Option<Amount>,

    /// Stop after this many seconds of sustained load
    #[arg(long)]
    duration: Option<u64>,

    /// Log level filter (overrides RUST_LOG)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn parse_finality(s: &str) -> Result<CompletionPolicy, String> {
    match s {
        "in_block" | "fire_and_forget" => Ok(CompletionPolicy::FireAndForget),
        "finalized" | "wait_for_finality" => Ok(CompletionPolicy::WaitForFinality),
        other => Err(format!("unknown finality '{other}' (expected in_block or finalized)")),
    }
}

fn parse_funding(s: &str) -> Result<FundingStrategy, String> {
    match s {
        "cascade" => Ok(FundingStrategy::Cascade),
        "direct" => Ok(FundingStrategy::Direct),
        other => Err(format!("unknown funding strategy '{other}' (expected cascade or direct)")),
    }
}

/// Apply CLI overrides to the configuration.
fn apply_overrides(config: &mut SpammerConfig, cli: &Cli) {
    if let Some(ref endpoint) = cli.endpoint {
        config.endpoint = endpoint.clone();
    }
    if let Some(accounts) = cli.accounts {
        config.accounts = accounts;
    }
    if let Some(mode) = cli.mode {
        config.mode = mode;
    }
    if let Some(finality) = cli.finality {
        config.finality = finality;
    }
    if let Some(funding) = cli.funding {
        config.funding = funding;
    }
    if let Some(amount) = cli.funding_amount {
        config.funding_amount = amount;
    }
    if let Some(amount) = cli.unit_amount {
        config.unit_amount = amount;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .init();

    let mut config = match cli.config {
        Some(ref path) => SpammerConfig::load(path)
            .with_context(|| format!("Failed to load config file: {}", path.display()))?,
        None => SpammerConfig::default(),
    };
    apply_overrides(&mut config, &cli);

    let ready_timeout = config.ready_timeout();
    let mut spammer = Spammer::new(config).context("Failed to create spammer")?;

    spammer
        .wait_for_ready(ready_timeout)
        .await
        .context("Ledger is not reachable")?;

    let cancel = CancellationToken::new();

    // Spawn shutdown signal handler
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                error!(error = %e, "Failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    error!(error = %e, "Failed to install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C"),
            _ = terminate => info!("Received SIGTERM"),
        }
        signal_cancel.cancel();
    });

    // Ctrl+C during funding stops funding too.
    match spammer.prepare(&cancel).await {
        Err(e) if e.is_cancelled() => {
            info!("Cancelled before sustained load started");
            return Ok(());
        }
        result => result.context("Funding failed")?,
    }

    // The duration covers sustained load only, not funding.
    match cli.duration {
        Some(secs) => {
            info!(duration_secs = secs, "Running for a fixed duration, press Ctrl+C to stop early");
            spawn_cancel_after(Duration::from_secs(secs), cancel.clone());
        }
        None => info!("Running until Ctrl+C"),
    }

    let report = spammer
        .run_until_cancelled(cancel)
        .await
        .context("Load run failed")?;

    report.print();
    Ok(())
}
