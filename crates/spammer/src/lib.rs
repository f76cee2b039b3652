//! Ledger Transaction Spammer
//!
//! A library and CLI tool that funds a pool of sender accounts from one root
//! account and then drives sustained transfer load against a ledger node,
//! reporting throughput as it goes.
//!
//! # Modules
//!
//! - [`accounts`]: Deterministic sender pool (AccountPool)
//! - [`funding`]: Doubling cascade and direct funding (Funder, CascadePlan)
//! - [`submission`]: Concurrent submission and completion tracking (SubmissionEngine)
//! - [`driver`]: Batch, streaming and read load loops (LoadDriver, LoadCounters)
//! - [`metrics`]: Periodic throughput sampling (MetricsReporter)
//! - [`latency`]: Submission latency histogram
//! - [`runner`]: Spammer orchestrator
//! - [`config`]: Configuration types

pub mod accounts;
pub mod config;
pub mod driver;
pub mod funding;
pub mod latency;
pub mod metrics;
pub mod runner;
pub mod submission;

pub use accounts::{AccountPool, AccountPoolError};
pub use config::{ConfigError, SpammerConfig};
pub use driver::{DriverError, DriverLimits, DriverMode, DriverSummary, LoadCounters, LoadDriver};
pub use funding::{
    cascade_rounds, CascadePlan, CascadeRound, Funder, FundingError, FundingReport,
    FundingStrategy, UnderfundingPolicy,
};
pub use latency::{LatencyRecorder, LatencyReport};
pub use metrics::{ConsoleSink, MetricsReporter, MetricsSink, ThroughputSample};
pub use runner::{spawn_cancel_after, Spammer, SpammerError, SpammerReport};
pub use submission::{CompletionPolicy, SubmissionEngine};
