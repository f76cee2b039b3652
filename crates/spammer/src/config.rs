//! Spammer configuration.
//!
//! Loaded from TOML; every field has a default so a file only needs the
//! values it changes:
//!
//! ```toml
//! endpoint = "http://127.0.0.1:9944"
//! accounts = 1000
//! funding_amount = "1024000000000000000000"
//! mode = "streaming"
//! finality = "finalized"
//! underfunding = { policy = "retry", max_attempts = 3 }
//! ```

use crate::driver::{DriverLimits, DriverMode};
use crate::funding::{CascadePlan, FundingStrategy, UnderfundingPolicy};
use crate::submission::CompletionPolicy;
use loadgen_types::Amount;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Endpoint scheme selecting the in-process ledger.
pub const MEMORY_ENDPOINT: &str = "memory://";

/// Configuration for a spammer run.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpammerConfig {
    /// Ledger node URL, or `memory://` for a dry run.
    pub endpoint: String,

    /// Number of sender accounts.
    pub accounts: usize,

    /// Seed the sender accounts are derived from.
    pub account_seed: String,

    /// Phrase of the pre-funded root account.
    pub root_phrase: String,

    /// Total amount distributed to the pool by the root.
    pub funding_amount: Amount,

    /// Amount of each load transfer.
    pub unit_amount: Amount,

    pub mode: DriverMode,

    pub finality: CompletionPolicy,

    pub funding: FundingStrategy,

    pub underfunding: UnderfundingPolicy,

    /// Skip funding when every account already holds at least this much.
    pub skip_funded_above: Option<Amount>,

    /// Bound on waiting for one transaction's outcome.
    pub submission_timeout_ms: u64,

    /// Throughput line interval.
    pub report_interval_ms: u64,

    /// How long to wait for the node's health probe at startup.
    pub ready_timeout_ms: u64,

    /// Status polling interval of the HTTP client.
    pub poll_interval_ms: u64,

    /// Simulated block time of the in-process ledger.
    pub dry_run_block_time_ms: u64,

    /// Stop after this many batches (batch mode) or reads (reads mode).
    pub max_rounds: Option<u64>,

    /// Stop each streaming task after this many submissions.
    pub max_requests_per_account: Option<u64>,
}

impl Default for SpammerConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:9944".to_string(),
            accounts: 1000,
            account_seed: "//Sender".to_string(),
            root_phrase: "//Alice".to_string(),
            // 10^18 base units per account after ten halvings.
            funding_amount: Amount::from_u128(1_024 * 10u128.pow(18)),
            unit_amount: Amount::from_u64(1),
            mode: DriverMode::default(),
            finality: CompletionPolicy::default(),
            funding: FundingStrategy::default(),
            underfunding: UnderfundingPolicy::default(),
            skip_funded_above: None,
            submission_timeout_ms: 60_000,
            report_interval_ms: 1_000,
            ready_timeout_ms: 30_000,
            poll_interval_ms: 250,
            dry_run_block_time_ms: 50,
            max_rounds: None,
            max_requests_per_account: None,
        }
    }
}

impl SpammerConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&contents)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_accounts(mut self, accounts: usize) -> Self {
        self.accounts = accounts;
        self
    }

    pub fn with_account_seed(mut self, seed: impl Into<String>) -> Self {
        self.account_seed = seed.into();
        self
    }

    pub fn with_funding_amount(mut self, amount: Amount) -> Self {
        self.funding_amount = amount;
        self
    }

    pub fn with_unit_amount(mut self, amount: Amount) -> Self {
        self.unit_amount = amount;
        self
    }

    pub fn with_mode(mut self, mode: DriverMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_finality(mut self, finality: CompletionPolicy) -> Self {
        self.finality = finality;
        self
    }

    pub fn with_funding(mut self, strategy: FundingStrategy) -> Self {
        self.funding = strategy;
        self
    }

    pub fn with_underfunding(mut self, policy: UnderfundingPolicy) -> Self {
        self.underfunding = policy;
        self
    }

    pub fn with_skip_funded_above(mut self, threshold: Amount) -> Self {
        self.skip_funded_above = Some(threshold);
        self
    }

    pub fn with_submission_timeout(mut self, timeout: Duration) -> Self {
        self.submission_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_report_interval(mut self, interval: Duration) -> Self {
        self.report_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_dry_run_block_time(mut self, block_time: Duration) -> Self {
        self.dry_run_block_time_ms = block_time.as_millis() as u64;
        self
    }

    pub fn with_max_rounds(mut self, rounds: u64) -> Self {
        self.max_rounds = Some(rounds);
        self
    }

    pub fn with_max_requests_per_account(mut self, requests: u64) -> Self {
        self.max_requests_per_account = Some(requests);
        self
    }

    pub fn submission_timeout(&self) -> Duration {
        Duration::from_millis(self.submission_timeout_ms)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_millis(self.report_interval_ms)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn dry_run_block_time(&self) -> Duration {
        Duration::from_millis(self.dry_run_block_time_ms)
    }

    pub fn driver_limits(&self) -> DriverLimits {
        DriverLimits {
            max_rounds: self.max_rounds,
            max_requests_per_account: self.max_requests_per_account,
        }
    }

    /// Whether the endpoint selects the in-process ledger.
    pub fn is_dry_run(&self) -> bool {
        self.endpoint.starts_with(MEMORY_ENDPOINT)
    }

    /// Check the configuration for values that cannot produce a useful run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.is_empty() {
            return Err(ConfigError::Invalid("endpoint must not be empty".into()));
        }
        if !self.is_dry_run()
            && !self.endpoint.starts_with("http://")
            && !self.endpoint.starts_with("https://")
        {
            return Err(ConfigError::Invalid(format!(
                "endpoint '{}' must be http(s):// or {MEMORY_ENDPOINT}",
                self.endpoint
            )));
        }
        if self.accounts == 0 {
            return Err(ConfigError::Invalid("accounts must be at least 1".into()));
        }
        if self.unit_amount.is_zero() && self.mode != DriverMode::Reads {
            return Err(ConfigError::Invalid("unit_amount must be non-zero".into()));
        }
        if self.submission_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "submission_timeout_ms must be non-zero".into(),
            ));
        }
        if self.report_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "report_interval_ms must be non-zero".into(),
            ));
        }
        if let UnderfundingPolicy::Retry { max_attempts: 0 } = self.underfunding {
            return Err(ConfigError::Invalid(
                "underfunding max_attempts must be at least 1".into(),
            ));
        }
        match self.funding {
            FundingStrategy::Cascade => {
                CascadePlan::new(self.accounts, self.funding_amount)
                    .map_err(|e| ConfigError::Invalid(e.to_string()))?;
            }
            FundingStrategy::Direct => {
                let per_account = self
                    .funding_amount
                    .checked_div_count(self.accounts as u64)
                    .unwrap_or(Amount::ZERO);
                if per_account.is_zero() {
                    return Err(ConfigError::Invalid(format!(
                        "funding_amount {} is too small for {} accounts",
                        self.funding_amount, self.accounts
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SpammerConfig::default();
        config.validate().unwrap();
        assert_eq!(config.submission_timeout(), Duration::from_secs(60));
        assert_eq!(config.report_interval(), Duration::from_secs(1));
        assert!(!config.is_dry_run());
    }

    #[test]
    fn test_partial_toml() {
        let config = SpammerConfig::from_toml(
            r#"
            endpoint = "memory://"
            accounts = 4
            funding_amount = 1000
            mode = "streaming"
            finality = "finalized"
            funding = "direct"
            underfunding = { policy = "best_effort" }
            skip_funded_above = "100"
            max_requests_per_account = 10
            "#,
        )
        .unwrap();

        assert!(config.is_dry_run());
        assert_eq!(config.accounts, 4);
        assert_eq!(config.funding_amount, Amount::from_u64(1000));
        assert_eq!(config.mode, DriverMode::Streaming);
        assert_eq!(config.finality, CompletionPolicy::WaitForFinality);
        assert_eq!(config.funding, FundingStrategy::Direct);
        assert_eq!(config.underfunding, UnderfundingPolicy::BestEffort);
        assert_eq!(config.skip_funded_above, Some(Amount::from_u64(100)));
        assert_eq!(config.driver_limits().max_requests_per_account, Some(10));
        assert_eq!(config.root_phrase, "//Alice");
        config.validate().unwrap();
    }

    #[test]
    fn test_unknown_mode_rejected() {
        assert!(matches!(
            SpammerConfig::from_toml(r#"mode = "turbo""#),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let base = SpammerConfig::default().with_endpoint("memory://");

        assert!(base.clone().with_accounts(0).validate().is_err());
        assert!(base.clone().with_unit_amount(Amount::ZERO).validate().is_err());
        assert!(base.clone().with_endpoint("ws://127.0.0.1:9944").validate().is_err());
        assert!(base
            .clone()
            .with_underfunding(UnderfundingPolicy::Retry { max_attempts: 0 })
            .validate()
            .is_err());

        // 1000 accounts cannot be funded by halving 1000 ten times.
        let err = base
            .clone()
            .with_funding_amount(Amount::from_u64(1000))
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("too small"), "{err}");

        // Reads mode never sends transfers.
        base.with_mode(DriverMode::Reads)
            .with_unit_amount(Amount::ZERO)
            .validate()
            .unwrap();
    }

    #[test]
    fn test_load_missing_file() {
        let err = SpammerConfig::load(Path::new("/nonexistent/loadgen.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
