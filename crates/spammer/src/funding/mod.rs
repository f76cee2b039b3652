//! Funding the account pool from a single root account.
//!
//! The default strategy is a doubling cascade. The root sends the whole lump
//! sum to account 0, then every funded account halves its share with one
//! unfunded account per round:
//!
//! ```text
//! seed:    root -> 0                 (A)
//! round 1: 0 -> 1                    (A/2)
//! round 2: 0 -> 2, 1 -> 3            (A/4)
//! round 3: 0 -> 4, 1 -> 5, 2 -> 6, 3 -> 7
//! ```
//!
//! Funding N accounts takes `ceil(log2 N)` rounds after the seed transfer.
//! Every round is one concurrent batch through the [`SubmissionEngine`].
//! An account whose funding failed never donates in a later round; its
//! would-be recipients stay unfunded and the round count does not change.

use crate::accounts::AccountPool;
use crate::submission::SubmissionEngine;
use futures::future::join_all;
use loadgen_ledger::LedgerError;
use loadgen_types::{Amount, Identity, TransferRequest, TxOutcome};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How the pool gets its funds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FundingStrategy {
    /// Doubling cascade from account 0.
    #[default]
    Cascade,
    /// Root pays every account directly, one transfer at a time.
    Direct,
}

/// What to do when some transfers of a cascade round fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum UnderfundingPolicy {
    /// Re-submit only the failed transfers, up to `max_attempts` attempts in
    /// total, then continue with whatever succeeded.
    Retry { max_attempts: u32 },
    /// Log the failures and continue.
    BestEffort,
    /// Fail the cascade.
    Abort,
}

impl Default for UnderfundingPolicy {
    fn default() -> Self {
        UnderfundingPolicy::Retry { max_attempts: 3 }
    }
}

/// One round of the cascade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadeRound {
    /// 1-based round number.
    pub number: usize,
    /// Number of funded accounts at the start of the round.
    pub frontier: usize,
    /// Amount each sender passes on.
    pub share: Amount,
    /// `(sender, recipient)` pool indices.
    pub transfers: Vec<(usize, usize)>,
}

/// Precomputed cascade for a pool of a given size.
///
/// Building the plan validates the configuration: if the share would reach
/// zero before every account is covered, no transfer is ever sent.
#[derive(Debug, Clone)]
pub struct CascadePlan {
    accounts: usize,
    amount: Amount,
    rounds: Vec<CascadeRound>,
}

impl CascadePlan {
    pub fn new(accounts: usize, amount: Amount) -> Result<Self, FundingError> {
        if accounts == 0 {
            return Err(FundingError::EmptyPool);
        }
        if amount.is_zero() {
            return Err(FundingError::ZeroAmount);
        }

        let mut rounds = Vec::new();
        let mut frontier = 1usize;
        let mut share = amount;

        while frontier < accounts {
            share = share.half();
            let number = rounds.len() + 1;
            if share.is_zero() {
                return Err(FundingError::ShareExhausted {
                    amount,
                    accounts,
                    round: number,
                });
            }

            let transfers = (0..frontier)
                .map(|j| (j, frontier + j))
                .take_while(|&(_, recipient)| recipient < accounts)
                .collect();

            rounds.push(CascadeRound {
                number,
                frontier,
                share,
                transfers,
            });
            frontier = frontier.saturating_mul(2).min(accounts);
        }

        Ok(Self {
            accounts,
            amount,
            rounds,
        })
    }

    pub fn accounts(&self) -> usize {
        self.accounts
    }

    /// Amount sent by the root in the seed transfer.
    pub fn amount(&self) -> Amount {
        self.amount
    }

    pub fn rounds(&self) -> &[CascadeRound] {
        &self.rounds
    }

    pub fn round_count(&self) -> usize {
        self.rounds.len()
    }

    /// Transfers after the seed transfer, across all rounds.
    pub fn transfer_count(&self) -> usize {
        self.rounds.iter().map(|r| r.transfers.len()).sum()
    }

    /// Share received in the final round (or the full amount for one account).
    pub fn smallest_share(&self) -> Amount {
        self.rounds.last().map(|r| r.share).unwrap_or(self.amount)
    }

    /// Balances after a failure-free run, in pool order.
    pub fn expected_balances(&self) -> Vec<Amount> {
        let mut balances = vec![Amount::ZERO; self.accounts];
        balances[0] = self.amount;
        for round in &self.rounds {
            for &(sender, recipient) in &round.transfers {
                balances[sender] = balances[sender].saturating_sub(round.share);
                balances[recipient] = round.share;
            }
        }
        balances
    }
}

/// Number of cascade rounds needed to fund `accounts` accounts.
pub fn cascade_rounds(accounts: usize) -> usize {
    if accounts <= 1 {
        0
    } else {
        (usize::BITS - (accounts - 1).leading_zeros()) as usize
    }
}

/// Summary of a funding run.
#[derive(Debug, Clone, Default)]
pub struct FundingReport {
    pub strategy: Option<FundingStrategy>,
    /// Cascade rounds executed (0 for direct funding or a skipped run).
    pub rounds: usize,
    /// Transfers attempted, including the seed transfer and retries.
    pub transfers: u64,
    /// Transfers still failed after retries.
    pub failed: u64,
    /// Re-submissions made under the retry policy.
    pub retried: u64,
    /// Cascade transfers never sent because their sender was left unfunded.
    pub starved: u64,
    /// Accounts left alone because they already held enough funds.
    pub skipped_accounts: usize,
    pub elapsed: Duration,
}

impl FundingReport {
    fn skipped(accounts: usize) -> Self {
        Self {
            skipped_accounts: accounts,
            ..Self::default()
        }
    }

    /// Whether no funding transfers were sent at all.
    pub fn was_skipped(&self) -> bool {
        self.strategy.is_none()
    }
}

/// Funds an [`AccountPool`] from a root identity.
///
/// Funding stops with [`FundingError::Cancelled`] as soon as the token given
/// to [`with_cancel`](Self::with_cancel) fires; in-flight transfers are
/// abandoned and no further ones are sent.
pub struct Funder {
    engine: SubmissionEngine,
    policy: UnderfundingPolicy,
    cancel: CancellationToken,
}

impl Funder {
    pub fn new(engine: SubmissionEngine, policy: UnderfundingPolicy) -> Self {
        Self {
            engine,
            policy,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Await `work` unless cancellation fires first.
    async fn unless_cancelled<F: Future>(&self, work: F) -> Result<F::Output, FundingError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(FundingError::Cancelled),
            output = work => Ok(output),
        }
    }

    /// Balance of every account, queried concurrently, in pool order.
    pub async fn balances(&self, pool: &AccountPool) -> Result<Vec<Amount>, FundingError> {
        let client = self.engine.client();
        let lookups = pool.iter().map(|account| {
            let address = account.address();
            async move { client.account_balance(&address).await }
        });
        self.unless_cancelled(join_all(lookups))
            .await?
            .into_iter()
            .collect::<Result<Vec<_>, _>>()
            .map_err(FundingError::Balance)
    }

    /// Fund the pool with `strategy`, skipping the whole run when every
    /// account already holds at least `skip_funded_above`.
    pub async fn fund(
        &self,
        strategy: FundingStrategy,
        root: &Arc<Identity>,
        pool: &AccountPool,
        amount: Amount,
        skip_funded_above: Option<Amount>,
    ) -> Result<FundingReport, FundingError> {
        if let Some(threshold) = skip_funded_above {
            let balances = self.balances(pool).await?;
            if balances.iter().all(|b| *b >= threshold) {
                info!(
                    accounts = pool.len(),
                    %threshold,
                    "All accounts already funded, skipping funding"
                );
                return Ok(FundingReport::skipped(pool.len()));
            }
        }

        match strategy {
            FundingStrategy::Cascade => self.run_cascade(root, pool, amount).await,
            FundingStrategy::Direct => {
                self.run_direct(root, pool, amount, skip_funded_above).await
            }
        }
    }

    /// Distribute `amount` from `root` across the pool with the doubling cascade.
    pub async fn run_cascade(
        &self,
        root: &Arc<Identity>,
        pool: &AccountPool,
        amount: Amount,
    ) -> Result<FundingReport, FundingError> {
        let plan = CascadePlan::new(pool.len(), amount)?;
        let start = Instant::now();
        let mut report = FundingReport {
            strategy: Some(FundingStrategy::Cascade),
            ..FundingReport::default()
        };

        info!(
            accounts = plan.accounts(),
            %amount,
            rounds = plan.round_count(),
            smallest_share = %plan.smallest_share(),
            "Starting funding cascade"
        );

        let first = pool.address(0).ok_or(FundingError::EmptyPool)?;
        let seed = TransferRequest::new(Arc::clone(root), first, amount);
        report.transfers += 1;
        let outcome = self.unless_cancelled(self.engine.submit(&seed)).await?;
        if !outcome.is_success() {
            return Err(FundingError::SeedTransferFailed { outcome });
        }
        info!(recipient = %first, %amount, "Seed transfer complete");

        // Pool indices known to hold nothing.
        let mut unfunded: HashSet<usize> = HashSet::new();

        for round in plan.rounds() {
            let mut requests = Vec::with_capacity(round.transfers.len());
            for &(sender, recipient) in &round.transfers {
                if unfunded.contains(&sender) {
                    unfunded.insert(recipient);
                    report.starved += 1;
                    continue;
                }
                let (Some(identity), Some(address)) = (pool.get(sender), pool.address(recipient))
                else {
                    continue;
                };
                requests.push(TransferRequest::new(Arc::clone(identity), address, round.share));
            }

            let failed = self.run_round(round, requests, &mut report).await?;
            unfunded.extend(failed.iter().filter_map(|r| pool.index_of(&r.recipient)));
            info!(
                round = round.number,
                rounds = plan.round_count(),
                funded = round.frontier + round.transfers.len() - unfunded.len(),
                accounts = plan.accounts(),
                share = %round.share,
                "Funding round complete"
            );
        }

        report.rounds = plan.round_count();
        report.elapsed = start.elapsed();
        Ok(report)
    }

    /// Submit one round, applying the under-funding policy. Returns the
    /// transfers that still failed.
    async fn run_round(
        &self,
        round: &CascadeRound,
        requests: Vec<TransferRequest>,
        report: &mut FundingReport,
    ) -> Result<Vec<TransferRequest>, FundingError> {
        report.transfers += requests.len() as u64;
        let mut pending = self.failed_requests(requests).await?;

        if let UnderfundingPolicy::Retry { max_attempts } = self.policy {
            let mut attempt = 1;
            while !pending.is_empty() && attempt < max_attempts {
                attempt += 1;
                warn!(
                    round = round.number,
                    failed = pending.len(),
                    attempt,
                    max_attempts,
                    "Retrying failed funding transfers"
                );
                report.transfers += pending.len() as u64;
                report.retried += pending.len() as u64;
                pending = self.failed_requests(pending).await?;
            }
        }

        if pending.is_empty() {
            return Ok(pending);
        }

        report.failed += pending.len() as u64;
        if self.policy == UnderfundingPolicy::Abort {
            return Err(FundingError::RoundUnderfunded {
                round: round.number,
                failed: pending.len(),
            });
        }

        for request in &pending {
            debug!(
                sender = %request.sender.address(),
                recipient = %request.recipient,
                "Recipient left under-funded"
            );
        }
        warn!(
            round = round.number,
            failed = pending.len(),
            "Funding round under-funded, continuing"
        );
        Ok(pending)
    }

    /// Submit a batch and keep only the requests that failed.
    async fn failed_requests(
        &self,
        requests: Vec<TransferRequest>,
    ) -> Result<Vec<TransferRequest>, FundingError> {
        if requests.is_empty() {
            return Ok(requests);
        }
        let outcomes = self
            .unless_cancelled(self.engine.submit_batch_detailed(&requests))
            .await?;
        if outcomes.contains(&TxOutcome::Disconnected) {
            return Err(FundingError::Disconnected);
        }
        Ok(requests
            .into_iter()
            .zip(outcomes)
            .filter(|(_, outcome)| !outcome.is_success())
            .map(|(request, _)| request)
            .collect())
    }

    /// Pay each account `amount / N` straight from the root, one transfer at
    /// a time. Accounts already holding `skip_funded_above` are left alone.
    pub async fn run_direct(
        &self,
        root: &Arc<Identity>,
        pool: &AccountPool,
        amount: Amount,
        skip_funded_above: Option<Amount>,
    ) -> Result<FundingReport, FundingError> {
        if pool.is_empty() {
            return Err(FundingError::EmptyPool);
        }
        let per_account = amount
            .checked_div_count(pool.len() as u64)
            .filter(|share| !share.is_zero())
            .ok_or(FundingError::ShareExhausted {
                amount,
                accounts: pool.len(),
                round: 0,
            })?;

        let start = Instant::now();
        let mut report = FundingReport {
            strategy: Some(FundingStrategy::Direct),
            ..FundingReport::default()
        };
        let client = self.engine.client();

        info!(accounts = pool.len(), %per_account, "Crediting accounts directly");

        for (i, account) in pool.iter().enumerate() {
            let address = account.address();
            if let Some(threshold) = skip_funded_above {
                let balance = self
                    .unless_cancelled(client.account_balance(&address))
                    .await?
                    .map_err(FundingError::Balance)?;
                if balance >= threshold {
                    report.skipped_accounts += 1;
                    continue;
                }
            }

            report.transfers += 1;
            let request = TransferRequest::new(Arc::clone(root), address, per_account);
            match self.unless_cancelled(self.engine.submit(&request)).await? {
                TxOutcome::Disconnected => return Err(FundingError::Disconnected),
                outcome if !outcome.is_success() => {
                    report.failed += 1;
                    warn!(account = i, %address, %outcome, "Direct funding transfer failed");
                }
                _ => {}
            }

            if (i + 1) % 100 == 0 {
                info!(credited = i + 1, accounts = pool.len(), "Crediting accounts");
            }
        }

        report.elapsed = start.elapsed();
        info!(
            transfers = report.transfers,
            failed = report.failed,
            skipped = report.skipped_accounts,
            "Direct funding complete"
        );
        Ok(report)
    }
}

/// Errors that abort funding.
#[derive(Debug, thiserror::Error)]
pub enum FundingError {
    #[error("Cannot fund an empty account pool")]
    EmptyPool,

    #[error("Funding amount must be non-zero")]
    ZeroAmount,

    #[error(
        "Funding amount {amount} is too small for {accounts} accounts: share reaches zero in round {round}"
    )]
    ShareExhausted {
        amount: Amount,
        accounts: usize,
        round: usize,
    },

    #[error("Seed transfer from the root account failed: {outcome}")]
    SeedTransferFailed { outcome: TxOutcome },

    #[error("Funding round {round} left {failed} accounts under-funded")]
    RoundUnderfunded { round: usize, failed: usize },

    #[error("Balance lookup failed: {0}")]
    Balance(#[source] LedgerError),

    #[error("Lost connection to the ledger during funding")]
    Disconnected,

    #[error("Funding cancelled")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_round_count() {
        assert_eq!(cascade_rounds(1), 0);
        assert_eq!(cascade_rounds(2), 1);
        assert_eq!(cascade_rounds(3), 2);
        assert_eq!(cascade_rounds(4), 2);
        assert_eq!(cascade_rounds(5), 3);
        assert_eq!(cascade_rounds(1000), 10);
        assert_eq!(cascade_rounds(1024), 10);
        assert_eq!(cascade_rounds(1025), 11);
    }

    #[test]
    fn test_plan_matches_round_count() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        for _ in 0..200 {
            let n = rng.gen_range(1..5000usize);
            let plan = CascadePlan::new(n, Amount::from_u64(u64::MAX)).unwrap();
            assert_eq!(plan.round_count(), cascade_rounds(n), "n = {n}");
            assert_eq!(plan.transfer_count(), n - 1, "n = {n}");
        }
    }

    #[test]
    fn test_plan_four_accounts() {
        let plan = CascadePlan::new(4, Amount::from_u64(1000)).unwrap();
        let rounds = plan.rounds();
        assert_eq!(rounds.len(), 2);

        assert_eq!(rounds[0].share, Amount::from_u64(500));
        assert_eq!(rounds[0].transfers, vec![(0, 1)]);

        assert_eq!(rounds[1].share, Amount::from_u64(250));
        assert_eq!(rounds[1].transfers, vec![(0, 2), (1, 3)]);

        // Account 0 holds 500 after round 1 and passes half of that on in round 2.
        let expected: Vec<Amount> = [250u64, 250, 250, 250]
            .into_iter()
            .map(Amount::from_u64)
            .collect();
        assert_eq!(plan.expected_balances(), expected);
    }

    #[test]
    fn test_expected_balances_conserve_amount() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        for _ in 0..100 {
            let n = rng.gen_range(1..2000usize);
            let amount = rng.gen_range(1u64 << 12..u64::MAX / 2);
            let Ok(plan) = CascadePlan::new(n, Amount::from_u64(amount)) else {
                continue;
            };
            let total = plan
                .expected_balances()
                .into_iter()
                .fold(Amount::ZERO, |acc, b| acc.checked_add(b).unwrap());
            assert_eq!(total, Amount::from_u64(amount), "n = {n}");
        }
    }

    #[test]
    fn test_plan_partial_last_round() {
        let plan = CascadePlan::new(5, Amount::from_u64(800)).unwrap();
        let last = plan.rounds().last().unwrap();
        assert_eq!(last.frontier, 4);
        assert_eq!(last.transfers, vec![(0, 4)]);
        assert!(plan.expected_balances().iter().all(|b| !b.is_zero()));
    }

    #[test]
    fn test_every_account_funded_when_share_positive() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..100 {
            let n = rng.gen_range(1..3000usize);
            let amount = Amount::from_u64(1u64 << cascade_rounds(n));
            let plan = CascadePlan::new(n, amount).unwrap();
            assert!(plan.expected_balances().iter().all(|b| !b.is_zero()), "n = {n}");
        }
    }

    #[test]
    fn test_share_exhausted_at_plan_time() {
        // 1000 accounts need 10 halvings; 1000 >> 10 == 0.
        let err = CascadePlan::new(1000, Amount::from_u64(1000)).unwrap_err();
        assert!(matches!(
            err,
            FundingError::ShareExhausted { round: 10, accounts: 1000, .. }
        ));
        assert!(CascadePlan::new(1000, Amount::from_u64(1024)).is_ok());
    }

    #[test]
    fn test_plan_rejects_degenerate_inputs() {
        assert!(matches!(
            CascadePlan::new(0, Amount::from_u64(1)),
            Err(FundingError::EmptyPool)
        ));
        assert!(matches!(
            CascadePlan::new(3, Amount::ZERO),
            Err(FundingError::ZeroAmount)
        ));
        let single = CascadePlan::new(1, Amount::from_u64(1)).unwrap();
        assert_eq!(single.round_count(), 0);
        assert_eq!(single.expected_balances(), vec![Amount::from_u64(1)]);
    }

    #[test]
    fn test_underfunding_policy_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            underfunding: UnderfundingPolicy,
        }
        let w: Wrapper =
            toml::from_str("underfunding = { policy = \"retry\", max_attempts = 5 }").unwrap();
        assert_eq!(w.underfunding, UnderfundingPolicy::Retry { max_attempts: 5 });
        let w: Wrapper = toml::from_str("underfunding = { policy = \"abort\" }").unwrap();
        assert_eq!(w.underfunding, UnderfundingPolicy::Abort);
    }
}
