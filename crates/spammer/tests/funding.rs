//! Funding against the in-memory and scripted ledgers.

mod common;

use common::{arc, finalized_ok, ScriptedLedger, Step};
use loadgen_ledger::{MemoryLedger, MemoryLedgerConfig};
use loadgen_spammer::{
    cascade_rounds, AccountPool, CompletionPolicy, Funder, FundingError, FundingStrategy,
    SubmissionEngine, UnderfundingPolicy,
};
use loadgen_types::{Amount, Identity, TxStatus};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing_test::traced_test;

fn root() -> Arc<Identity> {
    Arc::new(Identity::from_phrase("//Alice"))
}

fn funded_ledger(config: MemoryLedgerConfig, amount: Amount) -> MemoryLedger {
    MemoryLedger::new(config).with_balance(root().address(), amount)
}

fn funder(ledger: &MemoryLedger, policy: UnderfundingPolicy) -> Funder {
    let engine = SubmissionEngine::new(Arc::new(ledger.clone()), CompletionPolicy::WaitForFinality);
    Funder::new(engine, policy)
}

/// Seed 1000 -> acct0; round 1: 500 acct0 -> acct1; round 2: 250 acct0 -> acct2
/// and acct1 -> acct3. Account 0 ends with 250, having passed on 500 + 250.
#[tokio::test]
async fn test_four_account_cascade() {
    let amount = Amount::from_u64(1000);
    let ledger = funded_ledger(MemoryLedgerConfig::default(), amount);
    let pool = AccountPool::derive("cascade", 4).unwrap();

    let report = funder(&ledger, UnderfundingPolicy::default())
        .run_cascade(&root(), &pool, amount)
        .await
        .unwrap();

    assert_eq!(report.rounds, 2);
    assert_eq!(report.transfers, 4);
    assert_eq!(report.failed, 0);

    let balances: Vec<u64> = pool
        .addresses()
        .iter()
        .map(|a| ledger.balance_of(a).to_u128().unwrap() as u64)
        .collect();
    assert_eq!(balances, vec![250, 250, 250, 250]);
    assert_eq!(balances.iter().sum::<u64>(), 1000);
    assert!(ledger.balance_of(&root().address()).is_zero());

    let log = ledger.transfers();
    assert_eq!(log[0].sender, root().address());
    assert_eq!(log[0].recipient, pool.address(0).unwrap());
    assert_eq!(log[1].amount, Amount::from_u64(500));
    let round_two: HashSet<_> = log[2..]
        .iter()
        .map(|t| (t.sender, t.recipient, t.amount))
        .collect();
    let expected: HashSet<_> = [(0, 2), (1, 3)]
        .into_iter()
        .map(|(s, r)| {
            (
                pool.address(s).unwrap(),
                pool.address(r).unwrap(),
                Amount::from_u64(250),
            )
        })
        .collect();
    assert_eq!(round_two, expected);
}

#[tokio::test]
async fn test_thousand_accounts_take_ten_rounds() {
    let amount = Amount::from_u128(1_024 * 10u128.pow(18));
    let ledger = funded_ledger(MemoryLedgerConfig::default(), amount);
    let pool = AccountPool::derive("cascade", 1000).unwrap();

    let report = funder(&ledger, UnderfundingPolicy::default())
        .run_cascade(&root(), &pool, amount)
        .await
        .unwrap();

    assert_eq!(report.rounds, 10);
    assert_eq!(report.rounds, cascade_rounds(1000));
    assert_eq!(ledger.submissions(), 1000);
    assert!(pool
        .addresses()
        .iter()
        .all(|a| ledger.balance_of(a) >= Amount::from_u128(10u128.pow(18))));
}

#[tokio::test]
async fn test_single_account_needs_only_seed() {
    let amount = Amount::from_u64(7);
    let ledger = funded_ledger(MemoryLedgerConfig::default(), amount);
    let pool = AccountPool::derive("cascade", 1).unwrap();

    let report = funder(&ledger, UnderfundingPolicy::default())
        .run_cascade(&root(), &pool, amount)
        .await
        .unwrap();

    assert_eq!(report.rounds, 0);
    assert_eq!(ledger.balance_of(&pool.address(0).unwrap()), amount);
}

#[tokio::test]
async fn test_share_exhaustion_sends_nothing() {
    let amount = Amount::from_u64(1000);
    let ledger = funded_ledger(MemoryLedgerConfig::default(), amount);
    let pool = AccountPool::derive("cascade", 1000).unwrap();

    let err = funder(&ledger, UnderfundingPolicy::default())
        .run_cascade(&root(), &pool, amount)
        .await
        .unwrap_err();

    assert!(matches!(err, FundingError::ShareExhausted { .. }));
    assert_eq!(ledger.submissions(), 0);
}

#[tokio::test]
async fn test_seed_failure_is_fatal() {
    // Root holds less than it is asked to distribute.
    let ledger = funded_ledger(MemoryLedgerConfig::default(), Amount::from_u64(10));
    let pool = AccountPool::derive("cascade", 4).unwrap();

    let err = funder(&ledger, UnderfundingPolicy::default())
        .run_cascade(&root(), &pool, Amount::from_u64(1000))
        .await
        .unwrap_err();

    assert!(matches!(err, FundingError::SeedTransferFailed { .. }));
    assert_eq!(ledger.submissions(), 1);
}

/// Submission 3 is the first transfer of round 2; retrying it funds account 2.
#[tokio::test]
#[traced_test]
async fn test_retry_policy_recovers_failed_transfer() {
    let amount = Amount::from_u64(1000);
    let pool = AccountPool::derive("retry", 4).unwrap();
    let ledger = ScriptedLedger::new(|n, _, _| {
        if n == 3 {
            Step::statuses(vec![TxStatus::Ready, TxStatus::Dropped])
        } else {
            Step::statuses(finalized_ok())
        }
    });
    let ledger = Arc::new(ledger);
    let engine = SubmissionEngine::new(ledger.clone(), CompletionPolicy::WaitForFinality);

    let report = Funder::new(engine, UnderfundingPolicy::Retry { max_attempts: 3 })
        .run_cascade(&root(), &pool, amount)
        .await
        .unwrap();

    assert_eq!(report.retried, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(report.transfers, 5);
    assert_eq!(ledger.submissions(), 5);
    assert!(logs_contain("Retrying failed funding transfers"));
}

#[tokio::test]
#[traced_test]
async fn test_best_effort_continues_under_funded() {
    let amount = Amount::from_u64(1000);
    let pool = AccountPool::derive("best-effort", 4).unwrap();
    let unlucky = pool.address(1).unwrap();
    let ledger = ScriptedLedger::new(move |_, recipient, _| {
        if *recipient == unlucky {
            Step::statuses(vec![TxStatus::Invalid])
        } else {
            Step::statuses(finalized_ok())
        }
    });
    let engine = SubmissionEngine::new(arc(ledger), CompletionPolicy::WaitForFinality);

    let report = Funder::new(engine, UnderfundingPolicy::BestEffort)
        .run_cascade(&root(), &pool, amount)
        .await
        .unwrap();

    assert_eq!(report.rounds, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.retried, 0);
    assert!(logs_contain("Funding round under-funded, continuing"));
}

/// acct1 is never funded, so it must not donate to acct3 in round 2.
#[tokio::test]
async fn test_unfunded_account_never_donates() {
    let amount = Amount::from_u64(1000);
    let pool = AccountPool::derive("starved", 8).unwrap();
    let unlucky = pool.address(1).unwrap();
    let recipients = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&recipients);
    let ledger = Arc::new(ScriptedLedger::new(move |_, recipient, _| {
        seen.lock().unwrap().push(*recipient);
        if *recipient == unlucky {
            Step::statuses(vec![TxStatus::Ready, TxStatus::Invalid])
        } else {
            Step::statuses(finalized_ok())
        }
    }));
    let engine = SubmissionEngine::new(ledger.clone(), CompletionPolicy::WaitForFinality);

    let report = Funder::new(engine, UnderfundingPolicy::BestEffort)
        .run_cascade(&root(), &pool, amount)
        .await
        .unwrap();

    // acct1 would have funded acct3 (round 2), then acct3 -> acct7 and
    // acct1 -> acct5 (round 3).
    assert_eq!(report.rounds, 3);
    assert_eq!(report.failed, 1);
    assert_eq!(report.starved, 3);
    assert_eq!(ledger.submissions(), 8 - 3);

    let recipients = recipients.lock().unwrap();
    for skipped in [3, 5, 7] {
        assert!(!recipients.contains(&pool.address(skipped).unwrap()));
    }
}

#[tokio::test]
async fn test_cancelled_funder_sends_nothing() {
    let amount = Amount::from_u64(1000);
    let ledger = funded_ledger(MemoryLedgerConfig::default(), amount);
    let pool = AccountPool::derive("cancelled", 4).unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = funder(&ledger, UnderfundingPolicy::default())
        .with_cancel(cancel)
        .fund(FundingStrategy::Cascade, &root(), &pool, amount, None)
        .await
        .unwrap_err();

    assert!(matches!(err, FundingError::Cancelled));
    assert_eq!(ledger.submissions(), 0);
}

#[tokio::test]
async fn test_cancelled_direct_funding_stops() {
    let pool = AccountPool::derive("cancelled", 4).unwrap();
    let ledger = funded_ledger(MemoryLedgerConfig::default(), Amount::from_u64(4_000));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = funder(&ledger, UnderfundingPolicy::default())
        .with_cancel(cancel)
        .run_direct(&root(), &pool, Amount::from_u64(4_000), None)
        .await
        .unwrap_err();

    assert!(matches!(err, FundingError::Cancelled));
    assert_eq!(ledger.submissions(), 0);
}

#[tokio::test]
async fn test_abort_policy_fails_round() {
    let amount = Amount::from_u64(1000);
    let pool = AccountPool::derive("abort", 4).unwrap();
    let unlucky = pool.address(3).unwrap();
    let ledger = ScriptedLedger::new(move |_, recipient, _| {
        if *recipient == unlucky {
            Step::statuses(vec![TxStatus::Rejected { reason: None }])
        } else {
            Step::statuses(finalized_ok())
        }
    });
    let engine = SubmissionEngine::new(arc(ledger), CompletionPolicy::WaitForFinality);

    let err = Funder::new(engine, UnderfundingPolicy::Abort)
        .run_cascade(&root(), &pool, amount)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        FundingError::RoundUnderfunded { round: 2, failed: 1 }
    ));
}

#[tokio::test]
async fn test_direct_funding_skips_funded_accounts() {
    let pool = AccountPool::derive("direct", 4).unwrap();
    let ledger = funded_ledger(MemoryLedgerConfig::default(), Amount::from_u64(10_000));
    ledger.set_balance(pool.address(2).unwrap(), Amount::from_u64(5_000));

    let report = funder(&ledger, UnderfundingPolicy::default())
        .fund(
            FundingStrategy::Direct,
            &root(),
            &pool,
            Amount::from_u64(4_000),
            Some(Amount::from_u64(1_000)),
        )
        .await
        .unwrap();

    assert_eq!(report.strategy, Some(FundingStrategy::Direct));
    assert_eq!(report.transfers, 3);
    assert_eq!(report.skipped_accounts, 1);
    for i in [0, 1, 3] {
        assert_eq!(
            ledger.balance_of(&pool.address(i).unwrap()),
            Amount::from_u64(1_000)
        );
    }
    assert_eq!(
        ledger.balance_of(&pool.address(2).unwrap()),
        Amount::from_u64(5_000)
    );
}

#[tokio::test]
#[traced_test]
async fn test_already_funded_pool_is_skipped() {
    let pool = AccountPool::derive("resume", 8).unwrap();
    let ledger = funded_ledger(MemoryLedgerConfig::default(), Amount::from_u64(8_000));
    for address in pool.addresses() {
        ledger.set_balance(address, Amount::from_u64(2_000));
    }

    let report = funder(&ledger, UnderfundingPolicy::default())
        .fund(
            FundingStrategy::Cascade,
            &root(),
            &pool,
            Amount::from_u64(8_000),
            Some(Amount::from_u64(1_000)),
        )
        .await
        .unwrap();

    assert!(report.was_skipped());
    assert_eq!(ledger.submissions(), 0);
    assert!(logs_contain("All accounts already funded"));
}

#[tokio::test]
async fn test_disconnect_during_funding() {
    let amount = Amount::from_u64(1000);
    let ledger = funded_ledger(MemoryLedgerConfig::default(), amount);
    let pool = AccountPool::derive("cascade", 4).unwrap();
    ledger.disconnect();

    let err = funder(&ledger, UnderfundingPolicy::default())
        .run_cascade(&root(), &pool, amount)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        FundingError::SeedTransferFailed {
            outcome: loadgen_types::TxOutcome::Disconnected
        }
    ));
}
