//! Shared helpers for spammer integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use futures::StreamExt;
use loadgen_ledger::{LedgerClient, LedgerError, StatusStream};
use loadgen_types::{Address, Amount, Identity, TxStatus, SUCCESS_EVENT};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// What a scripted ledger does with one submission.
#[derive(Debug, Clone)]
pub enum Step {
    /// Report these statuses, waiting `delay` before each, then end the stream.
    Statuses { statuses: Vec<TxStatus>, delay: Duration },
    /// Report these statuses, then never report again.
    Stall(Vec<TxStatus>),
    /// Fail the submission call itself.
    Error(LedgerError),
}

impl Step {
    pub fn statuses(statuses: Vec<TxStatus>) -> Self {
        Step::Statuses {
            statuses,
            delay: Duration::ZERO,
        }
    }

    pub fn delayed(statuses: Vec<TxStatus>, delay: Duration) -> Self {
        Step::Statuses { statuses, delay }
    }
}

type Script = dyn Fn(u64, &Address, Amount) -> Step + Send + Sync;

/// Ledger client whose every response is decided by a closure of
/// `(submission number, recipient, amount)`.
pub struct ScriptedLedger {
    script: Box<Script>,
    submissions: AtomicU64,
}

impl ScriptedLedger {
    pub fn new(script: impl Fn(u64, &Address, Amount) -> Step + Send + Sync + 'static) -> Self {
        Self {
            script: Box::new(script),
            submissions: AtomicU64::new(0),
        }
    }

    pub fn submissions(&self) -> u64 {
        self.submissions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LedgerClient for ScriptedLedger {
    async fn health(&self) -> Result<(), LedgerError> {
        Ok(())
    }

    async fn account_balance(&self, _address: &Address) -> Result<Amount, LedgerError> {
        Ok(Amount::ZERO)
    }

    async fn submit_transfer(
        &self,
        _sender: &Identity,
        recipient: &Address,
        amount: Amount,
    ) -> Result<StatusStream, LedgerError> {
        let n = self.submissions.fetch_add(1, Ordering::SeqCst) + 1;
        match (self.script)(n, recipient, amount) {
            Step::Statuses { statuses, delay } => Ok(futures::stream::iter(statuses)
                .then(move |status| async move {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    Ok(status)
                })
                .boxed()),
            Step::Stall(statuses) => Ok(futures::stream::iter(statuses.into_iter().map(Ok))
                .chain(futures::stream::pending())
                .boxed()),
            Step::Error(e) => Err(e),
        }
    }

    fn describe(&self) -> String {
        "scripted://".to_string()
    }
}

/// The full happy-path progression.
pub fn finalized_ok() -> Vec<TxStatus> {
    vec![
        TxStatus::Ready,
        TxStatus::Broadcast,
        TxStatus::InBlock,
        TxStatus::Finalized {
            events: vec![SUCCESS_EVENT.to_string()],
        },
    ]
}

pub fn arc(client: impl LedgerClient) -> Arc<dyn LedgerClient> {
    Arc::new(client)
}
