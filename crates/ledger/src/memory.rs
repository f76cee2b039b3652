//! In-process ledger with real balance bookkeeping.
//!
//! Used by tests and by `memory://` endpoints for dry runs. Transfers are
//! applied at submission time and reported through the usual status
//! progression, optionally spaced out by a simulated block time.

use crate::{LedgerClient, LedgerError, StatusStream};
use async_trait::async_trait;
use futures::StreamExt;
use loadgen_types::{transfer_message, Address, Amount, Identity, TxStatus, SUCCESS_EVENT};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Behaviour knobs for [`MemoryLedger`].
#[derive(Debug, Clone, Default)]
pub struct MemoryLedgerConfig {
    /// Delay between consecutive status updates. Zero reports them immediately.
    pub block_time: Duration,
    /// Reject every k-th submission (1-based count across all senders).
    pub reject_every: Option<u64>,
    /// Fail every k-th submission with an adapter error before any status.
    pub fault_every: Option<u64>,
    /// Stop reporting after `InBlock`; the stream never reaches `Finalized`.
    pub stall_after_in_block: bool,
}

impl MemoryLedgerConfig {
    pub fn with_block_time(mut self, block_time: Duration) -> Self {
        self.block_time = block_time;
        self
    }

    pub fn with_reject_every(mut self, k: u64) -> Self {
        self.reject_every = Some(k);
        self
    }

    pub fn with_fault_every(mut self, k: u64) -> Self {
        self.fault_every = Some(k);
        self
    }

    pub fn with_stall_after_in_block(mut self) -> Self {
        self.stall_after_in_block = true;
        self
    }
}

/// One submission as seen by the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRecord {
    pub sender: Address,
    pub recipient: Address,
    pub amount: Amount,
    /// Whether the transfer moved funds.
    pub applied: bool,
}

struct Inner {
    config: MemoryLedgerConfig,
    balances: Mutex<HashMap<Address, Amount>>,
    log: Mutex<Vec<TransferRecord>>,
    submissions: AtomicU64,
    connected: AtomicBool,
}

/// Shared handle to an in-memory ledger. Clones see the same state.
#[derive(Clone)]
pub struct MemoryLedger {
    inner: Arc<Inner>,
}

impl MemoryLedger {
    pub fn new(config: MemoryLedgerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                balances: Mutex::new(HashMap::new()),
                log: Mutex::new(Vec::new()),
                submissions: AtomicU64::new(0),
                connected: AtomicBool::new(true),
            }),
        }
    }

    /// Builder form of [`set_balance`](Self::set_balance).
    pub fn with_balance(self, address: Address, amount: Amount) -> Self {
        self.set_balance(address, amount);
        self
    }

    pub fn set_balance(&self, address: Address, amount: Amount) {
        self.inner.balances.lock().insert(address, amount);
    }

    pub fn balance_of(&self, address: &Address) -> Amount {
        self.inner
            .balances
            .lock()
            .get(address)
            .copied()
            .unwrap_or(Amount::ZERO)
    }

    /// Make every subsequent call fail with a connectivity error.
    pub fn disconnect(&self) {
        self.inner.connected.store(false, Ordering::SeqCst);
    }

    /// Number of `submit_transfer` calls seen so far, including rejected ones.
    pub fn submissions(&self) -> u64 {
        self.inner.submissions.load(Ordering::SeqCst)
    }

    /// Every transfer that reached the ledger, in arrival order.
    pub fn transfers(&self) -> Vec<TransferRecord> {
        self.inner.log.lock().clone()
    }

    fn ensure_connected(&self) -> Result<(), LedgerError> {
        if self.inner.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(LedgerError::Unavailable("memory ledger disconnected".to_string()))
        }
    }

    /// Debit `sender` and credit `recipient`. Returns false if the sender
    /// cannot cover the amount; balances are left untouched in that case.
    fn apply(&self, sender: &Address, recipient: &Address, amount: Amount) -> bool {
        let mut balances = self.inner.balances.lock();
        let available = balances.get(sender).copied().unwrap_or(Amount::ZERO);
        let Some(remaining) = available.checked_sub(amount) else {
            return false;
        };
        balances.insert(*sender, remaining);
        let credited = balances.entry(*recipient).or_insert(Amount::ZERO);
        match credited.checked_add(amount) {
            Some(total) => {
                *credited = total;
                true
            }
            None => {
                // Roll back the debit on overflow.
                balances.insert(*sender, available);
                false
            }
        }
    }

    fn status_stream(&self, statuses: Vec<TxStatus>, stall: bool) -> StatusStream {
        let delay = self.inner.config.block_time;
        let updates = futures::stream::iter(statuses).then(move |status| async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Ok(status)
        });
        if stall {
            updates.chain(futures::stream::pending()).boxed()
        } else {
            updates.boxed()
        }
    }
}

fn nth(count: u64, every: Option<u64>) -> bool {
    matches!(every, Some(k) if k > 0 && count % k == 0)
}

impl std::fmt::Debug for MemoryLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryLedger")
            .field("config", &self.inner.config)
            .field("submissions", &self.submissions())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl LedgerClient for MemoryLedger {
    async fn health(&self) -> Result<(), LedgerError> {
        self.ensure_connected()
    }

    async fn account_balance(&self, address: &Address) -> Result<Amount, LedgerError> {
        self.ensure_connected()?;
        Ok(self.balance_of(address))
    }

    async fn submit_transfer(
        &self,
        sender: &Identity,
        recipient: &Address,
        amount: Amount,
    ) -> Result<StatusStream, LedgerError> {
        self.ensure_connected()?;
        let count = self.inner.submissions.fetch_add(1, Ordering::SeqCst) + 1;
        let config = &self.inner.config;
        let from = sender.address();

        if nth(count, config.fault_every) {
            return Err(LedgerError::Submission(format!(
                "injected fault on submission {count}"
            )));
        }

        let message = transfer_message(&from, recipient, &amount);
        if !from.verify(&message, &sender.sign(&message)) {
            return Ok(self.status_stream(vec![TxStatus::Invalid], false));
        }

        let rejected = nth(count, config.reject_every);
        let applied = !rejected && self.apply(&from, recipient, amount);
        self.inner.log.lock().push(TransferRecord {
            sender: from,
            recipient: *recipient,
            amount,
            applied,
        });

        debug!(%from, to = %recipient, %amount, count, applied, "Memory ledger transfer");

        let statuses = if rejected {
            vec![
                TxStatus::Ready,
                TxStatus::Rejected {
                    reason: Some(format!("injected rejection on submission {count}")),
                },
            ]
        } else if !applied {
            vec![TxStatus::Ready, TxStatus::Invalid]
        } else if config.stall_after_in_block {
            vec![TxStatus::Ready, TxStatus::Broadcast, TxStatus::InBlock]
        } else {
            vec![
                TxStatus::Ready,
                TxStatus::Broadcast,
                TxStatus::InBlock,
                TxStatus::Finalized {
                    events: vec!["Transfer".to_string(), SUCCESS_EVENT.to_string()],
                },
            ]
        };
        let stall = applied && config.stall_after_in_block;
        Ok(self.status_stream(statuses, stall))
    }

    fn describe(&self) -> String {
        "memory://".to_string()
    }
}
