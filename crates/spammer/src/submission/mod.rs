//! Concurrent submission with per-transaction completion tracking.
//!
//! [`SubmissionEngine::submit_batch`] puts every request of a batch in flight
//! at once and resolves when each one has reached a terminal outcome or hit
//! its timeout. Results come back in request order; completions arrive in any
//! order.

use crate::latency::LatencyRecorder;
use futures::future::join_all;
use futures::StreamExt;
use loadgen_ledger::LedgerClient;
use loadgen_types::{TransferRequest, TxOutcome, TxStatus};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Default bound on the wait for one transaction's terminal outcome.
pub const DEFAULT_SUBMISSION_TIMEOUT: Duration = Duration::from_secs(60);

/// When a submission counts as done.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompletionPolicy {
    /// Success as soon as the transaction is in a block.
    #[default]
    #[serde(rename = "in_block", alias = "fire_and_forget")]
    FireAndForget,

    /// Success only once finalized with the success event.
    #[serde(rename = "finalized", alias = "wait_for_finality")]
    WaitForFinality,
}

impl std::fmt::Display for CompletionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompletionPolicy::FireAndForget => f.write_str("in_block"),
            CompletionPolicy::WaitForFinality => f.write_str("finalized"),
        }
    }
}

/// Reduces a transaction's status updates to a terminal outcome.
///
/// ```text
/// Ready -> Broadcast -> InBlock -> Finalized
///   \________\___________\__________> Invalid | Rejected | Dropped | Unknown
/// ```
#[derive(Debug)]
struct CompletionTracker {
    policy: CompletionPolicy,
    last: Option<TxStatus>,
}

impl CompletionTracker {
    fn new(policy: CompletionPolicy) -> Self {
        Self { policy, last: None }
    }

    /// Feed the next status. Returns the outcome once one is decided.
    fn observe(&mut self, status: TxStatus) -> Option<TxOutcome> {
        let outcome = match &status {
            TxStatus::Ready | TxStatus::Broadcast => None,
            TxStatus::InBlock => match self.policy {
                CompletionPolicy::FireAndForget => Some(TxOutcome::Included),
                CompletionPolicy::WaitForFinality => None,
            },
            TxStatus::Finalized { .. } => match self.policy {
                CompletionPolicy::FireAndForget => Some(TxOutcome::Finalized),
                CompletionPolicy::WaitForFinality if status.has_success_event() => {
                    Some(TxOutcome::Finalized)
                }
                CompletionPolicy::WaitForFinality => Some(TxOutcome::Rejected),
            },
            TxStatus::Invalid => Some(TxOutcome::Invalid),
            TxStatus::Rejected { .. } | TxStatus::Dropped => Some(TxOutcome::Rejected),
            TxStatus::Unknown => Some(TxOutcome::Unknown),
        };
        self.last = Some(status);
        outcome
    }

    /// Outcome when the stream ends without a terminal status.
    fn finish(self) -> TxOutcome {
        debug!(last = ?self.last, "Status stream ended before a terminal status");
        TxOutcome::Unknown
    }
}

/// Submits transfers and waits for their outcomes.
///
/// Cheap to clone; clones share the client and the latency histogram.
#[derive(Clone)]
pub struct SubmissionEngine {
    client: Arc<dyn LedgerClient>,
    policy: CompletionPolicy,
    timeout: Duration,
    latency: LatencyRecorder,
}

impl SubmissionEngine {
    pub fn new(client: Arc<dyn LedgerClient>, policy: CompletionPolicy) -> Self {
        Self {
            client,
            policy,
            timeout: DEFAULT_SUBMISSION_TIMEOUT,
            latency: LatencyRecorder::new(),
        }
    }

    /// Set the per-request bound on waiting for a terminal outcome.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Record latencies into an existing recorder.
    pub fn with_latency_recorder(mut self, latency: LatencyRecorder) -> Self {
        self.latency = latency;
        self
    }

    pub fn policy(&self) -> CompletionPolicy {
        self.policy
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn client(&self) -> &Arc<dyn LedgerClient> {
        &self.client
    }

    pub fn latency(&self) -> &LatencyRecorder {
        &self.latency
    }

    /// Submit one transfer and wait for its outcome.
    pub async fn submit(&self, request: &TransferRequest) -> TxOutcome {
        let start = Instant::now();
        let outcome = match tokio::time::timeout(self.timeout, self.track(request)).await {
            Ok(outcome) => outcome,
            Err(_) => TxOutcome::TimedOut,
        };
        self.latency.record(start.elapsed());

        debug!(
            sender = %request.sender.address(),
            recipient = %request.recipient,
            amount = %request.amount,
            %outcome,
            latency_ms = start.elapsed().as_millis(),
            "Submission completed"
        );
        outcome
    }

    /// Submit all requests concurrently. One success flag per request, in
    /// request order.
    pub async fn submit_batch(&self, requests: &[TransferRequest]) -> Vec<bool> {
        self.submit_batch_detailed(requests)
            .await
            .into_iter()
            .map(|outcome| outcome.is_success())
            .collect()
    }

    /// Like [`submit_batch`](Self::submit_batch) but returns the outcomes.
    pub async fn submit_batch_detailed(&self, requests: &[TransferRequest]) -> Vec<TxOutcome> {
        join_all(requests.iter().map(|request| self.submit(request))).await
    }

    async fn track(&self, request: &TransferRequest) -> TxOutcome {
        let submitted = self
            .client
            .submit_transfer(&request.sender, &request.recipient, request.amount)
            .await;

        let mut updates = match submitted {
            Ok(updates) => updates,
            Err(e) if e.is_connectivity() => {
                warn!(error = %e, "Lost connection while submitting");
                return TxOutcome::Disconnected;
            }
            Err(e) => {
                debug!(error = %e, "Submission rejected by adapter");
                return TxOutcome::Fault;
            }
        };

        let mut tracker = CompletionTracker::new(self.policy);
        while let Some(update) = updates.next().await {
            match update {
                Ok(status) => {
                    if let Some(outcome) = tracker.observe(status) {
                        return outcome;
                    }
                }
                Err(e) if e.is_connectivity() => {
                    warn!(error = %e, "Lost connection while awaiting status");
                    return TxOutcome::Disconnected;
                }
                Err(e) => {
                    debug!(error = %e, "Status stream failed");
                    return TxOutcome::Fault;
                }
            }
        }
        tracker.finish()
    }
}

impl std::fmt::Debug for SubmissionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmissionEngine")
            .field("client", &self.client.describe())
            .field("policy", &self.policy)
            .field("timeout", &self.timeout)
            .finish()
    }
}
