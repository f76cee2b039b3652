//! Transaction lifecycle statuses and terminal outcomes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Event emitted in a finalized block when the transaction executed successfully.
pub const SUCCESS_EVENT: &str = "ExtrinsicSuccess";

/// Event emitted in a finalized block when the transaction was included but failed.
pub const FAILURE_EVENT: &str = "ExtrinsicFailed";

/// A status update reported by the ledger for a submitted transaction.
///
/// Typical progressions:
///
/// ```text
/// Ready -> Broadcast -> InBlock -> Finalized { events }
/// Ready -> Invalid
/// Ready -> Broadcast -> Dropped
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TxStatus {
    /// Accepted into the pending pool.
    Ready,
    /// Gossiped to peers.
    Broadcast,
    /// Included in a candidate block.
    InBlock,
    /// Irreversibly committed. Carries the event names emitted by the transaction.
    Finalized {
        #[serde(default)]
        events: Vec<String>,
    },
    /// Rejected by validation (bad signature, insufficient balance, stale nonce).
    Invalid,
    /// Explicitly rejected by the node.
    Rejected {
        #[serde(default)]
        reason: Option<String>,
    },
    /// Evicted from the pool or usurped.
    Dropped,
    /// Status the ledger could not classify.
    Unknown,
}

impl TxStatus {
    /// Whether the ledger will not report further progress for this transaction.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TxStatus::Finalized { .. }
                | TxStatus::Invalid
                | TxStatus::Rejected { .. }
                | TxStatus::Dropped
                | TxStatus::Unknown
        )
    }

    /// For `Finalized`, whether the event log contains the success marker.
    pub fn has_success_event(&self) -> bool {
        match self {
            TxStatus::Finalized { events } => events.iter().any(|e| e == SUCCESS_EVENT),
            _ => false,
        }
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxStatus::Ready => write!(f, "ready"),
            TxStatus::Broadcast => write!(f, "broadcast"),
            TxStatus::InBlock => write!(f, "in_block"),
            TxStatus::Finalized { .. } => write!(f, "finalized"),
            TxStatus::Invalid => write!(f, "invalid"),
            TxStatus::Rejected { reason: Some(r) } => write!(f, "rejected({r})"),
            TxStatus::Rejected { reason: None } => write!(f, "rejected"),
            TxStatus::Dropped => write!(f, "dropped"),
            TxStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Terminal outcome of one submission, as seen by the load generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxOutcome {
    /// Included in a block (fire-and-forget success).
    Included,
    /// Finalized with the success marker.
    Finalized,
    /// Explicitly rejected, dropped, or finalized without the success marker.
    Rejected,
    /// Failed validation.
    Invalid,
    /// Status stream ended or reported something unclassifiable.
    Unknown,
    /// The adapter raised an error before any terminal status.
    Fault,
    /// No terminal status within the submission timeout.
    TimedOut,
    /// The connection to the ledger was lost.
    Disconnected,
}

impl TxOutcome {
    /// Whether this outcome counts as a successful submission.
    pub fn is_success(&self) -> bool {
        matches!(self, TxOutcome::Included | TxOutcome::Finalized)
    }
}

impl fmt::Display for TxOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TxOutcome::Included => "included",
            TxOutcome::Finalized => "finalized",
            TxOutcome::Rejected => "rejected",
            TxOutcome::Invalid => "invalid",
            TxOutcome::Unknown => "unknown",
            TxOutcome::Fault => "fault",
            TxOutcome::TimedOut => "timed_out",
            TxOutcome::Disconnected => "disconnected",
        };
        f.write_str(s)
    }
}
