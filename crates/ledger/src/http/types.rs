//! Types for RPC client communication.

use loadgen_types::{Address, Amount, TxStatus};
use serde::{Deserialize, Serialize};

/// Request to submit a signed transfer.
#[derive(Debug, Serialize)]
pub struct SubmitTransferRequest {
    pub sender: Address,
    pub recipient: Address,
    pub amount: Amount,
    /// Hex-encoded ed25519 signature over the canonical transfer message.
    pub signature: String,
}

/// Response from transfer submission.
#[derive(Debug, Deserialize)]
pub struct SubmitTransferResponse {
    pub accepted: bool,
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Response from the balance endpoint.
#[derive(Debug, Deserialize)]
pub struct BalanceResponse {
    /// Free (transferable) balance as a decimal string.
    pub free: Amount,
}

/// Response from transaction status endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TransactionStatusResponse {
    /// Transaction hash (hex-encoded).
    pub hash: String,
    /// Current status of the transaction.
    /// Possible values: "ready", "broadcast", "in_block", "finalized", "invalid",
    /// "rejected", "dropped", "usurped", "unknown"
    pub status: String,
    /// Events emitted by the transaction (populated once finalized).
    #[serde(default)]
    pub events: Vec<String>,
    /// Rejection reason or lookup error.
    #[serde(default)]
    pub error: Option<String>,
}

impl TransactionStatusResponse {
    /// Convert to a typed [`TxStatus`].
    pub fn to_status(&self) -> TxStatus {
        match self.status.as_str() {
            "ready" | "future" => TxStatus::Ready,
            "broadcast" => TxStatus::Broadcast,
            "in_block" | "inblock" => TxStatus::InBlock,
            "finalized" => TxStatus::Finalized {
                events: self.events.clone(),
            },
            "invalid" => TxStatus::Invalid,
            "rejected" => TxStatus::Rejected {
                reason: self.error.clone(),
            },
            "dropped" | "usurped" | "retracted" => TxStatus::Dropped,
            _ => TxStatus::Unknown,
        }
    }
}
