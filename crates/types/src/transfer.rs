//! Transfer requests.

use crate::{Address, Amount, Identity};
use std::sync::Arc;

/// A single value transfer to submit.
///
/// The sender is shared, never copied: the account pool owns the key and
/// requests hold a reference-counted handle to it.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    /// Account authorizing the transfer.
    pub sender: Arc<Identity>,
    /// Receiving account.
    pub recipient: Address,
    /// Amount in base units.
    pub amount: Amount,
}

impl TransferRequest {
    /// Create a new transfer request.
    pub fn new(sender: Arc<Identity>, recipient: Address, amount: Amount) -> Self {
        Self {
            sender,
            recipient,
            amount,
        }
    }

    /// Canonical bytes signed by the sender to authorize this transfer.
    ///
    /// Layout: `sender (32) || recipient (32) || amount (decimal ASCII)`.
    pub fn signing_message(&self) -> Vec<u8> {
        transfer_message(&self.sender.address(), &self.recipient, &self.amount)
    }
}

/// Canonical transfer message for the given parts.
pub fn transfer_message(sender: &Address, recipient: &Address, amount: &Amount) -> Vec<u8> {
    let amount = amount.to_string();
    let mut message = Vec::with_capacity(64 + amount.len());
    message.extend_from_slice(sender.as_bytes());
    message.extend_from_slice(recipient.as_bytes());
    message.extend_from_slice(amount.as_bytes());
    message
}
