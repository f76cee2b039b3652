//! The ledger client seam.

use crate::LedgerError;
use async_trait::async_trait;
use futures::stream::BoxStream;
use loadgen_types::{Address, Amount, Identity, TxStatus};

/// Stream of status updates for one submitted transaction.
///
/// Ends after the first terminal status. An `Err` item means the adapter lost
/// track of the transaction; no further items follow it.
pub type StatusStream = BoxStream<'static, Result<TxStatus, LedgerError>>;

/// Connection to a ledger node.
///
/// Implementations must be cheap to share: the spammer holds one
/// `Arc<dyn LedgerClient>` and calls it from many tasks at once.
#[async_trait]
pub trait LedgerClient: Send + Sync + 'static {
    /// Check that the node is reachable and ready to accept transactions.
    async fn health(&self) -> Result<(), LedgerError>;

    /// Free balance of an account. Unknown accounts have a zero balance.
    async fn account_balance(&self, address: &Address) -> Result<Amount, LedgerError>;

    /// Sign and submit a transfer, returning its status updates.
    async fn submit_transfer(
        &self,
        sender: &Identity,
        recipient: &Address,
        amount: Amount,
    ) -> Result<StatusStream, LedgerError>;

    /// Short human-readable description of the endpoint, for logs.
    fn describe(&self) -> String;
}
