//! Ledger client adapters.
//!
//! The load generator only sees the [`LedgerClient`] trait: health probe,
//! balance lookup, and "submit a signed transfer, observe its status". Two
//! adapters ship with it:
//!
//! - [`RpcClient`]: JSON over HTTP against a running node
//! - [`MemoryLedger`]: in-process ledger for tests and dry runs

mod error;
mod http;
mod memory;
mod traits;

pub use error::LedgerError;
pub use http::{
    BalanceResponse, RpcClient, SubmitTransferRequest, SubmitTransferResponse,
    TransactionStatusResponse, DEFAULT_POLL_INTERVAL,
};
pub use memory::{MemoryLedger, MemoryLedgerConfig, TransferRecord};
pub use traits::{LedgerClient, StatusStream};
