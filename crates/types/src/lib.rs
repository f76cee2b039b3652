//! Core types for the load generator.
//!
//! This crate provides the data model shared by the ledger adapters and the
//! spammer:
//!
//! - **Values**: [`Amount`], a 256-bit base-unit amount with floor halving
//! - **Accounts**: [`Identity`] (keyed account) and [`Address`]
//! - **Transfers**: [`TransferRequest`]
//! - **Lifecycle**: [`TxStatus`] events and terminal [`TxOutcome`]s
//! - **Throughput**: [`MetricsSnapshot`]
//!
//! It does not depend on any other workspace crate.

mod amount;
mod identity;
mod metrics;
mod status;
mod transfer;

pub use amount::{Amount, AmountError, U256};
pub use identity::{Address, AddressParseError, Identity};
pub use metrics::MetricsSnapshot;
pub use status::{TxOutcome, TxStatus, FAILURE_EVENT, SUCCESS_EVENT};
pub use transfer::{transfer_message, TransferRequest};
