//! HTTP/JSON ledger client.
//!
//! Talks to a node exposing:
//!
//! ```text
//! GET  /health
//! GET  /api/v1/accounts/{address}/balance
//! POST /api/v1/transfers
//! GET  /api/v1/transactions/{hash}
//! ```
//!
//! Status updates are obtained by polling the transaction endpoint; each
//! distinct status is forwarded on the returned stream until a terminal one.

mod types;

pub use types::{
    BalanceResponse, SubmitTransferRequest, SubmitTransferResponse, TransactionStatusResponse,
};

use crate::{LedgerClient, LedgerError, StatusStream};
use async_trait::async_trait;
use futures::StreamExt;
use loadgen_types::{transfer_message, Address, Amount, Identity, TxStatus};
use reqwest::StatusCode;
use std::time::Duration;
use tracing::debug;

/// Default interval between transaction status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Default timeout for a single HTTP request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// JSON-over-HTTP client for one ledger node.
#[derive(Debug, Clone)]
pub struct RpcClient {
    base_url: String,
    client: reqwest::Client,
    poll_interval: Duration,
}

impl RpcClient {
    /// Create a client for the node at `base_url` (e.g. `http://127.0.0.1:9944`).
    pub fn new(base_url: impl Into<String>) -> Result<Self, LedgerError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| LedgerError::Client(e.to_string()))?;
        Ok(Self {
            base_url,
            client,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    /// Set the status polling interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// The node's base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn transport_error(&self, err: reqwest::Error) -> LedgerError {
        if err.is_connect() || err.is_timeout() || err.is_request() {
            LedgerError::Connection {
                endpoint: self.base_url.clone(),
                message: err.to_string(),
            }
        } else {
            LedgerError::Decode(err.to_string())
        }
    }

    /// Fetch the current status of a submitted transaction.
    ///
    /// Returns `Ok(None)` while the node does not know the hash yet.
    pub async fn transaction_status(
        &self,
        hash: &str,
    ) -> Result<Option<TransactionStatusResponse>, LedgerError> {
        let url = format!("{}/api/v1/transactions/{}", self.base_url, hash);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(LedgerError::Http {
                status: response.status().as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        response
            .json::<TransactionStatusResponse>()
            .await
            .map(Some)
            .map_err(|e| LedgerError::Decode(e.to_string()))
    }

    fn watch(&self, hash: String) -> StatusStream {
        struct Watch {
            client: RpcClient,
            hash: String,
            last: Option<TxStatus>,
            done: bool,
        }

        let state = Watch {
            client: self.clone(),
            hash,
            last: None,
            done: false,
        };

        futures::stream::unfold(state, |mut state| async move {
            if state.done {
                return None;
            }
            loop {
                tokio::time::sleep(state.client.poll_interval).await;
                match state.client.transaction_status(&state.hash).await {
                    Ok(None) => continue,
                    Ok(Some(response)) => {
                        let status = response.to_status();
                        if state.last.as_ref() == Some(&status) {
                            continue;
                        }
                        debug!(hash = %state.hash, %status, "Transaction status changed");
                        state.done = status.is_terminal();
                        state.last = Some(status.clone());
                        return Some((Ok(status), state));
                    }
                    Err(e) => {
                        state.done = true;
                        return Some((Err(e), state));
                    }
                }
            }
        })
        .boxed()
    }
}

#[async_trait]
impl LedgerClient for RpcClient {
    async fn health(&self) -> Result<(), LedgerError> {
        let url = format!("{}/health", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(LedgerError::Unavailable(format!(
                "{} answered health probe with HTTP {}",
                self.base_url,
                response.status().as_u16()
            )))
        }
    }

    async fn account_balance(&self, address: &Address) -> Result<Amount, LedgerError> {
        let url = format!("{}/api/v1/accounts/{}/balance", self.base_url, address);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Amount::ZERO);
        }
        if !response.status().is_success() {
            return Err(LedgerError::Http {
                status: response.status().as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let body: BalanceResponse = response
            .json()
            .await
            .map_err(|e| LedgerError::Decode(e.to_string()))?;
        Ok(body.free)
    }

    async fn submit_transfer(
        &self,
        sender: &Identity,
        recipient: &Address,
        amount: Amount,
    ) -> Result<StatusStream, LedgerError> {
        let message = transfer_message(&sender.address(), recipient, &amount);
        let request = SubmitTransferRequest {
            sender: sender.address(),
            recipient: *recipient,
            amount,
            signature: hex::encode(sender.sign(&message)),
        };

        let url = format!("{}/api/v1/transfers", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status_code = response.status();
        if status_code.is_server_error() {
            return Err(LedgerError::Http {
                status: status_code.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let body: SubmitTransferResponse = response
            .json()
            .await
            .map_err(|e| LedgerError::Decode(e.to_string()))?;

        match (body.accepted, body.hash) {
            (true, Some(hash)) => Ok(self.watch(hash)),
            (true, None) => Err(LedgerError::Decode(
                "accepted submission without a transaction hash".to_string(),
            )),
            (false, _) => {
                let status = TxStatus::Rejected { reason: body.error };
                Ok(futures::stream::once(async move { Ok(status) }).boxed())
            }
        }
    }

    fn describe(&self) -> String {
        self.base_url.clone()
    }
}
