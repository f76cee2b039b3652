//! Ledger adapter errors.

/// Errors raised by a [`LedgerClient`](crate::LedgerClient).
#[derive(Debug, Clone, thiserror::Error)]
pub enum LedgerError {
    /// Transport-level failure reaching the node.
    #[error("connection to {endpoint} failed: {message}")]
    Connection { endpoint: String, message: String },

    /// The ledger is known to be unreachable.
    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    /// The node answered with a non-success HTTP status.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// The node refused the submission before it reached any status.
    #[error("submission failed: {0}")]
    Submission(String),

    /// The node's response could not be decoded.
    #[error("malformed response: {0}")]
    Decode(String),

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

impl LedgerError {
    /// Whether the error means the ledger cannot be reached at all, as opposed
    /// to a problem with one particular request.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            LedgerError::Connection { .. } | LedgerError::Unavailable(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connectivity_classification() {
        assert!(LedgerError::Unavailable("down".into()).is_connectivity());
        assert!(LedgerError::Connection {
            endpoint: "http://127.0.0.1:9944".into(),
            message: "refused".into(),
        }
        .is_connectivity());
        assert!(!LedgerError::Submission("bad nonce".into()).is_connectivity());
        assert!(!LedgerError::Client("no TLS backend".into()).is_connectivity());
        assert!(!LedgerError::Http {
            status: 400,
            message: "bad request".into(),
        }
        .is_connectivity());
    }
}
