//! Collector error types.

use std::time::Duration;

use thiserror::Error;

/// Errors from a single backend query.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("invalid backend address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("unsupported backend scheme {0}, only http is supported")]
    UnsupportedScheme(String),

    #[error("cannot connect to backend {address}: {reason}")]
    Connect { address: String, reason: String },

    #[error("http error: {0}")]
    Http(String),

    #[error("backend returned status {0}")]
    Status(u16),

    #[error("cannot decode backend response: {0}")]
    Decode(String),

    #[error("backend error ({error_type}): {message}")]
    Backend { error_type: String, message: String },

    #[error("expected vector result, got {0}")]
    UnexpectedResultType(String),

    #[error("query timed out after {0:?}")]
    Timeout(Duration),
}

/// Errors that stop the collector from starting.
#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("monitoring backend unreachable: {0}")]
    Connectivity(#[source] QueryError),
}
