//! Error types for the deployer and verifier.

use std::fmt;

/// Deployer error type.
///
/// Variants keep their original kind all the way to the caller: the retry
/// policy absorbs `RateLimited` and nothing else, and the pipeline never
/// re-wraps what a ledger call returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Connectivity loss or an unexpected node response.
    Network(String),
    /// The node throttled the request (HTTP 429 / "too many requests").
    RateLimited(String),
    /// The transaction was not confirmed within `rounds` ledger rounds.
    ConfirmationTimeout { tx_id: String, rounds: u64 },
    /// The application aborted the call. Carries the node's reason verbatim.
    ApplicationCall(String),
    /// A precondition was violated by the caller or the configuration.
    InvalidConfiguration(String),
    /// The transaction pool rejected a transaction.
    Rejected { tx_id: String, reason: String },
    /// Deployment record persistence failed.
    Store(String),
    /// The caller cancelled the operation during a backoff sleep.
    Cancelled,
}

impl Error {
    /// Default retry classifier: only throttling is transient.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Error::RateLimited(_))
    }

    /// Classify a failed HTTP exchange with the node or the signing service.
    pub fn from_status(status: u16, body: &str, context: &str) -> Self {
        let body = body.trim();
        if status == 429 || is_throttle_message(body) {
            return Error::RateLimited(format!("{context}: HTTP {status} {body}"));
        }
        Error::Network(format!("{context}: HTTP {status} {body}"))
    }

    /// Classify a transport-level failure (connect, timeout, broken body).
    pub fn from_transport(err: impl fmt::Display, context: &str) -> Self {
        let msg = err.to_string();
        if is_throttle_message(&msg) {
            Error::RateLimited(format!("{context}: {msg}"))
        } else {
            Error::Network(format!("{context}: {msg}"))
        }
    }
}

/// Transient-error signature: a 429 status or a "too many requests" message.
pub(crate) fn is_throttle_message(msg: &str) -> bool {
    let lower = msg.to_ascii_lowercase();
    lower.contains("too many requests")
        || lower.contains("http 429")
        || lower.contains("status 429")
        || lower.contains("status code 429")
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Network(msg) => write!(f, "network error: {msg}"),
            Error::RateLimited(msg) => write!(f, "rate limited: {msg}"),
            Error::ConfirmationTimeout { tx_id, rounds } => {
                write!(f, "transaction {tx_id} not confirmed after {rounds} rounds")
            }
            Error::ApplicationCall(reason) => write!(f, "application call failed: {reason}"),
            Error::InvalidConfiguration(msg) => write!(f, "invalid configuration: {msg}"),
            Error::Rejected { tx_id, reason } => {
                write!(f, "transaction {tx_id} rejected: {reason}")
            }
            Error::Store(msg) => write!(f, "record store error: {msg}"),
            Error::Cancelled => write!(f, "operation cancelled"),
        }
    }
}

impl std::error::Error for Error {}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;
