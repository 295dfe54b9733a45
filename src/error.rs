//! Error types for the serial reader and the API client.
//!
//! Everything here is caught at the boundary of the operation that raised it
//! and turned into a console line or a notice; nothing is allowed to take the
//! process down.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("failed to open {port}: {source}")]
    PortUnavailable {
        port: String,
        #[source]
        source: std::io::Error,
    },

    #[error("read error: {0}")]
    SerialIo(#[from] std::io::Error),
}

/// Local checks that run before any request is made.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Kartu ARI must be filled in")]
    MissingIdentifier,

    #[error("{0} is not a number")]
    NotNumeric(&'static str),
}

/// Transport-level failures, kept separate so timeouts and unreachable hosts
/// get their own messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("timed out waiting for the API")]
    Timeout,

    #[error("cannot reach the API: {0}")]
    Unreachable(String),

    #[error("rejected by server: {0}")]
    Rejected(String),

    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("request failed: {0}")]
    Transport(String),
}

impl From<TransportError> for SubmitError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout => SubmitError::Timeout,
            TransportError::Connect(msg) => SubmitError::Unreachable(msg),
            TransportError::Other(msg) => SubmitError::Transport(msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("status {0}")]
    HttpStatus(u16),

    #[error("{0}")]
    Rejected(String),

    #[error("unreadable response: {0}")]
    Malformed(String),
}
