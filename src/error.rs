use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("timeout")]
    Timeout,

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Remote error (code {code}): {message}")]
    Remote {
        code: i64,
        http_status: u16,
        message: String,
    },

    #[error("cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout
        } else if e.is_decode() {
            Error::Protocol(e.to_string())
        } else if let Some(status) = e.status() {
            Error::Http {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else {
            Error::Transport(e.to_string())
        }
    }
}

/// Closed classification of a failed batch, so callers can branch on the
/// kind of failure instead of parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The request never got a response (connection, DNS, TLS).
    Transport,
    /// The request exceeded the configured timeout.
    Timeout,
    /// Non-2xx HTTP status.
    Http,
    /// 2xx response whose body carried a non-zero status code.
    Remote,
    /// The response body did not have the expected shape.
    Protocol,
    /// The batch was never sent because the run was cancelled.
    Cancelled,
}

impl Error {
    /// Batch-level classification of this error.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Error::Transport(_) | Error::Io(_) => FailureKind::Transport,
            Error::Timeout => FailureKind::Timeout,
            Error::Http { .. } => FailureKind::Http,
            Error::Remote { .. } | Error::Authentication { .. } => FailureKind::Remote,
            Error::Cancelled => FailureKind::Cancelled,
            Error::Protocol(_) | Error::Json(_) | Error::Config(_) | Error::InvalidInput(_) => {
                FailureKind::Protocol
            }
        }
    }

    /// HTTP status observed when the error happened, if a response arrived.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Error::Http { status, .. } => Some(*status),
            Error::Remote { http_status, .. } => Some(*http_status),
            _ => None,
        }
    }

    /// Message suitable for a batch ledger: the remote-supplied message when
    /// there is one, otherwise the error description.
    pub fn ledger_message(&self) -> String {
        match self {
            Error::Http { message, .. } | Error::Remote { message, .. } => message.clone(),
            Error::Authentication { message } => message.clone(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
