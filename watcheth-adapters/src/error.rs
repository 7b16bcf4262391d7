//! Error types for adapters.

use thiserror::Error;
use watcheth_types::StatusError;

/// Errors that can occur while talking to a client.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The HTTP client could not be constructed.
    #[error("HTTP client setup failed: {0}")]
    Client(String),

    /// Connection failed.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Timeout waiting for response.
    #[error("Request timed out")]
    Timeout,

    /// HTTP request failed after the connection was made.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The endpoint answered with a non-success status.
    #[error("HTTP {status} for {path}")]
    Status { status: u16, path: String },

    /// Failed to parse response.
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// The JSON-RPC server returned an error object.
    #[error("JSON-RPC error {code} from {method}: {message}")]
    Rpc {
        method: String,
        code: i64,
        message: String,
    },

    /// Genesis or spec values the slot clock depends on are unusable.
    #[error("Invalid chain config: {0}")]
    ChainConfig(String),
}

impl AdapterError {
    /// Whether another attempt might succeed.
    ///
    /// Transport failures and server errors are retried; client errors and
    /// anything wrong with the response body are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            AdapterError::Connection(_) | AdapterError::Timeout | AdapterError::Http(_) => true,
            AdapterError::Status { status, .. } => *status >= 500,
            AdapterError::Client(_)
            | AdapterError::Parse(_)
            | AdapterError::Rpc { .. }
            | AdapterError::ChainConfig(_) => false,
        }
    }
}

impl From<reqwest::Error> for AdapterError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AdapterError::Timeout
        } else if err.is_connect() {
            AdapterError::Connection(err.to_string())
        } else if err.is_decode() {
            AdapterError::Parse(err.to_string())
        } else {
            AdapterError::Http(err.to_string())
        }
    }
}

impl From<AdapterError> for StatusError {
    fn from(err: AdapterError) -> Self {
        match err {
            AdapterError::Connection(msg) | AdapterError::Http(msg) => StatusError::Connection(msg),
            AdapterError::Timeout => StatusError::Connection("request timed out".to_string()),
            AdapterError::Status { status, path } => StatusError::Status { status, path },
            AdapterError::Parse(msg) | AdapterError::ChainConfig(msg) => StatusError::Decode(msg),
            err @ (AdapterError::Client(_) | AdapterError::Rpc { .. }) => {
                StatusError::Other(err.to_string())
            }
        }
    }
}
