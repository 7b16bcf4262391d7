//! Errors embedded in status records.

use std::time::Duration;

use thiserror::Error;

/// Why the last fetch of a status source failed.
///
/// This is carried inside a [`StatusRecord`](crate::StatusRecord) rather than
/// returned to the poller, so it must be cheap to clone into every snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", content = "detail", rename_all = "snake_case"))]
pub enum StatusError {
    /// Transport-level failure (refused, reset, DNS, TLS).
    #[error("connection failed: {0}")]
    Connection(String),

    /// The fetch did not complete within its deadline.
    #[error("deadline exceeded after {0:?}")]
    Timeout(Duration),

    /// The endpoint answered with a non-success status code.
    #[error("HTTP {status} for {path}")]
    Status {
        /// HTTP status code returned by the endpoint.
        status: u16,
        /// Request path (or RPC method) that failed.
        path: String,
    },

    /// The response body could not be decoded.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// The monitor shut down while the fetch was in flight.
    #[error("fetch cancelled")]
    Cancelled,

    /// Anything else, including a panicking fetch task.
    #[error("{0}")]
    Other(String),
}

impl StatusError {
    /// True for failures that a later poll may well recover from.
    ///
    /// Client errors (4xx) and decode errors point at a misconfigured
    /// endpoint rather than a transient outage.
    pub fn is_transient(&self) -> bool {
        match self {
            StatusError::Connection(_) | StatusError::Timeout(_) => true,
            StatusError::Status { status, .. } => *status >= 500,
            StatusError::Decode(_) | StatusError::Cancelled | StatusError::Other(_) => false,
        }
    }
}
