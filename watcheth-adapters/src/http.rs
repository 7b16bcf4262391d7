//! Shared HTTP plumbing.

use std::time::Duration;

use reqwest::Client;

use crate::AdapterError;

/// Default request timeout.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Build a pooled client with the given request timeout.
pub fn build_client(timeout: Duration) -> Result<Client, AdapterError> {
    Client::builder()
        .timeout(timeout)
        .pool_max_idle_per_host(10)
        .pool_idle_timeout(Duration::from_secs(90))
        .user_agent(concat!("watcheth/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| AdapterError::Client(e.to_string()))
}

/// Strip trailing slashes so paths can be appended directly.
pub(crate) fn normalize_endpoint(endpoint: &str) -> String {
    endpoint.trim_end_matches('/').to_string()
}
