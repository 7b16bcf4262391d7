//! Vouch validator client adapter.
//!
//! Vouch has no status API; everything is read from a single scrape of its
//! Prometheus endpoint. A metric that is missing from the scrape leaves the
//! corresponding field at zero.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use watcheth_core::StatusSource;
use watcheth_types::{NodeKind, StatusPayload, StatusRecord, ValidatorStatus};

use crate::http::{build_client, normalize_endpoint, DEFAULT_HTTP_TIMEOUT};
use crate::prometheus::MetricSet;
use crate::AdapterError;

const METRICS_PATH: &str = "/metrics";

/// Status source for a Vouch validator client.
#[derive(Debug, Clone)]
pub struct VouchSource {
    client: Client,
    name: String,
    endpoint: String,
    metrics_url: String,
}

impl VouchSource {
    /// Create a new builder for configuring the source.
    pub fn builder() -> VouchSourceBuilder {
        VouchSourceBuilder::default()
    }

    /// Scrape and interpret the metrics endpoint.
    pub async fn node_status(&self) -> Result<ValidatorStatus, AdapterError> {
        Ok(validator_status(&self.scrape().await?))
    }

    /// URL of the scraped metrics page.
    pub fn metrics_url(&self) -> &str {
        &self.metrics_url
    }

    /// The metrics page as served, without parsing it.
    pub async fn raw_metrics(&self) -> Result<String, AdapterError> {
        let response = self.client.get(&self.metrics_url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AdapterError::Status {
                status: status.as_u16(),
                path: METRICS_PATH.to_string(),
            });
        }
        Ok(response.text().await?)
    }

    async fn scrape(&self) -> Result<MetricSet, AdapterError> {
        MetricSet::parse(&self.raw_metrics().await?)
    }
}

/// Map a Vouch scrape onto validator status fields.
pub fn validator_status(metrics: &MetricSet) -> ValidatorStatus {
    let count = |name: &str, label: &str, value: &str| {
        metrics.value_where(name, label, value).map_or(0, as_count)
    };
    let (auction_sum, auction_count) = metrics
        .histogram_totals("vouch_relay_auction_block_duration_seconds")
        .unwrap_or((0.0, 0.0));

    let mut status = ValidatorStatus {
        ready: metrics.value("vouch_ready").is_some_and(|v| v > 0.0),
        attestation_mark_seconds: metrics
            .histogram_mean("vouch_attestation_mark_seconds")
            .unwrap_or(0.0),
        attestation_succeeded: count(
            "vouch_attestation_process_requests_total",
            "result",
            "succeeded",
        ),
        attestation_failed: count("vouch_attestation_process_requests_total", "result", "failed"),
        block_proposal_mark_seconds: metrics
            .histogram_mean("vouch_beaconblockproposal_mark_seconds")
            .unwrap_or(0.0),
        block_proposal_succeeded: count(
            "vouch_beaconblockproposal_process_requests_total",
            "result",
            "succeeded",
        ),
        block_proposal_failed: count(
            "vouch_beaconblockproposal_process_requests_total",
            "result",
            "failed",
        ),
        beacon_node_response_ms: metrics
            .histogram_mean("vouch_client_operation_duration_seconds")
            .map_or(0.0, |secs| secs * 1000.0),
        best_bid_relay_count: metrics
            .value("vouch_beaconblockproposer_best_bid_relays")
            .map_or(0, as_count),
        blocks_from_relay: count("vouch_beaconblockproposal_process_blocks_total", "method", "relay"),
        relay_auction_duration: if auction_count > 0.0 {
            auction_sum / auction_count
        } else {
            0.0
        },
        relay_auction_count: as_count(auction_count),
        relay_registration_succeeded: count(
            "vouch_relay_validator_registrations_total",
            "result",
            "succeeded",
        ),
        relay_registration_failed: count(
            "vouch_relay_validator_registrations_total",
            "result",
            "failed",
        ),
        relay_builder_bid_succeeded: count("vouch_relay_builder_bid_total", "result", "succeeded"),
        relay_builder_bid_failed: count("vouch_relay_builder_bid_total", "result", "failed"),
        relay_execution_config_succeeded: count(
            "vouch_relay_execution_config_total",
            "result",
            "succeeded",
        ),
        relay_execution_config_failed: count(
            "vouch_relay_execution_config_total",
            "result",
            "failed",
        ),
        ..Default::default()
    };

    for sample in metrics.series("vouch_accountmanager_accounts_total") {
        if let Some(state) = sample.label("state") {
            *status.validator_states.entry(state.to_string()).or_default() += as_count(sample.value);
        }
    }

    status
}

// Counters are floats on the wire.
fn as_count(value: f64) -> u64 {
    if value.is_finite() && value > 0.0 {
        value as u64
    } else {
        0
    }
}

#[async_trait]
impl StatusSource for VouchSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Validator
    }

    async fn fetch_status(&self) -> StatusRecord {
        match self.node_status().await {
            Ok(status) => {
                StatusRecord::connected(&self.name, &self.endpoint, StatusPayload::Validator(status))
            }
            Err(e) => {
                tracing::debug!(client = %self.name, error = %e, "Vouch metrics unavailable");
                StatusRecord::failed(&self.name, &self.endpoint, NodeKind::Validator, e.into())
            }
        }
    }
}

/// Builder for VouchSource.
#[derive(Debug, Default)]
pub struct VouchSourceBuilder {
    name: Option<String>,
    endpoint: Option<String>,
    timeout: Option<Duration>,
    client: Option<Client>,
}

impl VouchSourceBuilder {
    /// Set the display name (default: "vouch").
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the metrics endpoint (default: "http://localhost:8081").
    ///
    /// `/metrics` is appended unless the endpoint already ends with it.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set the per-request timeout (default: 10 seconds).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Use an existing client instead of building one.
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Build the source.
    pub fn build(self) -> Result<VouchSource, AdapterError> {
        let client = match self.client {
            Some(client) => client,
            None => build_client(self.timeout.unwrap_or(DEFAULT_HTTP_TIMEOUT))?,
        };
        let endpoint =
            normalize_endpoint(self.endpoint.as_deref().unwrap_or("http://localhost:8081"));
        let metrics_url = if endpoint.ends_with(METRICS_PATH) {
            endpoint.clone()
        } else {
            format!("{endpoint}{METRICS_PATH}")
        };
        Ok(VouchSource {
            client,
            name: self.name.unwrap_or_else(|| "vouch".to_string()),
            endpoint,
            metrics_url,
        })
    }
}
