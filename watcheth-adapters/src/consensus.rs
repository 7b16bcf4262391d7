//! Consensus client adapter using the standard beacon node REST API.
//!
//! ## Endpoints used
//!
//! - `/eth/v1/beacon/genesis` and `/eth/v1/config/spec` for the slot clock
//! - `/eth/v1/node/syncing` for head slot and sync state
//! - `/eth/v1/beacon/states/head/finality_checkpoints` for justified and finalized epochs
//! - `/eth/v1/beacon/headers`, `/eth/v1/node/peer_count`, `/eth/v1/node/version`
//!   and `/eth/v1/beacon/states/head/fork`, all best effort
//!
//! ## Example
//!
//! ```rust,no_run
//! use watcheth_adapters::consensus::ConsensusSource;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let source = ConsensusSource::builder()
//!         .name("lighthouse")
//!         .endpoint("http://localhost:5052")
//!         .build()?;
//!
//!     let status = source.node_status().await?;
//!     println!("head {} / current {}", status.head_slot, status.current_slot);
//!     Ok(())
//! }
//! ```

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use watcheth_core::StatusSource;
use watcheth_types::{ConsensusStatus, NodeKind, StatusPayload, StatusRecord};

use crate::http::{build_client, normalize_endpoint, DEFAULT_HTTP_TIMEOUT};
use crate::AdapterError;

const GENESIS: &str = "/eth/v1/beacon/genesis";
const SPEC: &str = "/eth/v1/config/spec";
const SYNCING: &str = "/eth/v1/node/syncing";
const HEADERS: &str = "/eth/v1/beacon/headers";
const FINALITY: &str = "/eth/v1/beacon/states/head/finality_checkpoints";
const PEER_COUNT: &str = "/eth/v1/node/peer_count";
const VERSION: &str = "/eth/v1/node/version";
const FORK: &str = "/eth/v1/beacon/states/head/fork";

/// Every beacon API path the source reads.
pub(crate) const PATHS: &[&str] = &[
    GENESIS, SPEC, SYNCING, HEADERS, FINALITY, PEER_COUNT, VERSION, FORK,
];

/// How GET requests are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    /// Delay before the second attempt; doubles for each one after.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    fn delay_before(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Slot timing parameters of the chain a beacon node follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainConfig {
    pub seconds_per_slot: u64,
    pub slots_per_epoch: u64,
    pub genesis_time: SystemTime,
}

/// Where the chain is at a given moment, according to the wall clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SlotClock {
    pub current_slot: u64,
    pub current_epoch: u64,
    pub time_to_next_slot: Duration,
    pub time_to_next_epoch: Duration,
}

impl ChainConfig {
    /// Slot clock at `now`. All zero before genesis.
    pub fn clock_at(&self, now: SystemTime) -> SlotClock {
        let Ok(since_genesis) = now.duration_since(self.genesis_time) else {
            return SlotClock::default();
        };
        let seconds = since_genesis.as_secs();
        let current_slot = seconds / self.seconds_per_slot;
        let slot_in_epoch = current_slot % self.slots_per_epoch;

        let time_to_next_slot =
            Duration::from_secs(self.seconds_per_slot - seconds % self.seconds_per_slot);
        let remaining_slots = self.slots_per_epoch - slot_in_epoch - 1;
        let time_to_next_epoch = time_to_next_slot
            + Duration::from_secs(remaining_slots.saturating_mul(self.seconds_per_slot));

        SlotClock {
            current_slot,
            current_epoch: current_slot / self.slots_per_epoch,
            time_to_next_slot,
            time_to_next_epoch,
        }
    }

    /// First slot of `epoch`, or `None` for epoch zero or when the
    /// multiplication overflows.
    pub fn epoch_start_slot(&self, epoch: u64) -> Option<u64> {
        if epoch == 0 {
            return None;
        }
        epoch.checked_mul(self.slots_per_epoch)
    }
}

/// Status source for a beacon node.
#[derive(Debug, Clone)]
pub struct ConsensusSource {
    client: Client,
    name: String,
    endpoint: String,
    retry: RetryPolicy,
}

impl ConsensusSource {
    /// Create a new builder for configuring the source.
    pub fn builder() -> ConsensusSourceBuilder {
        ConsensusSourceBuilder::default()
    }

    /// Fetch genesis time and slot parameters.
    pub async fn chain_config(&self) -> Result<ChainConfig, AdapterError> {
        let genesis: Envelope<Genesis> = self.get(GENESIS).await?;
        let spec: Envelope<HashMap<String, serde_json::Value>> = self.get(SPEC).await?;

        let genesis_secs: u64 = genesis.data.genesis_time.parse().map_err(|e| {
            AdapterError::ChainConfig(format!(
                "failed to parse genesis time '{}': {e}",
                genesis.data.genesis_time
            ))
        })?;

        Ok(ChainConfig {
            seconds_per_slot: spec_value(&spec.data, "SECONDS_PER_SLOT")?,
            slots_per_epoch: spec_value(&spec.data, "SLOTS_PER_EPOCH")?,
            genesis_time: UNIX_EPOCH + Duration::from_secs(genesis_secs),
        })
    }

    /// Fetch the node's current state.
    ///
    /// Fails if the chain config, sync status or finality checkpoints are
    /// unavailable; everything else is filled in when the node provides it.
    pub async fn node_status(&self) -> Result<ConsensusStatus, AdapterError> {
        let config = self.chain_config().await?;

        let syncing: Envelope<Syncing> = self.get(SYNCING).await?;
        let mut head_slot = parse_u64(&syncing.data.head_slot);
        match self.get::<Envelope<Vec<HeaderEntry>>>(HEADERS).await {
            Ok(headers) => {
                if let Some(latest) = headers.data.first() {
                    head_slot = parse_u64(&latest.header.message.slot);
                }
            }
            Err(e) => tracing::debug!(client = %self.name, error = %e, "Headers unavailable"),
        }

        let finality: Envelope<Finality> = self.get(FINALITY).await?;
        let justified_epoch = parse_u64(&finality.data.current_justified.epoch);
        let finalized_epoch = parse_u64(&finality.data.finalized.epoch);

        let (peers, version, fork) = tokio::join!(
            self.get::<Envelope<PeerCount>>(PEER_COUNT),
            self.get::<Envelope<NodeVersion>>(VERSION),
            self.get::<Envelope<Fork>>(FORK),
        );

        let clock = config.clock_at(SystemTime::now());
        Ok(ConsensusStatus {
            current_slot: clock.current_slot,
            head_slot,
            justified_slot: self.epoch_slot(&config, justified_epoch, "justified"),
            finalized_slot: self.epoch_slot(&config, finalized_epoch, "finalized"),
            current_epoch: clock.current_epoch,
            justified_epoch,
            finalized_epoch,
            sync_distance: parse_u64(&syncing.data.sync_distance),
            is_syncing: syncing.data.is_syncing,
            is_optimistic: syncing.data.is_optimistic,
            el_offline: syncing.data.el_offline,
            time_to_next_slot: clock.time_to_next_slot,
            time_to_next_epoch: clock.time_to_next_epoch,
            peer_count: peers.ok().map(|r| parse_u64(&r.data.connected)),
            node_version: version.ok().map(|r| r.data.version),
            current_fork: fork.ok().map(|r| r.data.current_version),
        })
    }

    fn epoch_slot(&self, config: &ChainConfig, epoch: u64, which: &str) -> Option<u64> {
        let slot = config.epoch_start_slot(epoch);
        if slot.is_none() && epoch > 0 {
            tracing::warn!(
                client = %self.name,
                epoch,
                slots_per_epoch = config.slots_per_epoch,
                "Skipping {which} slot: epoch * slots_per_epoch overflows"
            );
        }
        slot
    }

    pub(crate) async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, AdapterError> {
        let url = format!("{}{}", self.endpoint, path);
        let attempts = self.retry.attempts.max(1);
        let mut attempt = 0;

        loop {
            if attempt > 0 {
                tokio::time::sleep(self.retry.delay_before(attempt)).await;
            }
            attempt += 1;

            match self.get_once(&url, path).await {
                Ok(body) => {
                    // Decode errors are not retried.
                    return serde_json::from_slice(&body).map_err(|e| {
                        tracing::debug!(
                            client = %self.name,
                            url = %url,
                            body = %String::from_utf8_lossy(&body),
                            "Failed to decode response"
                        );
                        AdapterError::Parse(e.to_string())
                    });
                }
                Err(e) if e.is_retryable() && attempt < attempts => {
                    tracing::debug!(
                        client = %self.name,
                        url = %url,
                        attempt,
                        attempts,
                        error = %e,
                        "Request failed, retrying"
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn get_once(&self, url: &str, path: &str) -> Result<Vec<u8>, AdapterError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AdapterError::Status {
                status: status.as_u16(),
                path: path.to_string(),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl StatusSource for ConsensusSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Consensus
    }

    async fn fetch_status(&self) -> StatusRecord {
        match self.node_status().await {
            Ok(status) => {
                StatusRecord::connected(&self.name, &self.endpoint, StatusPayload::Consensus(status))
            }
            Err(e) => {
                tracing::debug!(client = %self.name, error = %e, "Consensus status unavailable");
                StatusRecord::failed(&self.name, &self.endpoint, NodeKind::Consensus, e.into())
            }
        }
    }
}

/// Builder for ConsensusSource.
#[derive(Debug, Default)]
pub struct ConsensusSourceBuilder {
    name: Option<String>,
    endpoint: Option<String>,
    timeout: Option<Duration>,
    retry: Option<RetryPolicy>,
    client: Option<Client>,
}

impl ConsensusSourceBuilder {
    /// Set the display name (default: "consensus").
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the beacon API endpoint (default: "http://localhost:5052").
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set the per-request timeout (default: 10 seconds).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Use an existing client instead of building one.
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Build the source.
    pub fn build(self) -> Result<ConsensusSource, AdapterError> {
        let client = match self.client {
            Some(client) => client,
            None => build_client(self.timeout.unwrap_or(DEFAULT_HTTP_TIMEOUT))?,
        };
        Ok(ConsensusSource {
            client,
            name: self.name.unwrap_or_else(|| "consensus".to_string()),
            endpoint: normalize_endpoint(
                self.endpoint.as_deref().unwrap_or("http://localhost:5052"),
            ),
            retry: self.retry.unwrap_or_default(),
        })
    }
}

fn parse_u64(text: &str) -> u64 {
    text.trim().parse().unwrap_or(0)
}

fn spec_value(spec: &HashMap<String, serde_json::Value>, key: &str) -> Result<u64, AdapterError> {
    let text = spec
        .get(key)
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| AdapterError::ChainConfig(format!("{key} is missing or not a string")))?;
    let value: u64 = text
        .parse()
        .map_err(|e| AdapterError::ChainConfig(format!("failed to parse {key} '{text}': {e}")))?;
    if value == 0 {
        return Err(AdapterError::ChainConfig(format!("{key} cannot be zero")));
    }
    Ok(value)
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct Genesis {
    genesis_time: String,
}

#[derive(Debug, Deserialize)]
struct Syncing {
    #[serde(default)]
    head_slot: String,
    #[serde(default)]
    sync_distance: String,
    #[serde(default)]
    is_syncing: bool,
    #[serde(default)]
    is_optimistic: bool,
    #[serde(default)]
    el_offline: bool,
}

#[derive(Debug, Deserialize)]
struct HeaderEntry {
    header: SignedHeader,
}

#[derive(Debug, Deserialize)]
struct SignedHeader {
    message: HeaderMessage,
}

#[derive(Debug, Deserialize)]
struct HeaderMessage {
    slot: String,
}

#[derive(Debug, Deserialize)]
struct Finality {
    current_justified: Checkpoint,
    finalized: Checkpoint,
}

#[derive(Debug, Deserialize)]
struct Checkpoint {
    epoch: String,
}

#[derive(Debug, Deserialize)]
struct PeerCount {
    #[serde(default)]
    connected: String,
}

#[derive(Debug, Deserialize)]
struct NodeVersion {
    version: String,
}

#[derive(Debug, Deserialize)]
struct Fork {
    current_version: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use watcheth_types::StatusError;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(genesis_secs: u64) -> ChainConfig {
        ChainConfig {
            seconds_per_slot: 12,
            slots_per_epoch: 32,
            genesis_time: UNIX_EPOCH + Duration::from_secs(genesis_secs),
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            attempts: 3,
            base_delay: Duration::from_millis(1),
        }
    }

    async fn mount_required(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path(GENESIS))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "genesis_time": "1606824023" }
            })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path(SPEC))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "SECONDS_PER_SLOT": "12", "SLOTS_PER_EPOCH": "32", "CONFIG_NAME": "mainnet" }
            })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path(SYNCING))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {
                    "head_slot": "8000000",
                    "sync_distance": "2",
                    "is_syncing": false,
                    "is_optimistic": false,
                    "el_offline": false
                }
            })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path(FINALITY))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {
                    "previous_justified": { "epoch": "249998", "root": "0x00" },
                    "current_justified": { "epoch": "249999", "root": "0x00" },
                    "finalized": { "epoch": "249998", "root": "0x00" }
                }
            })))
            .mount(server)
            .await;
    }

    fn source(server: &MockServer) -> ConsensusSource {
        ConsensusSource::builder()
            .name("lighthouse")
            .endpoint(server.uri())
            .retry(fast_retry())
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_defaults() {
        let source = ConsensusSource::builder().build().unwrap();
        assert_eq!(source.name, "consensus");
        assert_eq!(source.endpoint, "http://localhost:5052");
        assert_eq!(source.retry, RetryPolicy::default());
    }

    #[test]
    fn test_builder_trims_endpoint() {
        let source = ConsensusSource::builder()
            .endpoint("http://beacon:5052/")
            .build()
            .unwrap();
        assert_eq!(source.endpoint, "http://beacon:5052");
    }

    #[test]
    fn retry_delays_double() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_before(1), Duration::from_millis(100));
        assert_eq!(policy.delay_before(2), Duration::from_millis(200));
    }

    #[test]
    fn clock_mid_epoch() {
        // 100 slots and 5 seconds after genesis.
        let cfg = config(1_000);
        let now = cfg.genesis_time + Duration::from_secs(100 * 12 + 5);
        let clock = cfg.clock_at(now);
        assert_eq!(clock.current_slot, 100);
        assert_eq!(clock.current_epoch, 3);
        assert_eq!(clock.time_to_next_slot, Duration::from_secs(7));
        // Slot 100 is the 4th slot of epoch 3; 27 more slots follow it.
        assert_eq!(clock.time_to_next_epoch, Duration::from_secs(7 + 27 * 12));
    }

    #[test]
    fn clock_before_genesis() {
        let cfg = config(2_000_000_000);
        assert_eq!(cfg.clock_at(UNIX_EPOCH), SlotClock::default());
    }

    #[test]
    fn epoch_start_slot_guards_overflow() {
        let cfg = config(0);
        assert_eq!(cfg.epoch_start_slot(0), None);
        assert_eq!(cfg.epoch_start_slot(10), Some(320));
        assert_eq!(cfg.epoch_start_slot(u64::MAX / 2), None);
    }

    #[tokio::test]
    async fn test_node_status() {
        let server = MockServer::start().await;
        mount_required(&server).await;
        Mock::given(method("GET"))
            .and(path(HEADERS))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{ "header": { "message": { "slot": "8000001" } } }]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(PEER_COUNT))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "connected": "87", "connecting": "0", "disconnected": "5", "disconnecting": "0" }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(VERSION))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "version": "Lighthouse/v5.1.0" }
            })))
            .mount(&server)
            .await;

        let status = source(&server).node_status().await.unwrap();
        assert_eq!(status.head_slot, 8_000_001);
        assert_eq!(status.sync_distance, 2);
        assert_eq!(status.justified_epoch, 249_999);
        assert_eq!(status.justified_slot, Some(249_999 * 32));
        assert_eq!(status.finalized_slot, Some(249_998 * 32));
        assert_eq!(status.peer_count, Some(87));
        assert_eq!(status.node_version.as_deref(), Some("Lighthouse/v5.1.0"));
        // Fork endpoint not mounted: best effort.
        assert!(status.current_fork.is_none());
        assert!(status.current_slot > 8_000_000);
    }

    #[tokio::test]
    async fn headers_fall_back_to_syncing_head() {
        let server = MockServer::start().await;
        mount_required(&server).await;

        let status = source(&server).node_status().await.unwrap();
        assert_eq!(status.head_slot, 8_000_000);
    }

    #[tokio::test]
    async fn server_errors_are_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(GENESIS))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let err = source(&server).chain_config().await.unwrap_err();
        assert!(matches!(err, AdapterError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(GENESIS))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let err = source(&server).chain_config().await.unwrap_err();
        assert!(matches!(err, AdapterError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn zero_slots_per_epoch_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(GENESIS))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "genesis_time": "1606824023" }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(SPEC))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "SECONDS_PER_SLOT": "12", "SLOTS_PER_EPOCH": "0" }
            })))
            .mount(&server)
            .await;

        let err = source(&server).chain_config().await.unwrap_err();
        assert!(err.to_string().contains("SLOTS_PER_EPOCH cannot be zero"));
    }

    #[tokio::test]
    async fn fetch_status_embeds_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let record = source(&server).fetch_status().await;
        assert!(!record.is_connected());
        assert_eq!(record.name(), "lighthouse");
        assert!(matches!(
            record.last_error(),
            Some(StatusError::Status { status: 500, .. })
        ));
    }

    #[tokio::test]
    async fn fetch_status_connected() {
        let server = MockServer::start().await;
        mount_required(&server).await;

        let record = source(&server).fetch_status().await;
        assert!(record.is_connected());
        assert_eq!(record.kind(), NodeKind::Consensus);
        assert_eq!(record.consensus().map(|s| s.head_slot), Some(8_000_000));
    }
}
