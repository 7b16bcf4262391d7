//! Execution client adapter over JSON-RPC.
//!
//! `eth_syncing` is the only call that must succeed. Block height, peer
//! count, chain id, gas price, client version, network id and latest block
//! time are all best effort and left empty when the node refuses them.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use watcheth_core::StatusSource;
use watcheth_types::{ExecutionStatus, NodeKind, StatusPayload, StatusRecord};

use crate::http::{build_client, normalize_endpoint, DEFAULT_HTTP_TIMEOUT};
use crate::AdapterError;

/// Status source for an execution client such as Geth or Nethermind.
#[derive(Debug, Clone)]
pub struct ExecutionSource {
    client: Client,
    name: String,
    endpoint: String,
}

impl ExecutionSource {
    /// Create a new builder for configuring the source.
    pub fn builder() -> ExecutionSourceBuilder {
        ExecutionSourceBuilder::default()
    }

    /// Fetch the node's current state.
    pub async fn node_status(&self) -> Result<ExecutionStatus, AdapterError> {
        let syncing: SyncResult = self.call("eth_syncing", json!([])).await?;

        let mut status = ExecutionStatus::default();
        match syncing {
            SyncResult::Progress(progress) => {
                status.is_syncing = true;
                status.starting_block = parse_hex(&progress.starting_block);
                status.current_block = parse_hex(&progress.current_block);
                status.highest_block = parse_hex(&progress.highest_block);
                if status.highest_block > status.starting_block {
                    let done = status.current_block.saturating_sub(status.starting_block);
                    let total = status.highest_block - status.starting_block;
                    status.sync_progress = (done as f64 / total as f64 * 100.0).min(100.0);
                }
            }
            SyncResult::Flag(syncing) => {
                status.is_syncing = syncing;
                match self.call::<String>("eth_blockNumber", json!([])).await {
                    Ok(hex) => {
                        status.current_block = parse_hex(&hex);
                        status.highest_block = status.current_block;
                    }
                    Err(e) => tracing::debug!(client = %self.name, error = %e, "eth_blockNumber failed"),
                }
            }
        }

        let (peers, chain_id, gas_price, version, network) = tokio::join!(
            self.call::<String>("net_peerCount", json!([])),
            self.call::<String>("eth_chainId", json!([])),
            self.call::<String>("eth_gasPrice", json!([])),
            self.call::<String>("web3_clientVersion", json!([])),
            self.call::<String>("net_version", json!([])),
        );
        status.peer_count = peers.ok().map(|hex| parse_hex(&hex));
        status.chain_id = chain_id.ok().map(|hex| parse_hex_u128(&hex));
        status.gas_price = gas_price.ok().map(|hex| parse_hex_u128(&hex));
        status.node_version = version.ok();
        status.network_id = network.ok();

        match self
            .call::<Option<Block>>("eth_getBlockByNumber", json!(["latest", false]))
            .await
        {
            Ok(Some(block)) => {
                let at = UNIX_EPOCH + Duration::from_secs(parse_hex(&block.timestamp));
                status.last_block_time = Some(at);
                status.block_age = Some(SystemTime::now().duration_since(at).unwrap_or_default());
            }
            Ok(None) => {}
            Err(e) => tracing::debug!(client = %self.name, error = %e, "Latest block unavailable"),
        }

        Ok(status)
    }

    /// Make one JSON-RPC call and decode its result.
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, AdapterError> {
        let request = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1,
        });

        let response = self.client.post(&self.endpoint).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AdapterError::Status {
                status: status.as_u16(),
                path: method.to_string(),
            });
        }

        let body: RpcResponse = response.json().await?;
        if let Some(err) = body.error {
            return Err(AdapterError::Rpc {
                method: method.to_string(),
                code: err.code,
                message: err.message,
            });
        }
        // A present-but-null result is valid for some methods; only a
        // missing field is an error.
        let result = body
            .result
            .ok_or_else(|| AdapterError::Parse(format!("{method}: response has no result")))?;
        serde_json::from_value(result).map_err(|e| AdapterError::Parse(format!("{method}: {e}")))
    }
}

#[async_trait]
impl StatusSource for ExecutionSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Execution
    }

    async fn fetch_status(&self) -> StatusRecord {
        match self.node_status().await {
            Ok(status) => {
                StatusRecord::connected(&self.name, &self.endpoint, StatusPayload::Execution(status))
            }
            Err(e) => {
                tracing::debug!(client = %self.name, error = %e, "Execution status unavailable");
                StatusRecord::failed(&self.name, &self.endpoint, NodeKind::Execution, e.into())
            }
        }
    }
}

/// Builder for ExecutionSource.
#[derive(Debug, Default)]
pub struct ExecutionSourceBuilder {
    name: Option<String>,
    endpoint: Option<String>,
    timeout: Option<Duration>,
    client: Option<Client>,
}

impl ExecutionSourceBuilder {
    /// Set the display name (default: "execution").
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the JSON-RPC endpoint (default: "http://localhost:8545").
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
    pub fn build(self) -> Result<ExecutionSource, AdapterError> {
        let client = match self.client {
            Some(client) => client,
            None => build_client(self.timeout.unwrap_or(DEFAULT_HTTP_TIMEOUT))?,
        };
        Ok(ExecutionSource {
            client,
            name: self.name.unwrap_or_else(|| "execution".to_string()),
            endpoint: normalize_endpoint(
                self.endpoint.as_deref().unwrap_or("http://localhost:8545"),
            ),
        })
    }
}

/// Lenient hex quantity parsing; anything malformed reads as zero.
fn parse_hex(text: &str) -> u64 {
    let digits = text.trim_start_matches("0x").trim_start_matches("0X");
    u64::from_str_radix(digits, 16).unwrap_or(0)
}

fn parse_hex_u128(text: &str) -> u128 {
    let digits = text.trim_start_matches("0x").trim_start_matches("0X");
    u128::from_str_radix(digits, 16).unwrap_or(0)
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default, deserialize_with = "present")]
    result: Option<Value>,
    error: Option<RpcError>,
}

/// Keeps `"result": null` distinct from a missing field.
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SyncResult {
    Flag(bool),
    Progress(SyncProgress),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SyncProgress {
    #[serde(default)]
    starting_block: String,
    #[serde(default)]
    current_block: String,
    #[serde(default)]
    highest_block: String,
}

#[derive(Debug, Deserialize)]
struct Block {
    timestamp: String,
}
