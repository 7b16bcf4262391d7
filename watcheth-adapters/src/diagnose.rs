//! One-off endpoint checks for troubleshooting a client.
//!
//! Each check hits a single API path or RPC method once, without retries, and
//! keeps the raw answer so it can be shown to the user as-is.

use std::time::Duration;

use serde_json::{json, Value};
use watcheth_types::NodeKind;

use crate::consensus::{self, ConsensusSource, RetryPolicy};
use crate::execution::ExecutionSource;
use crate::vouch::VouchSource;
use crate::AdapterError;

/// JSON-RPC methods checked on an execution client.
const RPC_METHODS: &[&str] = &[
    "eth_syncing",
    "eth_blockNumber",
    "net_peerCount",
    "eth_chainId",
    "eth_gasPrice",
    "web3_clientVersion",
    "net_version",
    "eth_protocolVersion",
];

/// Outcome of one endpoint check.
#[derive(Debug)]
pub struct EndpointCheck {
    /// API path, RPC method or metrics URL that was checked.
    pub target: String,
    /// Response body (pretty-printed when it is JSON) or the failure.
    pub result: Result<String, AdapterError>,
}

impl EndpointCheck {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Check every endpoint the source for `kind` relies on.
///
/// Only building the HTTP client can fail outright; individual failures are
/// reported per check.
pub async fn diagnose(
    kind: NodeKind,
    endpoint: &str,
    timeout: Duration,
) -> Result<Vec<EndpointCheck>, AdapterError> {
    let checks = match kind {
        NodeKind::Consensus => {
            let source = ConsensusSource::builder()
                .endpoint(endpoint)
                .timeout(timeout)
                .retry(RetryPolicy {
                    attempts: 1,
                    ..Default::default()
                })
                .build()?;
            let mut checks = Vec::with_capacity(consensus::PATHS.len());
            for path in consensus::PATHS {
                let result = source.get::<Value>(path).await.map(|body| pretty(&body));
                checks.push(EndpointCheck {
                    target: path.to_string(),
                    result,
                });
            }
            checks
        }
        NodeKind::Execution => {
            let source = ExecutionSource::builder()
                .endpoint(endpoint)
                .timeout(timeout)
                .build()?;
            let mut checks = Vec::with_capacity(RPC_METHODS.len());
            for method in RPC_METHODS {
                let result = source
                    .call::<Value>(method, json!([]))
                    .await
                    .map(|body| pretty(&body));
                checks.push(EndpointCheck {
                    target: method.to_string(),
                    result,
                });
            }
            checks
        }
        NodeKind::Validator => {
            let source = VouchSource::builder()
                .endpoint(endpoint)
                .timeout(timeout)
                .build()?;
            vec![EndpointCheck {
                target: source.metrics_url().to_string(),
                result: source.raw_metrics().await,
            }]
        }
    };
    Ok(checks)
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn consensus_checks_each_path_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/eth/v1/node/version"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "data": { "version": "Lighthouse/v5.1.0" } })),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/eth/v1/node/syncing"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let checks = diagnose(NodeKind::Consensus, &server.uri(), Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(checks.len(), consensus::PATHS.len());

        let version = checks.iter().find(|c| c.target == "/eth/v1/node/version").unwrap();
        assert!(version.result.as_ref().unwrap().contains("Lighthouse/v5.1.0"));

        let syncing = checks.iter().find(|c| c.target == "/eth/v1/node/syncing").unwrap();
        assert!(matches!(
            syncing.result,
            Err(AdapterError::Status { status: 503, .. })
        ));
    }

    #[tokio::test]
    async fn execution_checks_every_method() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "method": "eth_chainId" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": "0x1",
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": { "code": -32601, "message": "method not found" },
            })))
            .mount(&server)
            .await;

        let checks = diagnose(NodeKind::Execution, &server.uri(), Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(checks.len(), RPC_METHODS.len());

        let chain = checks.iter().find(|c| c.target == "eth_chainId").unwrap();
        assert_eq!(chain.result.as_ref().unwrap(), "\"0x1\"");
        let failed = checks.iter().filter(|c| !c.is_ok()).count();
        assert_eq!(failed, RPC_METHODS.len() - 1);
    }

    #[tokio::test]
    async fn vouch_returns_raw_metrics() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/metrics"))
            .respond_with(ResponseTemplate::new(200).set_body_string("vouch_ready 1\n"))
            .mount(&server)
            .await;

        let checks = diagnose(NodeKind::Validator, &server.uri(), Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(checks.len(), 1);
        assert!(checks[0].target.ends_with("/metrics"));
        assert_eq!(checks[0].result.as_ref().unwrap(), "vouch_ready 1\n");
    }
}
