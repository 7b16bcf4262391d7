//! Status records - one polled observation of one monitored client.

use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

use crate::{ConsensusStatus, ExecutionStatus, StatusError, StatusPayload, ValidatorStatus};

/// The kind of client a status source talks to.
///
/// Kinds are ordered; snapshots and reports list consensus clients first,
/// then execution clients, then validators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum NodeKind {
    /// Beacon node speaking the consensus REST API.
    Consensus,
    /// Execution client speaking JSON-RPC.
    Execution,
    /// Validator client exposing Prometheus metrics.
    Validator,
}

impl NodeKind {
    /// Every kind, in display order.
    pub const ALL: [NodeKind; 3] = [NodeKind::Consensus, NodeKind::Execution, NodeKind::Validator];

    /// Lower-case name used in configuration files and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Consensus => "consensus",
            NodeKind::Execution => "execution",
            NodeKind::Validator => "validator",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a client type string is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown client type '{0}' (expected consensus, execution, validator or vouch)")]
pub struct UnknownKind(pub String);

impl FromStr for NodeKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "consensus" | "beacon" => Ok(NodeKind::Consensus),
            "execution" => Ok(NodeKind::Execution),
            "validator" | "vouch" => Ok(NodeKind::Validator),
            other => Err(UnknownKind(other.to_string())),
        }
    }
}

/// One observation of a monitored client.
///
/// Records are built fresh on every fetch and never changed afterwards. The
/// constructors are the only way to create one, which keeps the invariant
/// that a record carrying an error is never marked connected.
///
/// A record that is disconnected but has no error is *pending*: the source
/// is registered but has not been polled yet.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct StatusRecord {
    name: String,
    endpoint: String,
    kind: NodeKind,
    is_connected: bool,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    last_error: Option<StatusError>,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    last_update: Option<SystemTime>,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    payload: Option<StatusPayload>,
}

impl StatusRecord {
    /// Placeholder for a source that has not completed a fetch yet.
    pub fn pending(name: impl Into<String>, endpoint: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            kind,
            is_connected: false,
            last_error: None,
            last_update: None,
            payload: None,
        }
    }

    /// A successful fetch. The kind is taken from the payload.
    pub fn connected(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        payload: StatusPayload,
    ) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            kind: payload.kind(),
            is_connected: true,
            last_error: None,
            last_update: Some(SystemTime::now()),
            payload: Some(payload),
        }
    }

    /// A failed fetch.
    pub fn failed(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        kind: NodeKind,
        error: StatusError,
    ) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            kind,
            is_connected: false,
            last_error: Some(error),
            last_update: Some(SystemTime::now()),
            payload: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn is_connected(&self) -> bool {
        self.is_connected
    }

    /// True until the first fetch for this source completes.
    pub fn is_pending(&self) -> bool {
        !self.is_connected && self.last_error.is_none()
    }

    pub fn last_error(&self) -> Option<&StatusError> {
        self.last_error.as_ref()
    }

    /// When the fetch that produced this record finished.
    pub fn last_update(&self) -> Option<SystemTime> {
        self.last_update
    }

    pub fn payload(&self) -> Option<&StatusPayload> {
        self.payload.as_ref()
    }

    /// Consensus fields, if this record holds them.
    pub fn consensus(&self) -> Option<&ConsensusStatus> {
        match &self.payload {
            Some(StatusPayload::Consensus(status)) => Some(status),
            _ => None,
        }
    }

    /// Execution fields, if this record holds them.
    pub fn execution(&self) -> Option<&ExecutionStatus> {
        match &self.payload {
            Some(StatusPayload::Execution(status)) => Some(status),
            _ => None,
        }
    }

    /// Validator fields, if this record holds them.
    pub fn validator(&self) -> Option<&ValidatorStatus> {
        match &self.payload {
            Some(StatusPayload::Validator(status)) => Some(status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn pending_record_has_no_error() {
        let record = StatusRecord::pending("geth", "http://localhost:8545", NodeKind::Execution);
        assert!(record.is_pending());
        assert!(!record.is_connected());
        assert!(record.last_update().is_none());
    }

    #[test]
    fn failed_record_is_disconnected() {
        let record = StatusRecord::failed(
            "prysm",
            "http://localhost:3500",
            NodeKind::Consensus,
            StatusError::Timeout(Duration::from_secs(5)),
        );
        assert!(!record.is_connected());
        assert!(!record.is_pending());
        assert!(record.last_error().is_some());
        assert!(record.last_update().is_some());
    }

    #[test]
    fn connected_record_takes_kind_from_payload() {
        let record = StatusRecord::connected(
            "vouch",
            "http://localhost:8081",
            StatusPayload::Validator(ValidatorStatus::default()),
        );
        assert_eq!(record.kind(), NodeKind::Validator);
        assert!(record.validator().is_some());
        assert!(record.consensus().is_none());
    }

    #[test]
    fn parse_kind_aliases() {
        assert_eq!("".parse::<NodeKind>().unwrap(), NodeKind::Consensus);
        assert_eq!("Beacon".parse::<NodeKind>().unwrap(), NodeKind::Consensus);
        assert_eq!("execution".parse::<NodeKind>().unwrap(), NodeKind::Execution);
        assert_eq!("vouch".parse::<NodeKind>().unwrap(), NodeKind::Validator);
        assert!("lodestar-vc".parse::<NodeKind>().is_err());
    }

    #[test]
    fn kinds_sort_in_display_order() {
        let mut kinds = vec![NodeKind::Validator, NodeKind::Consensus, NodeKind::Execution];
        kinds.sort();
        assert_eq!(kinds, NodeKind::ALL.to_vec());
    }
}
