//! Kind-specific fields carried by a connected status record.

use std::collections::BTreeMap;
use std::time::{Duration, SystemTime};

use crate::NodeKind;

/// Kind-tagged payload of a [`StatusRecord`](crate::StatusRecord).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "lowercase"))]
pub enum StatusPayload {
    Consensus(ConsensusStatus),
    Execution(ExecutionStatus),
    Validator(ValidatorStatus),
}

impl StatusPayload {
    /// The node kind this payload describes.
    pub fn kind(&self) -> NodeKind {
        match self {
            StatusPayload::Consensus(_) => NodeKind::Consensus,
            StatusPayload::Execution(_) => NodeKind::Execution,
            StatusPayload::Validator(_) => NodeKind::Validator,
        }
    }
}

/// Coarse sync state shared by consensus and execution clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum SyncState {
    Synced,
    Syncing,
    /// Head is known but the execution layer has not validated it.
    Optimistic,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Synced => "Synced",
            SyncState::Syncing => "Syncing",
            SyncState::Optimistic => "Optimistic",
        }
    }
}

/// Beacon node state.
///
/// Justified and finalized slots are `None` when the epoch is zero or when
/// `epoch * slots_per_epoch` would overflow.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ConsensusStatus {
    pub current_slot: u64,
    pub head_slot: u64,
    pub justified_slot: Option<u64>,
    pub finalized_slot: Option<u64>,
    pub current_epoch: u64,
    pub justified_epoch: u64,
    pub finalized_epoch: u64,
    pub sync_distance: u64,
    pub is_syncing: bool,
    pub is_optimistic: bool,
    pub el_offline: bool,
    pub time_to_next_slot: Duration,
    pub time_to_next_epoch: Duration,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub peer_count: Option<u64>,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub node_version: Option<String>,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub current_fork: Option<String>,
}

impl ConsensusStatus {
    pub fn sync_state(&self) -> SyncState {
        if self.is_syncing {
            SyncState::Syncing
        } else if self.is_optimistic {
            SyncState::Optimistic
        } else {
            SyncState::Synced
        }
    }
}

/// Execution client state.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ExecutionStatus {
    pub current_block: u64,
    pub highest_block: u64,
    pub starting_block: u64,
    pub is_syncing: bool,
    /// Percentage in `0.0..=100.0`; only meaningful while syncing.
    pub sync_progress: f64,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub peer_count: Option<u64>,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub chain_id: Option<u128>,
    /// Wei.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub gas_price: Option<u128>,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub network_id: Option<String>,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub node_version: Option<String>,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub last_block_time: Option<SystemTime>,
    /// Time elapsed since `last_block_time` when the record was built.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub block_age: Option<Duration>,
}

impl ExecutionStatus {
    pub fn sync_state(&self) -> SyncState {
        if self.is_syncing {
            SyncState::Syncing
        } else {
            SyncState::Synced
        }
    }
}

/// Validator client state scraped from its metrics endpoint.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ValidatorStatus {
    pub ready: bool,
    /// Average seconds into the slot at which attestations are broadcast.
    pub attestation_mark_seconds: f64,
    pub attestation_succeeded: u64,
    pub attestation_failed: u64,
    /// Average seconds into the slot at which proposals are broadcast.
    pub block_proposal_mark_seconds: f64,
    pub block_proposal_succeeded: u64,
    pub block_proposal_failed: u64,
    /// Average beacon node response time in milliseconds.
    pub beacon_node_response_ms: f64,
    pub best_bid_relay_count: u64,
    pub blocks_from_relay: u64,
    /// Average relay auction duration in seconds.
    pub relay_auction_duration: f64,
    pub relay_auction_count: u64,
    pub relay_registration_succeeded: u64,
    pub relay_registration_failed: u64,
    pub relay_builder_bid_succeeded: u64,
    pub relay_builder_bid_failed: u64,
    pub relay_execution_config_succeeded: u64,
    pub relay_execution_config_failed: u64,
    /// Validator counts keyed by account state (e.g. `active_ongoing`).
    pub validator_states: BTreeMap<String, u64>,
}

impl ValidatorStatus {
    /// Percentage of successful attestations, if any were attempted.
    pub fn attestation_success_rate(&self) -> Option<f64> {
        success_rate(self.attestation_succeeded, self.attestation_failed)
    }

    /// Percentage of successful block proposals, if any were attempted.
    pub fn block_proposal_success_rate(&self) -> Option<f64> {
        success_rate(self.block_proposal_succeeded, self.block_proposal_failed)
    }

    /// Total validators across all account states.
    pub fn total_validators(&self) -> u64 {
        self.validator_states.values().sum()
    }
}

fn success_rate(succeeded: u64, failed: u64) -> Option<f64> {
    let total = succeeded.checked_add(failed)?;
    if total == 0 {
        return None;
    }
    Some(succeeded as f64 / total as f64 * 100.0)
}
