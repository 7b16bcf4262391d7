//! Plain-text and JSON rendering of a snapshot.

use std::collections::BTreeMap;
use std::fmt::Write;
use std::time::SystemTime;

use watcheth_adapters::EndpointCheck;
use watcheth_core::{log_level, LogLevel};
use watcheth_types::{
    ConsensusStatus, ExecutionStatus, NodeKind, Snapshot, StatusRecord, ValidatorStatus,
};

use crate::duration::{format_age, format_countdown};

/// Render the snapshot as JSON.
pub fn render_json(snapshot: &Snapshot) -> serde_json::Result<String> {
    serde_json::to_string_pretty(snapshot)
}

/// Render the snapshot as a text report, one section per kind.
///
/// `logs` maps client names to their cached log windows; clients without
/// an entry get no log section.
pub fn render_text(
    snapshot: &Snapshot,
    logs: &BTreeMap<String, Vec<String>>,
    now: SystemTime,
) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "cycle {} | {}/{} clients connected",
        snapshot.cycle(),
        snapshot.connected_count(),
        snapshot.total()
    );

    for kind in NodeKind::ALL {
        let records = snapshot.get(kind);
        if records.is_empty() {
            continue;
        }
        let _ = writeln!(out, "\n[{kind}]");
        for record in records {
            render_record(&mut out, record, now);
            if let Some(lines) = logs.get(record.name()) {
                render_logs(&mut out, lines);
            }
        }
    }
    out
}

fn render_record(out: &mut String, record: &StatusRecord, now: SystemTime) {
    let _ = write!(out, "  {} ({})", record.name(), record.endpoint());
    if record.is_pending() {
        let _ = writeln!(out, ": waiting for first poll");
        return;
    }
    if let Some(err) = record.last_error() {
        // Non-transient failures usually mean a wrong endpoint or client type.
        let label = if err.is_transient() { "OFFLINE" } else { "ERROR" };
        let _ = writeln!(out, ": {label} - {err}");
        return;
    }
    let _ = writeln!(out);

    if let Some(status) = record.consensus() {
        consensus_lines(out, status);
    } else if let Some(status) = record.execution() {
        execution_lines(out, status, now);
    } else if let Some(status) = record.validator() {
        validator_lines(out, status);
    }
}

fn consensus_lines(out: &mut String, s: &ConsensusStatus) {
    let _ = writeln!(
        out,
        "    status {} | slot {} (head {}, distance {}) | epoch {}",
        s.sync_state().as_str(),
        s.current_slot,
        s.head_slot,
        s.sync_distance,
        s.current_epoch
    );
    let _ = writeln!(
        out,
        "    justified {} | finalized {} | next slot {} | next epoch {}",
        s.justified_epoch,
        s.finalized_epoch,
        format_countdown(s.time_to_next_slot),
        format_countdown(s.time_to_next_epoch)
    );
    let mut extra = Vec::new();
    if let Some(peers) = s.peer_count {
        extra.push(format!("peers {peers}"));
    }
    if let Some(fork) = &s.current_fork {
        extra.push(format!("fork {fork}"));
    }
    if let Some(version) = &s.node_version {
        extra.push(version.clone());
    }
    if s.el_offline {
        extra.push("EL OFFLINE".to_string());
    }
    if !extra.is_empty() {
        let _ = writeln!(out, "    {}", extra.join(" | "));
    }
}

fn execution_lines(out: &mut String, s: &ExecutionStatus, now: SystemTime) {
    let _ = write!(out, "    status {} | block {}", s.sync_state().as_str(), s.current_block);
    if s.is_syncing {
        let _ = write!(out, "/{} ({:.1}%)", s.highest_block, s.sync_progress);
    }
    if let Some(at) = s.last_block_time {
        let age = now.duration_since(at).unwrap_or_default();
        let _ = write!(out, " | last block {}", format_age(age));
    }
    let _ = writeln!(out);

    let mut extra = Vec::new();
    if let Some(peers) = s.peer_count {
        extra.push(format!("peers {peers}"));
    }
    if let Some(chain) = s.chain_id {
        extra.push(format!("chain {chain}"));
    }
    if let Some(wei) = s.gas_price {
        extra.push(format!("gas {:.2} gwei", wei as f64 / 1e9));
    }
    if let Some(version) = &s.node_version {
        extra.push(version.clone());
    }
    if !extra.is_empty() {
        let _ = writeln!(out, "    {}", extra.join(" | "));
    }
}

fn validator_lines(out: &mut String, s: &ValidatorStatus) {
    let _ = writeln!(
        out,
        "    {} | validators {} | beacon node {:.0}ms",
        if s.ready { "ready" } else { "NOT READY" },
        s.total_validators(),
        s.beacon_node_response_ms
    );
    let _ = writeln!(
        out,
        "    attestations {} ok / {} failed ({}) | mark {:.2}s",
        s.attestation_succeeded,
        s.attestation_failed,
        rate(s.attestation_success_rate()),
        s.attestation_mark_seconds
    );
    let _ = writeln!(
        out,
        "    proposals {} ok / {} failed ({}) | relay blocks {}",
        s.block_proposal_succeeded,
        s.block_proposal_failed,
        rate(s.block_proposal_success_rate()),
        s.blocks_from_relay
    );
}

fn rate(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.1}%"))
}

fn render_logs(out: &mut String, lines: &[String]) {
    for line in lines {
        let marker = match log_level(line) {
            LogLevel::Error => "E",
            LogLevel::Warn => "W",
            LogLevel::Info => " ",
            LogLevel::Debug => ".",
        };
        let _ = writeln!(out, "    {marker} {line}");
    }
}

/// Render the results of checking one endpoint's APIs.
pub fn render_checks(kind: NodeKind, endpoint: &str, checks: &[EndpointCheck]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Checking {kind} client at {endpoint}");
    for check in checks {
        match &check.result {
            Ok(body) => {
                let _ = writeln!(out, "\n{}: OK", check.target);
                for line in body.lines() {
                    let _ = writeln!(out, "    {line}");
                }
            }
            Err(e) => {
                let _ = writeln!(out, "\n{}: FAILED - {e}", check.target);
            }
        }
    }
    let passed = checks.iter().filter(|c| c.is_ok()).count();
    let _ = writeln!(out, "\n{passed}/{} checks passed", checks.len());
    out
}
