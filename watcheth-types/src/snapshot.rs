//! Snapshot - the positional, per-kind view of every monitored client.

use std::sync::Arc;
use std::time::SystemTime;

use crate::{NodeKind, StatusRecord};

/// The latest status of every registered source, grouped by kind.
///
/// Within a kind, records are positionally aligned with registration order:
/// index `i` always belongs to the `i`-th source registered for that kind,
/// whatever order their fetches completed in.
///
/// Records are shared behind `Arc` because they are immutable; cloning a
/// snapshot copies the per-kind arrays but not the records themselves.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use watcheth_types::{NodeKind, Snapshot, StatusRecord};
///
/// let mut snapshot = Snapshot::new();
/// let index = snapshot.push(Arc::new(StatusRecord::pending(
///     "geth",
///     "http://localhost:8545",
///     NodeKind::Execution,
/// )));
/// assert_eq!(index, 0);
/// assert_eq!(snapshot.get(NodeKind::Execution)[0].name(), "geth");
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Snapshot {
    /// Poll cycle that produced this snapshot; 0 before the first cycle.
    cycle: u64,

    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    published_at: Option<SystemTime>,

    consensus: Vec<Arc<StatusRecord>>,
    execution: Vec<Arc<StatusRecord>>,
    validator: Vec<Arc<StatusRecord>>,
}

impl Snapshot {
    /// Create an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder for constructing snapshots.
    pub fn builder() -> SnapshotBuilder {
        SnapshotBuilder::new()
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn published_at(&self) -> Option<SystemTime> {
        self.published_at
    }

    /// Records for one kind, in registration order.
    pub fn get(&self, kind: NodeKind) -> &[Arc<StatusRecord>] {
        match kind {
            NodeKind::Consensus => &self.consensus,
            NodeKind::Execution => &self.execution,
            NodeKind::Validator => &self.validator,
        }
    }

    /// Number of records for one kind.
    pub fn len(&self, kind: NodeKind) -> usize {
        self.get(kind).len()
    }

    /// Total records across all kinds.
    pub fn total(&self) -> usize {
        NodeKind::ALL.iter().map(|kind| self.len(*kind)).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Number of records currently marked connected.
    pub fn connected_count(&self) -> usize {
        self.records().filter(|record| record.is_connected()).count()
    }

    /// Iterate every record, kinds in display order.
    pub fn records(&self) -> impl Iterator<Item = &Arc<StatusRecord>> {
        NodeKind::ALL.into_iter().flat_map(move |kind| self.get(kind).iter())
    }

    /// Append a record to its kind's array and return its index.
    pub fn push(&mut self, record: Arc<StatusRecord>) -> usize {
        let records = self.kind_mut(record.kind());
        records.push(record);
        records.len() - 1
    }

    /// Replace the whole array for one kind.
    pub fn set(&mut self, kind: NodeKind, records: Vec<Arc<StatusRecord>>) {
        *self.kind_mut(kind) = records;
    }

    /// Stamp the cycle number and publish time.
    pub fn stamp(&mut self, cycle: u64, published_at: SystemTime) {
        self.cycle = cycle;
        self.published_at = Some(published_at);
    }

    fn kind_mut(&mut self, kind: NodeKind) -> &mut Vec<Arc<StatusRecord>> {
        match kind {
            NodeKind::Consensus => &mut self.consensus,
            NodeKind::Execution => &mut self.execution,
            NodeKind::Validator => &mut self.validator,
        }
    }
}

/// Builder for constructing `Snapshot` instances.
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    cycle: u64,
    published_at: Option<SystemTime>,
    records: Vec<StatusRecord>,
}

impl SnapshotBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cycle number.
    pub fn cycle(mut self, cycle: u64) -> Self {
        self.cycle = cycle;
        self
    }

    /// Set a specific publish time.
    pub fn published_at(mut self, at: SystemTime) -> Self {
        self.published_at = Some(at);
        self
    }

    /// Add a record; it lands at the end of its kind's array.
    pub fn record(mut self, record: StatusRecord) -> Self {
        self.records.push(record);
        self
    }

    /// Build the snapshot.
    pub fn build(self) -> Snapshot {
        let mut snapshot = Snapshot {
            cycle: self.cycle,
            published_at: self.published_at,
            ..Snapshot::default()
        };
        for record in self.records {
            snapshot.push(Arc::new(record));
        }
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ConsensusStatus, StatusError, StatusPayload};

    fn consensus(name: &str) -> StatusRecord {
        StatusRecord::connected(
            name,
            "http://localhost:5052",
            StatusPayload::Consensus(ConsensusStatus::default()),
        )
    }

    #[test]
    fn test_snapshot_builder() {
        let snapshot = Snapshot::builder()
            .cycle(7)
            .record(consensus("lighthouse"))
            .record(StatusRecord::pending("geth", "http://localhost:8545", NodeKind::Execution))
            .record(consensus("teku"))
            .build();

        assert_eq!(snapshot.cycle(), 7);
        assert_eq!(snapshot.len(NodeKind::Consensus), 2);
        assert_eq!(snapshot.len(NodeKind::Execution), 1);
        assert_eq!(snapshot.len(NodeKind::Validator), 0);
        assert_eq!(snapshot.total(), 3);
        assert_eq!(snapshot.connected_count(), 2);
    }

    #[test]
    fn push_preserves_registration_order() {
        let mut snapshot = Snapshot::new();
        assert_eq!(snapshot.push(Arc::new(consensus("a"))), 0);
        assert_eq!(snapshot.push(Arc::new(consensus("b"))), 1);

        let names: Vec<_> = snapshot
            .get(NodeKind::Consensus)
            .iter()
            .map(|r| r.name().to_string())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn clone_shares_records() {
        let snapshot = Snapshot::builder().record(consensus("a")).build();
        let copy = snapshot.clone();
        assert!(Arc::ptr_eq(
            &snapshot.get(NodeKind::Consensus)[0],
            &copy.get(NodeKind::Consensus)[0]
        ));
    }

    #[test]
    fn records_iterates_kinds_in_order() {
        let snapshot = Snapshot::builder()
            .record(StatusRecord::failed(
                "vouch",
                "http://localhost:8081",
                NodeKind::Validator,
                StatusError::Cancelled,
            ))
            .record(consensus("prysm"))
            .build();

        let kinds: Vec<_> = snapshot.records().map(|r| r.kind()).collect();
        assert_eq!(kinds, vec![NodeKind::Consensus, NodeKind::Validator]);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serialize_snapshot() {
        let snapshot = Snapshot::builder().cycle(3).record(consensus("nimbus")).build();
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["cycle"], 3);
        assert_eq!(json["consensus"][0]["name"], "nimbus");
        assert_eq!(json["consensus"][0]["payload"]["kind"], "consensus");
    }
}
