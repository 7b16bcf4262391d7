//! Shared snapshot storage.

use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::RwLock;
use watcheth_types::{NodeKind, Snapshot, StatusRecord};

/// Thread-safe holder of the most recently published [`Snapshot`].
///
/// Writers replace per-kind arrays wholesale under the write lock; readers
/// get an owned copy, so nothing a reader does can be observed by another
/// reader or by the poller. Records themselves are immutable and shared.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    current: RwLock<Snapshot>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current snapshot.
    pub fn read(&self) -> Snapshot {
        self.current.read().clone()
    }

    /// Records for one kind, copied out of the current snapshot.
    pub fn read_kind(&self, kind: NodeKind) -> Vec<Arc<StatusRecord>> {
        self.current.read().get(kind).to_vec()
    }

    /// Number of records currently held for one kind.
    pub fn len(&self, kind: NodeKind) -> usize {
        self.current.read().len(kind)
    }

    pub fn is_empty(&self) -> bool {
        self.current.read().is_empty()
    }

    /// Append a placeholder for a newly registered source and return its index.
    pub(crate) fn append(&self, record: StatusRecord) -> usize {
        self.current.write().push(Arc::new(record))
    }

    /// Publish the results of one poll cycle.
    ///
    /// `results` holds one array per kind, each as long as that kind's
    /// registry was when the cycle started. Sources registered while the
    /// cycle was running already have placeholders beyond that length; those
    /// are carried over so every registered source stays visible.
    pub(crate) fn publish(
        &self,
        cycle: u64,
        mut results: Vec<(NodeKind, Vec<Arc<StatusRecord>>)>,
    ) -> Snapshot {
        let mut current = self.current.write();
        let mut next = Snapshot::new();
        for kind in NodeKind::ALL {
            let mut records = results
                .iter_mut()
                .find(|(k, _)| *k == kind)
                .map(|(_, records)| std::mem::take(records))
                .unwrap_or_default();
            if let Some(late) = current.get(kind).get(records.len()..) {
                records.extend(late.iter().cloned());
            }
            next.set(kind, records);
        }
        next.stamp(cycle, SystemTime::now());
        *current = next.clone();
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use watcheth_types::{ExecutionStatus, StatusError, StatusPayload};

    fn pending(name: &str, kind: NodeKind) -> StatusRecord {
        StatusRecord::pending(name, "http://localhost", kind)
    }

    fn connected(name: &str) -> Arc<StatusRecord> {
        Arc::new(StatusRecord::connected(
            name,
            "http://localhost",
            StatusPayload::Execution(ExecutionStatus::default()),
        ))
    }

    #[test]
    fn test_append_returns_index() {
        let store = SnapshotStore::new();
        assert_eq!(store.append(pending("a", NodeKind::Execution)), 0);
        assert_eq!(store.append(pending("b", NodeKind::Execution)), 1);
        assert_eq!(store.append(pending("c", NodeKind::Consensus)), 0);
        assert_eq!(store.len(NodeKind::Execution), 2);
        assert_eq!(store.len(NodeKind::Consensus), 1);
    }

    #[test]
    fn read_returns_independent_copy() {
        let store = SnapshotStore::new();
        store.append(pending("a", NodeKind::Execution));

        let mut copy = store.read();
        copy.push(connected("intruder"));

        assert_eq!(store.len(NodeKind::Execution), 1);
        assert_eq!(copy.len(NodeKind::Execution), 2);
    }

    #[test]
    fn publish_replaces_results_positionally() {
        let store = SnapshotStore::new();
        store.append(pending("a", NodeKind::Execution));
        store.append(pending("b", NodeKind::Execution));

        let failed = Arc::new(StatusRecord::failed(
            "b",
            "http://localhost",
            NodeKind::Execution,
            StatusError::Connection("refused".into()),
        ));
        let published = store.publish(
            1,
            vec![(NodeKind::Execution, vec![connected("a"), failed])],
        );

        assert_eq!(published.cycle(), 1);
        assert!(published.published_at().is_some());
        let records = store.read_kind(NodeKind::Execution);
        assert!(records[0].is_connected());
        assert!(!records[1].is_connected());
        assert_eq!(records[1].name(), "b");
    }

    #[test]
    fn publish_keeps_placeholders_registered_mid_cycle() {
        let store = SnapshotStore::new();
        store.append(pending("a", NodeKind::Execution));
        // Registered after the cycle took its registry snapshot.
        store.append(pending("late", NodeKind::Execution));

        store.publish(4, vec![(NodeKind::Execution, vec![connected("a")])]);

        let records = store.read_kind(NodeKind::Execution);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].name(), "late");
        assert!(records[1].is_pending());
    }

    #[test]
    fn publish_without_results_keeps_placeholders() {
        let store = SnapshotStore::new();
        store.append(pending("vouch", NodeKind::Validator));

        store.publish(1, Vec::new());
        assert_eq!(store.len(NodeKind::Validator), 1);
        assert_eq!(store.read().cycle(), 1);
    }

    #[test]
    fn concurrent_readers_and_writer() {
        use std::thread;

        let store = Arc::new(SnapshotStore::new());
        store.append(pending("a", NodeKind::Execution));

        let mut handles = vec![];
        for _ in 0..4 {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                for _ in 0..200 {
                    assert_eq!(store.read().len(NodeKind::Execution), 1);
                }
            }));
        }
        for cycle in 1..=200 {
            store.publish(cycle, vec![(NodeKind::Execution, vec![connected("a")])]);
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.read().cycle(), 200);
    }
}
