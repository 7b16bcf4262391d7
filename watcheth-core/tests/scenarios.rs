use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use watcheth_core::{LogTailer, NodeKind, Poller, Refresh, StatusError, StatusRecord, StatusSource};
use watcheth_types::{ConsensusStatus, StatusPayload};

#[derive(Debug)]
enum Behaviour {
    Instant,
    Slow(Duration),
    ServerError,
}

#[derive(Debug)]
struct Beacon {
    name: String,
    behaviour: Behaviour,
}

#[async_trait]
impl StatusSource for Beacon {
    fn name(&self) -> &str {
        &self.name
    }

    fn endpoint(&self) -> &str {
        "http://localhost:5052"
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Consensus
    }

    async fn fetch_status(&self) -> StatusRecord {
        match self.behaviour {
            Behaviour::Instant => {}
            Behaviour::Slow(delay) => tokio::time::sleep(delay).await,
            Behaviour::ServerError => {
                return StatusRecord::failed(
                    self.name.as_str(),
                    self.endpoint(),
                    NodeKind::Consensus,
                    StatusError::Status {
                        status: 500,
                        path: "/eth/v1/node/syncing".to_string(),
                    },
                )
            }
        }
        StatusRecord::connected(
            self.name.as_str(),
            self.endpoint(),
            StatusPayload::Consensus(ConsensusStatus::default()),
        )
    }
}

fn beacon(name: impl Into<String>, behaviour: Behaviour) -> Arc<dyn StatusSource> {
    Arc::new(Beacon {
        name: name.into(),
        behaviour,
    })
}

#[tokio::test(start_paused = true)]
async fn slow_source_is_cut_off_at_the_timeout() {
    let (poller, _updates) = Poller::builder()
        .fetch_timeout(Duration::from_secs(5))
        .build();
    poller.register(beacon("a", Behaviour::Instant));
    poller.register(beacon("b", Behaviour::Slow(Duration::from_secs(6))));
    poller.register(beacon("c", Behaviour::ServerError));

    let started = tokio::time::Instant::now();
    let report = poller.run_cycle(&CancellationToken::new()).await;
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_secs(5));
    assert!(elapsed < Duration::from_secs(6), "cycle took {elapsed:?}");
    assert_eq!(report.connected, 1);
    assert_eq!(report.failed, 2);

    let snapshot = poller.snapshot();
    let records = snapshot.get(NodeKind::Consensus);
    assert_eq!(records.len(), 3);

    assert!(records[0].is_connected());

    assert!(!records[1].is_connected());
    let timeout = records[1].last_error().unwrap().to_string();
    assert!(timeout.contains("deadline exceeded"), "{timeout}");

    assert!(!records[2].is_connected());
    let server = records[2].last_error().unwrap().to_string();
    assert!(server.contains("500"), "{server}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn snapshots_stay_positional_under_concurrent_registration() {
    const SOURCES: usize = 50;

    let (poller, _updates) = Poller::builder()
        .fetch_timeout(Duration::from_millis(50))
        .build();
    let poller = Arc::new(poller);
    let cancel = CancellationToken::new();

    let registrar = {
        let poller = Arc::clone(&poller);
        tokio::spawn(async move {
            for i in 0..SOURCES {
                let index = poller.register(beacon(format!("s{i}"), Behaviour::Instant));
                assert_eq!(index, i);
                tokio::task::yield_now().await;
            }
        })
    };
    let cycles = {
        let poller = Arc::clone(&poller);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            for _ in 0..20 {
                poller.run_cycle(&cancel).await;
            }
        })
    };
    let readers: Vec<_> = (0..2)
        .map(|_| {
            let poller = Arc::clone(&poller);
            tokio::spawn(async move {
                let mut last_len = 0;
                for _ in 0..500 {
                    let snapshot = poller.snapshot();
                    let records = snapshot.get(NodeKind::Consensus);
                    assert!(records.len() >= last_len, "snapshot shrank");
                    for (i, record) in records.iter().enumerate() {
                        assert_eq!(record.name(), format!("s{i}"));
                    }
                    last_len = records.len();
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();

    registrar.await.unwrap();
    cycles.await.unwrap();
    for reader in readers {
        reader.await.unwrap();
    }

    poller.run_cycle(&cancel).await;
    let snapshot = poller.snapshot();
    assert_eq!(snapshot.len(NodeKind::Consensus), SOURCES);
    assert!(snapshot.records().all(|r| r.is_connected()));
}

#[tokio::test(start_paused = true)]
async fn cancellation_stops_the_poll_loop_after_the_cycle_drains() {
    let (poller, mut updates) = Poller::builder()
        .interval(Duration::from_secs(2))
        .fetch_timeout(Duration::from_secs(5))
        .build();
    poller.register(beacon("hung", Behaviour::Slow(Duration::from_secs(3600))));

    let handle = Arc::new(poller).start(CancellationToken::new());
    tokio::time::sleep(Duration::from_secs(1)).await;
    handle.stop();

    let notice = updates.recv().await.unwrap();
    assert_eq!(notice.cycle, 1);
    let snapshot = handle.snapshot();
    assert_eq!(
        snapshot.get(NodeKind::Consensus)[0].last_error(),
        Some(&StatusError::Cancelled)
    );
    handle.shutdown().await;
}

fn append(path: &Path, text: &str) {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .unwrap();
    file.write_all(text.as_bytes()).unwrap();
}

fn lines(range: std::ops::RangeInclusive<usize>) -> Vec<String> {
    range.map(|i| format!("L{i}")).collect()
}

#[test]
fn tail_window_slides_as_lines_are_appended() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("beacon.log");
    let body: String = (1..=20).map(|i| format!("L{i}\n")).collect();
    append(&path, &body);

    let (tailer, _updates) = LogTailer::builder()
        .window(15)
        .watch_files(false)
        .build()
        .unwrap();
    tailer.register("beacon", &path);
    assert_eq!(tailer.cached_lines("beacon"), Some(lines(6..=20)));

    append(&path, "L21\n");
    assert_eq!(
        tailer.refresh("beacon"),
        Some(Refresh::Appended(vec!["L21".to_string()]))
    );
    assert_eq!(tailer.cached_lines("beacon"), Some(lines(7..=21)));

    // A second trigger for the same change finds nothing new.
    assert_eq!(tailer.refresh("beacon"), Some(Refresh::Unchanged));
}

#[test]
fn tail_window_sizes() {
    let dir = TempDir::new().unwrap();
    let n = 15;

    for m in [0, 1, n - 1, n, n + 1, 10_000] {
        let path = dir.path().join(format!("{m}.log"));
        let mut body = String::new();
        for i in 1..=m {
            body.push_str(&format!("L{i}\n"));
            if i % 7 == 0 {
                body.push_str("\n   \n");
            }
        }
        fs::write(&path, body).unwrap();

        let (tailer, _updates) = LogTailer::builder()
            .window(n)
            .watch_files(false)
            .build()
            .unwrap();
        tailer.register("client", &path);

        let expected: Vec<String> = (m.saturating_sub(n) + 1..=m)
            .map(|i| format!("L{i}"))
            .collect();
        assert_eq!(tailer.cached_lines("client").unwrap(), expected, "m = {m}");
    }
}

#[test]
fn rotation_rebuilds_without_duplicates() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("geth.log");
    append(&path, &(1..=20).map(|i| format!("L{i}\n")).collect::<String>());

    let (tailer, _updates) = LogTailer::builder()
        .window(15)
        .watch_files(false)
        .build()
        .unwrap();
    tailer.register("geth", &path);

    // Rotate: the new file starts small, then grows.
    fs::write(&path, "R1\n").unwrap();
    assert_eq!(
        tailer.refresh("geth"),
        Some(Refresh::Rebuilt(vec!["R1".to_string()]))
    );
    append(&path, "R2\nR3\n");
    tailer.refresh("geth");

    assert_eq!(
        tailer.cached_lines("geth").unwrap(),
        vec!["R1", "R2", "R3"]
    );
}
