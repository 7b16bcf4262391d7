//! The poller: fans out one fetch per registered source on a fixed cadence.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span};
use watcheth_types::{NodeKind, Snapshot, StatusError, StatusRecord};

use crate::mailbox::{SnapshotNotice, UpdateMailbox, Updates};
use crate::source::StatusSource;
use crate::store::SnapshotStore;

/// Default time between poll cycles.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(2);

/// Default deadline for a single fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

type Registry = BTreeMap<NodeKind, Vec<Arc<dyn StatusSource>>>;

/// Polls every registered [`StatusSource`] concurrently and publishes the
/// results as one [`Snapshot`].
///
/// Each cycle takes a copy of the registry, spawns one task per source, waits
/// for all of them, then replaces the stored snapshot in a single write. A
/// slow or hung source only costs its own fetch timeout; the others are not
/// held back beyond that.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use tokio_util::sync::CancellationToken;
/// use watcheth_core::Poller;
///
/// #[tokio::main]
/// async fn main() {
///     let (poller, mut updates) = Poller::builder()
///         .interval(Duration::from_secs(2))
///         .build();
///
///     // poller.register(Arc::new(my_source));
///
///     let handle = Arc::new(poller).start(CancellationToken::new());
///     while let Some(notice) = updates.recv().await {
///         let snapshot = handle.snapshot();
///         println!("cycle {}: {} sources", notice.cycle, snapshot.total());
///     }
/// }
/// ```
#[derive(Debug)]
pub struct Poller {
    registry: RwLock<Registry>,
    store: Arc<SnapshotStore>,
    mailbox: UpdateMailbox,
    interval: Duration,
    fetch_timeout: Duration,
    cycles: AtomicU64,
    span: Span,
}

/// Outcome of one poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub cycle: u64,
    /// Sources whose fetch produced a connected record.
    pub connected: usize,
    /// Sources whose fetch failed, timed out or was cancelled.
    pub failed: usize,
    pub elapsed: Duration,
}

impl CycleReport {
    pub fn total(&self) -> usize {
        self.connected + self.failed
    }
}

impl Poller {
    /// Create a poller with default settings.
    pub fn new() -> (Self, Updates) {
        Self::builder().build()
    }

    /// Create a builder for configuring the poller.
    pub fn builder() -> PollerBuilder {
        PollerBuilder::new()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }

    /// The store this poller publishes into.
    pub fn store(&self) -> Arc<SnapshotStore> {
        Arc::clone(&self.store)
    }

    /// Register a source and publish a pending placeholder for it.
    ///
    /// Returns the source's index within its kind. The placeholder is visible
    /// to readers immediately; the source is polled from the next cycle on.
    /// Registering while a cycle is running is safe: that cycle keeps the
    /// registry it started with.
    pub fn register(&self, source: Arc<dyn StatusSource>) -> usize {
        let kind = source.kind();
        let mut registry = self.registry.write();
        let index = self.store.append(source.pending_record());
        let sources = registry.entry(kind).or_default();
        sources.push(source);
        debug_assert_eq!(index + 1, sources.len());
        index
    }

    /// Number of sources registered for one kind.
    pub fn registered(&self, kind: NodeKind) -> usize {
        self.registry.read().get(&kind).map_or(0, Vec::len)
    }

    /// Copy of the latest published snapshot.
    ///
    /// The per-kind arrays always match the registry in length: every
    /// registered source has a record, a placeholder if it was never polled.
    pub fn snapshot(&self) -> Snapshot {
        let _registry = self.registry.read();
        self.store.read()
    }

    /// Run a single poll cycle.
    ///
    /// Waits for every fetch to finish or time out, publishes the snapshot,
    /// then posts a notice to the mailbox. If `cancel` fires mid-cycle, fetches
    /// still in flight are abandoned and recorded as cancelled.
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> CycleReport {
        let started = Instant::now();
        let cycle = self.cycles.fetch_add(1, Ordering::Relaxed) + 1;
        let registry = self.registry.read().clone();

        let mut pending = Vec::with_capacity(registry.len());
        for (kind, sources) in &registry {
            let tasks: Vec<JoinHandle<StatusRecord>> = sources
                .iter()
                .map(|source| {
                    let span = tracing::debug_span!(
                        parent: &self.span,
                        "fetch",
                        cycle,
                        source = %source.name(),
                        kind = %kind,
                    );
                    tokio::spawn(
                        fetch_one(Arc::clone(source), self.fetch_timeout, cancel.clone())
                            .instrument(span),
                    )
                })
                .collect();
            pending.push((*kind, tasks));
        }

        let mut connected = 0;
        let mut failed = 0;
        let mut results = Vec::with_capacity(pending.len());
        for (kind, tasks) in pending {
            let sources = registry.get(&kind).map(Vec::as_slice).unwrap_or_default();
            let mut slots: Vec<Option<Arc<StatusRecord>>> = vec![None; tasks.len()];

            for (index, task) in tasks.into_iter().enumerate() {
                let record = match task.await {
                    Ok(record) => record,
                    Err(e) => {
                        let source = &sources[index];
                        tracing::error!(
                            parent: &self.span,
                            source = %source.name(),
                            error = %e,
                            "Fetch task did not complete"
                        );
                        StatusRecord::failed(
                            source.name(),
                            source.endpoint(),
                            kind,
                            StatusError::Other(format!("fetch task failed: {e}")),
                        )
                    }
                };
                if record.is_connected() {
                    connected += 1;
                } else {
                    failed += 1;
                }
                slots[index] = Some(Arc::new(record));
            }

            let records = slots
                .into_iter()
                .zip(sources)
                .map(|(slot, source)| slot.unwrap_or_else(|| Arc::new(source.pending_record())))
                .collect();
            results.push((kind, records));
        }

        let snapshot = self.store.publish(cycle, results);
        let published_at = snapshot.published_at().unwrap_or_else(std::time::SystemTime::now);
        if !self.mailbox.notify(SnapshotNotice {
            cycle,
            published_at,
        }) {
            tracing::trace!(parent: &self.span, cycle, "Update mailbox full, notice dropped");
        }

        let report = CycleReport {
            cycle,
            connected,
            failed,
            elapsed: started.elapsed(),
        };
        tracing::debug!(
            parent: &self.span,
            cycle,
            connected,
            failed,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Poll cycle complete"
        );
        report
    }

    /// Poll until `cancel` fires: one cycle immediately, then one per interval.
    ///
    /// A cycle that overruns the interval delays the next tick rather than
    /// triggering a burst of catch-up cycles. Cancellation is observed between
    /// cycles and by in-flight fetches, so the loop exits promptly.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(
            parent: &self.span,
            interval_ms = self.interval.as_millis() as u64,
            "Poller started"
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.run_cycle(&cancel).await;
                }
            }
        }

        tracing::info!(parent: &self.span, "Poller stopped");
    }

    /// Start polling in a background task.
    ///
    /// Returns a handle that can stop the task and wait for it to drain.
    pub fn start(self: Arc<Self>, cancel: CancellationToken) -> PollerHandle {
        let poller = Arc::clone(&self);
        let token = cancel.clone();
        let task = tokio::spawn(async move { poller.run(token).await });
        PollerHandle {
            poller: self,
            cancel,
            task,
        }
    }
}

/// Fetch one source, bounded by `timeout` and `cancel`.
async fn fetch_one(
    source: Arc<dyn StatusSource>,
    timeout: Duration,
    cancel: CancellationToken,
) -> StatusRecord {
    let record = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            StatusRecord::failed(source.name(), source.endpoint(), source.kind(), StatusError::Cancelled)
        }
        result = tokio::time::timeout(timeout, source.fetch_status()) => match result {
            Ok(record) => record,
            Err(_) => StatusRecord::failed(
                source.name(),
                source.endpoint(),
                source.kind(),
                StatusError::Timeout(timeout),
            ),
        },
    };

    match record.last_error() {
        Some(error) => tracing::warn!(error = %error, "Fetch failed"),
        None => tracing::trace!("Fetch succeeded"),
    }
    record
}

/// Builder for configuring a [`Poller`].
#[derive(Debug, Default)]
pub struct PollerBuilder {
    interval: Option<Duration>,
    fetch_timeout: Option<Duration>,
    store: Option<Arc<SnapshotStore>>,
    span: Option<Span>,
}

impl PollerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the time between cycles.
    ///
    /// Defaults to 2 seconds. A zero interval is raised to one millisecond.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Set the per-fetch deadline. Defaults to 5 seconds.
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = Some(timeout);
        self
    }

    /// Publish into an existing store instead of a fresh one.
    pub fn store(mut self, store: Arc<SnapshotStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Parent span for everything the poller logs.
    pub fn span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Build the poller and the receiving half of its update mailbox.
    pub fn build(self) -> (Poller, Updates) {
        let (mailbox, updates) = UpdateMailbox::channel();
        let interval = self
            .interval
            .unwrap_or(DEFAULT_INTERVAL)
            .max(Duration::from_millis(1));
        let poller = Poller {
            registry: RwLock::new(BTreeMap::new()),
            store: self.store.unwrap_or_default(),
            mailbox,
            interval,
            fetch_timeout: self.fetch_timeout.unwrap_or(DEFAULT_FETCH_TIMEOUT),
            cycles: AtomicU64::new(0),
            span: self.span.unwrap_or_else(|| tracing::info_span!("poller")),
        };
        (poller, updates)
    }
}

/// Handle for a poller running in the background.
///
/// Dropping the handle does not stop the poller; call [`stop`](Self::stop)
/// or cancel the token it was started with.
#[derive(Debug)]
pub struct PollerHandle {
    poller: Arc<Poller>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Copy of the latest published snapshot.
    pub fn snapshot(&self) -> Snapshot {
        self.poller.snapshot()
    }

    pub fn poller(&self) -> &Arc<Poller> {
        &self.poller
    }

    /// Ask the poller to stop. Returns immediately.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the poller and wait for the current cycle to drain.
    pub async fn shutdown(self) {
        let PollerHandle {
            poller,
            cancel,
            task,
        } = self;
        cancel.cancel();
        if let Err(e) = task.await {
            tracing::error!(parent: &poller.span, error = %e, "Poller task failed");
        }
    }
}
