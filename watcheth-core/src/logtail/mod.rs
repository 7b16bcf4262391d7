//! Log tailing: a bounded window of the latest lines of each client's log.
//!
//! Files are refreshed when the filesystem reports a change in their
//! directory and, as a fallback, on a short fixed interval. Refreshing reads
//! only the bytes appended since the last read; a file that shrank is read
//! again from its end.

mod level;
mod tail;
mod watch;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::Span;

pub use level::{log_level, LogLevel};
pub use tail::{tail_file, tail_lines, Tail, DEFAULT_CHUNK_SIZE};
pub use watch::Refresh;

use watch::LogWatch;

/// Default number of lines kept per file.
pub const DEFAULT_WINDOW: usize = 15;

/// Default fallback polling interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

const UPDATE_CAPACITY: usize = 100;

/// Errors from setting up the tailer.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("failed to start file watcher: {0}")]
    Notify(#[from] notify::Error),
}

/// A log window changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogUpdate {
    pub client_name: String,
    /// The full window after the change, oldest line first.
    pub lines: Vec<String>,
    pub timestamp: SystemTime,
}

/// Receiving half of the tailer's update channel.
#[derive(Debug)]
pub struct LogUpdates {
    rx: mpsc::Receiver<LogUpdate>,
}

impl LogUpdates {
    /// Wait for the next update. Returns `None` once the tailer is gone.
    pub async fn recv(&mut self) -> Option<LogUpdate> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<LogUpdate> {
        self.rx.try_recv().ok()
    }
}

/// Keeps the last few lines of a set of named log files up to date.
///
/// Cloning is cheap and every clone shares the same entries.
///
/// # Example
///
/// ```rust,no_run
/// use tokio_util::sync::CancellationToken;
/// use watcheth_core::LogTailer;
///
/// #[tokio::main]
/// async fn main() -> Result<(), watcheth_core::WatchError> {
///     let (tailer, mut updates) = LogTailer::builder().window(15).build()?;
///     tailer.register("lighthouse", "/var/log/lighthouse/lighthouse.log");
///
///     let handle = tailer.start(CancellationToken::new());
///     while let Some(update) = updates.recv().await {
///         println!("{}: {:?}", update.client_name, update.lines.last());
///     }
///     handle.shutdown().await;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct LogTailer {
    inner: Arc<Inner>,
}

struct Inner {
    entries: RwLock<BTreeMap<String, Arc<LogWatch>>>,
    window: usize,
    poll_interval: Duration,
    updates: mpsc::Sender<LogUpdate>,
    watcher: Mutex<Option<RecommendedWatcher>>,
    changed: Arc<ChangedPaths>,
    watched_dirs: Mutex<BTreeSet<PathBuf>>,
    span: Span,
}

impl LogTailer {
    /// Create a builder for configuring the tailer.
    pub fn builder() -> LogTailerBuilder {
        LogTailerBuilder::new()
    }

    pub fn window(&self) -> usize {
        self.inner.window
    }

    pub fn poll_interval(&self) -> Duration {
        self.inner.poll_interval
    }

    /// Start tailing `path` under `name`.
    ///
    /// Re-registering a name with the same path does nothing; with a different
    /// path the old window is discarded. The initial read happens off the
    /// caller's thread when a Tokio runtime is available, so this returns
    /// without touching the file.
    pub fn register(&self, name: impl Into<String>, path: impl Into<PathBuf>) {
        let name = name.into();
        let path = path.into();

        let watch = {
            let mut entries = self.inner.entries.write();
            if entries.get(&name).is_some_and(|w| w.path() == path) {
                return;
            }
            let watch = Arc::new(LogWatch::new(path, self.inner.window));
            entries.insert(name.clone(), Arc::clone(&watch));
            watch
        };
        tracing::debug!(parent: &self.inner.span, client = %name, path = %watch.path().display(), "Tailing log file");
        self.inner.watch_dir(watch.watch_dir());

        let inner = Arc::clone(&self.inner);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn_blocking(move || inner.refresh_entry(&name, &watch));
            }
            Err(_) => {
                inner.refresh_entry(&name, &watch);
            }
        }
    }

    /// Stop tailing `name`. Returns `false` if it was not registered.
    pub fn unregister(&self, name: &str) -> bool {
        self.inner.entries.write().remove(name).is_some()
    }

    /// Names of all registered files.
    pub fn names(&self) -> Vec<String> {
        self.inner.entries.read().keys().cloned().collect()
    }

    /// Refresh one file now. Returns `None` for an unknown name.
    pub fn refresh(&self, name: &str) -> Option<Refresh> {
        let watch = self.inner.entry(name)?;
        Some(self.inner.refresh_entry(name, &watch))
    }

    /// Refresh every file now. Returns how many windows changed.
    pub fn refresh_all(&self) -> usize {
        self.inner.refresh_all()
    }

    /// The current window for `name`, oldest line first.
    ///
    /// Never touches the file. `None` means the name is not registered; an
    /// empty window means the file has not been read yet or has no lines.
    pub fn cached_lines(&self, name: &str) -> Option<Vec<String>> {
        self.inner.entry(name).map(|watch| watch.lines())
    }

    /// Refresh files until `cancel` fires.
    ///
    /// Filesystem events refresh the files they concern; the poll interval
    /// refreshes everything and takes precedence over pending events. Events
    /// that pile up between wake-ups are merged per path. File reads run on
    /// the blocking pool.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.inner.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let inner = Arc::clone(&self.inner);
                    self.blocking(move || {
                        inner.refresh_all();
                    })
                    .await;
                }
                _ = self.inner.changed.wake.notified() => {
                    let paths = self.inner.changed.take();
                    if paths.is_empty() {
                        continue;
                    }
                    let inner = Arc::clone(&self.inner);
                    self.blocking(move || {
                        for path in &paths {
                            inner.refresh_path(path);
                        }
                    })
                    .await;
                }
            }
        }

        tracing::debug!(parent: &self.inner.span, "Log tailer stopped");
    }

    /// Run the tailer in a background task.
    pub fn start(&self, cancel: CancellationToken) -> TailerHandle {
        let tailer = self.clone();
        let token = cancel.clone();
        let task = tokio::spawn(async move { tailer.run(token).await });
        TailerHandle { cancel, task }
    }

    async fn blocking<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Err(e) = tokio::task::spawn_blocking(f).await {
            tracing::error!(parent: &self.inner.span, error = %e, "Log refresh task failed");
        }
    }
}

impl fmt::Debug for LogTailer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogTailer")
            .field("entries", &self.names())
            .field("window", &self.inner.window)
            .field("poll_interval", &self.inner.poll_interval)
            .finish()
    }
}

/// Paths reported by the filesystem watcher and not yet refreshed.
///
/// Holds each path at most once, so a file that changes constantly costs one
/// refresh per wake-up no matter how many events it produced.
#[derive(Debug, Default)]
struct ChangedPaths {
    paths: Mutex<BTreeSet<PathBuf>>,
    wake: Notify,
}

impl ChangedPaths {
    fn mark(&self, path: PathBuf) {
        self.paths.lock().insert(path);
        self.wake.notify_one();
    }

    fn take(&self) -> BTreeSet<PathBuf> {
        std::mem::take(&mut *self.paths.lock())
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.paths.lock().len()
    }
}

impl Inner {
    fn entry(&self, name: &str) -> Option<Arc<LogWatch>> {
        self.entries.read().get(name).cloned()
    }

    fn refresh_entry(&self, name: &str, watch: &LogWatch) -> Refresh {
        let (outcome, window) = watch.refresh();

        if let Refresh::Unreadable(message) = &outcome {
            tracing::warn!(parent: &self.span, client = %name, "{message}");
        }

        if let Some(lines) = window {
            let update = LogUpdate {
                client_name: name.to_string(),
                lines,
                timestamp: SystemTime::now(),
            };
            if let Err(mpsc::error::TrySendError::Full(_)) = self.updates.try_send(update) {
                tracing::trace!(parent: &self.span, client = %name, "Log update channel full, update dropped");
            }
        }
        outcome
    }

    fn refresh_all(&self) -> usize {
        let entries: Vec<(String, Arc<LogWatch>)> = self
            .entries
            .read()
            .iter()
            .map(|(name, watch)| (name.clone(), Arc::clone(watch)))
            .collect();

        entries
            .iter()
            .filter(|(name, watch)| self.refresh_entry(name, watch).is_changed())
            .count()
    }

    fn refresh_path(&self, path: &Path) {
        let matching: Vec<(String, Arc<LogWatch>)> = self
            .entries
            .read()
            .iter()
            .filter(|(_, watch)| watch.matches(path))
            .map(|(name, watch)| (name.clone(), Arc::clone(watch)))
            .collect();

        for (name, watch) in matching {
            self.refresh_entry(&name, &watch);
        }
    }

    fn watch_dir(&self, dir: &Path) {
        let mut watched = self.watched_dirs.lock();
        if watched.contains(dir) {
            return;
        }
        let mut watcher = self.watcher.lock();
        let Some(watcher) = watcher.as_mut() else {
            return;
        };
        match watcher.watch(dir, RecursiveMode::NonRecursive) {
            Ok(()) => {
                watched.insert(dir.to_path_buf());
            }
            Err(e) => {
                tracing::debug!(
                    parent: &self.span,
                    dir = %dir.display(),
                    error = %e,
                    "Cannot watch directory, relying on polling"
                );
            }
        }
    }
}

/// Builder for configuring a [`LogTailer`].
#[derive(Debug)]
pub struct LogTailerBuilder {
    window: usize,
    poll_interval: Duration,
    watch_files: bool,
    span: Option<Span>,
}

impl Default for LogTailerBuilder {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            poll_interval: DEFAULT_POLL_INTERVAL,
            watch_files: true,
            span: None,
        }
    }
}

impl LogTailerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines kept per file. Defaults to 15; at least one line is always kept.
    pub fn window(mut self, lines: usize) -> Self {
        self.window = lines.max(1);
        self
    }

    /// Fallback polling interval. Defaults to 100ms.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Whether to subscribe to filesystem notifications. Defaults to `true`.
    ///
    /// With notifications off, changes are picked up by polling alone.
    pub fn watch_files(mut self, enabled: bool) -> Self {
        self.watch_files = enabled;
        self
    }

    /// Parent span for everything the tailer logs.
    pub fn span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Build the tailer and the receiving half of its update channel.
    pub fn build(self) -> Result<(LogTailer, LogUpdates), WatchError> {
        let span = self.span.unwrap_or_else(|| tracing::info_span!("logtail"));
        let changed = Arc::new(ChangedPaths::default());

        let watcher = if self.watch_files {
            let watcher_span = span.clone();
            let changed = Arc::clone(&changed);
            let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if matches!(
                        event.kind,
                        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                    ) {
                        for path in event.paths {
                            changed.mark(path);
                        }
                    }
                }
                Err(e) => tracing::warn!(parent: &watcher_span, error = %e, "File watch error"),
            })?;
            Some(watcher)
        } else {
            None
        };

        let (updates_tx, updates_rx) = mpsc::channel(UPDATE_CAPACITY);
        let tailer = LogTailer {
            inner: Arc::new(Inner {
                entries: RwLock::new(BTreeMap::new()),
                window: self.window,
                poll_interval: self.poll_interval,
                updates: updates_tx,
                watcher: Mutex::new(watcher),
                changed,
                watched_dirs: Mutex::new(BTreeSet::new()),
                span,
            }),
        };
        Ok((tailer, LogUpdates { rx: updates_rx }))
    }
}

/// Handle for a tailer running in the background.
#[derive(Debug)]
pub struct TailerHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl TailerHandle {
    /// Ask the tailer to stop. Returns immediately.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Stop the tailer and wait for it to exit.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Log tailer task failed");
        }
    }
}
