//! Wiring from settings to a running poller and log tailer.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use watcheth_core::{
    LogTailer, LogUpdates, Poller, PollerHandle, Snapshot, TailerHandle, Updates,
};

use crate::config::Settings;

/// Poller and tailer built from one set of settings, not yet running.
#[derive(Debug)]
pub struct Monitor {
    poller: Arc<Poller>,
    updates: Updates,
    tailer: LogTailer,
    log_updates: LogUpdates,
}

impl Monitor {
    /// Build sources for every configured client and register them.
    ///
    /// `watch_logs` controls whether log files are registered with the
    /// tailer at all.
    pub fn from_settings(settings: &Settings, watch_logs: bool) -> Result<Self> {
        let (poller, updates) = Poller::builder()
            .interval(settings.refresh_interval())
            .fetch_timeout(settings.fetch_timeout())
            .build();
        let (tailer, log_updates) = LogTailer::builder()
            .window(settings.log_window())
            .poll_interval(settings.log_poll_interval())
            .watch_files(watch_logs)
            .build()
            .context("failed to start log watcher")?;

        for client in &settings.clients {
            let kind = client
                .kind()
                .with_context(|| format!("client '{}'", client.name))?;
            let source = watcheth_adapters::source(
                kind,
                &client.name,
                &client.endpoint,
                settings.fetch_timeout(),
            )
            .with_context(|| format!("client '{}'", client.name))?;
            poller.register(source);

            if watch_logs {
                tailer.register(client.name.clone(), client.log_path());
            }
            tracing::debug!(client = %client.name, kind = %kind, endpoint = %client.endpoint, "Registered client");
        }

        Ok(Self {
            poller: Arc::new(poller),
            updates,
            tailer,
            log_updates,
        })
    }

    pub fn poller(&self) -> &Arc<Poller> {
        &self.poller
    }

    pub fn tailer(&self) -> &LogTailer {
        &self.tailer
    }

    /// Run one poll cycle and return the published snapshot.
    pub async fn poll_once(&self) -> Snapshot {
        let report = self.poller.run_cycle(&CancellationToken::new()).await;
        tracing::debug!(
            cycle = report.cycle,
            connected = report.connected,
            failed = report.failed,
            elapsed = ?report.elapsed,
            "Poll cycle complete"
        );
        self.poller.snapshot()
    }

    /// Start both background loops under one cancellation token.
    pub fn start(self, cancel: CancellationToken) -> Running {
        let poller = Arc::clone(&self.poller).start(cancel.child_token());
        let tailer = self.tailer.start(cancel.child_token());
        Running {
            cancel,
            poller,
            tailer,
            updates: self.updates,
            logs: self.tailer,
            _log_updates: self.log_updates,
        }
    }
}

/// Handles to the running loops.
#[derive(Debug)]
pub struct Running {
    cancel: CancellationToken,
    poller: PollerHandle,
    tailer: TailerHandle,
    updates: Updates,
    logs: LogTailer,
    // Kept open so log events are dropped quietly rather than failing to send.
    _log_updates: LogUpdates,
}

impl Running {
    pub fn updates(&mut self) -> &mut Updates {
        &mut self.updates
    }

    pub fn snapshot(&self) -> Snapshot {
        self.poller.snapshot()
    }

    /// Cached log window of every registered client.
    pub fn log_windows(&self) -> BTreeMap<String, Vec<String>> {
        self.logs
            .names()
            .into_iter()
            .filter_map(|name| {
                let lines = self.logs.cached_lines(&name)?;
                Some((name, lines))
            })
            .collect()
    }

    /// Cancel both loops and wait for them to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        tokio::join!(self.poller.shutdown(), self.tailer.shutdown());
    }
}
