//! # watcheth-core
//!
//! The concurrent engine behind watcheth: a poller that fans out one fetch
//! per status source on a fixed cadence, a snapshot store that publishes the
//! aggregated result, and a log tailer that keeps a small window of the most
//! recent lines of each client's log file.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use async_trait::async_trait;
//! use tokio_util::sync::CancellationToken;
//! use watcheth_core::{LogTailer, Poller, StatusSource};
//! use watcheth_types::{ConsensusStatus, NodeKind, StatusPayload, StatusRecord};
//!
//! #[derive(Debug)]
//! struct Fixed;
//!
//! #[async_trait]
//! impl StatusSource for Fixed {
//!     fn name(&self) -> &str { "fixed" }
//!     fn endpoint(&self) -> &str { "memory://" }
//!     fn kind(&self) -> NodeKind { NodeKind::Consensus }
//!     async fn fetch_status(&self) -> StatusRecord {
//!         StatusRecord::connected("fixed", "memory://", StatusPayload::Consensus(ConsensusStatus::default()))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (poller, mut updates) = Poller::builder()
//!         .interval(Duration::from_secs(2))
//!         .fetch_timeout(Duration::from_secs(5))
//!         .build();
//!     poller.register(Arc::new(Fixed));
//!
//!     let (tailer, _log_updates) = LogTailer::builder().window(15).build()?;
//!     tailer.register("fixed", "/var/log/fixed/fixed.log");
//!
//!     let cancel = CancellationToken::new();
//!     let handle = Arc::new(poller).start(cancel.clone());
//!     let _tailer = tailer.start(cancel.clone());
//!
//!     while updates.recv().await.is_some() {
//!         // Always re-read the store; the notice is only a hint.
//!         let snapshot = handle.snapshot();
//!         println!("{} of {} connected", snapshot.connected_count(), snapshot.total());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Concurrency model
//!
//! - One short-lived task per source per poll cycle, each bounded by its own timeout
//! - Results are written to pre-assigned positions, so output order is registration order
//! - The snapshot is replaced whole under a read/write lock, never patched in place
//! - Change notices go through a one-slot mailbox that drops new notices when full
//! - Each log entry has its own lock; refreshing one file never blocks another

mod logtail;
mod mailbox;
mod poller;
mod source;
mod store;

pub use logtail::{
    log_level, tail_file, tail_lines, LogLevel, LogTailer, LogTailerBuilder, LogUpdate,
    LogUpdates, Refresh, Tail, TailerHandle, WatchError, DEFAULT_CHUNK_SIZE, DEFAULT_POLL_INTERVAL,
    DEFAULT_WINDOW,
};
pub use mailbox::{SnapshotNotice, UpdateMailbox, Updates};
pub use poller::{
    CycleReport, Poller, PollerBuilder, PollerHandle, DEFAULT_FETCH_TIMEOUT, DEFAULT_INTERVAL,
};
pub use source::StatusSource;
pub use store::SnapshotStore;

// Re-export types for convenience
pub use watcheth_types::{NodeKind, Snapshot, StatusError, StatusPayload, StatusRecord};
