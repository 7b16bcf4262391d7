//! # watcheth-types
//!
//! Shared types for the watcheth monitor. A [`StatusRecord`] is the value every
//! status source produces on every fetch, and a [`Snapshot`] is the positional,
//! per-kind collection of those records that the poller publishes after each
//! cycle.
//!
//! ## Design Goals
//!
//! - **Errors are data**: a failed fetch still produces a record; the failure
//!   lives in [`StatusRecord::last_error`] instead of unwinding the caller
//! - **Immutable records**: constructors are the only way to build a record,
//!   so `last_error.is_some()` always implies `!is_connected()`
//! - **One shape, many kinds**: shared fields plus a kind-tagged
//!   [`StatusPayload`] instead of one record type per client kind
//! - **Optional serialization**: enable the `serde` feature for JSON output
//!
//! ## Example
//!
//! ```rust
//! use watcheth_types::{
//!     ConsensusStatus, NodeKind, Snapshot, StatusError, StatusPayload, StatusRecord,
//! };
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let ok = StatusRecord::connected(
//!     "lighthouse",
//!     "http://localhost:5052",
//!     StatusPayload::Consensus(ConsensusStatus::default()),
//! );
//! let down = StatusRecord::failed(
//!     "teku",
//!     "http://localhost:5051",
//!     NodeKind::Consensus,
//!     StatusError::Timeout(Duration::from_secs(5)),
//! );
//! assert!(ok.is_connected());
//! assert!(!down.is_connected());
//!
//! let mut snapshot = Snapshot::new();
//! snapshot.push(Arc::new(ok));
//! snapshot.push(Arc::new(down));
//! assert_eq!(snapshot.len(NodeKind::Consensus), 2);
//! assert_eq!(snapshot.connected_count(), 1);
//! ```

mod error;
mod payload;
mod snapshot;
mod status;

pub use error::*;
pub use payload::*;
pub use snapshot::*;
pub use status::*;
