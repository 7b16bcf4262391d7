//! # watcheth
//!
//! Polling monitor for Ethereum consensus, execution and validator clients.
//!
//! The binary loads a list of clients from `watcheth.yml`, polls each one
//! on a fixed interval with [`watcheth_core::Poller`], tails their log
//! files with [`watcheth_core::LogTailer`], and prints a status report
//! after every cycle.
//!
//! ## Architecture
//!
//! ```text
//! watcheth.yml ──▶ config ──▶ monitor ──▶ Poller ──▶ SnapshotStore ──▶ report
//!                               │            ▲
//!                               │            └── adapters (beacon / JSON-RPC / vouch)
//!                               └──────▶ LogTailer ──▶ cached log windows ──▶ report
//! ```
//!
//! - **[`config`]**: settings file and environment overrides
//! - **[`monitor`]**: builds status sources from settings and runs the loops
//! - **[`report`]**: plain-text and JSON rendering of snapshots
//! - **[`logging`]**: diagnostic log setup
//!
//! ## Library use
//!
//! ```no_run
//! use watcheth::config::Settings;
//! use watcheth::monitor::Monitor;
//!
//! # tokio_test::block_on(async {
//! let settings = Settings::load(None).unwrap();
//! let monitor = Monitor::from_settings(&settings, false).unwrap();
//! let snapshot = monitor.poll_once().await;
//! println!("{}/{} connected", snapshot.connected_count(), snapshot.total());
//! # });
//! ```

pub mod config;
pub mod duration;
pub mod logging;
pub mod monitor;
pub mod report;

pub use config::{ClientConfig, ConfigError, Settings};
pub use monitor::{Monitor, Running};
