//! # watcheth-adapters
//!
//! Status sources for the three kinds of Ethereum node watcheth polls.
//!
//! ## Supported Clients
//!
//! - **Consensus** - any beacon node speaking the standard REST API
//!   (Lighthouse, Prysm, Teku, Nimbus, Lodestar)
//! - **Execution** - any client speaking Ethereum JSON-RPC (Geth, Nethermind,
//!   Besu, Erigon, Reth)
//! - **Validator** - Vouch, via its Prometheus metrics endpoint
//!
//! Every source implements [`StatusSource`](watcheth_core::StatusSource) and
//! never fails outward: errors end up inside the returned record.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use watcheth_adapters::execution::ExecutionSource;
//! use watcheth_core::{Poller, StatusSource};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let geth = ExecutionSource::builder()
//!         .name("geth")
//!         .endpoint("http://localhost:8545")
//!         .timeout(Duration::from_secs(5))
//!         .build()?;
//!
//!     let record = geth.fetch_status().await;
//!     println!("{} connected: {}", record.name(), record.is_connected());
//!
//!     let (poller, _updates) = Poller::new();
//!     poller.register(Arc::new(geth));
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use watcheth_core::StatusSource;
use watcheth_types::NodeKind;

pub mod consensus;
pub mod diagnose;
pub mod error;
pub mod execution;
pub mod http;
pub mod prometheus;
pub mod vouch;

pub use consensus::{ChainConfig, ConsensusSource, RetryPolicy, SlotClock};
pub use diagnose::{diagnose, EndpointCheck};
pub use error::AdapterError;
pub use execution::ExecutionSource;
pub use vouch::VouchSource;

/// Build the source for a configured client.
pub fn source(
    kind: NodeKind,
    name: &str,
    endpoint: &str,
    timeout: Duration,
) -> Result<Arc<dyn StatusSource>, AdapterError> {
    let source: Arc<dyn StatusSource> = match kind {
        NodeKind::Consensus => Arc::new(
            ConsensusSource::builder()
                .name(name)
                .endpoint(endpoint)
                .timeout(timeout)
                .build()?,
        ),
        NodeKind::Execution => Arc::new(
            ExecutionSource::builder()
                .name(name)
                .endpoint(endpoint)
                .timeout(timeout)
                .build()?,
        ),
        NodeKind::Validator => Arc::new(
            VouchSource::builder()
                .name(name)
                .endpoint(endpoint)
                .timeout(timeout)
                .build()?,
        ),
    };
    Ok(source)
}
