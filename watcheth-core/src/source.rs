//! The seam between the poller and the clients it watches.

use std::fmt::Debug;

use async_trait::async_trait;
use watcheth_types::{NodeKind, StatusRecord};

/// Something the poller can ask for a fresh status record.
///
/// Implementations never return an error: a failed fetch is reported as a
/// [`StatusRecord::failed`] record so the poller can publish it like any
/// other result. The poller bounds every call with its own timeout and drops
/// the future when the deadline passes or the poller shuts down, so
/// implementations must be cancel-safe (no partial state left behind when the
/// future is dropped mid-await).
#[async_trait]
pub trait StatusSource: Send + Sync + Debug {
    /// Display name, unique within the monitor.
    fn name(&self) -> &str;

    /// Endpoint the source talks to, shown in reports.
    fn endpoint(&self) -> &str;

    /// Which array of the snapshot this source's records land in.
    fn kind(&self) -> NodeKind;

    /// Fetch the current status.
    async fn fetch_status(&self) -> StatusRecord;

    /// Placeholder published until the first fetch completes.
    fn pending_record(&self) -> StatusRecord {
        StatusRecord::pending(self.name(), self.endpoint(), self.kind())
    }
}
