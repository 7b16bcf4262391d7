//! One-slot change notification between the poller and its consumer.

use std::time::SystemTime;

use tokio::sync::mpsc;

/// "A new snapshot was published." Carries no data; consumers re-read the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotNotice {
    /// Cycle number of the snapshot that triggered the notice.
    pub cycle: u64,
    pub published_at: SystemTime,
}

/// Sending half of the mailbox.
///
/// The mailbox holds at most one pending notice. Posting to a full mailbox
/// drops the new notice: the consumer will re-read the store anyway, and the
/// notice already waiting is enough to make it do so.
#[derive(Debug, Clone)]
pub struct UpdateMailbox {
    tx: mpsc::Sender<SnapshotNotice>,
}

impl UpdateMailbox {
    /// Create a connected mailbox and receiver.
    pub fn channel() -> (Self, Updates) {
        let (tx, rx) = mpsc::channel(1);
        (Self { tx }, Updates { rx })
    }

    /// Post a notice without waiting. Returns `true` if it was queued.
    pub fn notify(&self, notice: SnapshotNotice) -> bool {
        self.tx.try_send(notice).is_ok()
    }

    /// True once the receiving half has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiving half of the mailbox.
#[derive(Debug)]
pub struct Updates {
    rx: mpsc::Receiver<SnapshotNotice>,
}

impl Updates {
    /// Wait for the next notice. Returns `None` once the poller is gone.
    pub async fn recv(&mut self) -> Option<SnapshotNotice> {
        self.rx.recv().await
    }

    /// Take a pending notice, if any.
    pub fn try_recv(&mut self) -> Option<SnapshotNotice> {
        self.rx.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notice(cycle: u64) -> SnapshotNotice {
        SnapshotNotice {
            cycle,
            published_at: SystemTime::now(),
        }
    }

    #[test]
    fn test_notify_when_empty() {
        let (mailbox, mut updates) = UpdateMailbox::channel();
        assert!(mailbox.notify(notice(1)));
        assert_eq!(updates.try_recv().map(|n| n.cycle), Some(1));
        assert!(updates.try_recv().is_none());
    }

    #[test]
    fn full_mailbox_drops_newest() {
        let (mailbox, mut updates) = UpdateMailbox::channel();
        assert!(mailbox.notify(notice(1)));
        assert!(!mailbox.notify(notice(2)));
        assert!(!mailbox.notify(notice(3)));

        assert_eq!(updates.try_recv().map(|n| n.cycle), Some(1));
        assert!(updates.try_recv().is_none());
    }

    #[test]
    fn notify_after_receiver_dropped_does_not_panic() {
        let (mailbox, updates) = UpdateMailbox::channel();
        drop(updates);
        assert!(mailbox.is_closed());
        assert!(!mailbox.notify(notice(1)));
    }

    #[tokio::test]
    async fn recv_returns_none_when_sender_dropped() {
        let (mailbox, mut updates) = UpdateMailbox::channel();
        mailbox.notify(notice(5));
        drop(mailbox);
        assert_eq!(updates.recv().await.map(|n| n.cycle), Some(5));
        assert!(updates.recv().await.is_none());
    }
}
