//! Single-slot latest-value mailbox.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

/// Holds at most one item. A new item replaces the old one.
///
/// The producer never waits: [`Mailbox::put`] overwrites the slot, counts
/// the displaced item as dropped and wakes the consumer.
#[derive(Debug)]
pub struct Mailbox<T> {
    slot: Mutex<Option<T>>,
    notify: Arc<Notify>,
    dropped: AtomicU64,
    closed: AtomicBool,
}

impl<T> Mailbox<T> {
    /// Create a mailbox with its own wakeup.
    pub fn new() -> Self {
        Self::with_notify(Arc::new(Notify::new()))
    }

    /// Create a mailbox that signals a shared wakeup.
    pub fn with_notify(notify: Arc<Notify>) -> Self {
        Self {
            slot: Mutex::new(None),
            notify,
            dropped: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Store `item`, returning `true` if an unconsumed item was displaced.
    ///
    /// Items put after [`Mailbox::close`] are discarded.
    pub fn put(&self, item: T) -> bool {
        if self.is_closed() {
            return false;
        }
        let displaced = self.slot.lock().replace(item).is_some();
        if displaced {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        self.notify.notify_one();
        displaced
    }

    /// Take the current item without waiting.
    pub fn take(&self) -> Option<T> {
        self.slot.lock().take()
    }

    /// Wait for the next item. Returns `None` once closed and drained.
    pub async fn recv(&self) -> Option<T> {
        loop {
            let notified = self.notify.notified();
            if let Some(item) = self.take() {
                return Some(item);
            }
            if self.is_closed() {
                return None;
            }
            notified.await;
        }
    }

    /// Number of items overwritten before being consumed.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Close the mailbox and wake the consumer.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    /// Check if closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_keeps_only_latest() {
        let mailbox = Mailbox::new();
        assert!(!mailbox.put(1));
        assert!(mailbox.put(2));
        assert!(mailbox.put(3));
        assert_eq!(mailbox.take(), Some(3));
        assert_eq!(mailbox.take(), None);
        assert_eq!(mailbox.dropped(), 2);
    }

    #[tokio::test]
    async fn test_recv_wakes_on_put() {
        let mailbox = Arc::new(Mailbox::new());
        let consumer = {
            let mailbox = Arc::clone(&mailbox);
            tokio::spawn(async move { mailbox.recv().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        mailbox.put("frame");
        let got = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got, Some("frame"));
    }

    #[tokio::test]
    async fn test_close_ends_recv() {
        let mailbox: Arc<Mailbox<u8>> = Arc::new(Mailbox::new());
        let consumer = {
            let mailbox = Arc::clone(&mailbox);
            tokio::spawn(async move { mailbox.recv().await })
        };

        mailbox.close();
        assert!(!mailbox.put(1));
        let got = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got, None);
    }
}
