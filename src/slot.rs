//! Last-value-wins frame cell shared between the reader and the sinks

use futures::{Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::types::Frame;

/// Holds the most recently produced frame, or nothing.
///
/// Backed by a `watch` channel: every `set` replaces the value under a short
/// write lock and every `get` clones it under a short read lock. Neither side
/// ever waits on the other's progress, and there is no queue, so a slow reader
/// simply sees fewer frames.
///
/// Clones share the same cell.
#[derive(Debug, Clone)]
pub struct LatestFrameSlot {
    tx: Arc<watch::Sender<Option<Frame>>>,
}

impl Default for LatestFrameSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl LatestFrameSlot {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Overwrite the current frame.
    pub fn set(&self, frame: Frame) {
        self.tx.send_replace(Some(frame));
    }

    /// Current frame, or `None` if nothing has been set since creation or
    /// the last [`clear`](Self::clear).
    pub fn get(&self) -> Option<Frame> {
        self.tx.borrow().clone()
    }

    /// Empty the slot so consumers stop re-sending a stale frame.
    pub fn clear(&self) {
        self.tx.send_replace(None);
    }

    /// Raw change notifications, for consumers that react to each new frame.
    pub fn subscribe(&self) -> watch::Receiver<Option<Frame>> {
        self.tx.subscribe()
    }

    /// Frames set after this call. Intermediate values are skipped if the
    /// consumer falls behind.
    pub fn changes(&self) -> impl Stream<Item = Frame> + Send + 'static {
        WatchStream::from_changes(self.subscribe()).filter_map(|frame| async move { frame })
    }

    /// The current frame, if any, followed by [`changes`](Self::changes).
    pub fn frames(&self) -> impl Stream<Item = Frame> + Send + 'static {
        WatchStream::new(self.subscribe()).filter_map(|frame| async move { frame })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn frame(tag: u8) -> Frame {
        Frame::from(vec![0xFF, 0xD8, tag, 0xFF, 0xD9])
    }

    #[test]
    fn empty_until_set() {
        let slot = LatestFrameSlot::new();
        assert_eq!(slot.get(), None);
    }

    #[test]
    fn last_write_wins() {
        let slot = LatestFrameSlot::new();
        slot.set(frame(1));
        slot.set(frame(2));
        assert_eq!(slot.get(), Some(frame(2)));
        // Reads do not consume.
        assert_eq!(slot.get(), Some(frame(2)));
    }

    #[test]
    fn clones_share_the_cell() {
        let writer = LatestFrameSlot::new();
        let reader = writer.clone();
        writer.set(frame(7));
        assert_eq!(reader.get(), Some(frame(7)));
        writer.clear();
        assert_eq!(reader.get(), None);
    }

    #[tokio::test]
    async fn changes_skips_to_latest_for_slow_consumers() {
        let slot = LatestFrameSlot::new();
        let mut changes = Box::pin(slot.changes());

        slot.set(frame(1));
        slot.set(frame(2));
        slot.set(frame(3));

        let next = tokio::time::timeout(Duration::from_secs(1), changes.next())
            .await
            .expect("change notification")
            .expect("stream open");
        assert_eq!(next, frame(3));
    }

    #[tokio::test]
    async fn frames_starts_with_the_current_value() {
        let slot = LatestFrameSlot::new();
        slot.set(frame(4));
        let mut frames = Box::pin(slot.frames());
        assert_eq!(frames.next().await, Some(frame(4)));

        slot.set(frame(5));
        assert_eq!(frames.next().await, Some(frame(5)));
    }

    #[tokio::test]
    async fn concurrent_writer_and_readers() {
        let slot = LatestFrameSlot::new();
        let writer = {
            let slot = slot.clone();
            tokio::spawn(async move {
                for tag in 0..=200u8 {
                    slot.set(frame(tag));
                    tokio::task::yield_now().await;
                }
            })
        };
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let slot = slot.clone();
                tokio::spawn(async move {
                    for _ in 0..200 {
                        if let Some(f) = slot.get() {
                            assert!(f.is_delimited());
                        }
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        writer.await.unwrap();
        for reader in readers {
            reader.await.unwrap();
        }
        assert_eq!(slot.get(), Some(frame(200)));
    }
}
