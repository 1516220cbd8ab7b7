//! Rate-capped multipart chunk stream over the latest-frame slot

use bytes::{BufMut, Bytes, BytesMut};
use futures::{Stream, ready};
use pin_project_lite::pin_project;
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::{Instant, Sleep, sleep_until};
use tokio_util::sync::CancellationToken;

use crate::slot::LatestFrameSlot;
use crate::types::Frame;

/// `Content-Type` header value for a stream using `boundary`.
pub fn content_type(boundary: &str) -> String {
    format!("multipart/x-mixed-replace; boundary={boundary}")
}

/// Frame one JPEG as a multipart part:
/// `--boundary\r\nContent-Type: image/jpeg\r\n\r\n<bytes>\r\n`.
pub fn multipart_chunk(boundary: &str, frame: &Frame) -> Bytes {
    const PART_HEADER: &[u8] = b"\r\nContent-Type: image/jpeg\r\n\r\n";

    let mut chunk = BytesMut::with_capacity(2 + boundary.len() + PART_HEADER.len() + frame.len() + 2);
    chunk.put_slice(b"--");
    chunk.put_slice(boundary.as_bytes());
    chunk.put_slice(PART_HEADER);
    chunk.put_slice(frame.as_bytes());
    chunk.put_slice(b"\r\n");
    chunk.freeze()
}

pin_project! {
    /// Endless stream of multipart parts, one per tick, each carrying whatever
    /// the slot holds at that moment.
    ///
    /// Ticks with an empty slot emit nothing. The same frame is re-sent if the
    /// producer is slower than the tick rate, and intermediate frames are
    /// skipped if it is faster. The stream ends at the first tick after
    /// `cancel` fires.
    pub struct MultipartStream {
        #[pin]
        sleep: Sleep,
        period: Duration,
        slot: LatestFrameSlot,
        boundary: String,
        cancel: CancellationToken,
    }
}

impl MultipartStream {
    pub fn new(
        slot: LatestFrameSlot,
        boundary: impl Into<String>,
        period: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            sleep: sleep_until(Instant::now()),
            period,
            slot,
            boundary: boundary.into(),
            cancel,
        }
    }
}

impl Stream for MultipartStream {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            ready!(this.sleep.as_mut().poll(cx));

            if this.cancel.is_cancelled() {
                return Poll::Ready(None);
            }

            // Fixed rate, but never schedule into the past (no catch-up bursts).
            let next = (this.sleep.deadline() + *this.period).max(Instant::now());
            this.sleep.as_mut().reset(next);

            if let Some(frame) = this.slot.get() {
                return Poll::Ready(Some(Ok(multipart_chunk(this.boundary, &frame))));
            }
            // Empty slot: skip this tick. Polling the re-armed sleep registers the waker.
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn frame(tag: u8) -> Frame {
        Frame::from(vec![0xFF, 0xD8, tag, 0xFF, 0xD9])
    }

    #[test]
    fn chunk_layout() {
        let chunk = multipart_chunk("myboundary", &frame(9));
        let mut expected = b"--myboundary\r\nContent-Type: image/jpeg\r\n\r\n".to_vec();
        expected.extend_from_slice(&[0xFF, 0xD8, 9, 0xFF, 0xD9]);
        expected.extend_from_slice(b"\r\n");
        assert_eq!(chunk.as_ref(), expected.as_slice());
        assert_eq!(content_type("b"), "multipart/x-mixed-replace; boundary=b");
    }

    #[tokio::test(start_paused = true)]
    async fn empty_slot_emits_nothing() {
        let slot = LatestFrameSlot::new();
        let mut stream = std::pin::pin!(MultipartStream::new(
            slot.clone(),
            "b",
            Duration::from_millis(10),
            CancellationToken::new()
        ));

        let waited = tokio::time::timeout(Duration::from_millis(100), stream.next()).await;
        assert!(waited.is_err(), "no part expected while the slot is empty");

        slot.set(frame(1));
        let part = stream.next().await.expect("part").unwrap();
        assert!(part.ends_with(&[0xFF, 0xD9, b'\r', b'\n']));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_producer_frame_is_resent() {
        let slot = LatestFrameSlot::new();
        slot.set(frame(5));
        let stream =
            MultipartStream::new(slot, "b", Duration::from_millis(33), CancellationToken::new());

        let parts: Vec<_> = stream.take(3).map(|p| p.unwrap()).collect().await;
        assert_eq!(parts.len(), 3);
        assert!(parts.iter().all(|p| p == &parts[0]));
    }

    #[tokio::test(start_paused = true)]
    async fn emission_is_rate_capped() {
        let slot = LatestFrameSlot::new();
        slot.set(frame(1));
        let period = Duration::from_millis(50);
        let mut stream =
            std::pin::pin!(MultipartStream::new(slot, "b", period, CancellationToken::new()));

        let start = Instant::now();
        for _ in 0..5 {
            stream.next().await.expect("part").unwrap();
        }
        // First part is immediate, the next four are one period apart.
        assert!(start.elapsed() >= period * 4);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_ends_stream() {
        let slot = LatestFrameSlot::new();
        slot.set(frame(1));
        let cancel = CancellationToken::new();
        let mut stream =
            std::pin::pin!(MultipartStream::new(slot, "b", Duration::from_millis(10), cancel.clone()));

        assert!(stream.next().await.is_some());
        cancel.cancel();
        assert!(stream.next().await.is_none());
    }
}
