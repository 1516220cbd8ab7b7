//! Capture reader task
//!
//! Owns the connection to the capture source and the [`FrameExtractor`].
//! Every extracted frame is passed through the codec and, if it survives,
//! published to the [`LatestFrameSlot`]. Connection failures never end the
//! task: it logs, waits `retry_delay`, and connects again until cancelled.

use bytes::Bytes;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::codec::FrameCodec;
use crate::extractor::FrameExtractor;
use crate::slot::LatestFrameSlot;
use crate::source::{CaptureSource, ChunkStream};
use crate::types::Frame;
use crate::{RelayError, Result};

/// Counters reported when the reader stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderStats {
    /// Successful `open` calls on the source.
    pub connections: u64,
    /// Frames published to the slot.
    pub frames: u64,
    /// Extracted frames the codec rejected.
    pub dropped: u64,
}

/// Pulls bytes from a [`CaptureSource`] and keeps a slot filled with frames.
pub struct FrameReader {
    source: Arc<dyn CaptureSource>,
    codec: Arc<dyn FrameCodec>,
    slot: LatestFrameSlot,
    retry_delay: Duration,
    max_accumulator_bytes: usize,
}

impl FrameReader {
    pub fn new(
        source: Arc<dyn CaptureSource>,
        codec: Arc<dyn FrameCodec>,
        slot: LatestFrameSlot,
        retry_delay: Duration,
        max_accumulator_bytes: usize,
    ) -> Self {
        Self { source, codec, slot, retry_delay, max_accumulator_bytes }
    }

    /// Run on the current runtime until `cancel` fires.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<ReaderStats> {
        tokio::spawn(self.run(cancel))
    }

    pub async fn run(self, cancel: CancellationToken) -> ReaderStats {
        info!(source = %self.source.describe(), "Frame reader started");
        let mut extractor = FrameExtractor::with_limit(self.max_accumulator_bytes);
        let mut stats = ReaderStats::default();

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let opened = tokio::select! {
                _ = cancel.cancelled() => break,
                opened = self.source.open() => opened,
            };

            match opened {
                Ok(stream) => {
                    stats.connections += 1;
                    extractor.reset();
                    let result = self.pump(stream, &mut extractor, &mut stats, &cancel).await;
                    if cancel.is_cancelled() {
                        break;
                    }
                    match result {
                        Ok(()) => info!("Capture stream ended; reconnecting in {:?}", self.retry_delay),
                        Err(e) => warn!("Capture stream dropped: {}; reconnecting in {:?}", e, self.retry_delay),
                    }
                }
                Err(e) => {
                    warn!("Connection issue: {}; retrying in {:?}", e, self.retry_delay);
                }
            }

            // Fixed delay, no backoff growth, no retry limit.
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.retry_delay) => {}
            }
        }

        info!(
            connections = stats.connections,
            frames = stats.frames,
            dropped = stats.dropped,
            "Frame reader stopped"
        );
        stats
    }

    /// Read one connection until it ends, fails, or `cancel` fires.
    async fn pump(
        &self,
        mut stream: ChunkStream,
        extractor: &mut FrameExtractor,
        stats: &mut ReaderStats,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let read_timeout = self.source.read_timeout();

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                next = next_chunk(&mut stream, read_timeout) => next?,
            };
            let Some(chunk) = next else {
                return Ok(());
            };
            trace!(bytes = chunk.len(), "Capture chunk");

            let candidates: Vec<Frame> = extractor.feed(&chunk).collect();
            for candidate in candidates {
                self.publish(candidate, stats).await;
            }
        }
    }

    async fn publish(&self, candidate: Frame, stats: &mut ReaderStats) {
        let codec = Arc::clone(&self.codec);
        let len = candidate.len();

        // Decoding is CPU work; keep it off the async workers.
        match tokio::task::spawn_blocking(move || codec.transcode(candidate)).await {
            Ok(Ok(frame)) => {
                stats.frames += 1;
                debug!(bytes = len, encoded = frame.len(), "Publishing frame");
                self.slot.set(frame);
            }
            Ok(Err(e)) => {
                stats.dropped += 1;
                warn!("Dropping frame: {}", e);
            }
            Err(e) => {
                stats.dropped += 1;
                error!("Codec task failed: {}", e);
            }
        }
    }
}

async fn next_chunk(stream: &mut ChunkStream, read_timeout: Option<Duration>) -> Result<Option<Bytes>> {
    let next = match read_timeout {
        Some(duration) => tokio::time::timeout(duration, stream.next())
            .await
            .map_err(|_| RelayError::Timeout { duration })?,
        None => stream.next().await,
    };
    next.transpose()
}
