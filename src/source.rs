//! Capture source trait

use bytes::Bytes;
use futures::stream::BoxStream;
use std::time::Duration;

use crate::Result;

/// Byte chunks as they arrive from the capture source, in arbitrary,
/// non-frame-aligned boundaries.
pub type ChunkStream = BoxStream<'static, Result<Bytes>>;

/// Where the relay reads its MJPEG bytes from.
///
/// The reader task calls [`open`](CaptureSource::open) once per connection
/// attempt and reads the returned stream until it ends or fails, then waits
/// and opens again. Implementations do not retry on their own.
#[async_trait::async_trait]
pub trait CaptureSource: Send + Sync + 'static {
    /// Open a fresh connection.
    ///
    /// Returns:
    /// - `Ok(stream)` - connected; chunks follow
    /// - `Err(e)` - source unreachable or refused the request
    async fn open(&self) -> Result<ChunkStream>;

    /// Longest silence tolerated on an open stream before it is treated as dropped.
    fn read_timeout(&self) -> Option<Duration> {
        None
    }

    /// Human-readable location for logs.
    fn describe(&self) -> String;
}
