//! Downstream UDP consumer
//!
//! Reassembles frames sent by [`UdpSink`](crate::sinks::UdpSink) and
//! publishes them into a [`LatestFrameSlot`] for whatever displays or
//! forwards them.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::codec::FrameCodec;
use crate::datagram::UdpDefragmenter;
use crate::slot::LatestFrameSlot;
use crate::types::Frame;
use crate::{RelayError, Result};

const RECV_BUFFER_BYTES: usize = 65536;

/// Counters reported when the receiver stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiverStats {
    pub datagrams: u64,
    pub frames: u64,
    /// Reassembled buffers that did not decode.
    pub dropped: u64,
}

pub struct UdpReceiver {
    socket: UdpSocket,
    defrag: UdpDefragmenter,
    idle_timeout: Duration,
}

impl UdpReceiver {
    pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(5);

    pub async fn bind(addr: SocketAddr, chunk_limit: usize) -> Result<Self> {
        let socket = UdpSocket::bind(addr).await.map_err(|source| RelayError::Bind { addr, source })?;
        Ok(Self {
            socket,
            defrag: UdpDefragmenter::new(chunk_limit),
            idle_timeout: Self::DEFAULT_IDLE_TIMEOUT,
        })
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Receive until `cancel` fires.
    ///
    /// Silence longer than the idle timeout is logged and otherwise ignored.
    /// Receive errors are logged and the loop continues.
    pub async fn run(
        mut self,
        codec: Arc<dyn FrameCodec>,
        slot: LatestFrameSlot,
        cancel: CancellationToken,
    ) -> ReceiverStats {
        info!(
            addr = ?self.socket.local_addr().ok(),
            chunk_limit = self.defrag.chunk_limit(),
            "UDP receiver started"
        );
        let mut stats = ReceiverStats::default();
        let mut buf = vec![0u8; RECV_BUFFER_BYTES];

        loop {
            let received = tokio::select! {
                _ = cancel.cancelled() => break,
                received = tokio::time::timeout(self.idle_timeout, self.socket.recv_from(&mut buf)) => received,
            };

            let len = match received {
                Ok(Ok((len, _peer))) => len,
                Ok(Err(e)) => {
                    warn!("UDP receive failed: {}", e);
                    continue;
                }
                Err(_) => {
                    warn!(
                        pending = self.defrag.pending(),
                        "No datagram for {:?}; still listening", self.idle_timeout
                    );
                    continue;
                }
            };
            stats.datagrams += 1;

            let Some(candidate) = self.defrag.push(&buf[..len]) else {
                continue;
            };
            let codec = Arc::clone(&codec);
            let candidate = Frame::from(candidate);
            match tokio::task::spawn_blocking(move || codec.transcode(candidate)).await {
                Ok(Ok(frame)) => {
                    stats.frames += 1;
                    debug!(bytes = frame.len(), "Received frame");
                    slot.set(frame);
                }
                Ok(Err(e)) => {
                    stats.dropped += 1;
                    warn!("Dropping received frame: {}", e);
                }
                Err(e) => {
                    stats.dropped += 1;
                    warn!("Codec task failed: {}", e);
                }
            }
        }

        info!(
            datagrams = stats.datagrams,
            frames = stats.frames,
            dropped = stats.dropped,
            "UDP receiver stopped"
        );
        stats
    }
}
