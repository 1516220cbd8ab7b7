//! UDP datagram sink

use futures::StreamExt;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{info, trace, warn};

use crate::config::UdpSinkConfig;
use crate::datagram::UdpFramer;
use crate::slot::LatestFrameSlot;
use crate::types::{Frame, FrameRate};
use crate::{RelayError, Result};

/// Counters reported when the sink stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UdpSinkStats {
    pub frames: u64,
    pub datagrams: u64,
    /// Frames abandoned part-way because a send failed.
    pub failed: u64,
}

/// Sends every new frame in the slot to a fixed destination.
///
/// Fire-and-forget: nothing is acknowledged or retransmitted. Frames that
/// arrive faster than `frame_rate` are skipped, not queued.
#[derive(Debug, Clone)]
pub struct UdpSink {
    destination: SocketAddr,
    framer: UdpFramer,
    period: Duration,
    slot: LatestFrameSlot,
}

impl UdpSink {
    pub fn new(config: &UdpSinkConfig, frame_rate: FrameRate, slot: LatestFrameSlot) -> Self {
        Self {
            destination: config.destination,
            framer: UdpFramer::new(config.chunk_limit),
            period: frame_rate.interval(),
            slot,
        }
    }

    /// Unbound local socket of the destination's address family.
    pub async fn bind(&self) -> Result<UdpSocket> {
        let local: SocketAddr = if self.destination.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        UdpSocket::bind(local).await.map_err(|source| RelayError::Bind { addr: local, source })
    }

    pub async fn run(self, socket: UdpSocket, cancel: CancellationToken) -> UdpSinkStats {
        info!(
            destination = %self.destination,
            chunk_limit = self.framer.chunk_limit(),
            "UDP sink started"
        );
        let mut stats = UdpSinkStats::default();
        let mut frames = std::pin::pin!(self.slot.frames());

        loop {
            let frame = tokio::select! {
                _ = cancel.cancelled() => break,
                frame = frames.next() => match frame {
                    Some(frame) => frame,
                    None => break,
                },
            };

            match send_frame(&socket, &self.framer, self.destination, &frame).await {
                Ok(sent) => {
                    stats.frames += 1;
                    stats.datagrams += sent as u64;
                    trace!(bytes = frame.len(), datagrams = sent, "Sent frame");
                }
                Err(e) => {
                    stats.failed += 1;
                    warn!("{}; abandoning rest of frame", e);
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.period) => {}
            }
        }

        info!(frames = stats.frames, datagrams = stats.datagrams, failed = stats.failed, "UDP sink stopped");
        stats
    }
}

/// Send `frame` to `destination` as consecutive datagrams.
///
/// Stops at the first failed send; the datagrams already sent are not
/// recalled. Returns the number of datagrams sent.
pub async fn send_frame(
    socket: &UdpSocket,
    framer: &UdpFramer,
    destination: SocketAddr,
    frame: &Frame,
) -> Result<usize> {
    let mut sent = 0;
    for (index, datagram) in framer.encode(frame).enumerate() {
        socket
            .send_to(datagram, destination)
            .await
            .map_err(|source| RelayError::Send { destination, index, source })?;
        sent += 1;
    }
    Ok(sent)
}
