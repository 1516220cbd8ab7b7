//! HTTP multipart (MJPEG) sink

use axum::{
    Router,
    body::Body,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    routing::get,
};
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use tracing::{debug, info, warn};

use crate::config::HttpSinkConfig;
use crate::slot::LatestFrameSlot;
use crate::stream::{MultipartStream, content_type};
use crate::types::FrameRate;
use crate::{RelayError, Result};

/// How long open streams get to end on their own after cancel before their
/// connections are closed.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Serves the latest frame to any number of HTTP clients.
///
/// Each `GET` on the configured path gets its own [`MultipartStream`], so
/// clients are paced independently and never block the producer.
#[derive(Debug, Clone)]
pub struct HttpMultipartSink {
    config: HttpSinkConfig,
    period: Duration,
    slot: LatestFrameSlot,
}

struct StreamState {
    slot: LatestFrameSlot,
    boundary: String,
    period: Duration,
    cancel: CancellationToken,
}

impl HttpMultipartSink {
    pub fn new(config: HttpSinkConfig, frame_rate: FrameRate, slot: LatestFrameSlot) -> Self {
        Self { config, period: frame_rate.interval(), slot }
    }

    /// Router with the stream endpoint. Streams end once `cancel` fires.
    pub fn router(&self, cancel: CancellationToken) -> Router {
        let state = Arc::new(StreamState {
            slot: self.slot.clone(),
            boundary: self.config.boundary.clone(),
            period: self.period,
            cancel,
        });
        Router::new().route(&self.config.path, get(stream_handler)).with_state(state)
    }

    pub async fn bind(&self) -> Result<TcpListener> {
        TcpListener::bind(self.config.bind)
            .await
            .map_err(|source| RelayError::Bind { addr: self.config.bind, source })
    }

    /// Serve on `listener` until `cancel` fires and every open stream has ended.
    ///
    /// Streams end at their next tick after cancel. A client that stopped
    /// reading never lets its stream be polled again, so connections still
    /// open [`DRAIN_TIMEOUT`] after cancel are closed.
    pub async fn serve(self, listener: TcpListener, cancel: CancellationToken) -> Result<()> {
        let addr: SocketAddr = listener.local_addr()?;
        info!("HTTP multipart sink on http://{}{}", addr, self.config.path);

        let abort = CancellationToken::new();
        let listener = ClosingListener { inner: listener, abort: abort.clone() };
        let router = self.router(cancel.clone());
        let server = axum::serve(listener, router).with_graceful_shutdown(cancel.clone().cancelled_owned());
        let mut server = std::pin::pin!(server.into_future());

        let drained = tokio::select! {
            result = &mut server => Some(result),
            _ = async {
                cancel.cancelled().await;
                tokio::time::sleep(DRAIN_TIMEOUT).await;
            } => None,
        };
        match drained {
            Some(result) => result?,
            None => {
                warn!("Closing HTTP clients still attached {:?} after stop", DRAIN_TIMEOUT);
                abort.cancel();
                server.await?;
            }
        }

        info!("HTTP multipart sink stopped");
        Ok(())
    }
}

/// TCP listener whose connections fail every read and write once `abort`
/// fires.
struct ClosingListener {
    inner: TcpListener,
    abort: CancellationToken,
}

impl axum::serve::Listener for ClosingListener {
    type Io = ClosingStream;
    type Addr = SocketAddr;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        loop {
            match self.inner.accept().await {
                Ok((stream, addr)) => {
                    let abort = Box::pin(self.abort.clone().cancelled_owned());
                    return (ClosingStream { inner: stream, abort }, addr);
                }
                Err(e) => {
                    warn!("HTTP accept failed: {}", e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    fn local_addr(&self) -> io::Result<Self::Addr> {
        self.inner.local_addr()
    }
}

struct ClosingStream {
    inner: TcpStream,
    abort: Pin<Box<WaitForCancellationFutureOwned>>,
}

impl ClosingStream {
    /// Registers for the abort wakeup as a side effect.
    fn poll_aborted(&mut self, cx: &mut Context<'_>) -> io::Result<()> {
        match self.abort.as_mut().poll(cx) {
            Poll::Ready(()) => Err(io::ErrorKind::ConnectionAborted.into()),
            Poll::Pending => Ok(()),
        }
    }
}

impl AsyncRead for ClosingStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.poll_aborted(cx)?;
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for ClosingStream {
    fn poll_write(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        self.poll_aborted(cx)?;
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_write_vectored(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        self.poll_aborted(cx)?;
        Pin::new(&mut self.inner).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.poll_aborted(cx)?;
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

async fn stream_handler(State(state): State<Arc<StreamState>>) -> Response {
    debug!("HTTP client attached");
    let parts = MultipartStream::new(
        state.slot.clone(),
        state.boundary.clone(),
        state.period,
        state.cancel.clone(),
    );

    (
        [
            (header::CONTENT_TYPE, content_type(&state.boundary)),
            (header::CACHE_CONTROL, "no-cache".to_string()),
        ],
        Body::from_stream(parts),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Frame;
    use futures::StreamExt;
    use tokio::io::AsyncWriteExt;

    fn sink_config() -> HttpSinkConfig {
        HttpSinkConfig {
            bind: SocketAddr::from(([127, 0, 0, 1], 0)),
            path: "/capture".to_string(),
            boundary: "testboundary".to_string(),
        }
    }

    #[tokio::test]
    async fn serves_multipart_frames_and_stops_on_cancel() {
        let slot = LatestFrameSlot::new();
        let frame = Frame::from(vec![0xFF, 0xD8, 0x42, 0xFF, 0xD9]);
        slot.set(frame.clone());

        let sink = HttpMultipartSink::new(sink_config(), FrameRate::new(50).unwrap(), slot);
        let listener = sink.bind().await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let server = tokio::spawn(sink.serve(listener, cancel.clone()));

        let response = reqwest::get(format!("http://{addr}/capture")).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        assert_eq!(
            response.headers()[reqwest::header::CONTENT_TYPE],
            "multipart/x-mixed-replace; boundary=testboundary"
        );

        let mut body = response.bytes_stream();
        let mut received = Vec::new();
        while received.len() < 2 * 50 {
            let chunk = tokio::time::timeout(Duration::from_secs(2), body.next())
                .await
                .expect("chunk in time")
                .expect("stream open")
                .unwrap();
            received.extend_from_slice(&chunk);
        }
        let expected_head = b"--testboundary\r\nContent-Type: image/jpeg\r\n\r\n";
        assert!(received.starts_with(expected_head));
        assert!(received.windows(frame.len()).any(|w| w == frame.as_bytes()));

        cancel.cancel();
        // The body ends at the next tick, then the server shuts down.
        tokio::time::timeout(Duration::from_secs(2), async {
            while let Some(chunk) = body.next().await {
                chunk.unwrap();
            }
        })
        .await
        .expect("body should end after cancel");
        tokio::time::timeout(Duration::from_secs(2), server)
            .await
            .expect("server should stop")
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn stops_with_a_client_that_never_reads() {
        let slot = LatestFrameSlot::new();
        slot.set(Frame::from(crate::test_utils::fake_jpeg(&vec![0x5A; 2 * 1024 * 1024])));

        let sink = HttpMultipartSink::new(sink_config(), FrameRate::new(30).unwrap(), slot);
        let listener = sink.bind().await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let server = tokio::spawn(sink.serve(listener, cancel.clone()));

        let mut client = tokio::net::TcpStream::connect(addr).await.unwrap();
        client
            .write_all(b"GET /capture HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();
        // Let the response fill both socket buffers.
        tokio::time::sleep(Duration::from_millis(500)).await;

        cancel.cancel();
        tokio::time::timeout(DRAIN_TIMEOUT + Duration::from_secs(4), server)
            .await
            .expect("server should stop with a stalled client attached")
            .unwrap()
            .unwrap();
        drop(client);
    }

    #[tokio::test]
    async fn unknown_path_is_not_found() {
        let sink = HttpMultipartSink::new(sink_config(), FrameRate::DEFAULT, LatestFrameSlot::new());
        let listener = sink.bind().await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let server = tokio::spawn(sink.serve(listener, cancel.clone()));

        let response = reqwest::get(format!("http://{addr}/other")).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);

        cancel.cancel();
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn bind_conflict_is_reported() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut config = sink_config();
        config.bind = taken.local_addr().unwrap();

        let sink = HttpMultipartSink::new(config, FrameRate::DEFAULT, LatestFrameSlot::new());
        assert!(matches!(sink.bind().await, Err(RelayError::Bind { .. })));
    }
}
