//! Shared fixtures for the loopback tests: a fake phone capture server and
//! a small scripted device.

#![allow(dead_code)]

use axum::{Router, body::Body, http::StatusCode, http::header, response::IntoResponse, routing::get};
use bytes::Bytes;
use std::collections::VecDeque;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use mjpeg_relay::{DeviceBridge, LatestFrameSlot};

pub const CAPTURE_BOUNDARY: &str = "phoneboundary";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("mjpeg_relay=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// A decodable JPEG test image.
pub fn test_jpeg(width: u32, height: u32) -> Vec<u8> {
    let image = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x * 7) as u8, (y * 11) as u8, 0x40])
    });
    let mut out = Vec::new();
    image::DynamicImage::ImageRgb8(image)
        .write_with_encoder(image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, 85))
        .expect("encode test image");
    out
}

/// Fake capture endpoint.
///
/// - `/capture` streams `jpeg` as a multipart part every 20 ms, forever
/// - `/unavailable` answers 503
pub struct CaptureServer {
    pub addr: SocketAddr,
    task: JoinHandle<()>,
}

impl CaptureServer {
    pub async fn start(jpeg: Vec<u8>) -> Self {
        let jpeg = Bytes::from(jpeg);
        let router = Router::new()
            .route(
                "/capture",
                get(move || {
                    let jpeg = jpeg.clone();
                    async move { multipart_response(jpeg) }
                }),
            )
            .route("/unavailable", get(|| async { StatusCode::SERVICE_UNAVAILABLE }));

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind capture server");
        let addr = listener.local_addr().expect("capture server addr");
        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        Self { addr, task }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for CaptureServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn multipart_response(jpeg: Bytes) -> impl IntoResponse {
    let parts = futures::stream::unfold(jpeg, |jpeg| async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let mut part = format!("--{CAPTURE_BOUNDARY}\r\nContent-Type: image/jpeg\r\n\r\n").into_bytes();
        part.extend_from_slice(&jpeg);
        part.extend_from_slice(b"\r\n");
        Some((Ok::<_, Infallible>(Bytes::from(part)), jpeg))
    });
    (
        [(header::CONTENT_TYPE, format!("multipart/x-mixed-replace; boundary={CAPTURE_BOUNDARY}"))],
        Body::from_stream(parts),
    )
}

/// Device whose presence follows a script, then stays at the last answer.
pub struct ScriptedDevice {
    probes: VecDeque<bool>,
    last: bool,
    pub forwards: usize,
}

impl ScriptedDevice {
    pub fn new(probes: impl IntoIterator<Item = bool>) -> Self {
        Self { probes: probes.into_iter().collect(), last: false, forwards: 0 }
    }
}

#[async_trait::async_trait]
impl DeviceBridge for ScriptedDevice {
    async fn probe(&mut self) -> bool {
        if let Some(next) = self.probes.pop_front() {
            self.last = next;
        }
        self.last
    }

    async fn forward_port(&mut self, _local_port: u16, _remote_port: u16) {
        self.forwards += 1;
    }
}

pub async fn wait_for_frame(slot: &LatestFrameSlot) -> mjpeg_relay::Frame {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if let Some(frame) = slot.get() {
                return frame;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("no frame within 10s")
}
