//! MJPEG-over-HTTP capture source

use futures::StreamExt;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::CaptureConfig;
use crate::source::{CaptureSource, ChunkStream};
use crate::{RelayError, Result};

/// Streams the body of a `multipart/x-mixed-replace` HTTP response.
///
/// The multipart headers are not parsed; the body is handed to the
/// extractor as raw bytes and frames are found by their JPEG markers.
#[derive(Debug, Clone)]
pub struct HttpCaptureSource {
    client: reqwest::Client,
    url: String,
    read_timeout: Duration,
}

impl HttpCaptureSource {
    /// Build a source for `url`.
    ///
    /// `timeout` bounds both the connection attempt and the silence between
    /// two chunks of an open stream.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().connect_timeout(timeout).build()?;
        Ok(Self { client, url: url.into(), read_timeout: timeout })
    }

    pub fn from_config(config: &CaptureConfig) -> Result<Self> {
        Self::new(config.url.clone(), config.connect_timeout())
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait::async_trait]
impl CaptureSource for HttpCaptureSource {
    async fn open(&self) -> Result<ChunkStream> {
        debug!(url = %self.url, "Requesting MJPEG stream");
        let response = self.client.get(&self.url).send().await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(RelayError::connection_failed(format!(
                "{} answered {}",
                self.url, status
            )));
        }

        info!(
            url = %self.url,
            content_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("<none>"),
            "Connected to capture source"
        );

        Ok(response.bytes_stream().map(|chunk| chunk.map_err(RelayError::from)).boxed())
    }

    fn read_timeout(&self) -> Option<Duration> {
        Some(self.read_timeout)
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}
