//! Relay configuration
//!
//! Loaded from YAML; every field has a default, so an empty document is a
//! valid configuration that relays `http://127.0.0.1:9999/capture` to both
//! an HTTP multipart endpoint and a UDP destination.
//!
//! ```yaml
//! monitor:
//!   poll_interval_ms: 2000
//! capture:
//!   url: http://127.0.0.1:9999/capture
//! frame_rate: 30
//! http:
//!   bind: 0.0.0.0:9998
//!   path: /capture
//! udp:
//!   destination: 127.0.0.1:5454
//!   chunk_limit: 1300
//! ```

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::codec::CodecKind;
use crate::datagram::DEFAULT_CHUNK_LIMIT;
use crate::extractor::DEFAULT_MAX_ACCUMULATOR_BYTES;
use crate::types::FrameRate;
use crate::{RelayError, Result};

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelayConfig {
    pub monitor: MonitorConfig,
    pub capture: CaptureConfig,
    pub codec: CodecKind,
    pub frame_rate: FrameRate,
    /// HTTP multipart sink; `null` disables it.
    pub http: Option<HttpSinkConfig>,
    /// UDP sink; `null` disables it.
    pub udp: Option<UdpSinkConfig>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            monitor: MonitorConfig::default(),
            capture: CaptureConfig::default(),
            codec: CodecKind::default(),
            frame_rate: FrameRate::default(),
            http: Some(HttpSinkConfig::default()),
            udp: Some(UdpSinkConfig::default()),
        }
    }
}

/// Device polling and port forwarding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonitorConfig {
    pub poll_interval_ms: u64,
    /// Local end of the device port forward.
    pub local_port: u16,
    /// Device end of the port forward.
    pub remote_port: u16,
    /// Restart the adb server once before monitoring starts.
    pub restart_server: bool,
    pub adb_path: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2000,
            local_port: 9999,
            remote_port: 9999,
            restart_server: false,
            adb_path: "adb".to_string(),
        }
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Upstream MJPEG source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CaptureConfig {
    pub url: String,
    pub connect_timeout_ms: u64,
    pub retry_delay_ms: u64,
    pub max_accumulator_bytes: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:9999/capture".to_string(),
            connect_timeout_ms: 5000,
            retry_delay_ms: 2000,
            max_accumulator_bytes: DEFAULT_MAX_ACCUMULATOR_BYTES,
        }
    }
}

impl CaptureConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpSinkConfig {
    pub bind: SocketAddr,
    pub path: String,
    pub boundary: String,
}

impl Default for HttpSinkConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 9998)),
            path: "/capture".to_string(),
            boundary: "myboundary".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UdpSinkConfig {
    pub destination: SocketAddr,
    pub chunk_limit: usize,
}

impl Default for UdpSinkConfig {
    fn default() -> Self {
        Self { destination: SocketAddr::from(([127, 0, 0, 1], 5454)), chunk_limit: DEFAULT_CHUNK_LIMIT }
    }
}

impl RelayConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: RelayConfig =
            if yaml.trim().is_empty() { RelayConfig::default() } else { serde_yaml_ng::from_str(yaml)? };
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            RelayError::invalid_config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_yaml(&yaml)
    }

    /// Reject values the relay cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.monitor.poll_interval_ms == 0 {
            return Err(RelayError::invalid_config("monitor.poll_interval_ms must be positive"));
        }
        if self.frame_rate.fps() == 0 {
            return Err(RelayError::invalid_config("frame_rate must be positive"));
        }
        if self.capture.url.is_empty() {
            return Err(RelayError::invalid_config("capture.url is empty"));
        }
        if let Some(http) = &self.http {
            if !http.path.starts_with('/') {
                return Err(RelayError::invalid_config(format!(
                    "http.path must start with '/', got {:?}",
                    http.path
                )));
            }
            if http.boundary.is_empty() || http.boundary.contains(['\r', '\n']) {
                return Err(RelayError::invalid_config(
                    "http.boundary must be a non-empty single line",
                ));
            }
        }
        if let Some(udp) = &self.udp {
            if udp.chunk_limit == 0 {
                return Err(RelayError::invalid_config("udp.chunk_limit must be positive"));
            }
            if self.capture.max_accumulator_bytes < udp.chunk_limit {
                return Err(RelayError::invalid_config(
                    "capture.max_accumulator_bytes is smaller than udp.chunk_limit",
                ));
            }
        }
        Ok(())
    }
}
