//! Error types for the relay.
//!
//! Every failure the relay can hit while running is recoverable: tasks log the
//! error and keep going. `RelayError` exists so that the collaborators
//! (capture source, device bridge, codec, sockets) can report *what* went wrong
//! and so that startup problems (bad config, unbindable address) surface to the
//! binary.
//!
//! ## Error Categories
//!
//! - **Probe**: the device probe command failed or could not be run
//! - **Connection**: the capture source is unreachable or the stream dropped
//! - **Decode**: extracted bytes are not a decodable JPEG image
//! - **Send**: a UDP datagram could not be sent
//! - **Overflow**: the frame accumulator hit its cap without resolving a frame
//!
//! ```rust
//! use mjpeg_relay::RelayError;
//!
//! let error = RelayError::connection_failed("capture source refused connection");
//! assert!(error.is_retryable());
//! for suggestion in error.recovery_suggestions() {
//!     println!("  - {}", suggestion);
//! }
//! ```

use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for relay operations.
pub type Result<T, E = RelayError> = std::result::Result<T, E>;

/// Main error type for relay operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RelayError {
    #[error("Device probe failed: {reason}")]
    Probe {
        reason: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Capture source connection failed: {reason}")]
    Connection {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Frame of {len} bytes failed to decode: {details}")]
    Decode { len: usize, details: String },

    #[error("Failed to send datagram {index} to {destination}")]
    Send {
        destination: SocketAddr,
        index: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("Frame accumulator exceeded {limit} bytes without a complete frame")]
    Overflow { limit: usize },

    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    #[error("Failed to bind {addr}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("I/O error")]
    Io(#[from] std::io::Error),
}

impl RelayError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            RelayError::Probe { .. } => true,
            RelayError::Connection { .. } => true,
            RelayError::Send { .. } => true,
            RelayError::Timeout { .. } => true,
            RelayError::Io(_) => true,
            RelayError::Decode { .. } => false,
            RelayError::Overflow { .. } => false,
            RelayError::Config { .. } => false,
            RelayError::Bind { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            RelayError::Probe { .. } => vec![
                "Ensure adb is installed and on PATH",
                "Check the device is plugged in and authorized",
            ],
            RelayError::Connection { .. } => vec![
                "Check the capture source URL",
                "Verify the port forward to the device is in place",
                "Make sure the capture app is streaming",
            ],
            RelayError::Decode { .. } => vec![
                "Check the capture source emits baseline JPEG frames",
                "Switch to the passthrough codec to skip decoding",
            ],
            RelayError::Send { .. } => vec![
                "Check the UDP destination address is reachable",
                "Lower the chunk limit below the path MTU",
            ],
            RelayError::Overflow { .. } => vec![
                "Verify the capture source is an MJPEG stream",
                "Raise max_accumulator_bytes for very large frames",
            ],
            RelayError::Config { .. } => vec!["Fix the configuration value named in the error"],
            RelayError::Bind { .. } => vec![
                "Check no other process is listening on the address",
                "Use a port above 1024 or run with sufficient privileges",
            ],
            RelayError::Timeout { .. } => vec![
                "Increase the timeout",
                "Check the remote end is responding",
            ],
            RelayError::Io(_) => vec!["Check system resources and permissions"],
        }
    }

    /// Helper constructor for probe failures.
    pub fn probe_failed(reason: impl Into<String>) -> Self {
        RelayError::Probe { reason: reason.into(), source: None }
    }

    /// Helper constructor for probe failures caused by an I/O error.
    pub fn probe_failed_with_source(reason: impl Into<String>, source: std::io::Error) -> Self {
        RelayError::Probe { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for capture connection errors.
    pub fn connection_failed(reason: impl Into<String>) -> Self {
        RelayError::Connection { reason: reason.into(), source: None }
    }

    /// Helper constructor for capture connection errors with source.
    pub fn connection_failed_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        RelayError::Connection { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for decode failures.
    pub fn decode_failed(len: usize, details: impl Into<String>) -> Self {
        RelayError::Decode { len, details: details.into() }
    }

    /// Helper constructor for configuration errors.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        RelayError::Config { reason: reason.into() }
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        let reason = if err.is_timeout() {
            "request timed out"
        } else if err.is_connect() {
            "could not connect"
        } else if err.is_body() {
            "stream body error"
        } else {
            "request failed"
        };
        RelayError::connection_failed_with_source(reason, Box::new(err))
    }
}

impl From<serde_yaml_ng::Error> for RelayError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        RelayError::Config { reason: err.to_string() }
    }
}
