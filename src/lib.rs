//! Live MJPEG relay gated on device presence.
//!
//! Reads a JPEG stream from a capture source, cuts it into frames and fans
//! the latest frame out over HTTP multipart and UDP datagrams. Relaying only
//! runs while the upstream device is attached.
//!
//! # Pieces
//!
//! - [`FrameExtractor`] turns arbitrary byte chunks into complete JPEG frames
//! - [`UdpFramer`] / [`UdpDefragmenter`] split frames into datagrams and back
//! - [`LatestFrameSlot`] holds the newest frame for every sink
//! - [`HttpMultipartSink`] and [`UdpSink`] serve the slot
//! - [`RelaySession`] owns the reader and sinks of one active relay
//! - [`ConnectionMonitor`] polls the device and starts/stops the session
//!
//! # Example
//!
//! ```rust
//! use mjpeg_relay::FrameExtractor;
//!
//! let mut extractor = FrameExtractor::new();
//! let stream = [b"--boundary\r\n".as_slice(), &[0xFF, 0xD8, 0x01, 0xFF, 0xD9]].concat();
//!
//! // Split anywhere; frames come out whole.
//! assert_eq!(extractor.feed(&stream[..13]).count(), 0);
//! let frames: Vec<_> = extractor.feed(&stream[13..]).collect();
//! assert_eq!(frames[0].as_bytes(), &[0xFF, 0xD8, 0x01, 0xFF, 0xD9]);
//! ```

// Core types and error handling
mod error;
#[cfg_attr(any(test, feature = "benchmark"), path = "test_utils.rs")]
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Framing
pub mod codec;
pub mod datagram;
pub mod extractor;
pub mod slot;
pub mod stream;

// Relay pipeline
pub mod config;
pub mod device;
pub mod monitor;
pub mod reader;
pub mod receiver;
pub mod session;
pub mod sinks;
pub mod source;
pub mod sources;

pub use error::*;
pub use types::*;

pub use codec::{CodecKind, FrameCodec, ImageCodec, PassthroughCodec};
pub use config::RelayConfig;
pub use datagram::{UdpDefragmenter, UdpFramer};
pub use device::{AdbBridge, DeviceBridge};
pub use extractor::FrameExtractor;
pub use monitor::{ConnectionMonitor, MonitorHandle};
pub use reader::{FrameReader, ReaderStats};
pub use receiver::{ReceiverStats, UdpReceiver};
pub use session::{RelayControl, RelaySession};
pub use sinks::{HttpMultipartSink, UdpSink};
pub use slot::LatestFrameSlot;
pub use source::CaptureSource;
pub use sources::HttpCaptureSource;
