//! Transport sinks fed from the latest-frame slot
//!
//! - [`HttpMultipartSink`] serves the slot as `multipart/x-mixed-replace`
//! - [`UdpSink`] sends each new frame as a datagram sequence

pub mod http;
pub mod udp;

pub use http::HttpMultipartSink;
pub use udp::{UdpSink, UdpSinkStats};
