//! Capture source implementations

pub mod http;

pub use http::HttpCaptureSource;
