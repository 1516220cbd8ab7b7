//! Stream adapters used by the sinks

pub mod multipart;

pub use multipart::{MultipartStream, content_type, multipart_chunk};
