//! Opaque JPEG codec used to validate and normalize extracted frames

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::types::Frame;
use crate::{RelayError, Result};

/// Turns candidate frame bytes into a frame fit to relay.
///
/// An `Err` means the bytes are not a usable image; callers drop the frame
/// and carry on.
pub trait FrameCodec: Send + Sync + 'static {
    fn transcode(&self, frame: Frame) -> Result<Frame>;
}

/// Decodes each frame and re-encodes it as a baseline JPEG.
#[derive(Debug, Clone, Copy)]
pub struct ImageCodec {
    quality: u8,
}

impl ImageCodec {
    pub const DEFAULT_QUALITY: u8 = 80;

    pub fn new() -> Self {
        Self { quality: Self::DEFAULT_QUALITY }
    }
}

impl Default for ImageCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameCodec for ImageCodec {
    fn transcode(&self, frame: Frame) -> Result<Frame> {
        let decoded = image::load_from_memory_with_format(frame.as_bytes(), ImageFormat::Jpeg)
            .map_err(|e| RelayError::decode_failed(frame.len(), e.to_string()))?;

        // JPEG has no alpha; anything that is not already grey or RGB goes to RGB.
        let decoded = match decoded {
            DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_) => decoded,
            other => DynamicImage::ImageRgb8(other.to_rgb8()),
        };

        let mut out = Vec::with_capacity(frame.len());
        decoded
            .write_with_encoder(JpegEncoder::new_with_quality(&mut out, self.quality))
            .map_err(|e| RelayError::decode_failed(frame.len(), format!("re-encode: {e}")))?;
        Ok(Frame::from(out))
    }
}

/// Forwards frames untouched after a framing check.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughCodec;

impl FrameCodec for PassthroughCodec {
    fn transcode(&self, frame: Frame) -> Result<Frame> {
        if frame.is_delimited() {
            Ok(frame)
        } else {
            Err(RelayError::decode_failed(frame.len(), "missing SOI/EOI markers"))
        }
    }
}

/// Codec selection as written in the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecKind {
    #[default]
    Transcode,
    Passthrough,
}

impl CodecKind {
    pub fn build(self) -> Arc<dyn FrameCodec> {
        match self {
            CodecKind::Transcode => Arc::new(ImageCodec::new()),
            CodecKind::Passthrough => Arc::new(PassthroughCodec),
        }
    }
}
