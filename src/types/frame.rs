//! JPEG frame type shared by every stage of the relay

use bytes::Bytes;

/// JPEG Start Of Image marker.
pub const SOI: [u8; 2] = [0xFF, 0xD8];

/// JPEG End Of Image marker.
pub const EOI: [u8; 2] = [0xFF, 0xD9];

/// One complete JPEG image, start marker through end marker inclusive.
///
/// Frames are immutable and cheap to clone (the bytes are reference counted),
/// so the same frame can be handed to the latest-frame slot, the UDP sink and
/// any number of HTTP consumers without copying.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Frame {
    data: Bytes,
}

impl Frame {
    /// Wrap already-delimited JPEG bytes.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    /// Borrow the encoded bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Whether the bytes open with SOI and close with EOI.
    ///
    /// This is a framing check only; it says nothing about whether the
    /// payload in between decodes.
    pub fn is_delimited(&self) -> bool {
        self.data.len() >= 4 && self.data.starts_with(&SOI) && self.data.ends_with(&EOI)
    }
}

impl From<Vec<u8>> for Frame {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl From<Bytes> for Frame {
    fn from(data: Bytes) -> Self {
        Self::new(data)
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}
