//! Frame ↔ datagram packetization for the UDP transport
//!
//! # Wire format
//!
//! A frame is sent as consecutive slices of exactly `chunk_limit` bytes
//! followed by one shorter slice holding the remainder. There is no header:
//! the receiver treats any datagram shorter than `chunk_limit` as the last one
//! of the current frame.
//!
//! ```text
//! frame (3000 B, limit 1300)  →  [1300] [1300] [400]
//!                                             └ short: closes the frame
//! ```
//!
//! A frame whose length is an exact multiple of `chunk_limit` ends on a full
//! datagram, which the receiver cannot tell apart from a middle one. It keeps
//! accumulating until the next short datagram and so merges the following
//! frame into this one (which then fails to decode and is dropped). Changing
//! that would need a length prefix, i.e. a new wire format, so both sides keep
//! the behavior as is.

use bytes::{Bytes, BytesMut};
use std::slice::Chunks;
use tracing::{trace, warn};

use crate::extractor::DEFAULT_MAX_ACCUMULATOR_BYTES;
use crate::types::Frame;

/// Default maximum datagram payload.
pub const DEFAULT_CHUNK_LIMIT: usize = 1300;

/// Datagrams of one frame, in send order.
pub type Datagrams<'a> = Chunks<'a, u8>;

/// Splits frames into datagrams of at most `chunk_limit` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpFramer {
    chunk_limit: usize,
}

impl Default for UdpFramer {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_LIMIT)
    }
}

impl UdpFramer {
    /// A zero limit is raised to one byte.
    pub fn new(chunk_limit: usize) -> Self {
        Self { chunk_limit: chunk_limit.max(1) }
    }

    pub fn chunk_limit(&self) -> usize {
        self.chunk_limit
    }

    /// Slice `frame` into datagrams: full `chunk_limit` slices, then the
    /// remainder (between 1 and `chunk_limit` bytes).
    pub fn encode<'a>(&self, frame: &'a Frame) -> Datagrams<'a> {
        frame.as_bytes().chunks(self.chunk_limit)
    }

    /// Number of datagrams `encode` produces for a frame of `len` bytes.
    pub fn datagram_count(&self, len: usize) -> usize {
        len.div_ceil(self.chunk_limit)
    }

    /// Whether a frame of `len` bytes ends on a full datagram and will
    /// therefore not be closed by the receiver on its own.
    pub fn ends_ambiguously(&self, len: usize) -> bool {
        len > 0 && len % self.chunk_limit == 0
    }
}

/// Reassembles frames from datagrams received in arrival order.
#[derive(Debug)]
pub struct UdpDefragmenter {
    buffer: BytesMut,
    chunk_limit: usize,
    max_bytes: usize,
}

impl Default for UdpDefragmenter {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_LIMIT)
    }
}

impl UdpDefragmenter {
    pub fn new(chunk_limit: usize) -> Self {
        Self::with_limit(chunk_limit, DEFAULT_MAX_ACCUMULATOR_BYTES)
    }

    /// Like [`new`](Self::new), but drop the pending buffer once it exceeds
    /// `max_bytes` (a sender of only full-size datagrams never closes a frame).
    pub fn with_limit(chunk_limit: usize, max_bytes: usize) -> Self {
        Self { buffer: BytesMut::new(), chunk_limit: chunk_limit.max(1), max_bytes }
    }

    /// Add one datagram.
    ///
    /// Returns the accumulated candidate frame when `datagram` is shorter than
    /// the chunk limit. The buffer is emptied at that point whatever the
    /// candidate turns out to contain; decoding it is up to the caller.
    pub fn push(&mut self, datagram: &[u8]) -> Option<Bytes> {
        self.buffer.extend_from_slice(datagram);

        if datagram.len() < self.chunk_limit {
            let candidate = self.buffer.split().freeze();
            trace!(bytes = candidate.len(), "Closed frame on short datagram");
            return (!candidate.is_empty()).then_some(candidate);
        }

        if self.buffer.len() > self.max_bytes {
            warn!(
                buffered = self.buffer.len(),
                limit = self.max_bytes,
                "No closing datagram within limit; dropping partial frame"
            );
            self.buffer.clear();
        }
        None
    }

    /// Bytes waiting for a closing datagram.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    pub fn chunk_limit(&self) -> usize {
        self.chunk_limit
    }
}
