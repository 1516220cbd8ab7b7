//! JPEG frame extraction from an unstructured byte stream
//!
//! The capture source delivers bytes in whatever chunks the network hands us.
//! [`FrameExtractor`] accumulates them and cuts out every complete
//! `SOI ... EOI` run, in the order the end markers appear.
//!
//! Markers are matched heuristically: the first SOI in the buffer opens a frame
//! and the first EOI after it closes it. Nothing is assumed about frame length
//! and the scan never goes backwards.

use bytes::BytesMut;
use tracing::{trace, warn};

use crate::RelayError;
use crate::types::{EOI, Frame, SOI};

/// Default cap on buffered bytes (4 MiB).
pub const DEFAULT_MAX_ACCUMULATOR_BYTES: usize = 4 * 1024 * 1024;

/// Stateful demultiplexer from byte chunks to complete JPEG frames.
///
/// ```rust
/// use mjpeg_relay::FrameExtractor;
///
/// let mut extractor = FrameExtractor::new();
/// assert_eq!(extractor.feed(b"--frame\r\n\xFF\xD8abc").count(), 0);
/// let frames: Vec<_> = extractor.feed(b"\xFF\xD9\r\n").collect();
/// assert_eq!(frames[0].as_bytes(), b"\xFF\xD8abc\xFF\xD9");
/// ```
#[derive(Debug)]
pub struct FrameExtractor {
    buffer: BytesMut,

    /// Offset into `buffer` from which the pending marker search resumes.
    scan_from: usize,

    /// `buffer` starts with an SOI that has not been closed yet.
    in_frame: bool,

    max_bytes: usize,
    overflows: u64,
}

impl Default for FrameExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameExtractor {
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_MAX_ACCUMULATOR_BYTES)
    }

    /// Create an extractor that resets its buffer once it holds more than
    /// `max_bytes` without resolving a frame.
    pub fn with_limit(max_bytes: usize) -> Self {
        Self { buffer: BytesMut::new(), scan_from: 0, in_frame: false, max_bytes, overflows: 0 }
    }

    /// Append `chunk` and return the frames it completes.
    ///
    /// The returned iterator is lazy. Frames it does not yield stay buffered
    /// and come out of the next call, so nothing is lost if it is dropped early.
    pub fn feed(&mut self, chunk: &[u8]) -> Frames<'_> {
        self.buffer.extend_from_slice(chunk);
        Frames { extractor: self }
    }

    /// Cut the next complete frame out of the buffer, if there is one.
    pub fn next_frame(&mut self) -> Option<Frame> {
        if !self.in_frame {
            match find_marker(&self.buffer[self.scan_from..], &SOI) {
                Some(offset) => {
                    let start = self.scan_from + offset;
                    if start > 0 {
                        trace!(discarded = start, "Skipping bytes before start marker");
                        let _ = self.buffer.split_to(start);
                    }
                    self.in_frame = true;
                    self.scan_from = SOI.len();
                }
                None => {
                    // The last byte may be the first half of a split marker.
                    self.scan_from = self.buffer.len().saturating_sub(1);
                    self.enforce_limit();
                    return None;
                }
            }
        }

        match find_marker(&self.buffer[self.scan_from..], &EOI) {
            Some(offset) => {
                let end = self.scan_from + offset + EOI.len();
                let frame = self.buffer.split_to(end).freeze();
                self.in_frame = false;
                self.scan_from = 0;
                trace!(bytes = frame.len(), "Extracted frame");
                Some(Frame::new(frame))
            }
            None => {
                self.scan_from = self.buffer.len().saturating_sub(1).max(SOI.len());
                self.enforce_limit();
                None
            }
        }
    }

    /// Drop all buffered bytes, e.g. after reconnecting to the source.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.scan_from = 0;
        self.in_frame = false;
    }

    /// Number of bytes currently held.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// How many times the buffer has been reset for exceeding its cap.
    pub fn overflow_count(&self) -> u64 {
        self.overflows
    }

    pub fn limit(&self) -> usize {
        self.max_bytes
    }

    fn enforce_limit(&mut self) {
        if self.buffer.len() > self.max_bytes {
            self.overflows += 1;
            warn!(
                buffered = self.buffer.len(),
                pending_frame = self.in_frame,
                "{}; resetting",
                RelayError::Overflow { limit: self.max_bytes }
            );
            self.reset();
        }
    }
}

/// Lazy sequence of frames completed by one [`FrameExtractor::feed`] call.
pub struct Frames<'a> {
    extractor: &'a mut FrameExtractor,
}

impl Iterator for Frames<'_> {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        self.extractor.next_frame()
    }
}

fn find_marker(haystack: &[u8], marker: &[u8; 2]) -> Option<usize> {
    haystack.windows(2).position(|w| w == marker)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{chunk_at, fake_jpeg};
    use proptest::prelude::*;

    #[test]
    fn extracts_frame_from_single_chunk() {
        let mut extractor = FrameExtractor::new();
        let frame = fake_jpeg(b"abc");
        let mut chunk = b"--myboundary\r\nContent-Type: image/jpeg\r\n\r\n".to_vec();
        chunk.extend_from_slice(&frame);
        chunk.extend_from_slice(b"\r\n");

        let frames: Vec<_> = extractor.feed(&chunk).collect();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_bytes(), frame.as_slice());
        assert_eq!(extractor.buffered(), 2);
    }

    #[test]
    fn marker_split_across_chunks() {
        let mut extractor = FrameExtractor::new();
        let frame = fake_jpeg(b"payload");

        // Split inside the SOI, then inside the EOI.
        assert_eq!(extractor.feed(&frame[..1]).count(), 0);
        assert_eq!(extractor.feed(&frame[1..frame.len() - 1]).count(), 0);
        let frames: Vec<_> = extractor.feed(&frame[frame.len() - 1..]).collect();
        assert_eq!(frames, vec![Frame::from(frame)]);
        assert_eq!(extractor.buffered(), 0);
    }

    #[test]
    fn one_feed_yields_every_completed_frame_in_order() {
        let mut extractor = FrameExtractor::new();
        let a = fake_jpeg(b"first");
        let b = fake_jpeg(b"second");
        let c = fake_jpeg(b"third");
        let stream = [a.clone(), b.clone(), c.clone()].concat();

        let frames: Vec<_> = extractor.feed(&stream).collect();
        assert_eq!(frames, vec![Frame::from(a), Frame::from(b), Frame::from(c)]);
    }

    #[test]
    fn unconsumed_frames_survive_a_dropped_iterator() {
        let mut extractor = FrameExtractor::new();
        let a = fake_jpeg(b"a");
        let b = fake_jpeg(b"b");

        let first = extractor.feed(&[a.clone(), b.clone()].concat()).next();
        assert_eq!(first, Some(Frame::from(a)));

        let rest: Vec<_> = extractor.feed(&[]).collect();
        assert_eq!(rest, vec![Frame::from(b)]);
    }

    #[test]
    fn end_marker_before_start_is_ignored() {
        let mut extractor = FrameExtractor::new();
        let frame = fake_jpeg(b"x");
        let mut chunk = vec![0x00, 0xFF, 0xD9, 0x10];
        chunk.extend_from_slice(&frame);

        let frames: Vec<_> = extractor.feed(&chunk).collect();
        assert_eq!(frames, vec![Frame::from(frame)]);
    }

    #[test]
    fn garbage_before_first_frame_yields_no_spurious_frame() {
        let mut extractor = FrameExtractor::new();
        let frame = fake_jpeg(b"real");
        let garbage: Vec<u8> = (0u8..200).filter(|b| *b != 0xFF).collect();

        assert_eq!(extractor.feed(&garbage).count(), 0);
        let frames: Vec<_> = extractor.feed(&frame).collect();
        assert_eq!(frames, vec![Frame::from(frame)]);
    }

    #[test]
    fn prefix_before_pending_start_is_discarded() {
        let mut extractor = FrameExtractor::new();
        let mut chunk = vec![0x11; 100];
        chunk.extend_from_slice(&[0xFF, 0xD8, 0x01, 0x02]);

        assert_eq!(extractor.feed(&chunk).count(), 0);
        assert_eq!(extractor.buffered(), 4);
    }

    #[test]
    fn minimal_frame_is_soi_then_eoi() {
        let mut extractor = FrameExtractor::new();
        let frames: Vec<_> = extractor.feed(&[0xFF, 0xD8, 0xFF, 0xD9]).collect();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].is_delimited());
    }

    #[test]
    fn markerless_stream_is_bounded() {
        let limit = 1024;
        let mut extractor = FrameExtractor::with_limit(limit);
        let chunk = vec![0x42u8; 300];

        for _ in 0..20 {
            assert_eq!(extractor.feed(&chunk).count(), 0);
            assert!(extractor.buffered() <= limit);
        }
        assert!(extractor.overflow_count() > 0);
    }

    #[test]
    fn unterminated_frame_is_reset_at_cap() {
        let limit = 512;
        let mut extractor = FrameExtractor::with_limit(limit);
        assert_eq!(extractor.feed(&[0xFF, 0xD8]).count(), 0);
        for _ in 0..10 {
            let _ = extractor.feed(&[0x01; 100]).count();
            assert!(extractor.buffered() <= limit);
        }
        assert_eq!(extractor.overflow_count(), 1);

        // Extraction resumes with the next complete frame.
        let frame = fake_jpeg(b"after overflow");
        let frames: Vec<_> = extractor.feed(&frame).collect();
        assert_eq!(frames, vec![Frame::from(frame)]);
    }

    proptest! {
        #[test]
        fn arbitrary_chunking_reassembles_every_frame(
            payloads in prop::collection::vec(
                prop::collection::vec(0u8..0xFF, 0..300), 1..8),
            cuts in prop::collection::vec(0usize..4096, 0..24),
        ) {
            let originals: Vec<Vec<u8>> = payloads.iter().map(|p| fake_jpeg(p)).collect();
            let stream = originals.concat();

            let mut extractor = FrameExtractor::new();
            let mut out = Vec::new();
            for chunk in chunk_at(&stream, &cuts) {
                out.extend(extractor.feed(chunk));
            }

            prop_assert_eq!(out.len(), originals.len());
            for (got, want) in out.iter().zip(&originals) {
                prop_assert_eq!(got.as_bytes(), want.as_slice());
            }
        }
    }
}
