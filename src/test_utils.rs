//! Test utilities: synthetic frames and scripted collaborators
//!
//! Shared by the unit tests and the benchmarks. Nothing here touches a real
//! device or capture server.

#![cfg(any(test, feature = "benchmark"))]

use bytes::Bytes;
use futures::StreamExt;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::device::DeviceBridge;
use crate::session::RelayControl;
use crate::source::{CaptureSource, ChunkStream};
use crate::types::{EOI, SOI};
use crate::{RelayError, Result};

/// `payload` wrapped in SOI/EOI markers.
///
/// Only a real frame if `payload` contains no `0xFF 0xD9` of its own; tests
/// generating payloads should avoid `0xFF` entirely.
pub fn fake_jpeg(payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(payload.len() + 4);
    frame.extend_from_slice(&SOI);
    frame.extend_from_slice(payload);
    frame.extend_from_slice(&EOI);
    frame
}

/// Split `data` at the given offsets. Offsets are taken modulo the length,
/// sorted and deduplicated, so any list of numbers is a valid chunking.
pub fn chunk_at<'a>(data: &'a [u8], cuts: &[usize]) -> Vec<&'a [u8]> {
    if data.is_empty() {
        return vec![data];
    }
    let mut cuts: Vec<usize> = cuts.iter().map(|c| c % data.len()).filter(|c| *c > 0).collect();
    cuts.sort_unstable();
    cuts.dedup();

    let mut chunks = Vec::with_capacity(cuts.len() + 1);
    let mut start = 0;
    for cut in cuts {
        chunks.push(&data[start..cut]);
        start = cut;
    }
    chunks.push(&data[start..]);
    chunks
}

/// A real, decodable `width` x `height` RGB JPEG.
pub fn encoded_jpeg(width: u32, height: u32) -> Vec<u8> {
    let image = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x * 16) as u8, (y * 16) as u8, 0x80])
    });
    let mut out = Vec::new();
    image::DynamicImage::ImageRgb8(image)
        .write_with_encoder(image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, 90))
        .expect("encode test image");
    out
}

/// What one `open` call on a [`ScriptedSource`] does.
#[derive(Debug, Clone)]
pub enum Script {
    /// Fail to connect.
    Refuse,
    /// Deliver the chunks, then end the stream.
    Chunks(Vec<Vec<u8>>),
    /// Deliver the chunks, then stay open without sending anything.
    Hang(Vec<Vec<u8>>),
}

impl Script {
    pub fn chunks_then_hang(chunks: Vec<Vec<u8>>) -> Self {
        Script::Hang(chunks)
    }
}

/// [`CaptureSource`] that plays one [`Script`] per connection attempt.
///
/// Once the scripts run out, `open` never completes.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    scripts: Mutex<VecDeque<Script>>,
    opens: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(scripts: impl IntoIterator<Item = Script>) -> Self {
        Self { scripts: Mutex::new(scripts.into_iter().collect()), opens: AtomicUsize::new(0) }
    }

    /// Number of `open` calls so far, including refused and hanging ones.
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl CaptureSource for ScriptedSource {
    async fn open(&self) -> Result<ChunkStream> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let script = self.scripts.lock().expect("script lock").pop_front();
        let chunks = |chunks: Vec<Vec<u8>>| {
            futures::stream::iter(chunks.into_iter().map(|c| Ok(Bytes::from(c))))
        };

        match script {
            Some(Script::Refuse) => Err(RelayError::connection_failed("scripted refusal")),
            Some(Script::Chunks(list)) => Ok(chunks(list).boxed()),
            Some(Script::Hang(list)) => Ok(chunks(list).chain(futures::stream::pending()).boxed()),
            None => std::future::pending().await,
        }
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}

/// Collaborator call recorded by [`ScriptedBridge`] and [`RecordingRelay`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Probe(bool),
    Forward(u16, u16),
    Restart,
    Start,
    Stop,
}

pub type EventLog = Arc<Mutex<Vec<Event>>>;

pub fn event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// [`DeviceBridge`] answering probes from a fixed sequence, then `false`.
#[derive(Debug)]
pub struct ScriptedBridge {
    probes: VecDeque<bool>,
    log: EventLog,
}

impl ScriptedBridge {
    pub fn new(probes: impl IntoIterator<Item = bool>, log: EventLog) -> Self {
        Self { probes: probes.into_iter().collect(), log }
    }

    fn record(&self, event: Event) {
        self.log.lock().expect("event log lock").push(event);
    }
}

#[async_trait::async_trait]
impl DeviceBridge for ScriptedBridge {
    async fn probe(&mut self) -> bool {
        let present = self.probes.pop_front().unwrap_or(false);
        self.record(Event::Probe(present));
        present
    }

    async fn forward_port(&mut self, local_port: u16, remote_port: u16) {
        self.record(Event::Forward(local_port, remote_port));
    }

    async fn restart_server(&mut self) {
        self.record(Event::Restart);
    }
}

/// [`RelayControl`] that only records calls. Idempotent like the real session.
#[derive(Debug)]
pub struct RecordingRelay {
    log: EventLog,
    active: bool,
    starts: usize,
    stops: usize,
}

impl RecordingRelay {
    pub fn new(log: EventLog) -> Self {
        Self { log, active: false, starts: 0, stops: 0 }
    }

    pub fn starts(&self) -> usize {
        self.starts
    }

    pub fn stops(&self) -> usize {
        self.stops
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

#[async_trait::async_trait]
impl RelayControl for RecordingRelay {
    async fn start(&mut self) {
        self.log.lock().expect("event log lock").push(Event::Start);
        if !self.active {
            self.active = true;
            self.starts += 1;
        }
    }

    async fn stop(&mut self) {
        self.log.lock().expect("event log lock").push(Event::Stop);
        if self.active {
            self.active = false;
            self.stops += 1;
        }
    }
}
