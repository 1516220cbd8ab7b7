//! Relay session: lifecycle of one active relay
//!
//! A [`RelaySession`] is either idle or running exactly one relay: a frame
//! reader feeding the latest-frame slot plus whichever sinks the
//! configuration enables. The HTTP-only, UDP-only and combined setups are all
//! the same session with different `http` / `udp` settings.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::Result;
use crate::codec::FrameCodec;
use crate::config::RelayConfig;
use crate::reader::FrameReader;
use crate::sinks::{HttpMultipartSink, UdpSink};
use crate::slot::LatestFrameSlot;
use crate::source::CaptureSource;
use crate::sources::HttpCaptureSource;


/// Start/stop interface the connection monitor drives.
#[async_trait::async_trait]
pub trait RelayControl: Send + 'static {
    /// Begin relaying. No-op if already relaying.
    async fn start(&mut self);

    /// Stop relaying and wait for every task to finish. No-op if idle.
    async fn stop(&mut self);
}

struct ActiveRelay {
    /// Stop flag shared by every task of this relay.
    cancel: CancellationToken,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
    http_addr: Option<SocketAddr>,
}

/// Owns at most one running relay.
pub struct RelaySession {
    config: RelayConfig,
    source: Arc<dyn CaptureSource>,
    codec: Arc<dyn FrameCodec>,
    slot: LatestFrameSlot,
    active: Option<ActiveRelay>,
}

impl RelaySession {
    pub fn new(
        config: RelayConfig,
        source: Arc<dyn CaptureSource>,
        codec: Arc<dyn FrameCodec>,
    ) -> Self {
        Self { config, source, codec, slot: LatestFrameSlot::new(), active: None }
    }

    /// Session reading from the configured HTTP capture URL.
    pub fn from_config(config: RelayConfig) -> Result<Self> {
        let source = Arc::new(HttpCaptureSource::from_config(&config.capture)?);
        let codec = config.codec.build();
        Ok(Self::new(config, source, codec))
    }

    /// The slot the reader publishes into.
    pub fn slot(&self) -> LatestFrameSlot {
        self.slot.clone()
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Number of tasks (reader + sinks) of the running relay.
    pub fn task_count(&self) -> usize {
        self.active.as_ref().map_or(0, |active| active.tasks.len())
    }

    /// Address the HTTP sink is listening on, while relaying.
    pub fn http_addr(&self) -> Option<SocketAddr> {
        self.active.as_ref().and_then(|active| active.http_addr)
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Launch the reader and the configured sinks. No-op if already active.
    ///
    /// A sink whose socket cannot be bound is logged and left out; the rest
    /// of the relay still runs.
    pub async fn start(&mut self) {
        if self.active.is_some() {
            debug!("Relay already active");
            return;
        }

        let cancel = CancellationToken::new();
        let mut tasks: Vec<(&'static str, JoinHandle<()>)> = Vec::new();
        let mut http_addr = None;

        let reader = FrameReader::new(
            Arc::clone(&self.source),
            Arc::clone(&self.codec),
            self.slot.clone(),
            self.config.capture.retry_delay(),
            self.config.capture.max_accumulator_bytes,
        );
        let reader_cancel = cancel.clone();
        tasks.push((
            "reader",
            tokio::spawn(async move {
                reader.run(reader_cancel).await;
            }),
        ));

        if let Some(http) = &self.config.http {
            let sink = HttpMultipartSink::new(http.clone(), self.config.frame_rate, self.slot.clone());
            match sink.bind().await {
                Ok(listener) => {
                    http_addr = listener.local_addr().ok();
                    let sink_cancel = cancel.clone();
                    tasks.push((
                        "http sink",
                        tokio::spawn(async move {
                            if let Err(e) = sink.serve(listener, sink_cancel).await {
                                error!("HTTP sink failed: {}", e);
                            }
                        }),
                    ));
                }
                Err(e) => error!("HTTP sink disabled for this session: {}", e),
            }
        }

        if let Some(udp) = &self.config.udp {
            let sink = UdpSink::new(udp, self.config.frame_rate, self.slot.clone());
            match sink.bind().await {
                Ok(socket) => {
                    let sink_cancel = cancel.clone();
                    tasks.push((
                        "udp sink",
                        tokio::spawn(async move {
                            sink.run(socket, sink_cancel).await;
                        }),
                    ));
                }
                Err(e) => error!("UDP sink disabled for this session: {}", e),
            }
        }

        if tasks.len() == 1 {
            warn!("Relay running with no sinks; frames are only kept in the slot");
        }

        info!(tasks = tasks.len(), "Relay started");
        self.active = Some(ActiveRelay { cancel, tasks, http_addr });
    }

    /// Signal every task to stop and wait for all of them. No-op if idle.
    pub async fn stop(&mut self) {
        let Some(active) = self.active.take() else {
            debug!("Relay not active");
            return;
        };

        active.cancel.cancel();
        for (name, task) in active.tasks {
            if let Err(e) = task.await {
                error!("Relay {} task failed: {}", name, e);
            }
        }

        // Don't let the next session replay a stale frame.
        self.slot.clear();
        info!("Relay stopped");
    }
}

#[async_trait::async_trait]
impl RelayControl for RelaySession {
    async fn start(&mut self) {
        RelaySession::start(self).await;
    }

    async fn stop(&mut self) {
        RelaySession::stop(self).await;
    }
}

impl Drop for RelaySession {
    fn drop(&mut self) {
        if let Some(active) = &self.active {
            debug!("Dropping active relay session");
            active.cancel.cancel();
        }
    }
}
