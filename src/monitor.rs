//! Device connection monitor
//!
//! Polls a [`DeviceBridge`] on a fixed interval and drives a two-state
//! machine. Only edges act: DISCONNECTED → CONNECTED sets up the port forward
//! and starts the relay, CONNECTED → DISCONNECTED stops it. A single flipped
//! probe is enough to trigger either edge.

use std::time::Duration;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info};

use crate::config::MonitorConfig;
use crate::device::DeviceBridge;
use crate::session::RelayControl;
use crate::types::{ConnectionState, Transition};

/// Edge-triggered relay gate.
pub struct ConnectionMonitor<B, R> {
    bridge: B,
    relay: R,
    state: ConnectionState,
    poll_interval: Duration,
    local_port: u16,
    remote_port: u16,
}

impl<B, R> ConnectionMonitor<B, R>
where
    B: DeviceBridge,
    R: RelayControl,
{
    pub fn new(bridge: B, relay: R, config: &MonitorConfig) -> Self {
        Self {
            bridge,
            relay,
            state: ConnectionState::Disconnected,
            poll_interval: config.poll_interval(),
            local_port: config.local_port,
            remote_port: config.remote_port,
        }
    }

    pub fn with_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn relay(&self) -> &R {
        &self.relay
    }

    pub fn bridge(&self) -> &B {
        &self.bridge
    }

    /// Probe once and act on the edge, if any.
    pub async fn tick(&mut self) -> Option<Transition> {
        let next = ConnectionState::from_probe(self.bridge.probe().await);
        let transition = self.state.transition_to(next);
        self.state = next;

        match transition {
            Some(Transition::Connected) => {
                info!("Device connected");
                self.bridge.forward_port(self.local_port, self.remote_port).await;
                self.relay.start().await;
            }
            Some(Transition::Disconnected) => {
                info!("Device disconnected");
                self.relay.stop().await;
            }
            None => debug!(state = %self.state, "No change"),
        }
        transition
    }

    /// Tick every `poll_interval` until `cancel` fires.
    ///
    /// Cancellation is only observed between ticks, so a tick in progress
    /// always completes. A relay started by this monitor is stopped before
    /// returning.
    pub async fn run(mut self, cancel: CancellationToken) -> Self {
        info!(interval = ?self.poll_interval, "Connection monitor started");

        while !cancel.is_cancelled() {
            self.tick().await;

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        if self.state.is_connected() {
            self.relay.stop().await;
            self.state = ConnectionState::Disconnected;
        }
        info!("Connection monitor stopped");
        self
    }

    /// Run on the current runtime.
    pub fn spawn(self) -> MonitorHandle<B, R> {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(self.run(cancel.clone()));
        MonitorHandle { guard: cancel.drop_guard(), task }
    }
}

/// Owner of a spawned [`ConnectionMonitor`]. Dropping it requests a stop
/// without waiting.
pub struct MonitorHandle<B, R> {
    guard: DropGuard,
    task: JoinHandle<ConnectionMonitor<B, R>>,
}

impl<B, R> MonitorHandle<B, R> {
    /// Request a stop and wait for the in-flight tick and relay teardown.
    pub async fn stop(self) -> Result<ConnectionMonitor<B, R>, JoinError> {
        let MonitorHandle { guard, task } = self;
        drop(guard);
        task.await
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
