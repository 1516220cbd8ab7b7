//! Device connection state

use std::fmt;

/// Presence of the upstream device as last observed by the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connected,
}

/// Edge produced when a probe result differs from the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// DISCONNECTED → CONNECTED
    Connected,
    /// CONNECTED → DISCONNECTED
    Disconnected,
}

impl ConnectionState {
    /// State implied by a single probe result.
    pub fn from_probe(present: bool) -> Self {
        if present { ConnectionState::Connected } else { ConnectionState::Disconnected }
    }

    pub fn is_connected(self) -> bool {
        self == ConnectionState::Connected
    }

    /// Edge between `self` and `next`, if there is one.
    pub fn transition_to(self, next: ConnectionState) -> Option<Transition> {
        match (self, next) {
            (ConnectionState::Disconnected, ConnectionState::Connected) => {
                Some(Transition::Connected)
            }
            (ConnectionState::Connected, ConnectionState::Disconnected) => {
                Some(Transition::Disconnected)
            }
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => f.write_str("DISCONNECTED"),
            ConnectionState::Connected => f.write_str("CONNECTED"),
        }
    }
}
