use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;
use tracing::{info, warn};

/// Transport lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Subscribed,
}

impl ConnectionState {
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, Connected)
                | (Connecting, Disconnected)
                | (Connected, Subscribed)
                | (Connected, Disconnected)
                | (Subscribed, Disconnected)
        )
    }

    /// Inbound messages are only handled once the session is up
    pub fn accepts_messages(self) -> bool {
        matches!(self, ConnectionState::Connected | ConnectionState::Subscribed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Subscribed => "subscribed",
        };
        f.write_str(name)
    }
}

/// Individual readiness inputs, as reported by `/readyz`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReadinessChecks {
    pub transport: ConnectionState,
    pub archive: bool,
    pub timeseries: bool,
}

impl ReadinessChecks {
    pub fn is_ready(&self) -> bool {
        self.transport == ConnectionState::Subscribed && self.archive && self.timeseries
    }
}

/// Transport state plus the two sink flags, each set independently
pub struct ReadinessState {
    connection: watch::Sender<ConnectionState>,
    archive_ready: AtomicBool,
    timeseries_ready: AtomicBool,
}

impl Default for ReadinessState {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadinessState {
    pub fn new() -> Self {
        let (connection, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            connection,
            archive_ready: AtomicBool::new(false),
            timeseries_ready: AtomicBool::new(false),
        }
    }

    /// Move the transport to `next`. Returns false when the move is not allowed.
    ///
    /// Moving to the current state is accepted and changes nothing.
    pub fn transition(&self, next: ConnectionState) -> bool {
        let mut allowed = true;
        self.connection.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            if !current.can_transition_to(next) {
                warn!(from = %current, to = %next, "rejected connection state transition");
                allowed = false;
                return false;
            }
            info!(from = %current, to = %next, "connection state changed");
            *current = next;
            true
        });
        allowed
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.connection.borrow()
    }

    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.connection.subscribe()
    }

    pub fn set_archive_ready(&self, ready: bool) {
        self.archive_ready.store(ready, Ordering::SeqCst);
    }

    pub fn set_timeseries_ready(&self, ready: bool) {
        self.timeseries_ready.store(ready, Ordering::SeqCst);
    }

    pub fn checks(&self) -> ReadinessChecks {
        ReadinessChecks {
            transport: self.connection_state(),
            archive: self.archive_ready.load(Ordering::SeqCst),
            timeseries: self.timeseries_ready.load(Ordering::SeqCst),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.checks().is_ready()
    }
}
