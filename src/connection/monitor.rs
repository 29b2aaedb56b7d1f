//! Health Monitor - periodic liveness probe of the active connection
//!
//! Transports die silently: the console walks out of range, the socket is torn
//! down under the protocol, the HID server drops its interrupt channel. None of
//! these raise an error on the foreground, so the coordinator asks the monitor
//! once per interval whether the link still looks alive.
//!
//! The probe only reads flags the transport already keeps. It never performs
//! I/O, never blocks and never retries; recovery belongs to the coordinator.

use std::fmt;
use std::time::{Duration, Instant};
use tracing::debug;

use super::ConnectionHandle;

/// Positive indicator that the transport has failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LivenessFailure {
    /// The protocol no longer holds its transport
    ProtocolDetached,
    /// The transport is shutting down
    TransportClosing,
    /// The interrupt socket disappeared
    SocketMissing,
}

impl fmt::Display for LivenessFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            LivenessFailure::ProtocolDetached => "protocol transport is gone",
            LivenessFailure::TransportClosing => "transport is closing",
            LivenessFailure::SocketMissing => "interrupt socket is missing",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Alive,
    Failed(LivenessFailure),
}

/// Fixed-interval schedule, active only while connected
#[derive(Debug, Clone)]
pub struct HealthMonitor {
    interval: Duration,
    next_due: Option<Instant>,
}

impl HealthMonitor {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_due: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn start(&mut self, now: Instant) {
        debug!("Health monitor started ({:?} interval)", self.interval);
        self.next_due = Some(now + self.interval);
    }

    pub fn stop(&mut self) {
        if self.next_due.take().is_some() {
            debug!("Health monitor stopped");
        }
    }

    pub fn is_active(&self) -> bool {
        self.next_due.is_some()
    }

    /// Returns `true` once per elapsed interval and schedules the next tick.
    pub fn is_due(&mut self, now: Instant) -> bool {
        match self.next_due {
            Some(due) if now >= due => {
                self.next_due = Some(now + self.interval);
                true
            }
            _ => false,
        }
    }

    pub fn inspect(connection: &ConnectionHandle) -> Liveness {
        if !connection.protocol().is_attached() {
            return Liveness::Failed(LivenessFailure::ProtocolDetached);
        }

        let transport = connection.transport();
        if transport.is_closing() {
            return Liveness::Failed(LivenessFailure::TransportClosing);
        }
        if !transport.has_interrupt_socket() {
            return Liveness::Failed(LivenessFailure::SocketMissing);
        }
        Liveness::Alive
    }
}
