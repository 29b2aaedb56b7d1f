//! # Session State
//!
//! The single authoritative record of what the application is connected to.
//!
//! Exactly one [`Session`] exists per process. It is owned by the
//! [`ConnectionCoordinator`](crate::connection::coordinator::ConnectionCoordinator),
//! read by the UI and the health monitor, and only ever touched from the
//! foreground thread.
//!
//! ## State Machine
//!
//! ```text
//!            connect                success
//!   Idle ─────────────► Connecting ─────────► Connected
//!    ▲                   │  ▲                  │    │
//!    │      failure      │  │ reconnect        │    │ loss detected
//!    └───────────────────┘  │                  │    ▼
//!    ▲                      └──────────────── Lost ◄┘
//!    │          disconnect                     │
//!    └─────────────────────────────────────────┘ (from Connected)
//! ```
//!
//! [`Session::transition`] refuses every edge not drawn above.

pub mod buttons;

use chrono::{DateTime, Local};
use std::fmt;
use tracing::{info, warn};

pub use buttons::{ButtonId, ButtonState};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Connected,
    Lost,
}

impl ConnectionState {
    /// Whether the state machine allows moving from `self` to `to`.
    pub fn can_transition_to(&self, to: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, to),
            (Idle, Connecting)
                | (Lost, Connecting)
                | (Connecting, Connected)
                | (Connecting, Idle)
                | (Connected, Idle)
                | (Connected, Lost)
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ConnectionState::Idle => "Disconnected",
            ConnectionState::Connecting => "Connecting...",
            ConnectionState::Connected => "Connected",
            ConnectionState::Lost => "Connection Lost",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Session {
    /// Address chosen for the current or next connect attempt
    address: Option<String>,
    connection_state: ConnectionState,
    /// Peer address of the last successful connection, kept across losses
    last_known_address: Option<String>,
    /// File name of the loaded amiibo dump
    auxiliary_payload_name: Option<String>,
    connected_since: Option<DateTime<Local>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection_state
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state == ConnectionState::Connected
    }

    pub fn last_known_address(&self) -> Option<&str> {
        self.last_known_address.as_deref()
    }

    pub fn auxiliary_payload_name(&self) -> Option<&str> {
        self.auxiliary_payload_name.as_deref()
    }

    pub fn connected_since(&self) -> Option<DateTime<Local>> {
        self.connected_since
    }

    /// Moves the session to `to` if the edge exists. Returns `false` and leaves
    /// the session untouched otherwise.
    pub(crate) fn transition(&mut self, to: ConnectionState) -> bool {
        let from = self.connection_state;
        if !from.can_transition_to(to) {
            warn!("Refusing session transition {:?} -> {:?}", from, to);
            return false;
        }

        info!("Session transition {:?} -> {:?}", from, to);
        self.connection_state = to;
        self.connected_since = match to {
            ConnectionState::Connected => Some(Local::now()),
            _ => None,
        };
        true
    }

    pub(crate) fn set_address(&mut self, address: Option<String>) {
        self.address = address;
    }

    pub(crate) fn set_last_known_address(&mut self, address: Option<String>) {
        self.last_known_address = address;
    }

    pub(crate) fn set_auxiliary_payload_name(&mut self, name: Option<String>) {
        self.auxiliary_payload_name = name;
    }
}
