//! # Connection Core
//!
//! Lifecycle of the one console link this application drives.
//!
//! ## Components
//!
//! ```text
//! ┌──────────────────────────── foreground ─────────────────────────────┐
//! │  UI ──► ConnectionCoordinator ──► Session (state, addresses)        │
//! │              │        │                                             │
//! │              │        ├──► InputDispatcher (ButtonState)            │
//! │              │        └──► HealthMonitor (interval probe)           │
//! └──────────────┼──────────────────────────────────────────────────────┘
//!                ▼
//!         RuntimeBridge<WorkOutput> ──► transport / protocol / controller
//! ```
//!
//! The coordinator is the only writer of [`Session`](crate::session::Session).
//! Background units hand their results back as [`WorkOutput`] completions,
//! which the coordinator applies from [`ConnectionCoordinator::poll`] on the
//! foreground. The UI reads the session and reacts to [`CoordinatorEvent`]s.

pub mod coordinator;
pub mod dispatcher;
pub mod error;
pub mod monitor;

#[cfg(test)]
mod tests;

use std::fmt;
use std::sync::Arc;

use crate::device::{ControllerProtocol, ControllerState, PairedDevice, Transport, UnpairOutcome};
use crate::runtime::RuntimeBridge;
use crate::session::ButtonId;

pub use coordinator::{
    ConnectRequest, ConnectionCoordinator, CoordinatorEvent, CoordinatorSettings,
};
pub use dispatcher::{DispatchResult, InputDispatcher};
pub use error::ConnectionError;
pub use monitor::{HealthMonitor, Liveness, LivenessFailure};

/// Bridge flavour used by the connection core
pub type Bridge = RuntimeBridge<WorkOutput>;

/// Live transport, protocol and controller state of one console link.
///
/// Only the coordinator keeps one. Clones travel into background units so
/// they can call the controller; they never reach the UI.
#[derive(Clone)]
pub struct ConnectionHandle {
    transport: Arc<dyn Transport>,
    protocol: Arc<dyn ControllerProtocol>,
    controller: Arc<dyn ControllerState>,
}

impl ConnectionHandle {
    pub fn new(transport: Arc<dyn Transport>, protocol: Arc<dyn ControllerProtocol>) -> Self {
        let controller = protocol.controller_state();
        Self {
            transport,
            protocol,
            controller,
        }
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn protocol(&self) -> &Arc<dyn ControllerProtocol> {
        &self.protocol
    }

    pub fn controller(&self) -> &Arc<dyn ControllerState> {
        &self.controller
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("peer", &self.transport.peer_address())
            .field("closing", &self.transport.is_closing())
            .field("attached", &self.protocol.is_attached())
            .finish()
    }
}

/// Result values of background units
#[derive(Debug)]
pub enum WorkOutput {
    Connected(ConnectionHandle),
    Closed,
    ButtonSent { button: ButtonId, pressed: bool },
    PayloadLoaded { name: String },
    PayloadEjected,
    PairedDevices(Vec<PairedDevice>),
    Unpaired {
        address: String,
        outcome: UnpairOutcome,
    },
}
