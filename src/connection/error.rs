//! Error definitions for the connection core

use thiserror::Error;
use tracing::warn;

use super::monitor::LivenessFailure;
use crate::runtime::BridgeError;

/// Errors surfaced by the connection coordinator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    /// The HID server needs root; checked before every attempt
    #[error("This application must be run as root!")]
    PermissionDenied,

    /// The background context is gone or was never started
    #[error("Background runtime is not available")]
    RuntimeUnavailable,

    /// A connect attempt is running or a connection is already up
    #[error("A connection attempt is already in progress")]
    AlreadyConnecting,

    /// The external factory or the controller handshake failed
    #[error("Failed to connect: {0}")]
    TransportConstructionFailed(String),

    /// Neither an explicit nor a remembered address is available
    #[error("No console address known, select a device first")]
    AddressRequired,

    #[error("Not connected to a console")]
    NotConnected,

    /// Logged and turned into a `Connected -> Lost` transition, never returned
    #[error("Liveness check failed: {0}")]
    LivenessCheckFailed(LivenessFailure),
}

impl From<BridgeError> for ConnectionError {
    fn from(error: BridgeError) -> Self {
        match error {
            BridgeError::RuntimeUnavailable | BridgeError::StartFailed(_) => {
                ConnectionError::RuntimeUnavailable
            }
            BridgeError::QueueFull => {
                warn!("Background work queue is full");
                ConnectionError::RuntimeUnavailable
            }
        }
    }
}
