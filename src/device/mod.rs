//! # External Device Collaborators
//!
//! Everything the connection core talks to but does not implement: the
//! Bluetooth HID transport and protocol, paired-device enumeration, OS pairing
//! removal and the amiibo dump loader.
//!
//! ## Why These Are Traits
//!
//! The HID server and report encoding live outside this application. The core
//! only sequences calls against them, so each collaborator is a small trait
//! the coordinator holds behind an `Arc<dyn _>`:
//!
//! ```text
//! ConnectionFactory ──► (Transport, ControllerProtocol) ──► ControllerState
//! DeviceRegistry      PairingRemover      PayloadLoader      PrivilegeCheck
//! ```
//!
//! All async methods are only ever awaited on the background runtime.
//!
//! ## Shipped Implementations
//! - [`bluetoothctl`]: BlueZ command line for enumeration and unpairing
//! - [`payload`]: raw amiibo dump files
//! - [`loopback`]: in-process controller backend for dry runs and tests

pub mod bluetoothctl;
pub mod loopback;
pub mod payload;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::session::ButtonId;

pub use payload::AuxiliaryPayload;

/// Errors raised by external collaborators
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("Command timed out after {0:?}")]
    CommandTimeout(Duration),

    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("Invalid Bluetooth address: {0}")]
    InvalidAddress(String),

    #[error("Payload file is empty: {}", .0.display())]
    EmptyPayload(PathBuf),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Kind of controller to emulate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControllerType {
    #[default]
    ProController,
    JoyConLeft,
    JoyConRight,
}

impl ControllerType {
    /// Identifier understood by the HID protocol factory.
    pub fn as_str(&self) -> &'static str {
        match self {
            ControllerType::ProController => "PRO_CONTROLLER",
            ControllerType::JoyConLeft => "JOYCON_L",
            ControllerType::JoyConRight => "JOYCON_R",
        }
    }
}

impl fmt::Display for ControllerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Paired console as reported by the OS Bluetooth stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    /// Raw identifier, whatever the registry reports (path or address)
    pub id: String,
    pub name: String,
}

/// Paired console with a validated address, ready for the device picker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairedDevice {
    pub address: String,
    pub name: String,
}

impl fmt::Display for PairedDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.name, self.address)
    }
}

/// Result of an OS-level pairing removal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnpairOutcome {
    Removed,
    Failed(String),
    TimedOut,
    NotFound,
}

impl fmt::Display for UnpairOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnpairOutcome::Removed => write!(f, "Successfully unpaired"),
            UnpairOutcome::Failed(message) => write!(f, "Failed to unpair device: {}", message),
            UnpairOutcome::TimedOut => {
                write!(f, "bluetoothctl command timed out. Please try again.")
            }
            UnpairOutcome::NotFound => write!(
                f,
                "bluetoothctl command not found. Please ensure BlueZ is installed."
            ),
        }
    }
}

/// Live communication channel to the console
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Set once the transport started shutting down, for whatever reason.
    fn is_closing(&self) -> bool;

    /// Whether the interrupt channel socket is still present.
    fn has_interrupt_socket(&self) -> bool;

    /// Address of the connected console, if the socket knows it.
    fn peer_address(&self) -> Option<String>;

    async fn close(&self) -> Result<(), DeviceError>;
}

/// Translates controller state changes into reports over a transport
pub trait ControllerProtocol: Send + Sync + 'static {
    /// Whether the protocol is still bound to its transport.
    fn is_attached(&self) -> bool;

    fn controller_state(&self) -> Arc<dyn ControllerState>;
}

/// Emulated controller state. Only called from the background runtime.
#[async_trait]
pub trait ControllerState: Send + Sync + 'static {
    /// Waits until the console accepted the controller.
    async fn connect(&self) -> Result<(), DeviceError>;

    async fn set_auxiliary_payload(
        &self,
        payload: Option<AuxiliaryPayload>,
    ) -> Result<(), DeviceError>;

    async fn button_press(&self, button: ButtonId) -> Result<(), DeviceError>;

    async fn button_release(&self, button: ButtonId) -> Result<(), DeviceError>;
}

/// Builds the transport/protocol pair for a controller.
///
/// `previous_address` set means direct reconnection to that console; `None`
/// starts a fresh pairing handshake.
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    async fn create_connection(
        &self,
        controller: ControllerType,
        previous_address: Option<String>,
    ) -> Result<(Arc<dyn Transport>, Arc<dyn ControllerProtocol>), DeviceError>;
}

#[async_trait]
pub trait DeviceRegistry: Send + Sync + 'static {
    async fn list_paired_devices(&self) -> Result<Vec<DeviceDescriptor>, DeviceError>;

    fn address_of(&self, descriptor: &DeviceDescriptor) -> Result<String, DeviceError>;
}

#[async_trait]
pub trait PairingRemover: Send + Sync + 'static {
    async fn remove_pairing(&self, address: &str, timeout: Duration) -> UnpairOutcome;
}

#[async_trait]
pub trait PayloadLoader: Send + Sync + 'static {
    async fn load_from_file(&self, path: &Path) -> Result<AuxiliaryPayload, DeviceError>;
}

/// Answers whether the process runs with the privilege the HID server needs
pub trait PrivilegeCheck: Send + Sync + 'static {
    fn is_elevated(&self) -> bool;
}

/// Root check through the effective user id.
#[derive(Debug, Default, Clone, Copy)]
pub struct EffectiveUid;

impl PrivilegeCheck for EffectiveUid {
    fn is_elevated(&self) -> bool {
        #[cfg(unix)]
        {
            nix::unistd::geteuid().is_root()
        }
        #[cfg(not(unix))]
        {
            false
        }
    }
}

/// Skips the privilege requirement (`require_root = false`, tests).
#[derive(Debug, Default, Clone, Copy)]
pub struct AssumeElevated;

impl PrivilegeCheck for AssumeElevated {
    fn is_elevated(&self) -> bool {
        true
    }
}

/// Bundle of every collaborator the coordinator needs
#[derive(Clone)]
pub struct Collaborators {
    pub factory: Arc<dyn ConnectionFactory>,
    pub registry: Arc<dyn DeviceRegistry>,
    pub remover: Arc<dyn PairingRemover>,
    pub loader: Arc<dyn PayloadLoader>,
    pub privilege: Arc<dyn PrivilegeCheck>,
}
