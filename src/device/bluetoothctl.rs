//! BlueZ `bluetoothctl` backed device enumeration and pairing removal

use async_trait::async_trait;
use std::io::ErrorKind;
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::{DeviceDescriptor, DeviceError, DeviceRegistry, PairingRemover, UnpairOutcome};

const BLUETOOTHCTL: &str = "bluetoothctl";
const CONSOLE_NAME: &str = "Nintendo Switch";
const LIST_TIMEOUT: Duration = Duration::from_secs(5);

/// Lists paired consoles via `bluetoothctl devices Paired`.
#[derive(Debug, Clone)]
pub struct BluetoothctlRegistry {
    program: String,
}

impl Default for BluetoothctlRegistry {
    fn default() -> Self {
        Self::with_program(BLUETOOTHCTL)
    }
}

impl BluetoothctlRegistry {
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl DeviceRegistry for BluetoothctlRegistry {
    async fn list_paired_devices(&self) -> Result<Vec<DeviceDescriptor>, DeviceError> {
        debug!("Listing paired devices with {}", self.program);
        let mut command = Command::new(&self.program);
        command.args(["devices", "Paired"]).kill_on_drop(true);

        let output = match timeout(LIST_TIMEOUT, command.output()).await {
            Err(_) => return Err(DeviceError::CommandTimeout(LIST_TIMEOUT)),
            Ok(Err(e)) if e.kind() == ErrorKind::NotFound => {
                return Err(DeviceError::CommandNotFound(self.program.clone()))
            }
            Ok(Err(e)) => return Err(DeviceError::Io(e)),
            Ok(Ok(output)) => output,
        };

        if !output.status.success() {
            return Err(DeviceError::CommandFailed(failure_message(&output)));
        }

        let devices = parse_paired_devices(&String::from_utf8_lossy(&output.stdout));
        info!("Found {} paired consoles", devices.len());
        Ok(devices)
    }

    fn address_of(&self, descriptor: &DeviceDescriptor) -> Result<String, DeviceError> {
        normalize_address(&descriptor.id)
    }
}

/// Removes a pairing via `bluetoothctl remove <address>`.
#[derive(Debug, Clone)]
pub struct BluetoothctlRemover {
    program: String,
}

impl Default for BluetoothctlRemover {
    fn default() -> Self {
        Self::with_program(BLUETOOTHCTL)
    }
}

impl BluetoothctlRemover {
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl PairingRemover for BluetoothctlRemover {
    async fn remove_pairing(&self, address: &str, limit: Duration) -> UnpairOutcome {
        let address = match normalize_address(address) {
            Ok(address) => address,
            Err(e) => return UnpairOutcome::Failed(e.to_string()),
        };

        info!("Removing pairing for {}", address);
        let mut command = Command::new(&self.program);
        command.args(["remove", address.as_str()]).kill_on_drop(true);

        match timeout(limit, command.output()).await {
            Err(_) => {
                warn!("{} remove {} timed out after {:?}", self.program, address, limit);
                UnpairOutcome::TimedOut
            }
            Ok(Err(e)) if e.kind() == ErrorKind::NotFound => {
                warn!("{} not found", self.program);
                UnpairOutcome::NotFound
            }
            Ok(Err(e)) => UnpairOutcome::Failed(e.to_string()),
            Ok(Ok(output)) if output.status.success() => {
                info!("Unpaired {}", address);
                UnpairOutcome::Removed
            }
            Ok(Ok(output)) => UnpairOutcome::Failed(failure_message(&output)),
        }
    }
}

fn failure_message(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if !stderr.is_empty() {
        stderr
    } else if !stdout.is_empty() {
        stdout
    } else {
        "Unknown error".to_string()
    }
}

/// Parses `Device <address> <name>` lines, keeping consoles only.
pub fn parse_paired_devices(output: &str) -> Vec<DeviceDescriptor> {
    output
        .lines()
        .filter_map(|line| {
            let mut parts = line.trim().splitn(3, ' ');
            if parts.next()? != "Device" {
                return None;
            }
            let id = parts.next()?.to_string();
            let name = parts.next().unwrap_or_default().trim().to_string();
            Some(DeviceDescriptor { id, name })
        })
        .filter(|device| device.name.contains(CONSOLE_NAME))
        .collect()
}

/// Validates `XX:XX:XX:XX:XX:XX` and returns it upper-cased.
pub fn normalize_address(raw: &str) -> Result<String, DeviceError> {
    let trimmed = raw.trim();
    let octets: Vec<&str> = trimmed.split(':').collect();
    let valid = octets.len() == 6
        && octets
            .iter()
            .all(|octet| octet.len() == 2 && octet.chars().all(|c| c.is_ascii_hexdigit()));

    if !valid {
        return Err(DeviceError::InvalidAddress(trimmed.to_string()));
    }
    Ok(trimmed.to_ascii_uppercase())
}
