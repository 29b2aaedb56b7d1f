use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use tracing::info;

use super::{DeviceError, PayloadLoader};

/// Emulated NFC tag contents (an amiibo dump). The bytes are handed to the
/// controller state untouched.
#[derive(Clone, PartialEq, Eq)]
pub struct AuxiliaryPayload {
    name: String,
    data: Vec<u8>,
}

impl AuxiliaryPayload {
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl fmt::Debug for AuxiliaryPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuxiliaryPayload")
            .field("name", &self.name)
            .field("len", &self.data.len())
            .finish()
    }
}

/// Reads dump files from disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct FilePayloadLoader;

#[async_trait]
impl PayloadLoader for FilePayloadLoader {
    async fn load_from_file(&self, path: &Path) -> Result<AuxiliaryPayload, DeviceError> {
        let data = tokio::fs::read(path).await?;
        if data.is_empty() {
            return Err(DeviceError::EmptyPayload(path.to_path_buf()));
        }

        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        info!("Loaded payload {} ({} bytes)", name, data.len());
        Ok(AuxiliaryPayload::new(name, data))
    }
}
