use crate::domain::ports::ReceiptStore;
use crate::domain::receipt::RefreshProperties;
use crate::error::{PlatformError, PlatformErrorKind};
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};

/// Reads the receipt from a file at a fixed location.
///
/// There is no platform to ask for a new receipt, so refreshing always fails.
#[derive(Debug, Clone)]
pub struct FileReceiptStore {
    path: PathBuf,
}

impl FileReceiptStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl ReceiptStore for FileReceiptStore {
    async fn read(&self) -> io::Result<Option<Vec<u8>>> {
        match tokio::fs::read(&self.path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn refresh(&self, _properties: Option<&RefreshProperties>) -> Result<(), PlatformError> {
        Err(PlatformError::new(
            PlatformErrorKind::ClientInvalid,
            format!("Cannot refresh file-backed receipt {}", self.path.display()),
        ))
    }
}
