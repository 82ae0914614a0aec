// crates/jobs/src/firmware.rs
//! Firmware artifact store contract.

use async_trait::async_trait;
use thiserror::Error;

/// Errors surfaced by the firmware store.
#[derive(Debug, Error)]
pub enum FirmwareError {
    #[error("firmware download failed: {message}")]
    Fetch { message: String },

    #[error("no firmware found for target {target}")]
    NotFound { target: String },
}

/// Fetches firmware images by download location and hardware target.
#[async_trait]
pub trait FirmwareStore: Send + Sync {
    async fn fetch_firmware(&self, url: &str, target: &str) -> Result<Vec<u8>, FirmwareError>;
}

/// Firmware selection for one job: either inline bytes, or a download
/// location resolved through the firmware store.
#[derive(Debug, Clone)]
pub struct FirmwareSpec {
    pub data: Option<Vec<u8>>,
    pub url: Option<String>,
    /// The hardware variant the image is built for.
    pub target: String,
}

impl FirmwareSpec {
    pub fn inline(data: Vec<u8>, target: impl Into<String>) -> Self {
        Self {
            data: Some(data),
            url: None,
            target: target.into(),
        }
    }

    pub fn remote(url: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            data: None,
            url: Some(url.into()),
            target: target.into(),
        }
    }
}
