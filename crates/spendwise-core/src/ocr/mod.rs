//! OCR provider abstraction
//!
//! - `OcrProvider` trait: turns image bytes into an [`OcrResponse`]
//! - `OcrClient` enum: concrete wrapper with compile-time dispatch
//! - Backends: `AzureOcr` (Document Intelligence REST API), `MockOcr`
//!
//! Environment variables:
//! - `OCR_BACKEND`: Backend to use (azure, mock). Default: azure
//! - `AZURE_OCR_ENDPOINT`, `AZURE_OCR_KEY`: Document Intelligence resource

mod azure;
mod mock;

pub use azure::AzureOcr;
pub use mock::MockOcr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::extract::ExtractedReceipt;

/// Outcome of an OCR call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OcrResponseStatus {
    Success,
    Error,
}

/// Result of processing one image
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrResponse {
    pub status: OcrResponseStatus,
    /// Extracted fields (success only)
    pub data: Option<ExtractedReceipt>,
    /// Failure reason (error only)
    pub message: Option<String>,
    /// Provider payload, kept for audit
    pub raw_response: Value,
}

impl OcrResponse {
    pub fn success(data: ExtractedReceipt, raw_response: Value) -> Self {
        Self {
            status: OcrResponseStatus::Success,
            data: Some(data),
            message: None,
            raw_response,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: OcrResponseStatus::Error,
            data: None,
            message: Some(message.into()),
            raw_response: Value::Null,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OcrResponseStatus::Success && self.data.is_some()
    }
}

/// Interface for OCR backends
///
/// Processing never returns `Err`; failures come back as an error response
/// so the caller can keep the reason on the receipt.
#[async_trait]
pub trait OcrProvider: Send + Sync {
    async fn process(&self, image: &[u8]) -> OcrResponse;

    /// Backend name (for logging)
    fn name(&self) -> &str;
}

/// Concrete OCR client enum
#[derive(Clone)]
pub enum OcrClient {
    Azure(AzureOcr),
    Mock(MockOcr),
}

impl OcrClient {
    /// Create an OCR client from environment variables
    ///
    /// Returns None if the selected backend isn't configured.
    pub fn from_env() -> Option<Self> {
        let backend = std::env::var("OCR_BACKEND").unwrap_or_else(|_| "azure".to_string());

        match backend.to_lowercase().as_str() {
            "azure" => AzureOcr::from_env().map(OcrClient::Azure),
            "mock" => Some(OcrClient::Mock(MockOcr::new())),
            _ => {
                tracing::warn!(backend = %backend, "Unknown OCR_BACKEND, falling back to azure");
                AzureOcr::from_env().map(OcrClient::Azure)
            }
        }
    }

    /// Create a mock client for testing
    pub fn mock() -> Self {
        OcrClient::Mock(MockOcr::new())
    }
}

#[async_trait]
impl OcrProvider for OcrClient {
    async fn process(&self, image: &[u8]) -> OcrResponse {
        match self {
            OcrClient::Azure(b) => b.process(image).await,
            OcrClient::Mock(b) => b.process(image).await,
        }
    }

    fn name(&self) -> &str {
        match self {
            OcrClient::Azure(b) => b.name(),
            OcrClient::Mock(b) => b.name(),
        }
    }
}
