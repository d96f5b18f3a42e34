//! Mock OCR backend for testing and development

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{OcrProvider, OcrResponse};
use crate::extract::extract;

/// Mock OCR backend
///
/// Returns a canned Azure-shaped payload run through the regular extractor.
#[derive(Clone)]
pub struct MockOcr {
    payload: Value,
    failure: Option<String>,
    delay: Option<Duration>,
}

impl Default for MockOcr {
    fn default() -> Self {
        Self::new()
    }
}

impl MockOcr {
    pub fn new() -> Self {
        Self {
            payload: sample_payload(),
            failure: None,
            delay: None,
        }
    }

    /// Answer with this provider payload instead of the built-in receipt
    pub fn with_payload(payload: Value) -> Self {
        Self {
            payload,
            ..Self::new()
        }
    }

    /// Always fail with this message
    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::new()
        }
    }

    /// Sleep before answering (simulates a slow provider)
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// A convenience-store receipt in the Azure prebuilt-receipt shape
pub fn sample_payload() -> Value {
    json!({
        "status": "succeeded",
        "analyzeResult": {
            "content": "GS25 역삼점\n서울특별시 강남구 테헤란로 152\n2024-03-15 14:30",
            "documents": [{
                "fields": {
                    "MerchantName": { "content": "GS25 역삼점" },
                    "MerchantAddress": { "content": "서울특별시 강남구 테헤란로 152" },
                    "MerchantPhoneNumber": { "content": "02-555-0125" },
                    "TransactionDate": { "valueDate": "2024-03-15" },
                    "TransactionTime": { "valueTime": "14:30:00" },
                    "Total": { "valueCurrency": { "amount": 8300.0 } },
                    "Items": { "valueArray": [
                        { "valueObject": {
                            "Description": { "content": "아메리카노" },
                            "TotalPrice": { "valueCurrency": { "amount": 4500.0 } },
                            "Quantity": { "valueNumber": 1 }
                        }},
                        { "valueObject": {
                            "Description": { "content": "샌드위치" },
                            "TotalPrice": { "valueCurrency": { "amount": 3800.0 } },
                            "Quantity": { "valueNumber": 1 }
                        }}
                    ]}
                }
            }]
        }
    })
}

#[async_trait]
impl OcrProvider for MockOcr {
    async fn process(&self, _image: &[u8]) -> OcrResponse {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.failure {
            return OcrResponse::error(message.clone());
        }
        OcrResponse::success(extract(&self.payload), self.payload.clone())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_sample_receipt() {
        let response = MockOcr::new().process(b"img").await;
        assert!(response.is_success());

        let data = response.data.unwrap();
        assert_eq!(data.store_name, "GS25 역삼점");
        assert_eq!(data.total_amount, 8300.0);
        assert_eq!(data.items.len(), 2);
        assert_eq!(data.most_expensive_item().unwrap().name, "아메리카노");
        assert_eq!(data.date.format("%Y-%m-%d %H:%M").to_string(), "2024-03-15 14:30");
    }

    #[tokio::test]
    async fn test_mock_failure() {
        let response = MockOcr::failing("blurry").process(b"img").await;
        assert!(!response.is_success());
        assert_eq!(response.message.as_deref(), Some("blurry"));
    }
}
