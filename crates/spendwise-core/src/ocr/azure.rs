//! Azure Document Intelligence backend
//!
//! Submits the image to the prebuilt-receipt model and polls the
//! `Operation-Location` returned by the analyze call until the result is
//! ready.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{OcrProvider, OcrResponse};
use crate::error::{Error, Result};
use crate::extract::extract;

const API_VERSION: &str = "2024-11-30";
const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";
const POLL_INTERVAL: Duration = Duration::from_secs(1);
const MAX_POLLS: u32 = 120;

#[derive(Clone)]
pub struct AzureOcr {
    http_client: Client,
    endpoint: String,
    key: String,
    poll_interval: Duration,
}

impl AzureOcr {
    pub fn new(endpoint: &str, key: &str) -> Self {
        Self {
            http_client: Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            key: key.to_string(),
            poll_interval: POLL_INTERVAL,
        }
    }

    /// Create from `AZURE_OCR_ENDPOINT` and `AZURE_OCR_KEY`
    pub fn from_env() -> Option<Self> {
        let endpoint = std::env::var("AZURE_OCR_ENDPOINT").ok()?;
        let key = std::env::var("AZURE_OCR_KEY").ok()?;
        Some(Self::new(&endpoint, &key))
    }

    /// Override the polling interval (tests use a short one)
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn analyze_url(&self) -> String {
        format!(
            "{}/documentintelligence/documentModels/prebuilt-receipt:analyze?api-version={}",
            self.endpoint, API_VERSION
        )
    }

    /// Submit the image and wait for the analysis result
    async fn analyze(&self, image: &[u8]) -> Result<Value> {
        let response = self
            .http_client
            .post(self.analyze_url())
            .header(SUBSCRIPTION_KEY_HEADER, &self.key)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(image.to_vec())
            .send()
            .await?
            .error_for_status()?;

        let operation = response
            .headers()
            .get("operation-location")
            .and_then(|v| v.to_str().ok())
            .map(String::from)
            .ok_or_else(|| Error::Ocr("Analyze response has no Operation-Location".into()))?;
        debug!("Azure analyze accepted, polling {}", operation);

        for _ in 0..MAX_POLLS {
            let body: Value = self
                .http_client
                .get(&operation)
                .header(SUBSCRIPTION_KEY_HEADER, &self.key)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;

            match body.get("status").and_then(Value::as_str) {
                Some("succeeded") => return Ok(body),
                Some("failed") => {
                    let reason = body
                        .pointer("/error/message")
                        .and_then(Value::as_str)
                        .unwrap_or("analysis failed");
                    return Err(Error::Ocr(reason.to_string()));
                }
                _ => tokio::time::sleep(self.poll_interval).await,
            }
        }

        Err(Error::Ocr("Timed out waiting for Azure analysis".into()))
    }
}

#[async_trait]
impl OcrProvider for AzureOcr {
    async fn process(&self, image: &[u8]) -> OcrResponse {
        info!("Analyzing receipt with Azure Document Intelligence ({} bytes)", image.len());

        let body = match self.analyze(image).await {
            Ok(body) => body,
            Err(e) => {
                warn!("Azure OCR failed: {}", e);
                return OcrResponse::error(e.to_string());
            }
        };

        let has_document = body
            .pointer("/analyzeResult/documents/0")
            .is_some();
        if !has_document {
            return OcrResponse::error("영수증 정보를 추출할 수 없습니다");
        }

        let data = extract(&body);
        info!(
            "Azure OCR extracted store '{}', total {}",
            data.store_name, data.total_amount
        );
        OcrResponse::success(data, body)
    }

    fn name(&self) -> &str {
        "azure"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        http::{HeaderMap, StatusCode},
        response::IntoResponse,
        routing::{get, post},
        Json, Router,
    };
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    async fn start(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn receipt_body() -> Value {
        json!({
            "status": "succeeded",
            "analyzeResult": {
                "documents": [{ "fields": {
                    "MerchantName": { "content": "파리바게뜨" },
                    "Total": { "valueCurrency": { "amount": 7800.0 } }
                }}]
            }
        })
    }

    #[tokio::test]
    async fn test_analyze_and_poll() {
        let polls = Arc::new(AtomicU32::new(0));
        let polls_handler = polls.clone();

        let app = Router::new()
            .route(
                "/documentintelligence/documentModels/:model",
                post(|headers: HeaderMap| async move {
                    assert_eq!(
                        headers.get(SUBSCRIPTION_KEY_HEADER).unwrap().to_str().unwrap(),
                        "secret"
                    );
                    let host = headers.get("host").unwrap().to_str().unwrap().to_string();
                    (
                        StatusCode::ACCEPTED,
                        [("operation-location", format!("http://{}/results/1", host))],
                    )
                        .into_response()
                }),
            )
            .route(
                "/results/1",
                get(move || {
                    let polls = polls_handler.clone();
                    async move {
                        if polls.fetch_add(1, Ordering::SeqCst) == 0 {
                            Json(json!({ "status": "running" }))
                        } else {
                            Json(receipt_body())
                        }
                    }
                }),
            );

        let url = start(app).await;
        let ocr = AzureOcr::new(&url, "secret").with_poll_interval(Duration::from_millis(10));

        let response = ocr.process(b"fake image").await;
        assert!(response.is_success(), "{:?}", response.message);
        let data = response.data.unwrap();
        assert_eq!(data.store_name, "파리바게뜨");
        assert_eq!(data.total_amount, 7800.0);
        assert_eq!(polls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_rejected_request_is_error_response() {
        let app = Router::new().route(
            "/documentintelligence/documentModels/:model",
            post(|| async { StatusCode::UNAUTHORIZED }),
        );
        let url = start(app).await;

        let response = AzureOcr::new(&url, "wrong").process(b"img").await;
        assert!(!response.is_success());
        assert!(response.message.is_some());
    }
}
