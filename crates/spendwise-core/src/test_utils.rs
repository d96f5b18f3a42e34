//! Test utilities for spendwise-core
//!
//! A mock Ollama server that answers the zero-shot category prompt, for
//! development and integration tests of the model-backed classifier tiers.

use axum::{
    extract::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::sync::oneshot;

/// Mock Ollama server for testing and development
pub struct MockOllamaServer {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockOllamaServer {
    /// Start the mock server on an available port
    pub async fn start() -> Self {
        let app = Router::new()
            .route("/api/tags", get(handle_tags))
            .route("/api/generate", post(handle_generate));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Get the base URL for this mock server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockOllamaServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Ollama tags endpoint response (health check)
async fn handle_tags() -> Json<TagsResponse> {
    Json(TagsResponse {
        models: vec![ModelInfo {
            name: "llama3.2:latest".to_string(),
            modified_at: "2024-01-01T00:00:00Z".to_string(),
            size: 4_000_000_000,
        }],
    })
}

/// Ollama generate endpoint
async fn handle_generate(Json(request): Json<GenerateRequest>) -> Json<GenerateResponse> {
    let text = receipt_text(&request.prompt);

    // "GARBLED" simulates a model that ignores the output format
    let response = if text.contains("GARBLED") {
        "I think this is probably food, but I'm not sure.".to_string()
    } else {
        let (category, confidence) = classify_mock(text);
        format!(
            "Here is my answer:\n{{\"category\": \"{}\", \"confidence\": {}}}",
            category, confidence
        )
    };

    Json(GenerateResponse {
        model: request.model,
        response,
        done: true,
    })
}

/// Pull the quoted receipt text out of the classification prompt
fn receipt_text(prompt: &str) -> &str {
    const MARKER: &str = "Receipt text: \"";
    prompt
        .find(MARKER)
        .map(|start| &prompt[start + MARKER.len()..])
        .and_then(|rest| rest.find('"').map(|end| &rest[..end]))
        .unwrap_or(prompt)
}

/// Deterministic answers keyed on well-known words
fn classify_mock(text: &str) -> (&'static str, f64) {
    let t = text.to_uppercase();
    let has = |words: &[&str]| words.iter().any(|w| t.contains(w));

    if has(&["스타벅스", "STARBUCKS", "아메리카노", "커피"]) {
        ("food", 0.92)
    } else if has(&["택시", "TAXI", "KTX", "UBER"]) {
        ("transportation", 0.9)
    } else if has(&["소주", "맥주", "회식", "포차"]) {
        ("dining_out", 0.88)
    } else if has(&["약국", "병원", "PHARMACY"]) {
        ("health", 0.9)
    } else if has(&["CGV", "영화", "NETFLIX"]) {
        ("entertainment", 0.85)
    } else if has(&["학원", "강의", "UDEMY"]) {
        ("education", 0.85)
    } else if has(&["다이소", "문구", "볼펜"]) {
        ("office_supplies", 0.85)
    } else if has(&["UNCLEAR"]) {
        ("entertainment", 0.6)
    } else {
        ("other", 0.3)
    }
}

#[derive(Serialize)]
struct TagsResponse {
    models: Vec<ModelInfo>,
}

#[derive(Serialize)]
struct ModelInfo {
    name: String,
    modified_at: String,
    size: u64,
}

#[derive(Deserialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
}

#[derive(Serialize)]
struct GenerateResponse {
    model: String,
    response: String,
    done: bool,
}
