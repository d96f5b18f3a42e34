//! Statistical category model backends
//!
//! The classifier consults a model before and after its keyword tiers. The
//! model is a zero-shot prompt against a local Ollama server, or a mock for
//! tests and development.
//!
//! Environment variables:
//! - `CATEGORY_MODEL`: Backend to use (ollama, mock). Default: ollama
//! - `OLLAMA_HOST`: Ollama server URL (required for ollama backend)
//! - `OLLAMA_MODEL`: Model name (default: llama3.2)

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::models::Category;

/// Embedded zero-shot classification prompt
const CLASSIFY_PROMPT: &str = include_str!("../../../../prompts/classify_category.md");

/// A model's opinion about a piece of receipt text
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPrediction {
    pub category: Category,
    pub confidence: f64,
}

/// Interface for category model backends
#[async_trait]
pub trait CategoryModel: Send + Sync {
    /// Predict the category of receipt text ("{store}에서 {item}")
    async fn predict(&self, text: &str) -> Result<ModelPrediction>;

    /// Whether the backend can currently answer
    async fn is_available(&self) -> bool;

    /// Model name (for logging)
    fn model(&self) -> &str;
}

/// Concrete category model enum
#[derive(Clone)]
pub enum ModelClient {
    Ollama(OllamaModel),
    Mock(MockModel),
}

impl ModelClient {
    /// Create a model client from environment variables
    ///
    /// Returns None when no model is configured; the classifier then runs
    /// on keywords alone.
    pub fn from_env() -> Option<Self> {
        let backend = std::env::var("CATEGORY_MODEL").unwrap_or_else(|_| "ollama".to_string());

        match backend.to_lowercase().as_str() {
            "ollama" => OllamaModel::from_env().map(ModelClient::Ollama),
            "mock" => Some(ModelClient::Mock(MockModel::new())),
            "none" | "off" => None,
            _ => {
                warn!(backend = %backend, "Unknown CATEGORY_MODEL, falling back to ollama");
                OllamaModel::from_env().map(ModelClient::Ollama)
            }
        }
    }

    /// Create an Ollama model directly
    pub fn ollama(host: &str, model: &str) -> Self {
        ModelClient::Ollama(OllamaModel::new(host, model))
    }

    /// Create a mock model for testing
    pub fn mock() -> Self {
        ModelClient::Mock(MockModel::new())
    }
}

#[async_trait]
impl CategoryModel for ModelClient {
    async fn predict(&self, text: &str) -> Result<ModelPrediction> {
        match self {
            ModelClient::Ollama(m) => m.predict(text).await,
            ModelClient::Mock(m) => m.predict(text).await,
        }
    }

    async fn is_available(&self) -> bool {
        match self {
            ModelClient::Ollama(m) => m.is_available().await,
            ModelClient::Mock(m) => m.is_available().await,
        }
    }

    fn model(&self) -> &str {
        match self {
            ModelClient::Ollama(m) => m.model(),
            ModelClient::Mock(m) => m.model(),
        }
    }
}

// ============================================================================
// Ollama
// ============================================================================

/// Zero-shot classification through the Ollama generate API
#[derive(Clone)]
pub struct OllamaModel {
    http_client: Client,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
}

impl OllamaModel {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("OLLAMA_HOST").ok()?;
        let model = std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| "llama3.2".to_string());
        Some(Self::new(&host, &model))
    }

    pub fn host(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl CategoryModel for OllamaModel {
    async fn predict(&self, text: &str) -> Result<ModelPrediction> {
        let request = OllamaRequest {
            model: self.model.clone(),
            prompt: render_prompt(text),
            stream: false,
        };

        let response = self
            .http_client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await?
            .error_for_status()?;

        let ollama_response: OllamaResponse = response.json().await?;
        debug!("Ollama category response: {}", ollama_response.response);

        parse_prediction(&ollama_response.response)
    }

    async fn is_available(&self) -> bool {
        match self
            .http_client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Fill the classification prompt with the category table and the text
pub fn render_prompt(text: &str) -> String {
    let categories = Category::all()
        .iter()
        .map(|c| format!("- {}: {}", c.code(), c.description()))
        .collect::<Vec<_>>()
        .join("\n");

    CLASSIFY_PROMPT
        .replace("{{categories}}", &categories)
        .replace("{{text}}", &text.replace('"', "'"))
}

#[derive(Debug, Deserialize)]
struct RawPrediction {
    category: String,
    #[serde(default)]
    confidence: Option<f64>,
}

/// Parse a model reply, tolerating chatter around the JSON object
pub fn parse_prediction(response: &str) -> Result<ModelPrediction> {
    let response = response.trim();
    let start = response.find('{');
    let end = response.rfind('}');

    let json_str = match (start, end) {
        (Some(s), Some(e)) if s < e => &response[s..=e],
        _ => {
            return Err(Error::InvalidData(format!(
                "No JSON found in model response | Raw: {}",
                truncate(response)
            )))
        }
    };

    let raw: RawPrediction = serde_json::from_str(json_str).map_err(|e| {
        Error::InvalidData(format!(
            "Invalid JSON from model: {} | Raw: {}",
            e,
            truncate(json_str)
        ))
    })?;

    let category = raw.category.parse::<Category>().map_err(Error::InvalidData)?;
    let confidence = raw.confidence.unwrap_or(0.0);
    if !confidence.is_finite() {
        return Err(Error::InvalidData("Model confidence is not a number".into()));
    }

    Ok(ModelPrediction {
        category,
        confidence: confidence.clamp(0.0, 1.0),
    })
}

fn truncate(s: &str) -> String {
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s.to_string()
    }
}

// ============================================================================
// Mock
// ============================================================================

/// Mock category model for testing
///
/// Answers a fixed prediction when one is set, otherwise recognizes a few
/// well-known chains and returns a low-confidence `Other` for anything else.
#[derive(Clone)]
pub struct MockModel {
    /// Whether is_available should return true
    pub healthy: bool,
    /// Fixed answer overriding the built-in table
    pub answer: Option<ModelPrediction>,
    /// Fail every prediction (simulates a broken backend)
    pub failing: bool,
}

impl Default for MockModel {
    fn default() -> Self {
        Self::new()
    }
}

impl MockModel {
    /// Create a new mock model (healthy by default)
    pub fn new() -> Self {
        Self {
            healthy: true,
            answer: None,
            failing: false,
        }
    }

    pub fn unhealthy() -> Self {
        Self {
            healthy: false,
            ..Self::new()
        }
    }

    /// Always answer with this category and confidence
    pub fn with_answer(category: Category, confidence: f64) -> Self {
        Self {
            answer: Some(ModelPrediction {
                category,
                confidence,
            }),
            ..Self::new()
        }
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::new()
        }
    }
}

#[async_trait]
impl CategoryModel for MockModel {
    async fn predict(&self, text: &str) -> Result<ModelPrediction> {
        if self.failing {
            return Err(Error::InvalidData("mock model failure".into()));
        }
        if let Some(answer) = self.answer {
            return Ok(answer);
        }

        let upper = text.to_uppercase();
        let (category, confidence) = match upper.as_str() {
            t if t.contains("STARBUCKS") || t.contains("MCDONALD") => (Category::Food, 0.85),
            t if t.contains("UBER") || t.contains("KORAIL") => (Category::Transportation, 0.85),
            t if t.contains("NETFLIX") || t.contains("CGV") => (Category::Entertainment, 0.85),
            t if t.contains("OLIVE YOUNG") => (Category::Health, 0.6),
            _ => (Category::Other, 0.2),
        };

        Ok(ModelPrediction {
            category,
            confidence,
        })
    }

    async fn is_available(&self) -> bool {
        self.healthy
    }

    fn model(&self) -> &str {
        "mock"
    }
}
