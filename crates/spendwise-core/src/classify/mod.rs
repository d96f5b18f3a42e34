//! Category classification engine
//!
//! Receipts are classified through a confidence-ranked sequence of tiers.
//! The first tier whose result clears its threshold wins:
//!
//! 1. Model prediction (confident)
//! 2. Item keyword match
//! 3. Store keyword match
//! 4. Model prediction (low confidence)
//! 5. Item keyword match, any confidence
//! 6. Store keyword match, any confidence
//! 7. Large-amount heuristic
//! 8. `Other` at 0.0
//!
//! Classification never fails. A broken model backend is logged and treated
//! as "no opinion".

mod lexicon;
mod model;

pub use lexicon::{default_keywords_path, CategoryKeywords, KeywordLexicon, KeywordMatch, KEYWORDS_ENV};
pub use model::{
    parse_prediction, render_prompt, CategoryModel, MockModel, ModelClient, ModelPrediction,
    OllamaModel,
};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::Category;

/// Confidence given to every keyword suggestion
const SUGGESTION_CONFIDENCE: f64 = 0.8;
const MAX_SUGGESTIONS: usize = 3;

/// Thresholds and constants of the tiered classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierPolicy {
    pub model_threshold: f64,
    pub item_threshold: f64,
    pub store_threshold: f64,
    pub model_fallback_threshold: f64,
    pub item_confidence: f64,
    pub store_confidence: f64,
    pub large_amount_threshold: f64,
    pub large_amount_category: Category,
    pub large_amount_confidence: f64,
}

impl Default for ClassifierPolicy {
    fn default() -> Self {
        Self {
            model_threshold: 0.8,
            item_threshold: 0.9,
            store_threshold: 0.7,
            model_fallback_threshold: 0.5,
            item_confidence: 0.9,
            store_confidence: 0.7,
            large_amount_threshold: 100_000.0,
            large_amount_category: Category::DiningOut,
            large_amount_confidence: 0.3,
        }
    }
}

/// Which tier produced a classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationTier {
    Model,
    ItemKeyword,
    StoreKeyword,
    ModelFallback,
    ItemFallback,
    StoreFallback,
    AmountHeuristic,
    Default,
}

impl ClassificationTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Model => "model",
            Self::ItemKeyword => "item_keyword",
            Self::StoreKeyword => "store_keyword",
            Self::ModelFallback => "model_fallback",
            Self::ItemFallback => "item_fallback",
            Self::StoreFallback => "store_fallback",
            Self::AmountHeuristic => "amount_heuristic",
            Self::Default => "default",
        }
    }
}

/// Result of classifying a transaction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub category: Category,
    /// Always within [0, 1]
    pub confidence: f64,
    pub tier: ClassificationTier,
}

impl Classification {
    fn new(category: Category, confidence: f64, tier: ClassificationTier) -> Self {
        Self {
            category,
            confidence: if confidence.is_finite() {
                confidence.clamp(0.0, 1.0)
            } else {
                0.0
            },
            tier,
        }
    }
}

/// Category suggested for free text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySuggestion {
    pub category: Category,
    pub matched_keywords: Vec<String>,
    pub confidence: f64,
}

/// Tiered category classifier
#[derive(Clone)]
pub struct CategoryClassifier {
    lexicon: KeywordLexicon,
    policy: ClassifierPolicy,
    model: Option<ModelClient>,
}

impl Default for CategoryClassifier {
    fn default() -> Self {
        Self::new(KeywordLexicon::default(), ClassifierPolicy::default())
    }
}

impl CategoryClassifier {
    /// Create a keyword-only classifier
    pub fn new(lexicon: KeywordLexicon, policy: ClassifierPolicy) -> Self {
        Self {
            lexicon,
            policy,
            model: None,
        }
    }

    /// Attach a model backend for tiers 1 and 4
    pub fn with_model(mut self, model: Option<ModelClient>) -> Self {
        self.model = model;
        self
    }

    pub fn policy(&self) -> &ClassifierPolicy {
        &self.policy
    }

    pub fn lexicon(&self) -> &KeywordLexicon {
        &self.lexicon
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    pub fn model(&self) -> Option<&ModelClient> {
        self.model.as_ref()
    }

    /// Classify a transaction into a spending category
    pub async fn classify(
        &self,
        store_name: &str,
        item_name: Option<&str>,
        amount: Option<f64>,
    ) -> Classification {
        let item_name = item_name.map(str::trim).filter(|s| !s.is_empty());
        let policy = &self.policy;

        let model = self.predict(store_name, item_name).await;
        let item = item_name
            .and_then(|name| self.lexicon.match_item(name))
            .map(|category| (category, policy.item_confidence));
        let store = self
            .lexicon
            .match_store(store_name)
            .map(|category| (category, policy.store_confidence));

        // 1. Confident model prediction
        if let Some(p) = model.filter(|p| p.confidence >= policy.model_threshold) {
            debug!("Model classified '{}': {} ({:.2})", store_name, p.category, p.confidence);
            return Classification::new(p.category, p.confidence, ClassificationTier::Model);
        }

        // 2. Item keyword
        if let Some((category, confidence)) = item.filter(|(_, c)| *c >= policy.item_threshold) {
            debug!("Item keyword matched for '{:?}': {}", item_name, category);
            return Classification::new(category, confidence, ClassificationTier::ItemKeyword);
        }

        // 3. Store keyword
        if let Some((category, confidence)) = store.filter(|(_, c)| *c >= policy.store_threshold) {
            debug!("Store keyword matched for '{}': {}", store_name, category);
            return Classification::new(category, confidence, ClassificationTier::StoreKeyword);
        }

        // 4. Low-confidence model prediction
        if let Some(p) = model.filter(|p| p.confidence > policy.model_fallback_threshold) {
            debug!(
                "Model fallback for '{}': {} ({:.2})",
                store_name, p.category, p.confidence
            );
            return Classification::new(p.category, p.confidence, ClassificationTier::ModelFallback);
        }

        // 5-6. Any keyword hit
        if let Some((category, confidence)) = item.filter(|(_, c)| *c > 0.0) {
            debug!("Item keyword fallback for '{:?}': {}", item_name, category);
            return Classification::new(category, confidence, ClassificationTier::ItemFallback);
        }
        if let Some((category, confidence)) = store.filter(|(_, c)| *c > 0.0) {
            debug!("Store keyword fallback for '{}': {}", store_name, category);
            return Classification::new(category, confidence, ClassificationTier::StoreFallback);
        }

        // 7. Large purchases with no other signal
        if let Some(amount) = amount.filter(|a| *a > policy.large_amount_threshold) {
            debug!(
                "Amount heuristic for '{}' ({}): {}",
                store_name, amount, policy.large_amount_category
            );
            return Classification::new(
                policy.large_amount_category,
                policy.large_amount_confidence,
                ClassificationTier::AmountHeuristic,
            );
        }

        // 8. Nothing matched
        debug!("Falling back to '{}' for '{}'", Category::Other, store_name);
        Classification::new(Category::Other, 0.0, ClassificationTier::Default)
    }

    /// Ask the model, if one is configured and reachable
    async fn predict(&self, store_name: &str, item_name: Option<&str>) -> Option<ModelPrediction> {
        let model = self.model.as_ref()?;

        if !model.is_available().await {
            debug!("Category model {} unavailable, skipping", model.model());
            return None;
        }

        let text = classification_text(store_name, item_name);
        match model.predict(&text).await {
            Ok(prediction) => Some(prediction),
            Err(e) => {
                warn!("Category model failed for '{}': {}", text, e);
                None
            }
        }
    }

    /// Suggest up to three categories whose keywords relate to free text
    pub fn suggest(&self, text: &str) -> Vec<CategorySuggestion> {
        let mut matches = self.lexicon.related(text);
        // Stable sort keeps category order among equal match counts
        matches.sort_by(|a, b| b.keywords.len().cmp(&a.keywords.len()));

        matches
            .into_iter()
            .take(MAX_SUGGESTIONS)
            .map(|m| CategorySuggestion {
                category: m.category,
                matched_keywords: m.keywords.into_iter().take(MAX_SUGGESTIONS).collect(),
                confidence: SUGGESTION_CONFIDENCE,
            })
            .collect()
    }
}

/// Text sent to the model: "{store}에서 {item}" or just the store
pub fn classification_text(store_name: &str, item_name: Option<&str>) -> String {
    match item_name {
        Some(item) => format!("{}에서 {}", store_name.trim(), item),
        None => store_name.trim().to_string(),
    }
}
