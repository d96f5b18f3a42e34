//! Category classification handlers

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{AppError, AppState};
use spendwise_core::{CategorySuggestion, Classification};

/// Request body for classifying a transaction
#[derive(Debug, Deserialize)]
pub struct ClassifyRequest {
    pub store_name: String,
    #[serde(default)]
    pub item_name: Option<String>,
    #[serde(default)]
    pub amount: Option<f64>,
}

/// Classification with the category code alongside its label
#[derive(Debug, Serialize)]
pub struct ClassifyResponse {
    #[serde(flatten)]
    pub classification: Classification,
    pub category_code: &'static str,
    pub description: &'static str,
}

/// Query parameters for keyword suggestions
#[derive(Debug, Deserialize)]
pub struct SuggestionQuery {
    pub text: String,
}

/// POST /api/classify - Classify a store/item/amount without recording anything
pub async fn classify(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ClassifyRequest>,
) -> Result<Json<ClassifyResponse>, AppError> {
    if body.store_name.trim().is_empty() {
        return Err(AppError::bad_request("store_name is required"));
    }

    let classification = state
        .classifier
        .classify(&body.store_name, body.item_name.as_deref(), body.amount)
        .await;

    Ok(Json(ClassifyResponse {
        category_code: classification.category.code(),
        description: classification.category.description(),
        classification,
    }))
}

/// GET /api/classify/suggestions - Categories whose keywords appear in free text
pub async fn get_suggestions(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SuggestionQuery>,
) -> Result<Json<Vec<CategorySuggestion>>, AppError> {
    if params.text.trim().is_empty() {
        return Err(AppError::bad_request("text is required"));
    }
    Ok(Json(state.classifier.suggest(&params.text)))
}
