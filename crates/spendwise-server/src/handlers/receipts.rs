//! Receipt handlers
//!
//! Uploads arrive either as multipart forms (field `file`, or `image`) or as
//! JSON with a base64-encoded image.

use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, Query, State},
    http::HeaderMap,
    Json,
};
use base64::Engine;
use serde::Deserialize;
use tracing::info;

use crate::{get_user_id, parse_date_param, AppError, AppState, MAX_UPLOAD_SIZE};
use spendwise_core::models::Receipt;
use spendwise_core::{OcrPreview, ProcessedReceipt, ReceiptDeletion};

/// JSON receipt upload
#[derive(Debug, Deserialize)]
pub struct Base64Upload {
    /// Base64-encoded image bytes (standard alphabet)
    pub image: String,
    #[serde(default)]
    pub file_name: Option<String>,
}

/// Query parameters for listing receipts
#[derive(Debug, Deserialize)]
pub struct ReceiptListQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    #[serde(default = "default_receipt_limit")]
    pub limit: i64,
}

fn default_receipt_limit() -> i64 {
    100
}

/// Query parameters for deleting a receipt
#[derive(Debug, Deserialize)]
pub struct DeleteReceiptQuery {
    #[serde(default)]
    pub delete_expenses: bool,
}

/// Read the image field from a multipart form
async fn read_image(mut multipart: Multipart) -> Result<(Vec<u8>, Option<String>), AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::bad_request(&format!("Failed to read form field: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        if name != "file" && name != "image" {
            continue;
        }

        let file_name = field.file_name().map(String::from);
        let bytes = field
            .bytes()
            .await
            .map_err(|_| AppError::bad_request("Failed to read file data"))?;
        check_size(bytes.len())?;
        return Ok((bytes.to_vec(), file_name));
    }

    Err(AppError::bad_request("Missing file field"))
}

fn check_size(len: usize) -> Result<(), AppError> {
    if len > MAX_UPLOAD_SIZE {
        return Err(AppError::bad_request(&format!(
            "File too large. Maximum size is {} MB",
            MAX_UPLOAD_SIZE / 1024 / 1024
        )));
    }
    Ok(())
}

async fn process_upload(
    state: &AppState,
    user_id: &str,
    image: Vec<u8>,
    file_name: Option<String>,
) -> Result<Json<ProcessedReceipt>, AppError> {
    info!(
        "Processing receipt upload for {} ({} bytes)",
        user_id,
        image.len()
    );

    let processed = state
        .receipts
        .upload_and_process(user_id, &image, file_name.as_deref())
        .await?;

    state.db.log_audit(
        user_id,
        "upload",
        Some("receipt"),
        Some(&processed.receipt.id),
        Some(&format!(
            "status={}, expenses={}, total={}",
            processed.receipt.ocr_status.as_str(),
            processed.expenses.len(),
            processed.receipt.total_amount
        )),
    )?;

    Ok(Json(processed))
}

/// POST /api/receipts - Upload a receipt image and record its expenses
pub async fn upload_receipt(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Json<ProcessedReceipt>, AppError> {
    let user_id = get_user_id(&headers);
    let (image, file_name) = read_image(multipart).await?;
    process_upload(&state, &user_id, image, file_name).await
}

/// POST /api/receipts/base64 - Upload a base64-encoded receipt image
pub async fn upload_receipt_base64(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<Base64Upload>,
) -> Result<Json<ProcessedReceipt>, AppError> {
    let user_id = get_user_id(&headers);

    let image = base64::engine::general_purpose::STANDARD
        .decode(body.image.trim())
        .map_err(|_| AppError::bad_request("Image is not valid base64"))?;
    check_size(image.len())?;

    process_upload(&state, &user_id, image, body.file_name).await
}

/// POST /api/receipts/ocr - OCR preview with a suggested category, nothing stored
pub async fn ocr_receipt(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<OcrPreview>, AppError> {
    let (image, _) = read_image(multipart).await?;
    Ok(Json(state.receipts.ocr_only(&image).await?))
}

/// GET /api/receipts - List the caller's receipts, newest purchase first
pub async fn list_receipts(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<ReceiptListQuery>,
) -> Result<Json<Vec<Receipt>>, AppError> {
    let user_id = get_user_id(&headers);
    let start = parse_date_param("start_date", params.start_date.as_deref(), false)?;
    let end = parse_date_param("end_date", params.end_date.as_deref(), true)?;

    Ok(Json(state.receipts.list(&user_id, start, end, params.limit)?))
}

/// GET /api/receipts/:id - Get a receipt with its expenses
pub async fn get_receipt(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<ProcessedReceipt>, AppError> {
    let user_id = get_user_id(&headers);
    Ok(Json(state.receipts.get_with_expenses(&user_id, &id)?))
}

/// DELETE /api/receipts/:id - Delete a receipt and its stored image
pub async fn delete_receipt(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(params): Query<DeleteReceiptQuery>,
) -> Result<Json<ReceiptDeletion>, AppError> {
    let user_id = get_user_id(&headers);

    let deletion = state
        .receipts
        .delete(&user_id, &id, params.delete_expenses)?;

    state.db.log_audit(
        &user_id,
        "delete",
        Some("receipt"),
        Some(&id),
        Some(&format!(
            "expenses_deleted={}, image_deleted={}",
            deletion.expenses_deleted, deletion.image_deleted
        )),
    )?;

    Ok(Json(deletion))
}
