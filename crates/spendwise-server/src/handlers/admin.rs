//! Retention, archive and storage handlers (admin only)

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use tracing::info;

use crate::{get_user_id, require_admin, AppError, AppState};
use spendwise_core::models::{ArchiveReport, CleanupReport, ReceiptsSummary, StorageStats};

/// Query parameters for the retention sweep; omitted values use the
/// configured retention defaults
#[derive(Debug, Default, Deserialize)]
pub struct CleanupQuery {
    pub days_to_keep: Option<i64>,
    pub keep_successful_only: Option<bool>,
    #[serde(default)]
    pub dry_run: bool,
}

/// Query parameters for the failed-receipt sweep
#[derive(Debug, Default, Deserialize)]
pub struct FailedCleanupQuery {
    pub days_old: Option<i64>,
}

/// Query parameters for the archive sweep
#[derive(Debug, Default, Deserialize)]
pub struct ArchiveQuery {
    pub days_to_keep: Option<i64>,
}

fn check_days(name: &str, days: i64) -> Result<i64, AppError> {
    if days < 0 {
        return Err(AppError::bad_request(&format!(
            "{} must not be negative",
            name
        )));
    }
    Ok(days)
}

/// POST /api/admin/cleanup/receipts - Delete old receipts and their images
pub async fn cleanup_receipts(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<CleanupQuery>,
) -> Result<Json<CleanupReport>, AppError> {
    let user_id = get_user_id(&headers);
    require_admin(&state, &user_id)?;

    let days = check_days(
        "days_to_keep",
        params.days_to_keep.unwrap_or(state.retention.days_to_keep),
    )?;
    let keep_successful_only = params
        .keep_successful_only
        .unwrap_or(state.retention.keep_successful_only);

    let report = state
        .sweeper
        .cleanup_old_receipts(days, keep_successful_only, params.dry_run)?;
    info!(
        "Retention sweep by {}: {} receipt(s), {} MB (dry_run={})",
        user_id, report.deleted_count, report.storage_freed_mb, report.dry_run
    );

    if !report.dry_run {
        state.db.log_audit(
            &user_id,
            "cleanup_receipts",
            Some("receipt"),
            None,
            Some(&format!(
                "days={}, keep_successful_only={}, deleted={}, errors={}",
                days,
                keep_successful_only,
                report.deleted_count,
                report.errors.len()
            )),
        )?;
    }

    Ok(Json(report))
}

/// POST /api/admin/cleanup/failed-receipts - Delete old failed receipts
pub async fn cleanup_failed_receipts(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<FailedCleanupQuery>,
) -> Result<Json<CleanupReport>, AppError> {
    let user_id = get_user_id(&headers);
    require_admin(&state, &user_id)?;

    let days = check_days(
        "days_old",
        params.days_old.unwrap_or(state.retention.failed_days),
    )?;
    let report = state.sweeper.cleanup_failed_receipts(days)?;

    state.db.log_audit(
        &user_id,
        "cleanup_failed_receipts",
        Some("receipt"),
        None,
        Some(&format!(
            "days={}, deleted={}, errors={}",
            days,
            report.deleted_count,
            report.errors.len()
        )),
    )?;

    Ok(Json(report))
}

/// GET /api/admin/storage/stats - Image storage usage and estimated cost
pub async fn get_storage_stats(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<StorageStats>, AppError> {
    let user_id = get_user_id(&headers);
    require_admin(&state, &user_id)?;

    Ok(Json(state.sweeper.storage_stats()?))
}

/// POST /api/admin/archive/receipts - Move old completed receipts to the archive
pub async fn archive_receipts(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<ArchiveQuery>,
) -> Result<Json<ArchiveReport>, AppError> {
    let user_id = get_user_id(&headers);
    require_admin(&state, &user_id)?;

    let days = check_days(
        "days_to_keep",
        params.days_to_keep.unwrap_or(state.retention.archive_days),
    )?;
    let report = state.sweeper.archive_old_receipts(days)?;

    state.db.log_audit(
        &user_id,
        "archive_receipts",
        Some("receipt"),
        None,
        Some(&format!(
            "days={}, archived={}, errors={}",
            days,
            report.archived_count,
            report.errors.len()
        )),
    )?;

    Ok(Json(report))
}

/// GET /api/admin/receipts/summary - Receipt counts and cleanup recommendation
pub async fn get_receipts_summary(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ReceiptsSummary>, AppError> {
    let user_id = get_user_id(&headers);
    require_admin(&state, &user_id)?;

    Ok(Json(state.sweeper.receipts_summary()?))
}
