//! Share link handlers
//!
//! Creating, listing and revoking links goes through the authenticated API.
//! The organization and expense views are served without authentication and
//! take the share token as a query parameter.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use tracing::info;

use crate::{get_user_id, parse_date_param, AppError, AppState};
use spendwise_core::models::{Expense, ExpenseQuery, PublicOrganization, ShareToken};

/// Default page size for the shared expense view
const PUBLIC_EXPENSES_DEFAULT_LIMIT: i64 = 1000;

/// Query parameters for issuing a share link
#[derive(Debug, Default, Deserialize)]
pub struct ShareCreateQuery {
    pub expires_in_days: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ShareTokenQuery {
    pub token: String,
}

/// Query parameters for the shared expense view
#[derive(Debug, Deserialize)]
pub struct PublicExpensesQuery {
    pub token: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub limit: Option<i64>,
}

/// POST /api/public/share/create - Issue a share link for the caller's organization
pub async fn create_share_link(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<ShareCreateQuery>,
) -> Result<Json<ShareToken>, AppError> {
    let user_id = get_user_id(&headers);
    let share = state.shares.create(&user_id, params.expires_in_days)?;

    state.db.log_audit(
        &user_id,
        "create_share_link",
        Some("organization"),
        Some(&share.organization_name),
        Some(&format!("expires_at={}", share.expires_at)),
    )?;

    Ok(Json(share))
}

/// GET /api/shares - Share links of the caller's organization
pub async fn list_share_links(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<ShareToken>>, AppError> {
    let user_id = get_user_id(&headers);
    Ok(Json(state.shares.list(&user_id)?))
}

/// DELETE /api/shares/:token - Revoke a share link
pub async fn revoke_share_link(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(token): Path<String>,
) -> Result<Json<ShareToken>, AppError> {
    let user_id = get_user_id(&headers);
    let share = state.shares.revoke(&user_id, &token)?;

    state.db.log_audit(
        &user_id,
        "revoke_share_link",
        Some("organization"),
        Some(&share.organization_name),
        None,
    )?;

    Ok(Json(share))
}

/// GET /api/public/organization?token= - Organization and members behind a share link
pub async fn get_public_organization(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ShareTokenQuery>,
) -> Result<Json<PublicOrganization>, AppError> {
    let organization = state.shares.organization(&params.token)?;
    info!("Shared organization view for '{}'", organization.name);
    Ok(Json(organization))
}

/// GET /api/public/expenses?token= - Read-only expense list behind a share link
pub async fn get_public_expenses(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PublicExpensesQuery>,
) -> Result<Json<Vec<Expense>>, AppError> {
    let query = ExpenseQuery {
        start: parse_date_param("start_date", params.start_date.as_deref(), false)?,
        end: parse_date_param("end_date", params.end_date.as_deref(), true)?,
        limit: params.limit.unwrap_or(PUBLIC_EXPENSES_DEFAULT_LIMIT),
        ..Default::default()
    };
    Ok(Json(state.shares.expenses(&params.token, &query)?))
}
