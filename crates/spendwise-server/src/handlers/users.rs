//! Current user and organization membership handlers

use std::sync::Arc;

use axum::{extract::State, http::HeaderMap, Json};
use serde::{Deserialize, Serialize};

use crate::{get_user_id, get_user_profile, AppError, AppState};
use spendwise_core::models::User;

/// Response for the /api/me endpoint
#[derive(Serialize)]
pub struct MeResponse {
    #[serde(flatten)]
    pub user: User,
    pub is_admin: bool,
}

/// Request body for changing organization membership
#[derive(Debug, Deserialize)]
pub struct OrganizationRequest {
    /// New organization name; null or empty leaves the organization
    #[serde(default, rename = "organizationName", alias = "organization_name")]
    pub organization_name: Option<String>,
}

/// Make sure the caller has a user record, registering it on first sight
fn ensure_user(state: &AppState, headers: &HeaderMap) -> Result<User, AppError> {
    let user_id = get_user_id(headers);
    if let Some(user) = state.db.get_user(&user_id)? {
        return Ok(user);
    }

    let (email, name) = get_user_profile(headers, &user_id);
    let user = state.db.upsert_user(&user_id, &email, &name)?;
    state
        .db
        .log_audit(&user_id, "register", Some("user"), Some(&user_id), None)?;
    Ok(user)
}

/// GET /api/me - Get the current user, registering it if needed
pub async fn get_me(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<MeResponse>, AppError> {
    let user = ensure_user(&state, &headers)?;
    let is_admin = state.config.is_admin(&user.id);
    Ok(Json(MeResponse { user, is_admin }))
}

/// PUT /api/me/organization - Join, switch or leave an organization
pub async fn update_organization(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<OrganizationRequest>,
) -> Result<Json<User>, AppError> {
    let user = ensure_user(&state, &headers)?;

    state
        .db
        .set_user_organization(&user.id, body.organization_name.as_deref())?;

    let user = state
        .db
        .get_user(&user.id)?
        .ok_or_else(|| AppError::internal("User disappeared during update"))?;

    state.db.log_audit(
        &user.id,
        "update_organization",
        Some("user"),
        Some(&user.id),
        Some(&format!("organization={:?}", user.organization_name)),
    )?;

    Ok(Json(user))
}
