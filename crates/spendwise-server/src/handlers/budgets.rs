//! Budget handlers
//!
//! Every response carries `spent` and `remaining`, computed at read time.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use serde::Serialize;

use crate::{get_user_id, AppError, AppState, SuccessResponse};
use spendwise_core::models::{BudgetUpdate, BudgetWithUsage, NewBudget};

/// Response for organization migration
#[derive(Serialize)]
pub struct MigrationResponse {
    pub migrated: usize,
}

/// POST /api/budgets - Create a personal or organization budget
pub async fn create_budget(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<NewBudget>,
) -> Result<Json<BudgetWithUsage>, AppError> {
    let user_id = get_user_id(&headers);

    let budget = state.budgets.create(&user_id, body)?;

    state.db.log_audit(
        &user_id,
        "create",
        Some("budget"),
        Some(&budget.budget.id),
        Some(&format!(
            "name={}, amount={}, category={}, shared={}",
            budget.budget.name,
            budget.budget.amount,
            budget.budget.category.as_str(),
            budget.budget.is_shared()
        )),
    )?;

    Ok(Json(budget))
}

/// GET /api/budgets - Personal budgets plus the caller's organization budgets
pub async fn list_budgets(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<BudgetWithUsage>>, AppError> {
    let user_id = get_user_id(&headers);
    Ok(Json(state.budgets.list(&user_id)?))
}

/// GET /api/budgets/:id - Get a budget
pub async fn get_budget(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<BudgetWithUsage>, AppError> {
    let user_id = get_user_id(&headers);
    Ok(Json(state.budgets.get(&user_id, &id)?))
}

/// PUT /api/budgets/:id - Update a budget (owner only)
pub async fn update_budget(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<BudgetUpdate>,
) -> Result<Json<BudgetWithUsage>, AppError> {
    let user_id = get_user_id(&headers);

    let budget = state.budgets.update(&user_id, &id, body)?;

    state.db.log_audit(
        &user_id,
        "update",
        Some("budget"),
        Some(&id),
        Some(&format!(
            "name={}, amount={}",
            budget.budget.name, budget.budget.amount
        )),
    )?;

    Ok(Json(budget))
}

/// DELETE /api/budgets/:id - Delete a budget
pub async fn delete_budget(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, AppError> {
    let user_id = get_user_id(&headers);

    state.budgets.delete(&user_id, &id)?;

    state
        .db
        .log_audit(&user_id, "delete", Some("budget"), Some(&id), None)?;

    Ok(Json(SuccessResponse { success: true }))
}

/// POST /api/budgets/migrate-organization - Share the caller's personal
/// budgets with their organization
pub async fn migrate_budgets(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<MigrationResponse>, AppError> {
    let user_id = get_user_id(&headers);

    let migrated = state.budgets.migrate_to_organization(&user_id)?;

    state.db.log_audit(
        &user_id,
        "migrate_organization",
        Some("budget"),
        None,
        Some(&format!("migrated={}", migrated)),
    )?;

    Ok(Json(MigrationResponse { migrated }))
}
