//! Expense handlers

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderMap, Response, StatusCode},
    Json,
};
use serde::Deserialize;
use tracing::info;

use crate::{get_user_id, parse_date_param, AppError, AppState, SuccessResponse};
use spendwise_core::models::{
    Category, Expense, ExpenseQuery, ExpenseStatistics, ExpenseUpdate, NewExpense,
};

/// Query parameters for listing and exporting expenses
#[derive(Debug, Default, Deserialize)]
pub struct ExpenseListQuery {
    /// Category label ("식비") or code ("food")
    pub category: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    /// Widen the scope to every member of this organization
    pub organization: Option<String>,
    pub limit: Option<i64>,
}

impl ExpenseListQuery {
    fn into_query(self, default_limit: i64) -> Result<ExpenseQuery, AppError> {
        let category = self
            .category
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .map(|c| c.parse::<Category>())
            .transpose()
            .map_err(|e| AppError::bad_request(&e))?;

        Ok(ExpenseQuery {
            category,
            start: parse_date_param("start_date", self.start_date.as_deref(), false)?,
            end: parse_date_param("end_date", self.end_date.as_deref(), true)?,
            organization: self.organization.filter(|o| !o.trim().is_empty()),
            limit: self.limit.unwrap_or(default_limit),
        })
    }
}

/// Query parameters for statistics
#[derive(Debug, Deserialize)]
pub struct StatisticsQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub organization: Option<String>,
}

/// POST /api/expenses - Record an expense, classifying it when no category is given
pub async fn create_expense(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<NewExpense>,
) -> Result<Json<Expense>, AppError> {
    let user_id = get_user_id(&headers);

    let expense = state.expenses.create(&user_id, body).await?;

    state.db.log_audit(
        &user_id,
        "create",
        Some("expense"),
        Some(&expense.id),
        Some(&format!(
            "amount={}, category={}, method={}",
            expense.amount,
            expense.category,
            expense.classification_method.as_str()
        )),
    )?;

    Ok(Json(expense))
}

/// GET /api/expenses - List the caller's (or organization's) expenses
pub async fn list_expenses(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<ExpenseListQuery>,
) -> Result<Json<Vec<Expense>>, AppError> {
    let user_id = get_user_id(&headers);
    let query = params.into_query(ExpenseQuery::default().limit)?;

    let expenses = state.expenses.list(&user_id, &query)?;
    Ok(Json(expenses))
}

/// GET /api/expenses/statistics - Spending per category for a period
pub async fn get_statistics(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<StatisticsQuery>,
) -> Result<Json<ExpenseStatistics>, AppError> {
    let user_id = get_user_id(&headers);
    let start = parse_date_param("start_date", params.start_date.as_deref(), false)?;
    let end = parse_date_param("end_date", params.end_date.as_deref(), true)?;
    let organization = params.organization.filter(|o| !o.trim().is_empty());

    let stats = state
        .expenses
        .statistics(&user_id, start, end, organization.as_deref())?;
    Ok(Json(stats))
}

/// GET /api/expenses/export - Export expenses as CSV
pub async fn export_expenses(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<ExpenseListQuery>,
) -> Result<Response<Body>, AppError> {
    let user_id = get_user_id(&headers);
    let query = params.into_query(spendwise_core::expenses::MAX_LIST_LIMIT)?;

    let csv = state.expenses.export_csv(&user_id, &query)?;
    let lines = csv.lines().count().saturating_sub(1);
    info!("Exported {} expenses to CSV", lines);

    state.db.log_audit(
        &user_id,
        "export_expenses",
        Some("expense"),
        None,
        Some(&format!(
            "count={}, category={:?}, from={:?}, to={:?}",
            lines, query.category, query.start, query.end
        )),
    )?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/csv; charset=utf-8")
        .header(
            header::CONTENT_DISPOSITION,
            "attachment; filename=\"expenses.csv\"",
        )
        .body(Body::from(csv))
        .map_err(|e| AppError::internal(&e.to_string()))
}

/// GET /api/expenses/by-receipt/:id - Expenses derived from a receipt
pub async fn get_expenses_by_receipt(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(receipt_id): Path<String>,
) -> Result<Json<Vec<Expense>>, AppError> {
    let user_id = get_user_id(&headers);
    let expenses = state.expenses.by_receipt(&user_id, &receipt_id)?;
    Ok(Json(expenses))
}

/// GET /api/expenses/:id - Get a single expense
pub async fn get_expense(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Expense>, AppError> {
    let user_id = get_user_id(&headers);
    Ok(Json(state.expenses.get(&user_id, &id)?))
}

/// PUT /api/expenses/:id - Update an expense
///
/// Setting a category marks the expense as manually classified.
pub async fn update_expense(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<ExpenseUpdate>,
) -> Result<Json<Expense>, AppError> {
    let user_id = get_user_id(&headers);
    let category_changed = body.category.is_some();

    let expense = state.expenses.update(&user_id, &id, body)?;

    state.db.log_audit(
        &user_id,
        "update",
        Some("expense"),
        Some(&id),
        Some(&format!(
            "category={}, manual={}",
            expense.category, category_changed
        )),
    )?;

    Ok(Json(expense))
}

/// DELETE /api/expenses/:id - Delete an expense
pub async fn delete_expense(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, AppError> {
    let user_id = get_user_id(&headers);

    state.expenses.delete(&user_id, &id)?;

    state
        .db
        .log_audit(&user_id, "delete", Some("expense"), Some(&id), None)?;

    Ok(Json(SuccessResponse { success: true }))
}

/// POST /api/expenses/:id/reclassify - Re-run automatic classification
pub async fn reclassify_expense(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Expense>, AppError> {
    let user_id = get_user_id(&headers);

    let expense = state.expenses.reclassify(&user_id, &id).await?;

    state.db.log_audit(
        &user_id,
        "reclassify",
        Some("expense"),
        Some(&id),
        Some(&format!(
            "category={}, confidence={:?}",
            expense.category, expense.classification_confidence
        )),
    )?;

    Ok(Json(expense))
}
