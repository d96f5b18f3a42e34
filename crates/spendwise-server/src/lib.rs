//! Spendwise Web Server
//!
//! Axum-based REST API for the Spendwise receipt and budget tracker.
//!
//! Security features:
//! - API key authentication (secure by default, use --no-auth for local dev)
//! - Caller identity from the `x-user-id` header set by the upstream gateway
//! - Admin-only retention and storage endpoints
//! - Unauthenticated read-only views behind expiring share tokens
//! - Restrictive CORS policy and security headers
//! - Input validation (pagination limits, upload size limits)
//! - Audit logging for every mutation
//! - Sanitized error responses

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use tower_http::{cors::CorsLayer, set_header::SetResponseHeaderLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use spendwise_core::{
    BudgetReconciler, CategoryClassifier, CategoryModel, Database, ExpenseAggregator, ImageStore,
    LocalImageStore, MockOcr, OcrClient, OcrProvider, ReceiptProcessor, RetentionConfig,
    RetentionSweeper, ShareLinks, SpendwiseConfig,
};

mod handlers;
mod scheduler;

pub use scheduler::{run_cleanup_cycle, start_cleanup_scheduler, CleanupCycle, CleanupScheduleConfig};

/// Maximum receipt image size (10 MB)
pub const MAX_UPLOAD_SIZE: usize = 10 * 1024 * 1024;

/// Maximum pagination limit
pub const MAX_PAGE_LIMIT: i64 = 1000;

/// Header carrying the caller's user id, set by the upstream identity provider
pub const USER_ID_HEADER: &str = "x-user-id";

/// Optional profile headers used when a user is first registered
const USER_EMAIL_HEADER: &str = "x-user-email";
const USER_NAME_HEADER: &str = "x-user-name";

/// Authorization header for API key auth
const AUTHORIZATION_HEADER: &str = "authorization";

/// Identity used when authentication is disabled and no user header is sent
pub const LOCAL_DEV_USER: &str = "local-dev";

/// Server configuration
#[derive(Clone)]
pub struct ServerConfig {
    /// Whether authentication is required (secure by default)
    pub require_auth: bool,
    /// Allowed CORS origins (empty = same-origin only in production)
    pub allowed_origins: Vec<String>,
    /// API keys accepted as "Bearer <key>" in the Authorization header
    pub api_keys: Vec<String>,
    /// User ids allowed to run retention sweeps and read storage stats
    pub admin_users: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            require_auth: true,
            allowed_origins: vec![],
            api_keys: vec![],
            admin_users: vec![],
        }
    }
}

impl ServerConfig {
    /// Default configuration with API keys and admin users read from
    /// `SPENDWISE_API_KEYS` and `SPENDWISE_ADMIN_USERS`
    pub fn from_env() -> Self {
        Self {
            api_keys: std::env::var("SPENDWISE_API_KEYS")
                .map(|s| parse_list(&s))
                .unwrap_or_default(),
            admin_users: std::env::var("SPENDWISE_ADMIN_USERS")
                .map(|s| parse_list(&s))
                .unwrap_or_default(),
            ..Default::default()
        }
    }

    /// Whether a user may call the admin endpoints
    ///
    /// With authentication disabled every caller is a local developer and
    /// gets admin access unless an explicit admin list is configured.
    pub fn is_admin(&self, user_id: &str) -> bool {
        if !self.require_auth && self.admin_users.is_empty() {
            return true;
        }
        self.admin_users.iter().any(|u| u == user_id)
    }
}

/// Parse a comma-separated list, dropping empty entries
pub fn parse_list(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Backends the request services are built from
pub struct Services {
    pub settings: SpendwiseConfig,
    pub classifier: CategoryClassifier,
    pub ocr: OcrClient,
    pub images: Arc<dyn ImageStore>,
}

impl Services {
    /// Build services from the configuration file and environment
    pub fn from_env() -> anyhow::Result<Self> {
        let settings = SpendwiseConfig::load(None)?;
        let classifier = settings.build_classifier()?;

        let ocr = OcrClient::from_env().unwrap_or_else(|| {
            warn!("OCR backend not configured (set AZURE_OCR_ENDPOINT and AZURE_OCR_KEY, or OCR_BACKEND=mock)");
            OcrClient::Mock(MockOcr::failing("OCR backend not configured"))
        });
        info!("OCR backend: {}", ocr.name());

        let images: Arc<dyn ImageStore> =
            Arc::new(LocalImageStore::new(&settings.receipts.images_dir)?);
        info!(
            "Receipt images stored under {}",
            settings.receipts.images_dir.display()
        );

        Ok(Self {
            settings,
            classifier,
            ocr,
            images,
        })
    }
}

/// Shared application state
pub struct AppState {
    pub db: Database,
    pub config: ServerConfig,
    pub classifier: CategoryClassifier,
    pub expenses: ExpenseAggregator,
    pub budgets: BudgetReconciler,
    pub receipts: ReceiptProcessor,
    pub sweeper: RetentionSweeper,
    pub shares: ShareLinks,
    /// Defaults for admin sweeps when the request leaves them out
    pub retention: RetentionConfig,
}

impl AppState {
    pub fn new(db: Database, config: ServerConfig, services: Services) -> Self {
        let expenses = ExpenseAggregator::new(db.clone(), services.classifier.clone());
        let receipts = ReceiptProcessor::new(
            db.clone(),
            services.ocr,
            services.images.clone(),
            expenses.clone(),
            services.settings.receipts.clone(),
        );

        Self {
            budgets: BudgetReconciler::new(db.clone()),
            sweeper: RetentionSweeper::new(db.clone(), services.images),
            shares: ShareLinks::new(db.clone(), expenses.clone()),
            classifier: services.classifier,
            retention: services.settings.retention,
            expenses,
            receipts,
            config,
            db,
        }
    }
}

/// Authentication middleware - validates the API key and requires a caller id
///
/// API keys are compared in constant time. The user id header is trusted as
/// issued by the gateway in front of the server.
async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if !state.config.require_auth {
        return next.run(request).await;
    }

    let api_key_valid = request
        .headers()
        .get(AUTHORIZATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "))
        .map(|key| validate_api_key(key, &state.config.api_keys))
        .unwrap_or(false);

    if !api_key_valid {
        warn!(path = %request.uri().path(), "Unauthorized request - no valid API key");
        return unauthorized("Authentication required");
    }

    match header_value(request.headers(), USER_ID_HEADER) {
        Some(user) => {
            info!(user = %user, path = %request.uri().path(), "Authenticated via API key");
            next.run(request).await
        }
        None => {
            warn!(path = %request.uri().path(), "Unauthorized request - missing user id");
            unauthorized("User identity required")
        }
    }
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({ "error": message })),
    )
        .into_response()
}

/// Validate an API key against the configured keys using constant-time comparison
/// to prevent timing attacks.
fn validate_api_key(provided: &str, valid_keys: &[String]) -> bool {
    use subtle::ConstantTimeEq;

    let provided_bytes = provided.as_bytes();

    for key in valid_keys {
        let key_bytes = key.as_bytes();
        // Only compare if lengths match (constant-time for same-length keys)
        if provided_bytes.len() == key_bytes.len() && bool::from(provided_bytes.ct_eq(key_bytes)) {
            return true;
        }
    }
    false
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Caller user id from request headers ("local-dev" when auth is disabled
/// and no id was sent)
pub fn get_user_id(headers: &HeaderMap) -> String {
    header_value(headers, USER_ID_HEADER).unwrap_or_else(|| LOCAL_DEV_USER.to_string())
}

/// Email and display name for registering the caller, defaulting to the id
pub(crate) fn get_user_profile(headers: &HeaderMap, user_id: &str) -> (String, String) {
    let email = header_value(headers, USER_EMAIL_HEADER).unwrap_or_else(|| user_id.to_string());
    let name = header_value(headers, USER_NAME_HEADER).unwrap_or_else(|| user_id.to_string());
    (email, name)
}

/// Reject callers that are not configured as administrators
pub(crate) fn require_admin(state: &AppState, user_id: &str) -> Result<(), AppError> {
    if state.config.is_admin(user_id) {
        Ok(())
    } else {
        warn!(user = %user_id, "Admin endpoint called by non-admin user");
        Err(AppError::forbidden("Administrator access required"))
    }
}

/// Parse a date query parameter
///
/// Accepts `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS` or a bare
/// `YYYY-MM-DD`, which maps to the start of the day, or its last second when
/// `end_of_day` is set.
pub(crate) fn parse_date_param(
    name: &str,
    value: Option<&str>,
    end_of_day: bool,
) -> Result<Option<NaiveDateTime>, AppError> {
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };

    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(Some(dt));
        }
    }

    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
        AppError::bad_request(&format!(
            "Invalid '{}' date format (use YYYY-MM-DD or YYYY-MM-DD HH:MM:SS)",
            name
        ))
    })?;
    let time = if end_of_day {
        date.and_hms_opt(23, 59, 59)
    } else {
        date.and_hms_opt(0, 0, 0)
    };
    Ok(time)
}

/// Success response
#[derive(Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Create the application router
pub fn create_router(db: Database, config: ServerConfig, services: Services) -> Router {
    let state = Arc::new(AppState::new(db, config, services));
    let config = state.config.clone();

    let api_routes = Router::new()
        // Users
        .route("/me", get(handlers::get_me))
        .route("/me/organization", put(handlers::update_organization))
        // Expenses
        .route(
            "/expenses",
            get(handlers::list_expenses).post(handlers::create_expense),
        )
        .route("/expenses/statistics", get(handlers::get_statistics))
        .route("/expenses/export", get(handlers::export_expenses))
        .route(
            "/expenses/by-receipt/:id",
            get(handlers::get_expenses_by_receipt),
        )
        .route(
            "/expenses/:id",
            get(handlers::get_expense)
                .put(handlers::update_expense)
                .delete(handlers::delete_expense),
        )
        .route("/expenses/:id/reclassify", post(handlers::reclassify_expense))
        // Classification
        .route("/classify", post(handlers::classify))
        .route("/classify/suggestions", get(handlers::get_suggestions))
        // Budgets
        .route(
            "/budgets",
            get(handlers::list_budgets).post(handlers::create_budget),
        )
        .route(
            "/budgets/migrate-organization",
            post(handlers::migrate_budgets),
        )
        .route(
            "/budgets/:id",
            get(handlers::get_budget)
                .put(handlers::update_budget)
                .delete(handlers::delete_budget),
        )
        // Receipts
        .route(
            "/receipts",
            get(handlers::list_receipts).post(handlers::upload_receipt),
        )
        .route("/receipts/base64", post(handlers::upload_receipt_base64))
        .route("/receipts/ocr", post(handlers::ocr_receipt))
        .route(
            "/receipts/:id",
            get(handlers::get_receipt).delete(handlers::delete_receipt),
        )
        // Retention and storage (admin)
        .route("/admin/cleanup/receipts", post(handlers::cleanup_receipts))
        .route(
            "/admin/cleanup/failed-receipts",
            post(handlers::cleanup_failed_receipts),
        )
        .route("/admin/storage/stats", get(handlers::get_storage_stats))
        .route("/admin/archive/receipts", post(handlers::archive_receipts))
        .route("/admin/receipts/summary", get(handlers::get_receipts_summary))
        // Share links
        .route("/public/share/create", post(handlers::create_share_link))
        .route("/shares", get(handlers::list_share_links))
        .route("/shares/:token", delete(handlers::revoke_share_link))
        // Audit log
        .route("/audit", get(handlers::list_audit_log));

    // Share link views, reachable without credentials
    let public_routes = Router::new()
        .route(
            "/api/public/organization",
            get(handlers::get_public_organization),
        )
        .route("/api/public/expenses", get(handlers::get_public_expenses));

    let methods = [
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::DELETE,
        Method::OPTIONS,
    ];
    let headers = [
        header::CONTENT_TYPE,
        header::AUTHORIZATION,
        header::HeaderName::from_static(USER_ID_HEADER),
    ];

    // Build CORS layer
    let cors = if config.allowed_origins.is_empty() {
        // Restrictive default: only allow same-origin
        CorsLayer::new().allow_methods(methods).allow_headers(headers)
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(methods)
            .allow_headers(headers)
    };

    Router::new()
        .nest("/api", api_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .merge(public_routes)
        // base64 bodies are a third larger than the image they carry
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_SIZE * 2))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        // Security headers
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
}

/// Start the server with configuration from the environment
pub async fn serve(db: Database, host: &str, port: u16) -> anyhow::Result<()> {
    serve_with_config(db, host, port, ServerConfig::from_env()).await
}

/// Start the server with custom configuration
pub async fn serve_with_config(
    db: Database,
    host: &str,
    port: u16,
    config: ServerConfig,
) -> anyhow::Result<()> {
    if !config.require_auth {
        warn!("⚠️  Authentication disabled - do not expose to network!");
    } else if config.api_keys.is_empty() {
        warn!("⚠️  No API keys configured (SPENDWISE_API_KEYS) - every request will be rejected");
    }

    let services = Services::from_env()?;

    check_model_connection(&services.classifier).await;

    // Start cleanup scheduler if configured
    if let Some(schedule) = CleanupScheduleConfig::from_env(&services.settings.retention) {
        let sweeper = RetentionSweeper::new(db.clone(), services.images.clone());
        start_cleanup_scheduler(db.clone(), sweeper, schedule);
    }

    let app = create_router(db, config, services);
    let addr = format!("{}:{}", host, port);

    info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Check and log category model connection status
async fn check_model_connection(classifier: &CategoryClassifier) {
    match classifier.model() {
        Some(model) => {
            if model.is_available().await {
                info!("✅ Category model connected: {}", model.model());
            } else {
                warn!(
                    "⚠️  Category model configured but not responding: {} (keyword tiers only until it recovers)",
                    model.model()
                );
            }
        }
        None => {
            info!("ℹ️  Category model not configured (set OLLAMA_HOST to enable the model tiers)");
        }
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Application error type with proper HTTP status codes
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
    internal: Option<anyhow::Error>,
}

impl AppError {
    pub fn bad_request(msg: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn forbidden(msg: &str) -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn internal(msg: &str) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the full internal error if present
        if let Some(err) = &self.internal {
            error!(error = %err, "Internal error");
        }

        let body = Json(serde_json::json!({
            "error": self.message
        }));

        (self.status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        use spendwise_core::Error as CoreError;

        let err = err.into();
        let (status, message) = match err.downcast_ref::<CoreError>() {
            Some(CoreError::InvalidData(msg)) => (StatusCode::BAD_REQUEST, msg.clone()),
            Some(CoreError::NotFound(msg)) => (StatusCode::NOT_FOUND, format!("Not found: {}", msg)),
            Some(CoreError::Forbidden(msg)) => (StatusCode::FORBIDDEN, msg.clone()),
            Some(CoreError::Ocr(msg)) => (StatusCode::BAD_GATEWAY, msg.clone()),
            Some(CoreError::Operation { operation, .. }) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("{} failed", operation),
            ),
            // Return generic message to client
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "An internal error occurred".to_string(),
            ),
        };

        Self {
            status,
            message,
            // Keep full error for logging
            internal: status.is_server_error().then_some(err),
        }
    }
}
