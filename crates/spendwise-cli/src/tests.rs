//! CLI command tests
//!
//! This module contains all tests for the CLI commands.

use std::sync::Arc;

use spendwise_core::db::Database;
use spendwise_core::models::{Category, ClassificationMethod, ExpenseQuery, NewReceipt, OcrStatus};
use spendwise_core::{CategoryClassifier, LocalImageStore, OcrClient, SpendwiseConfig};
use spendwise_server::{AppState, ServerConfig, Services};
use tempfile::TempDir;

use crate::commands::{
    self, format_won, parse_date_arg, truncate, ExpenseArgs, ExpenseChanges, ExpenseFilter,
};

fn setup_test_app() -> (TempDir, AppState) {
    let temp = TempDir::new().unwrap();
    let db = Database::in_memory().unwrap();
    let services = Services {
        settings: SpendwiseConfig::default(),
        classifier: CategoryClassifier::default(),
        ocr: OcrClient::mock(),
        images: Arc::new(LocalImageStore::new(temp.path().join("images")).unwrap()),
    };
    let state = AppState::new(db, ServerConfig::default(), services);
    (temp, state)
}

fn expense_args<'a>(store: &'a str, amount: f64) -> ExpenseArgs<'a> {
    ExpenseArgs {
        store,
        amount,
        date: Some("2024-03-15"),
        ..Default::default()
    }
}

fn all_expenses(state: &AppState, user: &str) -> Vec<spendwise_core::models::Expense> {
    state.expenses.list(user, &ExpenseQuery::default()).unwrap()
}

// ========== Helper Tests ==========

#[test]
fn test_truncate() {
    assert_eq!(truncate("short", 10), "short");
    assert_eq!(truncate("a long store name", 10), "a long ...");
    // Counts characters, not bytes
    assert_eq!(truncate("스타벅스 강남역점", 20), "스타벅스 강남역점");
    assert_eq!(truncate("스타벅스 강남역점 2층", 7), "스타벅스...");
}

#[test]
fn test_parse_date_arg() {
    let start = parse_date_arg("2024-03-15", false).unwrap();
    assert_eq!(start.to_string(), "2024-03-15 00:00:00");

    let end = parse_date_arg("2024-03-15", true).unwrap();
    assert_eq!(end.to_string(), "2024-03-15 23:59:59");

    let exact = parse_date_arg("2024-03-15 12:30:00", true).unwrap();
    assert_eq!(exact.to_string(), "2024-03-15 12:30:00");

    assert!(parse_date_arg("15/03/2024", false).is_err());
}

#[test]
fn test_format_won() {
    assert_eq!(format_won(0.0), "₩0");
    assert_eq!(format_won(4500.0), "₩4,500");
    assert_eq!(format_won(1234567.0), "₩1,234,567");
    assert_eq!(format_won(-500.0), "-₩500");
}

// ========== Init Command Tests ==========

#[test]
fn test_cmd_init_unencrypted() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("spendwise.db");

    commands::cmd_init(&path, true).unwrap();
    assert!(path.exists());

    let db = commands::open_db(&path, true).unwrap();
    assert!(!db.is_encrypted().unwrap());
}

// ========== Users Command Tests ==========

#[test]
fn test_cmd_users_add_and_org() {
    let db = Database::in_memory().unwrap();

    commands::cmd_users_add(&db, "alice", Some("alice@acme.test"), None, Some("acme")).unwrap();
    let user = db.get_user("alice").unwrap().unwrap();
    assert_eq!(user.email, "alice@acme.test");
    assert_eq!(user.name, "alice");
    assert_eq!(user.organization_name.as_deref(), Some("acme"));

    // Re-adding without an email keeps the stored one
    commands::cmd_users_add(&db, "alice", None, Some("Alice"), None).unwrap();
    let user = db.get_user("alice").unwrap().unwrap();
    assert_eq!(user.email, "alice@acme.test");
    assert_eq!(user.name, "Alice");
    assert_eq!(user.organization_name.as_deref(), Some("acme"));

    commands::cmd_users_org(&db, "alice", None).unwrap();
    assert!(db.user_organization("alice").unwrap().is_none());

    assert!(commands::cmd_users_list(&db).is_ok());

    let audit = db.list_audit_log(10).unwrap();
    assert!(audit.iter().any(|e| e.action == "register"));
    assert!(audit.iter().any(|e| e.action == "update_organization"));
}

#[test]
fn test_cmd_users_org_unknown_user() {
    let db = Database::in_memory().unwrap();
    assert!(commands::cmd_users_org(&db, "ghost", Some("acme")).is_err());
}

#[test]
fn test_cmd_users_add_empty_id() {
    let db = Database::in_memory().unwrap();
    assert!(commands::cmd_users_add(&db, "  ", None, None, None).is_err());
}

// ========== Expenses Command Tests ==========

#[tokio::test]
async fn test_cmd_expenses_add_auto_classifies() {
    let (_temp, state) = setup_test_app();

    let args = ExpenseArgs {
        item: Some("아메리카노"),
        ..expense_args("스타벅스 강남점", 4500.0)
    };
    commands::cmd_expenses_add(&state, "alice", args).await.unwrap();

    let expenses = all_expenses(&state, "alice");
    assert_eq!(expenses.len(), 1);
    assert_eq!(expenses[0].category, Category::Food);
    assert_eq!(expenses[0].classification_method, ClassificationMethod::Auto);
    assert_eq!(expenses[0].date.to_string(), "2024-03-15 00:00:00");

    let audit = state.db.list_audit_log(10).unwrap();
    assert_eq!(audit[0].action, "create");
    assert_eq!(audit[0].entity_type.as_deref(), Some("expense"));
}

#[tokio::test]
async fn test_cmd_expenses_add_explicit_category_code() {
    let (_temp, state) = setup_test_app();

    let args = ExpenseArgs {
        category: Some("dining_out"),
        ..expense_args("고깃집", 120000.0)
    };
    commands::cmd_expenses_add(&state, "alice", args).await.unwrap();

    let expenses = all_expenses(&state, "alice");
    assert_eq!(expenses[0].category, Category::DiningOut);
    assert_eq!(expenses[0].classification_method, ClassificationMethod::Manual);
}

#[tokio::test]
async fn test_cmd_expenses_add_rejects_bad_input() {
    let (_temp, state) = setup_test_app();

    let negative = expense_args("Shop", -10.0);
    assert!(commands::cmd_expenses_add(&state, "alice", negative).await.is_err());

    let bad_category = ExpenseArgs {
        category: Some("groceries"),
        ..expense_args("Shop", 10.0)
    };
    assert!(commands::cmd_expenses_add(&state, "alice", bad_category).await.is_err());

    let bad_date = ExpenseArgs {
        date: Some("yesterday"),
        ..expense_args("Shop", 10.0)
    };
    assert!(commands::cmd_expenses_add(&state, "alice", bad_date).await.is_err());

    assert!(all_expenses(&state, "alice").is_empty());
}

#[tokio::test]
async fn test_cmd_expenses_update_delete_and_ownership() {
    let (_temp, state) = setup_test_app();
    commands::cmd_expenses_add(&state, "alice", expense_args("카카오택시", 15000.0))
        .await
        .unwrap();
    let id = all_expenses(&state, "alice")[0].id.clone();

    let changes = ExpenseChanges {
        category: Some("의료"),
        amount: Some(16000.0),
        ..Default::default()
    };
    commands::cmd_expenses_update(&state, "alice", &id, changes).unwrap();
    let expense = state.expenses.get("alice", &id).unwrap();
    assert_eq!(expense.category, Category::Health);
    assert_eq!(expense.amount, 16000.0);
    assert_eq!(expense.classification_method, ClassificationMethod::Manual);

    // Another user can neither see nor delete it
    assert!(commands::cmd_expenses_show(&state, "bob", &id).is_err());
    assert!(commands::cmd_expenses_delete(&state, "bob", &id).is_err());

    commands::cmd_expenses_delete(&state, "alice", &id).unwrap();
    assert!(all_expenses(&state, "alice").is_empty());
}

#[tokio::test]
async fn test_cmd_expenses_update_without_changes_fails() {
    let (_temp, state) = setup_test_app();
    commands::cmd_expenses_add(&state, "alice", expense_args("Shop", 1000.0))
        .await
        .unwrap();
    let id = all_expenses(&state, "alice")[0].id.clone();

    assert!(commands::cmd_expenses_update(&state, "alice", &id, ExpenseChanges::default()).is_err());
}

#[tokio::test]
async fn test_cmd_expenses_reclassify() {
    let (_temp, state) = setup_test_app();
    commands::cmd_expenses_add(&state, "alice", expense_args("카카오택시", 15000.0))
        .await
        .unwrap();
    let auto_id = all_expenses(&state, "alice")[0].id.clone();

    commands::cmd_expenses_reclassify(&state, "alice", &auto_id)
        .await
        .unwrap();
    let expense = state.expenses.get("alice", &auto_id).unwrap();
    assert_eq!(expense.category, Category::Transportation);
    assert_eq!(expense.classification_method, ClassificationMethod::Auto);

    // A hand-picked category survives reclassification
    let changes = ExpenseChanges {
        category: Some("기타"),
        ..Default::default()
    };
    commands::cmd_expenses_update(&state, "alice", &auto_id, changes).unwrap();
    commands::cmd_expenses_reclassify(&state, "alice", &auto_id)
        .await
        .unwrap();
    let expense = state.expenses.get("alice", &auto_id).unwrap();
    assert_eq!(expense.category, Category::Other);
    assert_eq!(expense.classification_method, ClassificationMethod::Manual);
}

#[tokio::test]
async fn test_cmd_expenses_list_stats_and_export() {
    let (temp, state) = setup_test_app();
    commands::cmd_expenses_add(
        &state,
        "alice",
        ExpenseArgs {
            category: Some("식비"),
            ..expense_args("마트", 7500.0)
        },
    )
    .await
    .unwrap();
    commands::cmd_expenses_add(
        &state,
        "alice",
        ExpenseArgs {
            category: Some("교통비"),
            ..expense_args("카카오택시", 2500.0)
        },
    )
    .await
    .unwrap();

    let filter = ExpenseFilter {
        category: Some("food"),
        ..Default::default()
    };
    assert!(commands::cmd_expenses_list(&state, "alice", &filter, 20).is_ok());
    assert!(commands::cmd_expenses_stats(
        &state,
        "alice",
        Some("2024-03-01"),
        Some("2024-03-31"),
        None
    )
    .is_ok());

    let bad_filter = ExpenseFilter {
        from: Some("03/01/2024"),
        ..Default::default()
    };
    assert!(commands::cmd_expenses_list(&state, "alice", &bad_filter, 20).is_err());

    let path = temp.path().join("expenses.csv");
    commands::cmd_expenses_export(&state, "alice", &ExpenseFilter::default(), Some(&path))
        .unwrap();
    let csv = std::fs::read_to_string(&path).unwrap();
    assert_eq!(csv.lines().count(), 3);
    assert!(csv.contains("마트"));
    assert!(csv.contains("카카오택시"));

    let audit = state.db.list_audit_log(10).unwrap();
    assert_eq!(audit[0].action, "export_expenses");
}

// ========== Classify Command Tests ==========

#[tokio::test]
async fn test_cmd_classify() {
    let classifier = CategoryClassifier::default();
    assert!(commands::cmd_classify(&classifier, "스타벅스", Some("아메리카노"), None)
        .await
        .is_ok());
    assert!(commands::cmd_classify(&classifier, "Unknown", None, Some(250000.0))
        .await
        .is_ok());
    assert!(commands::cmd_classify(&classifier, "  ", None, None).await.is_err());
}

// ========== Budgets Command Tests ==========

#[tokio::test]
async fn test_cmd_budgets_lifecycle() {
    let (_temp, state) = setup_test_app();
    state.db.upsert_user("alice", "alice@acme.test", "Alice").unwrap();
    state.db.set_user_organization("alice", Some("acme")).unwrap();

    commands::cmd_budgets_add(&state, "alice", "점심", 100000.0, Some("식비"), None).unwrap();
    commands::cmd_budgets_add(&state, "alice", "전체 예산", 500000.0, None, None).unwrap();
    assert!(commands::cmd_budgets_add(&state, "alice", "Bad", 1000.0, Some("nope"), None).is_err());

    let budgets = state.budgets.list("alice").unwrap();
    assert_eq!(budgets.len(), 2);
    assert!(budgets.iter().all(|b| !b.budget.is_shared()));
    assert!(commands::cmd_budgets_list(&state, "alice").is_ok());
    assert!(commands::cmd_budgets_show(&state, "alice", &budgets[0].budget.id).is_ok());

    commands::cmd_budgets_migrate(&state, "alice").unwrap();
    let budgets = state.budgets.list("alice").unwrap();
    assert!(budgets
        .iter()
        .all(|b| b.budget.organization_name.as_deref() == Some("acme")));

    let id = budgets[0].budget.id.clone();
    commands::cmd_budgets_delete(&state, "alice", &id).unwrap();
    assert_eq!(state.budgets.list("alice").unwrap().len(), 1);
}

// ========== Receipts Command Tests ==========

#[tokio::test]
async fn test_cmd_receipts_upload_show_delete() {
    let (temp, state) = setup_test_app();
    let image = temp.path().join("receipt.jpg");
    std::fs::write(&image, b"fake jpeg bytes").unwrap();

    commands::cmd_receipts_upload(&state, "alice", &image)
        .await
        .unwrap();

    let receipts = state.receipts.list("alice", None, None, 10).unwrap();
    assert_eq!(receipts.len(), 1);
    let receipt = &receipts[0];
    assert_eq!(receipt.store_name, "GS25 역삼점");
    assert_eq!(receipt.ocr_status, OcrStatus::Completed);

    assert!(commands::cmd_receipts_list(&state, "alice", None, None, 20).is_ok());
    assert!(commands::cmd_receipts_show(&state, "alice", &receipt.id).is_ok());
    assert!(commands::cmd_receipts_show(&state, "bob", &receipt.id).is_err());

    commands::cmd_receipts_delete(&state, "alice", &receipt.id, true).unwrap();
    assert!(state.db.get_receipt(&receipt.id).unwrap().is_none());
    assert!(all_expenses(&state, "alice").is_empty());

    let audit = state.db.list_audit_log(10).unwrap();
    assert_eq!(audit[0].action, "delete");
    assert_eq!(audit[1].action, "upload");
}

#[tokio::test]
async fn test_cmd_receipts_ocr_preview_stores_nothing() {
    let (temp, state) = setup_test_app();
    let image = temp.path().join("receipt.png");
    std::fs::write(&image, b"fake png bytes").unwrap();

    commands::cmd_receipts_ocr(&state, &image, true).await.unwrap();
    assert!(state.receipts.list("alice", None, None, 10).unwrap().is_empty());
}

#[tokio::test]
async fn test_cmd_receipts_upload_missing_file() {
    let (temp, state) = setup_test_app();
    let missing = temp.path().join("missing.jpg");
    assert!(commands::cmd_receipts_upload(&state, "alice", &missing)
        .await
        .is_err());
}

#[test]
fn test_cmd_receipts_list_limit_bounds() {
    let (_temp, state) = setup_test_app();
    assert!(commands::cmd_receipts_list(&state, "alice", None, None, 0).is_err());
    assert!(commands::cmd_receipts_list(&state, "alice", None, None, 5000).is_err());
}

// ========== Admin Command Tests ==========

fn aged_receipt(db: &Database, status: OcrStatus, days: i64) -> String {
    let id = db
        .create_receipt(&NewReceipt {
            user_id: "alice".into(),
            store_name: "Shop".into(),
            total_amount: 1000.0,
            ocr_status: status,
            ..Default::default()
        })
        .unwrap();
    db.conn()
        .unwrap()
        .execute(
            "UPDATE receipts SET created_at = datetime('now', ?) WHERE id = ?",
            rusqlite::params![format!("-{} days", days), id],
        )
        .unwrap();
    id
}

#[test]
fn test_cmd_admin_cleanup_dry_run_then_real() {
    let (_temp, state) = setup_test_app();
    let old_failed = aged_receipt(&state.db, OcrStatus::Failed, 120);
    let old_completed = aged_receipt(&state.db, OcrStatus::Completed, 120);

    commands::cmd_admin_cleanup(&state, "root", None, false, true).unwrap();
    assert!(state.db.get_receipt(&old_failed).unwrap().is_some());
    assert!(state.db.list_audit_log(10).unwrap().is_empty());

    commands::cmd_admin_cleanup(&state, "root", None, false, false).unwrap();
    assert!(state.db.get_receipt(&old_failed).unwrap().is_none());
    assert!(state.db.get_receipt(&old_completed).unwrap().is_some());

    commands::cmd_admin_cleanup(&state, "root", None, true, false).unwrap();
    assert!(state.db.get_receipt(&old_completed).unwrap().is_none());

    let audit = state.db.list_audit_log(10).unwrap();
    assert_eq!(audit.len(), 2);
    assert!(audit.iter().all(|e| e.action == "cleanup_receipts"));
}

#[test]
fn test_cmd_admin_cleanup_failed_and_archive() {
    let (_temp, state) = setup_test_app();
    let failed = aged_receipt(&state.db, OcrStatus::Failed, 10);
    let ancient = aged_receipt(&state.db, OcrStatus::Completed, 400);

    commands::cmd_admin_cleanup_failed(&state, "root", None).unwrap();
    assert!(state.db.get_receipt(&failed).unwrap().is_none());

    commands::cmd_admin_archive(&state, "root", None).unwrap();
    assert!(state.db.get_receipt(&ancient).unwrap().is_none());
    assert!(state.db.get_archived_receipt(&ancient).unwrap().is_some());

    assert!(commands::cmd_admin_stats(&state).is_ok());
    assert!(commands::cmd_admin_summary(&state).is_ok());
}

#[test]
fn test_cmd_admin_rejects_negative_days() {
    let (_temp, state) = setup_test_app();
    let fresh = aged_receipt(&state.db, OcrStatus::Completed, 0);

    assert!(commands::cmd_admin_cleanup(&state, "root", Some(-1), true, false).is_err());
    assert!(commands::cmd_admin_cleanup_failed(&state, "root", Some(-1)).is_err());
    assert!(commands::cmd_admin_archive(&state, "root", Some(-1)).is_err());

    assert!(state.db.get_receipt(&fresh).unwrap().is_some());
    assert!(state.db.list_audit_log(10).unwrap().is_empty());
}

// ========== Share Command Tests ==========

#[test]
fn test_cmd_share_create_list_revoke() {
    let (_temp, state) = setup_test_app();
    commands::cmd_users_add(&state.db, "alice", None, None, Some("acme")).unwrap();

    assert!(commands::cmd_share_create(&state, "carol", None).is_err());
    assert!(commands::cmd_share_create(&state, "alice", Some(0)).is_err());

    commands::cmd_share_create(&state, "alice", Some(3)).unwrap();
    let shares = state.shares.list("alice").unwrap();
    assert_eq!(shares.len(), 1);
    assert!(commands::cmd_share_list(&state, "alice").is_ok());

    let token = shares[0].token.clone();
    assert!(commands::cmd_share_revoke(&state, "carol", &token).is_err());
    commands::cmd_share_revoke(&state, "alice", &token).unwrap();
    assert!(state.shares.resolve(&token).is_err());

    let audit = state.db.list_audit_log(10).unwrap();
    assert!(audit.iter().any(|e| e.action == "create_share_link"));
    assert!(audit.iter().any(|e| e.action == "revoke_share_link"));
}
