//! Integration tests for spendwise-core
//!
//! These tests exercise the full upload → expense → budget workflow and the
//! retention sweeps that run afterwards.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use spendwise_core::{
    models::{BudgetCategory, Category, ClassificationMethod, ExpenseQuery, NewBudget, OcrStatus, ReceiptGranularity},
    BudgetReconciler, CategoryClassifier, Database, ExpenseAggregator, LocalImageStore, MockModel,
    MockOcr, ModelClient, OcrClient, ReceiptConfig, ReceiptProcessor, RetentionSweeper,
};
use tempfile::TempDir;

struct Services {
    _temp: TempDir,
    db: Database,
    processor: ReceiptProcessor,
    expenses: ExpenseAggregator,
    budgets: BudgetReconciler,
    sweeper: RetentionSweeper,
}

fn services(ocr: MockOcr, granularity: ReceiptGranularity) -> Services {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let db = Database::in_memory().expect("Failed to create in-memory database");
    let images = Arc::new(
        LocalImageStore::new(temp.path().join("images")).expect("Failed to create image store"),
    );

    let expenses = ExpenseAggregator::new(db.clone(), CategoryClassifier::default());
    let config = ReceiptConfig {
        granularity,
        ocr_timeout: Duration::from_secs(5),
        images_dir: images.root().to_path_buf(),
    };
    let processor = ReceiptProcessor::new(
        db.clone(),
        OcrClient::Mock(ocr),
        images.clone(),
        expenses.clone(),
        config,
    );

    Services {
        _temp: temp,
        budgets: BudgetReconciler::new(db.clone()),
        sweeper: RetentionSweeper::new(db.clone(), images),
        db,
        processor,
        expenses,
    }
}

fn age_receipt(db: &Database, id: &str, days: i64) {
    db.conn()
        .unwrap()
        .execute(
            "UPDATE receipts SET created_at = datetime('now', ?) WHERE id = ?",
            rusqlite::params![format!("-{} days", days), id],
        )
        .unwrap();
}

// =============================================================================
// Upload → Expense → Budget
// =============================================================================

#[tokio::test]
async fn test_receipt_upload_counts_against_budget() {
    let s = services(MockOcr::new(), ReceiptGranularity::Total);

    let budget = s
        .budgets
        .create(
            "alice",
            NewBudget {
                name: "식비".into(),
                amount: 20000.0,
                category: BudgetCategory::Only(Category::Food),
                organization_name: None,
            },
        )
        .unwrap();
    assert_eq!(budget.spent, 0.0);

    let processed = s
        .processor
        .upload_and_process("alice", b"receipt image", Some("gs25.jpg"))
        .await
        .expect("upload should succeed");
    assert_eq!(processed.receipt.ocr_status, OcrStatus::Completed);
    assert_eq!(processed.expenses[0].category, Category::Food);

    let budget = s.budgets.get("alice", &budget.budget.id).unwrap();
    assert_eq!(budget.spent, 8300.0);
    assert_eq!(budget.remaining, 11700.0);

    // A manual correction moves the spending out of the food budget
    s.expenses
        .update(
            "alice",
            &processed.expenses[0].id,
            spendwise_core::models::ExpenseUpdate {
                category: Some(Category::DiningOut),
                ..Default::default()
            },
        )
        .unwrap();
    let budget = s.budgets.get("alice", &budget.budget.id).unwrap();
    assert_eq!(budget.spent, 0.0);
}

#[tokio::test]
async fn test_shared_budget_across_organization() {
    let s = services(MockOcr::new(), ReceiptGranularity::Item);
    for user in ["alice", "bob"] {
        s.db.upsert_user(user, &format!("{}@acme.test", user), user)
            .unwrap();
        s.db.set_user_organization(user, Some("Acme")).unwrap();
    }

    s.processor
        .upload_and_process("alice", b"one", None)
        .await
        .unwrap();
    s.processor
        .upload_and_process("bob", b"two", None)
        .await
        .unwrap();

    let shared = s
        .budgets
        .create(
            "bob",
            NewBudget {
                name: "팀 예산".into(),
                amount: 10000.0,
                category: BudgetCategory::All,
                organization_name: Some("Acme".into()),
            },
        )
        .unwrap();
    assert_eq!(shared.spent, 16600.0);
    assert_eq!(shared.remaining, -6600.0);

    let query = ExpenseQuery {
        organization: Some("Acme".into()),
        limit: 100,
        ..Default::default()
    };
    let listed = s.expenses.list("alice", &query).unwrap();
    assert_eq!(listed.len(), 4);
    assert!(listed.windows(2).all(|w| w[0].date >= w[1].date));

    let stats = s
        .expenses
        .statistics("bob", Some(listed[3].date), Some(listed[0].date), Some("Acme"))
        .unwrap();
    assert_eq!(stats.total_amount, 16600.0);
    assert_eq!(stats.total_count, 4);
}

#[tokio::test]
async fn test_failed_upload_then_sweep() {
    let s = services(MockOcr::failing("unreadable"), ReceiptGranularity::Total);

    assert!(s
        .processor
        .upload_and_process("alice", b"blurry", None)
        .await
        .is_err());

    let receipts = s.processor.list("alice", None, None, 10).unwrap();
    assert_eq!(receipts.len(), 1);
    age_receipt(&s.db, &receipts[0].id, 10);

    let dry = s.sweeper.cleanup_failed_receipts(30).unwrap();
    assert_eq!(dry.deleted_count, 0);

    let report = s.sweeper.cleanup_failed_receipts(7).unwrap();
    assert_eq!(report.deleted_count, 1);
    assert!(s.processor.list("alice", None, None, 10).unwrap().is_empty());
}

#[tokio::test]
async fn test_retention_keeps_expenses() {
    let s = services(MockOcr::new(), ReceiptGranularity::Total);
    let processed = s
        .processor
        .upload_and_process("alice", b"img", None)
        .await
        .unwrap();
    age_receipt(&s.db, &processed.receipt.id, 120);

    let dry = s.sweeper.cleanup_old_receipts(90, false, true).unwrap();
    assert_eq!(dry.deleted_count, 1);
    assert_eq!(dry.storage_freed_bytes, 3);
    assert!(s.db.get_receipt(&processed.receipt.id).unwrap().is_some());

    let report = s.sweeper.cleanup_old_receipts(90, false, false).unwrap();
    assert_eq!(report.deleted_count, 1);
    assert!(s.db.get_receipt(&processed.receipt.id).unwrap().is_none());

    // The derived expense survives its receipt
    let expense = s
        .expenses
        .get("alice", &processed.expenses[0].id)
        .unwrap();
    assert_eq!(expense.amount, 8300.0);
}

#[tokio::test]
async fn test_archive_after_a_year() {
    let s = services(MockOcr::new(), ReceiptGranularity::Total);
    let processed = s
        .processor
        .upload_and_process("alice", b"img", None)
        .await
        .unwrap();
    age_receipt(&s.db, &processed.receipt.id, 400);

    let report = s.sweeper.archive_old_receipts(365).unwrap();
    assert_eq!(report.archived_count, 1);

    let archived = s
        .db
        .get_archived_receipt(&processed.receipt.id)
        .unwrap()
        .expect("archived copy");
    assert_eq!(archived.receipt.store_name, "GS25 역삼점");
    assert_eq!(archived.receipt.ocr_status, OcrStatus::Completed);

    let summary = s.sweeper.receipts_summary().unwrap();
    assert_eq!(summary.total_receipts, 0);
}

// =============================================================================
// Classification
// =============================================================================

#[tokio::test]
async fn test_model_backed_classification_on_upload() {
    let temp = TempDir::new().unwrap();
    let db = Database::in_memory().unwrap();
    let images = Arc::new(LocalImageStore::new(temp.path()).unwrap());
    let classifier = CategoryClassifier::default().with_model(Some(ModelClient::Mock(
        MockModel::with_answer(Category::Education, 0.95),
    )));
    let expenses = ExpenseAggregator::new(db.clone(), classifier);

    let ocr = MockOcr::with_payload(json!({
        "store_name": "해커스 어학원",
        "date": "2024-06-01 10:00",
        "total_amount": 250000
    }));
    let processor = ReceiptProcessor::new(
        db,
        OcrClient::Mock(ocr),
        images,
        expenses,
        ReceiptConfig::default(),
    );

    let processed = processor
        .upload_and_process("alice", b"img", None)
        .await
        .unwrap();
    let expense = &processed.expenses[0];
    assert_eq!(expense.category, Category::Education);
    assert_eq!(expense.classification_method, ClassificationMethod::Auto);
    assert_eq!(expense.classification_confidence, Some(0.95));
}

#[tokio::test]
async fn test_large_unknown_purchase_uses_amount_heuristic() {
    let s = services(
        MockOcr::with_payload(json!({ "store_name": "Unknown Shop", "total_amount": 150000 })),
        ReceiptGranularity::Total,
    );

    let processed = s
        .processor
        .upload_and_process("alice", b"img", None)
        .await
        .unwrap();
    assert_eq!(processed.expenses[0].category, Category::DiningOut);
    assert_eq!(processed.expenses[0].classification_confidence, Some(0.3));
}
