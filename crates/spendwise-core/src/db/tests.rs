//! Database tests

use super::*;
use crate::models::*;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use rusqlite::params;

    fn date(y: i32, m: u32, d: u32) -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn expense(user: &str, category: Category, amount: f64, on: chrono::NaiveDateTime) -> Expense {
        let now = Utc::now();
        Expense {
            id: new_id(),
            user_id: user.to_string(),
            receipt_id: format!("manual-{}", new_id()),
            category,
            amount,
            date: on,
            store_name: "Test Store".to_string(),
            store_address: None,
            store_phone_number: None,
            description: None,
            item_name: None,
            classification_method: ClassificationMethod::Auto,
            classification_confidence: Some(0.7),
            budget_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_in_memory_db() {
        let db = Database::in_memory().unwrap();
        assert!(db.list_users().unwrap().is_empty());
        assert!(db.path().contains("spendwise_test_"));
    }

    #[test]
    fn test_schema_tables_exist() {
        let db = Database::in_memory().unwrap();
        let conn = db.conn().unwrap();

        for table in [
            "users",
            "receipts",
            "receipts_archive",
            "expenses",
            "budgets",
            "share_tokens",
            "audit_log",
        ] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
                    params![table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "missing table {}", table);
        }
    }

    #[test]
    fn test_expense_amount_must_be_positive() {
        let db = Database::in_memory().unwrap();
        let bad = expense("u1", Category::Food, 0.0, date(2024, 3, 1));
        assert!(db.insert_expense(&bad).is_err());
    }

    #[test]
    fn test_user_organization_membership() {
        let db = Database::in_memory().unwrap();
        db.upsert_user("alice", "alice@example.com", "Alice").unwrap();
        db.upsert_user("bob", "bob@example.com", "Bob").unwrap();
        db.upsert_user("carol", "carol@example.com", "Carol").unwrap();

        assert!(db.set_user_organization("alice", Some("Club A")).unwrap());
        assert!(db.set_user_organization("bob", Some("Club A")).unwrap());
        assert!(!db.set_user_organization("nobody", Some("Club A")).unwrap());

        let members = db.organization_member_ids("Club A").unwrap();
        assert_eq!(members, vec!["alice".to_string(), "bob".to_string()]);

        // Blank names clear membership
        db.set_user_organization("bob", Some("  ")).unwrap();
        assert_eq!(db.user_organization("bob").unwrap(), None);

        // Re-upserting keeps the organization
        db.upsert_user("alice", "alice@new.example.com", "Alice").unwrap();
        assert_eq!(
            db.user_organization("alice").unwrap().as_deref(),
            Some("Club A")
        );
    }

    #[test]
    fn test_expense_crud_and_filters() {
        let db = Database::in_memory().unwrap();
        let a = expense("u1", Category::Food, 5000.0, date(2024, 3, 1));
        let b = expense("u1", Category::Transportation, 12000.0, date(2024, 3, 5));
        let c = expense("u2", Category::Food, 8000.0, date(2024, 3, 3));
        for e in [&a, &b, &c] {
            db.insert_expense(e).unwrap();
        }

        let users = vec!["u1".to_string()];
        let listed = db
            .list_expenses(ExpenseFilter::new().user_ids(&users), 100)
            .unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, b.id, "newest first");

        let both = vec!["u1".to_string(), "u2".to_string()];
        let food = db
            .list_expenses(
                ExpenseFilter::new()
                    .user_ids(&both)
                    .category(Some(Category::Food)),
                100,
            )
            .unwrap();
        assert_eq!(food.len(), 2);
        assert_eq!(food[0].id, c.id);

        let (total, count) = db
            .sum_expenses(
                ExpenseFilter::new()
                    .user_ids(&both)
                    .date_range(Some(date(2024, 3, 2)), Some(date(2024, 3, 31))),
            )
            .unwrap();
        assert_eq!(count, 2);
        assert_eq!(total, 20000.0);

        let mut updated = a.clone();
        updated.category = Category::Health;
        updated.classification_method = ClassificationMethod::Manual;
        updated.classification_confidence = Some(1.0);
        assert!(db.update_expense(&updated).unwrap());

        let fetched = db.get_expense(&a.id).unwrap().unwrap();
        assert_eq!(fetched.category, Category::Health);
        assert_eq!(fetched.classification_method, ClassificationMethod::Manual);
        assert_eq!(fetched.date, a.date);

        assert!(db.delete_expense(&a.id).unwrap());
        assert!(!db.delete_expense(&a.id).unwrap());
        assert!(db.get_expense(&a.id).unwrap().is_none());
    }

    #[test]
    fn test_delete_expenses_for_receipt() {
        let db = Database::in_memory().unwrap();
        let mut a = expense("u1", Category::Food, 1000.0, date(2024, 1, 1));
        let mut b = expense("u1", Category::Food, 2000.0, date(2024, 1, 1));
        a.receipt_id = "r1".to_string();
        b.receipt_id = "r1".to_string();
        db.insert_expense(&a).unwrap();
        db.insert_expense(&b).unwrap();
        db.insert_expense(&expense("u1", Category::Food, 3000.0, date(2024, 1, 1)))
            .unwrap();

        assert_eq!(db.delete_expenses_for_receipt("r1").unwrap(), 2);
        let (_, remaining) = db.sum_expenses(ExpenseFilter::new()).unwrap();
        assert_eq!(remaining, 1);
    }

    #[test]
    fn test_budget_visibility() {
        let db = Database::in_memory().unwrap();
        let now = Utc::now();
        let make = |id: &str, owner: &str, org: Option<&str>| Budget {
            id: id.to_string(),
            user_id: owner.to_string(),
            organization_name: org.map(String::from),
            name: format!("budget {}", id),
            amount: 100000.0,
            category: BudgetCategory::All,
            created_at: now,
            updated_at: now,
        };

        db.insert_budget(&make("b1", "alice", None)).unwrap();
        db.insert_budget(&make("b2", "bob", Some("Club A"))).unwrap();
        db.insert_budget(&make("b3", "bob", None)).unwrap();
        db.insert_budget(&make("b4", "dave", Some("Club B"))).unwrap();

        let visible = db.list_visible_budgets("alice", Some("Club A")).unwrap();
        let mut ids: Vec<_> = visible.iter().map(|b| b.id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["b1", "b2"]);

        let private = db.list_visible_budgets("alice", None).unwrap();
        assert_eq!(private.len(), 1);

        assert_eq!(db.assign_budgets_to_organization("bob", "Club A").unwrap(), 1);
        let b3 = db.get_budget("b3").unwrap().unwrap();
        assert_eq!(b3.organization_name.as_deref(), Some("Club A"));
    }

    #[test]
    fn test_receipt_status_and_archive() {
        let db = Database::in_memory().unwrap();
        let id = db
            .create_receipt(&NewReceipt {
                user_id: "u1".to_string(),
                store_name: "GS25".to_string(),
                total_amount: 4500.0,
                purchase_date: Some(date(2024, 2, 1)),
                items: vec![ReceiptItem {
                    name: "아메리카노".to_string(),
                    price: 4500.0,
                    quantity: 1.0,
                }],
                ocr_status: OcrStatus::Processing,
                content_hash: Some("abc".to_string()),
                ..Default::default()
            })
            .unwrap();

        let receipt = db.get_receipt(&id).unwrap().unwrap();
        assert_eq!(receipt.ocr_status, OcrStatus::Processing);
        assert_eq!(receipt.items.len(), 1);
        assert!(receipt.ocr_processed_at.is_none());

        db.update_receipt_status(&id, OcrStatus::Completed, None)
            .unwrap();
        let receipt = db.get_receipt(&id).unwrap().unwrap();
        assert_eq!(receipt.ocr_status, OcrStatus::Completed);
        assert!(receipt.ocr_processed_at.is_some());

        assert!(db.find_receipt_by_hash("u1", "abc").unwrap().is_some());
        assert!(db.find_receipt_by_hash("u2", "abc").unwrap().is_none());

        assert!(db.archive_receipt(&receipt).unwrap());
        assert!(!db.archive_receipt(&receipt).unwrap(), "archived once");
        assert_eq!(db.count_archived_receipts().unwrap(), 1);

        let archived = db.get_archived_receipt(&id).unwrap().unwrap();
        assert_eq!(archived.original_id, id);
        assert_eq!(archived.receipt.store_name, "GS25");
    }

    #[test]
    fn test_receipts_created_before() {
        let db = Database::in_memory().unwrap();
        let old = db
            .create_receipt(&NewReceipt {
                user_id: "u1".to_string(),
                store_name: "Old".to_string(),
                ocr_status: OcrStatus::Failed,
                ..Default::default()
            })
            .unwrap();
        db.create_receipt(&NewReceipt {
            user_id: "u1".to_string(),
            store_name: "New".to_string(),
            ocr_status: OcrStatus::Failed,
            ..Default::default()
        })
        .unwrap();

        let conn = db.conn().unwrap();
        conn.execute(
            "UPDATE receipts SET created_at = datetime('now', '-30 days') WHERE id = ?",
            params![old],
        )
        .unwrap();
        drop(conn);

        let cutoff = Utc::now() - Duration::days(7);
        let found = db
            .receipts_created_before(&cutoff, Some(OcrStatus::Failed))
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, old);

        assert!(db
            .receipts_created_before(&cutoff, Some(OcrStatus::Completed))
            .unwrap()
            .is_empty());
        assert_eq!(db.count_receipts(None, None, Some(&cutoff)).unwrap(), 1);
        assert_eq!(db.count_receipts(Some(OcrStatus::Failed), None, None).unwrap(), 2);
    }

    #[test]
    fn test_encrypted_database() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("encrypted.db");
        let path = path.to_str().unwrap();

        {
            let db = Database::new_with_key(path, Some("test-passphrase")).unwrap();
            assert!(db.is_encrypted().unwrap());
            db.upsert_user("alice", "alice@example.com", "Alice").unwrap();
        }

        let db = Database::new_with_key(path, Some("test-passphrase")).unwrap();
        assert_eq!(db.list_users().unwrap().len(), 1);

        // Opening without the key, or with the wrong one, fails
        assert!(Database::new_with_key(path, None).is_err());
        assert!(Database::new_with_key(path, Some("wrong-passphrase")).is_err());

        assert!(!Database::in_memory().unwrap().is_encrypted().unwrap());
    }

    #[test]
    fn test_audit_log() {
        let db = Database::in_memory().unwrap();
        db.log_audit("alice", "create", Some("expense"), Some("e1"), None)
            .unwrap();
        db.log_audit("alice", "delete", Some("expense"), Some("e1"), Some("cascade"))
            .unwrap();

        let entries = db.list_audit_log(10).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, "delete");
        assert_eq!(entries[0].details.as_deref(), Some("cascade"));
    }
}
