//! Budget reconciler
//!
//! Budgets store only their limit. How much of it is used is computed on
//! every read from the expenses in the budget's scope: the owner alone, or
//! every member of the owner's organization for shared budgets.

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::db::{new_id, Database, ExpenseFilter};
use crate::error::{Error, Result};
use crate::models::{Budget, BudgetCategory, BudgetUpdate, BudgetWithUsage, NewBudget};

const NOT_FOUND: &str = "예산을 찾을 수 없습니다";
const NO_PERMISSION: &str = "권한이 없습니다";

/// Budget service
#[derive(Clone)]
pub struct BudgetReconciler {
    db: Database,
}

impl BudgetReconciler {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Amount consumed against a budget
    ///
    /// Expenses explicitly linked to the budget win; when there are none the
    /// budget's category decides which expenses count. Lookup failures are
    /// logged and reported as nothing spent.
    pub fn spent(&self, budget: &Budget) -> f64 {
        match self.try_spent(budget) {
            Ok(spent) => spent,
            Err(e) => {
                warn!("Failed to compute spending for budget {}: {}", budget.id, e);
                0.0
            }
        }
    }

    fn try_spent(&self, budget: &Budget) -> Result<f64> {
        let user_ids = self.scope_user_ids(budget)?;

        let linked = ExpenseFilter::new()
            .user_ids(&user_ids)
            .budget_id(Some(&budget.id));
        let (linked_total, linked_count) = self.db.sum_expenses(linked)?;
        if linked_count > 0 {
            debug!(
                "Budget {}: {} linked expenses, {}",
                budget.id, linked_count, linked_total
            );
            return Ok(linked_total);
        }

        let category = match budget.category {
            BudgetCategory::All => None,
            BudgetCategory::Only(category) => Some(category),
        };
        let by_category = ExpenseFilter::new().user_ids(&user_ids).category(category);
        let (total, count) = self.db.sum_expenses(by_category)?;
        debug!(
            "Budget {}: {} expenses in '{}', {}",
            budget.id,
            count,
            budget.category.as_str(),
            total
        );
        Ok(total)
    }

    fn scope_user_ids(&self, budget: &Budget) -> Result<Vec<String>> {
        let Some(organization) = budget.organization_name.as_deref() else {
            return Ok(vec![budget.user_id.clone()]);
        };

        let mut members = self.db.organization_member_ids(organization)?;
        if !members.contains(&budget.user_id) {
            members.push(budget.user_id.clone());
        }
        Ok(members)
    }

    /// Attach read-time consumption figures. `remaining` may be negative.
    pub fn with_usage(&self, budget: Budget) -> BudgetWithUsage {
        let spent = self.spent(&budget);
        BudgetWithUsage {
            remaining: budget.amount - spent,
            spent,
            budget,
        }
    }

    /// Create a budget owned by `user_id`
    ///
    /// A shared budget may only name the caller's own organization.
    pub fn create(&self, user_id: &str, input: NewBudget) -> Result<BudgetWithUsage> {
        let name = validate_name(&input.name)?;
        validate_amount(input.amount)?;

        let organization_name = input
            .organization_name
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty());
        if let Some(org) = organization_name.as_deref() {
            let own = self.db.user_organization(user_id)?;
            if own.as_deref() != Some(org) {
                return Err(Error::Forbidden(NO_PERMISSION.into()));
            }
        }

        let now = Utc::now();
        let budget = Budget {
            id: new_id(),
            user_id: user_id.to_string(),
            organization_name,
            name,
            amount: input.amount,
            category: input.category,
            created_at: now,
            updated_at: now,
        };

        self.db
            .insert_budget(&budget)
            .map_err(|e| Error::operation("budget creation", e))?;
        info!(
            "Created budget {} '{}' ({} {}) for {}",
            budget.id,
            budget.name,
            budget.amount,
            budget.category.as_str(),
            user_id
        );

        Ok(self.with_usage(budget))
    }

    /// The caller's budgets plus shared budgets of their organization
    pub fn list(&self, user_id: &str) -> Result<Vec<BudgetWithUsage>> {
        let organization = self.db.user_organization(user_id)?;
        let budgets = self
            .db
            .list_visible_budgets(user_id, organization.as_deref())?;

        Ok(budgets.into_iter().map(|b| self.with_usage(b)).collect())
    }

    pub fn get(&self, user_id: &str, id: &str) -> Result<BudgetWithUsage> {
        let budget = self.load(id)?;
        if budget.user_id != user_id && !self.shares_organization(user_id, &budget)? {
            return Err(Error::Forbidden(NO_PERMISSION.into()));
        }
        Ok(self.with_usage(budget))
    }

    /// Change name, amount or category. Only the owner may update.
    pub fn update(&self, user_id: &str, id: &str, update: BudgetUpdate) -> Result<BudgetWithUsage> {
        let mut budget = self.load(id)?;
        if budget.user_id != user_id {
            return Err(Error::Forbidden(NO_PERMISSION.into()));
        }

        if let Some(name) = update.name {
            budget.name = validate_name(&name)?;
        }
        if let Some(amount) = update.amount {
            validate_amount(amount)?;
            budget.amount = amount;
        }
        if let Some(category) = update.category {
            budget.category = category;
        }
        budget.updated_at = Utc::now();

        let updated = self
            .db
            .update_budget(&budget)
            .map_err(|e| Error::operation("budget update", e))?;
        if !updated {
            return Err(Error::NotFound(NOT_FOUND.into()));
        }

        debug!("Updated budget {}", id);
        Ok(self.with_usage(budget))
    }

    /// Delete a budget. The owner or any member of its organization may delete.
    pub fn delete(&self, user_id: &str, id: &str) -> Result<()> {
        let budget = self.load(id)?;
        if budget.user_id != user_id && !self.shares_organization(user_id, &budget)? {
            return Err(Error::Forbidden(NO_PERMISSION.into()));
        }

        let deleted = self
            .db
            .delete_budget(id)
            .map_err(|e| Error::operation("budget deletion", e))?;
        if !deleted {
            return Err(Error::NotFound(NOT_FOUND.into()));
        }

        info!("Deleted budget {} (by {})", id, user_id);
        Ok(())
    }

    /// Share every unshared budget of the caller with their organization
    ///
    /// Returns the number of budgets migrated.
    pub fn migrate_to_organization(&self, user_id: &str) -> Result<usize> {
        let organization = self
            .db
            .user_organization(user_id)?
            .ok_or_else(|| Error::InvalidData("User has no organization".into()))?;

        let migrated = self
            .db
            .assign_budgets_to_organization(user_id, &organization)
            .map_err(|e| Error::operation("budget migration", e))?;
        info!(
            "Migrated {} budgets of {} to organization '{}'",
            migrated, user_id, organization
        );
        Ok(migrated)
    }

    fn load(&self, id: &str) -> Result<Budget> {
        self.db
            .get_budget(id)?
            .ok_or_else(|| Error::NotFound(NOT_FOUND.into()))
    }

    fn shares_organization(&self, user_id: &str, budget: &Budget) -> Result<bool> {
        let Some(org) = budget.organization_name.as_deref() else {
            return Ok(false);
        };
        Ok(self.db.user_organization(user_id)?.as_deref() == Some(org))
    }
}

fn validate_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::InvalidData("Budget name is required".into()));
    }
    Ok(name.to_string())
}

fn validate_amount(amount: f64) -> Result<()> {
    if amount.is_finite() && amount > 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidData(format!(
            "Budget amount must be greater than 0, got {}",
            amount
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, ClassificationMethod, Expense};
    use chrono::NaiveDate;

    fn setup() -> (Database, BudgetReconciler) {
        let db = Database::in_memory().unwrap();
        for user in ["alice", "bob", "carol"] {
            db.upsert_user(user, &format!("{}@example.com", user), user)
                .unwrap();
        }
        db.set_user_organization("alice", Some("Acme")).unwrap();
        db.set_user_organization("bob", Some("Acme")).unwrap();
        (db.clone(), BudgetReconciler::new(db))
    }

    fn add_expense(db: &Database, user: &str, category: Category, amount: f64, budget_id: Option<&str>) {
        let now = Utc::now();
        db.insert_expense(&Expense {
            id: new_id(),
            user_id: user.to_string(),
            receipt_id: "manual-test".to_string(),
            category,
            amount,
            date: NaiveDate::from_ymd_opt(2024, 3, 10)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap(),
            store_name: "Shop".to_string(),
            store_address: None,
            store_phone_number: None,
            description: None,
            item_name: None,
            classification_method: ClassificationMethod::Manual,
            classification_confidence: Some(1.0),
            budget_id: budget_id.map(String::from),
            created_at: now,
            updated_at: now,
        })
        .unwrap();
    }

    fn new_budget(name: &str, amount: f64, category: BudgetCategory) -> NewBudget {
        NewBudget {
            name: name.to_string(),
            amount,
            category,
            organization_name: None,
        }
    }

    #[test]
    fn test_category_budget_spent_and_remaining() {
        let (db, reconciler) = setup();
        add_expense(&db, "alice", Category::Food, 30000.0, None);
        add_expense(&db, "alice", Category::Food, 45000.0, None);
        add_expense(&db, "alice", Category::Transportation, 9000.0, None);

        let budget = reconciler
            .create("alice", new_budget("식비", 100000.0, BudgetCategory::Only(Category::Food)))
            .unwrap();
        assert_eq!(budget.spent, 75000.0);
        assert_eq!(budget.remaining, 25000.0);
    }

    #[test]
    fn test_unreadable_expenses_count_as_nothing_spent() {
        let (db, reconciler) = setup();
        add_expense(&db, "alice", Category::Food, 30000.0, None);
        let budget = reconciler
            .create("alice", new_budget("식비", 100000.0, BudgetCategory::Only(Category::Food)))
            .unwrap();
        assert_eq!(budget.spent, 30000.0);

        db.conn().unwrap().execute("DROP TABLE expenses", []).unwrap();

        let reloaded = reconciler.get("alice", &budget.budget.id).unwrap();
        assert_eq!(reloaded.spent, 0.0);
        assert_eq!(reloaded.remaining, 100000.0);
    }

    #[test]
    fn test_all_category_counts_everything_and_may_overrun() {
        let (db, reconciler) = setup();
        add_expense(&db, "alice", Category::Food, 60000.0, None);
        add_expense(&db, "alice", Category::Health, 50000.0, None);

        let budget = reconciler
            .create("alice", new_budget("월 예산", 100000.0, BudgetCategory::All))
            .unwrap();
        assert_eq!(budget.spent, 110000.0);
        assert_eq!(budget.remaining, -10000.0);
        assert_eq!(budget.remaining, budget.budget.amount - budget.spent);
    }

    #[test]
    fn test_linked_expenses_take_precedence() {
        let (db, reconciler) = setup();
        let budget = reconciler
            .create("alice", new_budget("출장", 50000.0, BudgetCategory::Only(Category::Food)))
            .unwrap();
        add_expense(&db, "alice", Category::Food, 20000.0, None);
        add_expense(&db, "alice", Category::Transportation, 12000.0, Some(&budget.budget.id));

        let reloaded = reconciler.get("alice", &budget.budget.id).unwrap();
        assert_eq!(reloaded.spent, 12000.0);
    }

    #[test]
    fn test_shared_budget_counts_organization_members() {
        let (db, reconciler) = setup();
        add_expense(&db, "alice", Category::Food, 10000.0, None);
        add_expense(&db, "bob", Category::Food, 15000.0, None);
        add_expense(&db, "carol", Category::Food, 99000.0, None);

        let mut input = new_budget("팀 식비", 100000.0, BudgetCategory::Only(Category::Food));
        input.organization_name = Some("Acme".into());
        let shared = reconciler.create("alice", input).unwrap();
        assert!(shared.budget.is_shared());
        assert_eq!(shared.spent, 25000.0);

        let personal = reconciler
            .create("alice", new_budget("내 식비", 100000.0, BudgetCategory::Only(Category::Food)))
            .unwrap();
        assert_eq!(personal.spent, 10000.0);
    }

    #[test]
    fn test_cannot_share_with_foreign_organization() {
        let (_db, reconciler) = setup();
        let mut input = new_budget("x", 1000.0, BudgetCategory::All);
        input.organization_name = Some("Globex".into());
        assert!(matches!(
            reconciler.create("alice", input).unwrap_err(),
            Error::Forbidden(_)
        ));
    }

    #[test]
    fn test_create_validation() {
        let (_db, reconciler) = setup();
        assert!(matches!(
            reconciler
                .create("alice", new_budget("", 1000.0, BudgetCategory::All))
                .unwrap_err(),
            Error::InvalidData(_)
        ));
        assert!(matches!(
            reconciler
                .create("alice", new_budget("x", 0.0, BudgetCategory::All))
                .unwrap_err(),
            Error::InvalidData(_)
        ));
    }

    #[test]
    fn test_list_includes_shared_budgets_of_organization() {
        let (_db, reconciler) = setup();
        let mut shared = new_budget("팀", 1000.0, BudgetCategory::All);
        shared.organization_name = Some("Acme".into());
        reconciler.create("alice", shared).unwrap();
        reconciler
            .create("alice", new_budget("개인", 1000.0, BudgetCategory::All))
            .unwrap();
        reconciler
            .create("bob", new_budget("bob 개인", 1000.0, BudgetCategory::All))
            .unwrap();

        let bob: Vec<_> = reconciler
            .list("bob")
            .unwrap()
            .into_iter()
            .map(|b| b.budget.name)
            .collect();
        assert_eq!(bob.len(), 2);
        assert!(bob.contains(&"팀".to_string()));
        assert!(bob.contains(&"bob 개인".to_string()));

        assert!(reconciler.list("carol").unwrap().is_empty());
    }

    #[test]
    fn test_authorization_rules() {
        let (_db, reconciler) = setup();
        let mut input = new_budget("팀", 1000.0, BudgetCategory::All);
        input.organization_name = Some("Acme".into());
        let shared = reconciler.create("alice", input).unwrap().budget;
        let personal = reconciler
            .create("alice", new_budget("개인", 1000.0, BudgetCategory::All))
            .unwrap()
            .budget;

        // Members read shared budgets, not personal ones
        assert!(reconciler.get("bob", &shared.id).is_ok());
        assert!(matches!(
            reconciler.get("bob", &personal.id).unwrap_err(),
            Error::Forbidden(_)
        ));
        assert!(matches!(
            reconciler.get("carol", &shared.id).unwrap_err(),
            Error::Forbidden(_)
        ));
        assert!(matches!(
            reconciler.get("alice", "missing").unwrap_err(),
            Error::NotFound(_)
        ));

        // Only the owner updates
        let update = BudgetUpdate {
            amount: Some(2000.0),
            ..Default::default()
        };
        assert!(matches!(
            reconciler.update("bob", &shared.id, update.clone()).unwrap_err(),
            Error::Forbidden(_)
        ));
        let updated = reconciler.update("alice", &shared.id, update).unwrap();
        assert_eq!(updated.budget.amount, 2000.0);

        // Organization members may delete shared budgets
        assert!(matches!(
            reconciler.delete("carol", &shared.id).unwrap_err(),
            Error::Forbidden(_)
        ));
        reconciler.delete("bob", &shared.id).unwrap();
        assert!(matches!(
            reconciler.get("alice", &shared.id).unwrap_err(),
            Error::NotFound(_)
        ));
    }

    #[test]
    fn test_forbidden_message() {
        let (_db, reconciler) = setup();
        let personal = reconciler
            .create("alice", new_budget("개인", 1000.0, BudgetCategory::All))
            .unwrap()
            .budget;
        let err = reconciler.delete("bob", &personal.id).unwrap_err();
        assert!(err.to_string().contains("권한이 없습니다"));
    }

    #[test]
    fn test_migrate_to_organization() {
        let (db, reconciler) = setup();
        reconciler
            .create("alice", new_budget("a", 1000.0, BudgetCategory::All))
            .unwrap();
        reconciler
            .create("alice", new_budget("b", 1000.0, BudgetCategory::All))
            .unwrap();

        assert_eq!(reconciler.migrate_to_organization("alice").unwrap(), 2);
        assert_eq!(reconciler.migrate_to_organization("alice").unwrap(), 0);

        let bob_sees = reconciler.list("bob").unwrap();
        assert_eq!(bob_sees.len(), 2);

        db.set_user_organization("carol", None).unwrap();
        assert!(matches!(
            reconciler.migrate_to_organization("carol").unwrap_err(),
            Error::InvalidData(_)
        ));
    }
}
