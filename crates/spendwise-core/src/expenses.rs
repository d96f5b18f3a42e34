//! Expense aggregator
//!
//! Creates expenses (auto-classifying when no category is given), enforces
//! owner-only access, lists expenses for a user or a whole organization, and
//! rolls them up into per-category statistics.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDateTime, Utc};
use tracing::{debug, info};

use crate::classify::CategoryClassifier;
use crate::db::{new_id, Database, ExpenseFilter};
use crate::error::{Error, Result};
use crate::models::{
    Category, CategorySpending, ClassificationMethod, Expense, ExpenseQuery, ExpenseStatistics,
    ExpenseUpdate, NewExpense, StatisticsPeriod,
};

/// Largest page a list call may request
pub const MAX_LIST_LIMIT: i64 = 10_000;

/// Upper bound on records scanned for statistics
pub const STATISTICS_SCAN_LIMIT: i64 = 10_000;

/// Prefix of receipt ids generated for expenses entered by hand
pub const MANUAL_RECEIPT_PREFIX: &str = "manual-";

/// Expense service over the database and the category classifier
#[derive(Clone)]
pub struct ExpenseAggregator {
    db: Database,
    classifier: CategoryClassifier,
}

impl ExpenseAggregator {
    pub fn new(db: Database, classifier: CategoryClassifier) -> Self {
        Self { db, classifier }
    }

    pub fn classifier(&self) -> &CategoryClassifier {
        &self.classifier
    }

    /// Record a new expense for `user_id`
    ///
    /// Without an explicit category the classifier picks one (method `auto`);
    /// an explicit category is recorded as `manual` with confidence 1.0.
    pub async fn create(&self, user_id: &str, input: NewExpense) -> Result<Expense> {
        let store_name = input.store_name.trim().to_string();
        if store_name.is_empty() {
            return Err(Error::InvalidData("Store name is required".into()));
        }
        validate_amount(input.amount)?;
        if let Some(budget_id) = input.budget_id.as_deref() {
            self.require_budget(budget_id)?;
        }

        let (category, method, confidence) = match input.category {
            Some(category) => (category, ClassificationMethod::Manual, 1.0),
            None => {
                let c = self
                    .classifier
                    .classify(&store_name, input.item_name.as_deref(), Some(input.amount))
                    .await;
                debug!(
                    "Auto-classified '{}' as {} via {} ({:.2})",
                    store_name,
                    c.category,
                    c.tier.as_str(),
                    c.confidence
                );
                (c.category, ClassificationMethod::Auto, c.confidence)
            }
        };

        let now = Utc::now();
        let expense = Expense {
            id: new_id(),
            user_id: user_id.to_string(),
            receipt_id: input
                .receipt_id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| format!("{}{}", MANUAL_RECEIPT_PREFIX, uuid::Uuid::new_v4())),
            category,
            amount: input.amount,
            date: input.date,
            store_name,
            store_address: input.store_address,
            store_phone_number: input.store_phone_number,
            description: input.description,
            item_name: input.item_name,
            classification_method: method,
            classification_confidence: Some(confidence),
            budget_id: input.budget_id,
            created_at: now,
            updated_at: now,
        };

        self.db
            .insert_expense(&expense)
            .map_err(|e| Error::operation("expense creation", e))?;

        info!(
            "Created expense {} for {}: {} {} ({})",
            expense.id,
            user_id,
            expense.amount,
            expense.category,
            method.as_str()
        );
        Ok(expense)
    }

    /// Get an expense owned by `user_id`
    pub fn get(&self, user_id: &str, id: &str) -> Result<Expense> {
        let expense = self
            .db
            .get_expense(id)?
            .ok_or_else(|| Error::NotFound(format!("Expense {}", id)))?;

        if expense.user_id != user_id {
            return Err(Error::Forbidden(format!("Expense {}", id)));
        }
        Ok(expense)
    }

    /// Apply a partial update. A category change pins the expense to manual.
    pub fn update(&self, user_id: &str, id: &str, update: ExpenseUpdate) -> Result<Expense> {
        if update.is_empty() {
            return Err(Error::InvalidData("No fields to update".into()));
        }

        let mut expense = self.get(user_id, id)?;

        if let Some(category) = update.category {
            expense.category = category;
            expense.classification_method = ClassificationMethod::Manual;
            expense.classification_confidence = Some(1.0);
        }
        if let Some(amount) = update.amount {
            validate_amount(amount)?;
            expense.amount = amount;
        }
        if let Some(date) = update.date {
            expense.date = date;
        }
        if let Some(store_name) = update.store_name {
            let store_name = store_name.trim().to_string();
            if store_name.is_empty() {
                return Err(Error::InvalidData("Store name is required".into()));
            }
            expense.store_name = store_name;
        }
        if let Some(address) = update.store_address {
            expense.store_address = Some(address);
        }
        if let Some(phone) = update.store_phone_number {
            expense.store_phone_number = Some(phone);
        }
        if let Some(description) = update.description {
            expense.description = Some(description);
        }
        if let Some(item_name) = update.item_name {
            expense.item_name = Some(item_name);
        }
        if let Some(budget_id) = update.budget_id {
            // An empty id detaches the expense from its budget
            if budget_id.trim().is_empty() {
                expense.budget_id = None;
            } else {
                self.require_budget(&budget_id)?;
                expense.budget_id = Some(budget_id);
            }
        }
        expense.updated_at = Utc::now();

        let updated = self
            .db
            .update_expense(&expense)
            .map_err(|e| Error::operation("expense update", e))?;
        if !updated {
            return Err(Error::NotFound(format!("Expense {}", id)));
        }

        debug!("Updated expense {}", id);
        Ok(expense)
    }

    /// Delete an expense owned by `user_id`
    pub fn delete(&self, user_id: &str, id: &str) -> Result<()> {
        self.get(user_id, id)?;

        let deleted = self
            .db
            .delete_expense(id)
            .map_err(|e| Error::operation("expense deletion", e))?;
        if !deleted {
            return Err(Error::NotFound(format!("Expense {}", id)));
        }

        info!("Deleted expense {} for {}", id, user_id);
        Ok(())
    }

    /// List expenses, newest first
    ///
    /// With `organization` set the caller must belong to it, and the result
    /// is the union of every member's expenses, filtered, sorted and limited
    /// as one set.
    pub fn list(&self, user_id: &str, query: &ExpenseQuery) -> Result<Vec<Expense>> {
        check_limit(query.limit)?;
        let user_ids = self.scope_user_ids(user_id, query.organization.as_deref())?;
        self.list_for_users(&user_ids, query)
    }

    /// Every member's expenses for an organization, without a caller check
    ///
    /// Callers must have established access some other way, such as a share
    /// link. `query.organization` is ignored.
    pub fn list_for_organization(&self, organization: &str, query: &ExpenseQuery) -> Result<Vec<Expense>> {
        check_limit(query.limit)?;
        let user_ids = self.db.organization_member_ids(organization)?;
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }
        self.list_for_users(&user_ids, query)
    }

    fn list_for_users(&self, user_ids: &[String], query: &ExpenseQuery) -> Result<Vec<Expense>> {
        let filter = ExpenseFilter::new()
            .user_ids(user_ids)
            .category(query.category)
            .date_range(query.start, query.end);

        self.db.list_expenses(filter, query.limit)
    }

    /// Per-category spending for a period
    ///
    /// The period defaults to the first day of the current month through now.
    pub fn statistics(
        &self,
        user_id: &str,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
        organization: Option<&str>,
    ) -> Result<ExpenseStatistics> {
        let now = Utc::now().naive_utc();
        let start = start.unwrap_or_else(|| month_start(now));
        let end = end.unwrap_or(now);

        let user_ids = self.scope_user_ids(user_id, organization)?;
        let filter = ExpenseFilter::new()
            .user_ids(&user_ids)
            .date_range(Some(start), Some(end));
        let expenses = self.db.list_expenses(filter, STATISTICS_SCAN_LIMIT)?;

        let mut totals: BTreeMap<Category, (f64, i64)> = BTreeMap::new();
        for expense in &expenses {
            let entry = totals.entry(expense.category).or_insert((0.0, 0));
            entry.0 += expense.amount;
            entry.1 += 1;
        }

        let total_amount: f64 = totals.values().map(|(amount, _)| amount).sum();
        let total_count = expenses.len() as i64;

        let mut by_category: Vec<CategorySpending> = totals
            .into_iter()
            .map(|(category, (amount, count))| CategorySpending {
                category,
                total_amount: amount,
                count,
                percentage: if total_amount > 0.0 {
                    round2(amount / total_amount * 100.0)
                } else {
                    0.0
                },
            })
            .collect();
        // Stable sort keeps category order among equal amounts
        by_category.sort_by(|a, b| b.total_amount.total_cmp(&a.total_amount));

        Ok(ExpenseStatistics {
            total_amount,
            total_count,
            by_category,
            period: StatisticsPeriod { start, end },
        })
    }

    /// Expenses of one receipt that belong to `user_id`
    pub fn by_receipt(&self, user_id: &str, receipt_id: &str) -> Result<Vec<Expense>> {
        if let Some(receipt) = self.db.get_receipt(receipt_id)? {
            if receipt.user_id != user_id {
                return Err(Error::Forbidden(format!("Receipt {}", receipt_id)));
            }
        }

        let user_ids = [user_id.to_string()];
        let filter = ExpenseFilter::new()
            .user_ids(&user_ids)
            .receipt_id(Some(receipt_id));
        self.db.list_expenses(filter, MAX_LIST_LIMIT)
    }

    /// Re-run the classifier on an auto-classified expense
    ///
    /// Manual expenses come back unchanged.
    pub async fn reclassify(&self, user_id: &str, id: &str) -> Result<Expense> {
        let mut expense = self.get(user_id, id)?;
        if expense.classification_method == ClassificationMethod::Manual {
            debug!("Expense {} is manually classified, leaving it alone", id);
            return Ok(expense);
        }

        let c = self
            .classifier
            .classify(
                &expense.store_name,
                expense.item_name.as_deref(),
                Some(expense.amount),
            )
            .await;

        if c.category == expense.category && expense.classification_confidence == Some(c.confidence)
        {
            return Ok(expense);
        }

        info!(
            "Reclassified expense {}: {} -> {} ({:.2})",
            id, expense.category, c.category, c.confidence
        );
        expense.category = c.category;
        expense.classification_confidence = Some(c.confidence);
        expense.updated_at = Utc::now();

        self.db
            .update_expense(&expense)
            .map_err(|e| Error::operation("expense reclassification", e))?;
        Ok(expense)
    }

    /// Render the expenses matching `query` as CSV
    pub fn export_csv(&self, user_id: &str, query: &ExpenseQuery) -> Result<String> {
        let expenses = self.list(user_id, query)?;

        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record([
            "date",
            "store_name",
            "category",
            "amount",
            "item_name",
            "description",
            "classification_method",
            "classification_confidence",
            "receipt_id",
        ])?;

        for e in &expenses {
            let amount = e.amount.to_string();
            let confidence = e
                .classification_confidence
                .map(|c| format!("{:.2}", c))
                .unwrap_or_default();
            let date = e.date.format("%Y-%m-%d %H:%M:%S").to_string();
            writer.write_record([
                date.as_str(),
                e.store_name.as_str(),
                e.category.as_str(),
                amount.as_str(),
                e.item_name.as_deref().unwrap_or(""),
                e.description.as_deref().unwrap_or(""),
                e.classification_method.as_str(),
                confidence.as_str(),
                e.receipt_id.as_str(),
            ])?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| Error::Io(e.into_error()))?;
        String::from_utf8(bytes).map_err(|e| Error::InvalidData(e.to_string()))
    }

    /// Users whose expenses a query may see
    fn scope_user_ids(&self, user_id: &str, organization: Option<&str>) -> Result<Vec<String>> {
        let Some(organization) = organization.map(str::trim).filter(|o| !o.is_empty()) else {
            return Ok(vec![user_id.to_string()]);
        };

        let own = self.db.user_organization(user_id)?;
        if own.as_deref() != Some(organization) {
            return Err(Error::Forbidden(format!(
                "Not a member of organization '{}'",
                organization
            )));
        }

        self.db.organization_member_ids(organization)
    }

    fn require_budget(&self, budget_id: &str) -> Result<()> {
        match self.db.get_budget(budget_id)? {
            Some(_) => Ok(()),
            None => Err(Error::InvalidData(format!(
                "Budget {} does not exist",
                budget_id
            ))),
        }
    }
}

fn check_limit(limit: i64) -> Result<()> {
    if (1..=MAX_LIST_LIMIT).contains(&limit) {
        Ok(())
    } else {
        Err(Error::InvalidData(format!(
            "limit must be between 1 and {}",
            MAX_LIST_LIMIT
        )))
    }
}

fn validate_amount(amount: f64) -> Result<()> {
    if amount.is_finite() && amount > 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidData(format!(
            "Amount must be greater than 0, got {}",
            amount
        )))
    }
}

fn month_start(now: NaiveDateTime) -> NaiveDateTime {
    now.date()
        .with_day(1)
        .unwrap_or(now.date())
        .and_hms_opt(0, 0, 0)
        .unwrap_or(now)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
