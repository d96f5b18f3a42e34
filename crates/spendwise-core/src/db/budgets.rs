//! Budget operations

use rusqlite::{params, OptionalExtension};

use super::{format_datetime, parse_datetime, Database};
use crate::error::Result;
use crate::models::*;

const BUDGET_COLUMNS: &str =
    "id, user_id, organization_name, name, amount, category, created_at, updated_at";

impl Database {
    /// Insert a fully-formed budget record
    pub fn insert_budget(&self, budget: &Budget) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO budgets (id, user_id, organization_name, name, amount, category,
                created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                budget.id,
                budget.user_id,
                budget.organization_name,
                budget.name,
                budget.amount,
                budget.category.as_str(),
                format_datetime(&budget.created_at),
                format_datetime(&budget.updated_at),
            ],
        )?;
        Ok(())
    }

    /// Get budget by ID
    pub fn get_budget(&self, id: &str) -> Result<Option<Budget>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM budgets WHERE id = ?", BUDGET_COLUMNS);
        let budget = conn
            .query_row(&sql, params![id], Self::row_to_budget)
            .optional()?;
        Ok(budget)
    }

    /// Budgets owned by the user, plus shared budgets of their organization
    pub fn list_visible_budgets(
        &self,
        user_id: &str,
        organization: Option<&str>,
    ) -> Result<Vec<Budget>> {
        let conn = self.conn()?;
        let sql = format!(
            r#"
            SELECT {} FROM budgets
            WHERE user_id = ?1 OR (?2 IS NOT NULL AND organization_name = ?2)
            ORDER BY created_at DESC, id
            "#,
            BUDGET_COLUMNS
        );

        let mut stmt = conn.prepare(&sql)?;
        let budgets = stmt
            .query_map(params![user_id, organization], Self::row_to_budget)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(budgets)
    }

    /// Overwrite the mutable fields of a budget
    pub fn update_budget(&self, budget: &Budget) -> Result<bool> {
        let conn = self.conn()?;
        let updated = conn.execute(
            r#"
            UPDATE budgets SET name = ?, amount = ?, category = ?, organization_name = ?,
                updated_at = ?
            WHERE id = ?
            "#,
            params![
                budget.name,
                budget.amount,
                budget.category.as_str(),
                budget.organization_name,
                format_datetime(&budget.updated_at),
                budget.id,
            ],
        )?;
        Ok(updated > 0)
    }

    /// Delete a budget. Returns false if it didn't exist.
    pub fn delete_budget(&self, id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM budgets WHERE id = ?", params![id])?;
        Ok(deleted > 0)
    }

    /// Attach an organization to every budget of the user that has none
    pub fn assign_budgets_to_organization(&self, user_id: &str, organization: &str) -> Result<usize> {
        let conn = self.conn()?;
        let migrated = conn.execute(
            r#"
            UPDATE budgets SET organization_name = ?, updated_at = CURRENT_TIMESTAMP
            WHERE user_id = ? AND organization_name IS NULL
            "#,
            params![organization, user_id],
        )?;
        Ok(migrated)
    }

    fn row_to_budget(row: &rusqlite::Row) -> rusqlite::Result<Budget> {
        let category_str: String = row.get(5)?;
        let created_at: String = row.get(6)?;
        let updated_at: String = row.get(7)?;

        Ok(Budget {
            id: row.get(0)?,
            user_id: row.get(1)?,
            organization_name: row.get(2)?,
            name: row.get(3)?,
            amount: row.get(4)?,
            category: category_str.parse().unwrap_or_default(),
            created_at: parse_datetime(&created_at),
            updated_at: parse_datetime(&updated_at),
        })
    }
}
