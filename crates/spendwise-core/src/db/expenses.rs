//! Expense operations

use rusqlite::{params, OptionalExtension};

use super::{format_datetime, format_naive, parse_datetime, parse_naive, Database, ExpenseFilter};
use crate::error::Result;
use crate::models::*;

const EXPENSE_COLUMNS: &str = "id, user_id, receipt_id, category, amount, date, store_name,
     store_address, store_phone_number, description, item_name, classification_method,
     classification_confidence, budget_id, created_at, updated_at";

impl Database {
    /// Insert a fully-formed expense record
    pub fn insert_expense(&self, expense: &Expense) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO expenses (id, user_id, receipt_id, category, amount, date, store_name,
                store_address, store_phone_number, description, item_name, classification_method,
                classification_confidence, budget_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                expense.id,
                expense.user_id,
                expense.receipt_id,
                expense.category.as_str(),
                expense.amount,
                format_naive(&expense.date),
                expense.store_name,
                expense.store_address,
                expense.store_phone_number,
                expense.description,
                expense.item_name,
                expense.classification_method.as_str(),
                expense.classification_confidence,
                expense.budget_id,
                format_datetime(&expense.created_at),
                format_datetime(&expense.updated_at),
            ],
        )?;
        Ok(())
    }

    /// Get expense by ID
    pub fn get_expense(&self, id: &str) -> Result<Option<Expense>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM expenses WHERE id = ?", EXPENSE_COLUMNS);
        let expense = conn
            .query_row(&sql, params![id], Self::row_to_expense)
            .optional()?;
        Ok(expense)
    }

    /// Overwrite the mutable fields of an expense
    pub fn update_expense(&self, expense: &Expense) -> Result<bool> {
        let conn = self.conn()?;
        let updated = conn.execute(
            r#"
            UPDATE expenses SET category = ?, amount = ?, date = ?, store_name = ?,
                store_address = ?, store_phone_number = ?, description = ?, item_name = ?,
                classification_method = ?, classification_confidence = ?, budget_id = ?,
                updated_at = ?
            WHERE id = ?
            "#,
            params![
                expense.category.as_str(),
                expense.amount,
                format_naive(&expense.date),
                expense.store_name,
                expense.store_address,
                expense.store_phone_number,
                expense.description,
                expense.item_name,
                expense.classification_method.as_str(),
                expense.classification_confidence,
                expense.budget_id,
                format_datetime(&expense.updated_at),
                expense.id,
            ],
        )?;
        Ok(updated > 0)
    }

    /// Delete an expense. Returns false if it didn't exist.
    pub fn delete_expense(&self, id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM expenses WHERE id = ?", params![id])?;
        Ok(deleted > 0)
    }

    /// Delete every expense derived from a receipt
    pub fn delete_expenses_for_receipt(&self, receipt_id: &str) -> Result<usize> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM expenses WHERE receipt_id = ?",
            params![receipt_id],
        )?;
        Ok(deleted)
    }

    /// List expenses matching a filter, newest first
    pub fn list_expenses(&self, filter: ExpenseFilter<'_>, limit: i64) -> Result<Vec<Expense>> {
        let conn = self.conn()?;
        let built = filter.build();
        let sql = format!(
            "SELECT {} FROM expenses {} {} LIMIT {}",
            EXPENSE_COLUMNS, built.where_clause, built.order_clause, limit
        );

        let mut stmt = conn.prepare(&sql)?;
        let expenses = stmt
            .query_map(built.params_refs().as_slice(), Self::row_to_expense)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(expenses)
    }

    /// Sum and count of expenses matching a filter
    pub fn sum_expenses(&self, filter: ExpenseFilter<'_>) -> Result<(f64, i64)> {
        let conn = self.conn()?;
        let built = filter.build();
        let sql = format!(
            "SELECT COALESCE(SUM(amount), 0), COUNT(*) FROM expenses {}",
            built.where_clause
        );

        let totals = conn.query_row(&sql, built.params_refs().as_slice(), |row| {
            Ok((row.get::<_, f64>(0)?, row.get::<_, i64>(1)?))
        })?;

        Ok(totals)
    }

    fn row_to_expense(row: &rusqlite::Row) -> rusqlite::Result<Expense> {
        let category_str: String = row.get(3)?;
        let date_str: String = row.get(5)?;
        let method_str: String = row.get(11)?;
        let created_at: String = row.get(14)?;
        let updated_at: String = row.get(15)?;

        Ok(Expense {
            id: row.get(0)?,
            user_id: row.get(1)?,
            receipt_id: row.get(2)?,
            category: category_str.parse().unwrap_or_default(),
            amount: row.get(4)?,
            date: parse_naive(&date_str),
            store_name: row.get(6)?,
            store_address: row.get(7)?,
            store_phone_number: row.get(8)?,
            description: row.get(9)?,
            item_name: row.get(10)?,
            classification_method: method_str.parse().unwrap_or_default(),
            classification_confidence: row.get(12)?,
            budget_id: row.get(13)?,
            created_at: parse_datetime(&created_at),
            updated_at: parse_datetime(&updated_at),
        })
    }
}
