//! Expense filter builder for constructing dynamic SQL queries
//!
//! Listing, statistics, export and budget consumption all scan the expenses
//! collection with a different mix of equality and range conditions. The
//! builder keeps those queries in one place.

use chrono::NaiveDateTime;

use super::format_naive;
use crate::models::Category;

/// Builder for constructing expense query filters
///
/// The lifetime `'query` is how long borrowed filter values (user ids,
/// budget id) must stay valid.
#[derive(Default)]
pub struct ExpenseFilter<'query> {
    pub user_ids: Option<&'query [String]>,
    pub category: Option<Category>,
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    pub budget_id: Option<&'query str>,
    pub receipt_id: Option<&'query str>,
}

/// Result of building a filter - contains SQL components and parameters
pub struct FilterResult {
    /// WHERE clause including "WHERE" keyword (empty if no conditions)
    pub where_clause: String,
    /// ORDER BY clause including "ORDER BY" keyword
    pub order_clause: &'static str,
    /// Parameters for the query (boxed for rusqlite compatibility)
    pub params: Vec<Box<dyn rusqlite::ToSql>>,
}

impl<'query> ExpenseFilter<'query> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to expenses owned by any of these users
    pub fn user_ids(mut self, ids: &'query [String]) -> Self {
        self.user_ids = Some(ids);
        self
    }

    pub fn category(mut self, category: Option<Category>) -> Self {
        self.category = category;
        self
    }

    /// Inclusive date range; either bound may be open
    pub fn date_range(mut self, start: Option<NaiveDateTime>, end: Option<NaiveDateTime>) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    pub fn budget_id(mut self, id: Option<&'query str>) -> Self {
        self.budget_id = id;
        self
    }

    pub fn receipt_id(mut self, id: Option<&'query str>) -> Self {
        self.receipt_id = id;
        self
    }

    /// Build the filter components
    pub fn build(self) -> FilterResult {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ids) = self.user_ids {
            if ids.is_empty() {
                // An empty scope matches nothing
                conditions.push("0".to_string());
            } else {
                let placeholders: Vec<&str> = ids.iter().map(|_| "?").collect();
                conditions.push(format!("user_id IN ({})", placeholders.join(", ")));
                for id in ids {
                    params.push(Box::new(id.clone()));
                }
            }
        }

        if let Some(category) = self.category {
            conditions.push("category = ?".to_string());
            params.push(Box::new(category.as_str()));
        }

        if let Some(start) = self.start {
            conditions.push("date >= ?".to_string());
            params.push(Box::new(format_naive(&start)));
        }

        if let Some(end) = self.end {
            conditions.push("date <= ?".to_string());
            params.push(Box::new(format_naive(&end)));
        }

        if let Some(budget_id) = self.budget_id {
            conditions.push("budget_id = ?".to_string());
            params.push(Box::new(budget_id.to_string()));
        }

        if let Some(receipt_id) = self.receipt_id {
            conditions.push("receipt_id = ?".to_string());
            params.push(Box::new(receipt_id.to_string()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        FilterResult {
            where_clause,
            order_clause: "ORDER BY date DESC, created_at DESC, id DESC",
            params,
        }
    }
}

impl FilterResult {
    /// Get parameter references for query execution
    pub fn params_refs(&self) -> Vec<&dyn rusqlite::ToSql> {
        self.params.iter().map(|p| p.as_ref()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_filter_has_no_where() {
        let result = ExpenseFilter::new().build();
        assert!(result.where_clause.is_empty());
        assert!(result.params.is_empty());
    }

    #[test]
    fn test_user_scope_and_category() {
        let ids = vec!["u1".to_string(), "u2".to_string()];
        let result = ExpenseFilter::new()
            .user_ids(&ids)
            .category(Some(Category::Food))
            .build();
        assert_eq!(result.where_clause, "WHERE user_id IN (?, ?) AND category = ?");
        assert_eq!(result.params.len(), 3);
    }

    #[test]
    fn test_empty_user_scope_matches_nothing() {
        let ids: Vec<String> = Vec::new();
        let result = ExpenseFilter::new().user_ids(&ids).build();
        assert_eq!(result.where_clause, "WHERE 0");
    }

    #[test]
    fn test_open_ended_date_range() {
        let start = chrono::NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let result = ExpenseFilter::new().date_range(Some(start), None).build();
        assert_eq!(result.where_clause, "WHERE date >= ?");
        assert_eq!(result.params_refs().len(), 1);
    }
}
