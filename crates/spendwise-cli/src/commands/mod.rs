//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `core` - Init and shared utilities (open_db, open_app)
//! - `users` - User and organization commands
//! - `expenses` - Expense commands (add, list, stats, export, ...)
//! - `classify` - Category classification
//! - `budgets` - Budget commands
//! - `receipts` - Receipt upload and management
//! - `share` - Organization share links
//! - `admin` - Retention sweeps and storage reports
//! - `serve` - Web server command

pub mod admin;
pub mod budgets;
pub mod classify;
pub mod core;
pub mod expenses;
pub mod receipts;
pub mod serve;
pub mod share;
pub mod users;

// Re-export command functions for main.rs
pub use admin::*;
pub use budgets::*;
pub use classify::*;
pub use core::*;
pub use expenses::*;
pub use receipts::*;
pub use serve::*;
pub use share::*;
pub use users::*;

use anyhow::{anyhow, Result};
use chrono::{NaiveDate, NaiveDateTime};
use spendwise_core::models::Category;

/// Truncate a string to a maximum number of characters, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Parse a date argument
///
/// Accepts `YYYY-MM-DD HH:MM:SS` or `YYYY-MM-DD`; a bare date is the start
/// of the day, or its last second with `end_of_day`.
pub fn parse_date_arg(value: &str, end_of_day: bool) -> Result<NaiveDateTime> {
    let value = value.trim();
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(dt);
        }
    }

    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| anyhow!("Invalid date '{}' (use YYYY-MM-DD)", value))?;
    let time = if end_of_day {
        date.and_hms_opt(23, 59, 59)
    } else {
        date.and_hms_opt(0, 0, 0)
    };
    time.ok_or_else(|| anyhow!("Invalid date '{}'", value))
}

/// Parse an optional date range argument pair
pub fn parse_range(
    from: Option<&str>,
    to: Option<&str>,
) -> Result<(Option<NaiveDateTime>, Option<NaiveDateTime>)> {
    let from = from.map(|f| parse_date_arg(f, false)).transpose()?;
    let to = to.map(|t| parse_date_arg(t, true)).transpose()?;
    Ok((from, to))
}

/// Parse a category label or code
pub fn parse_category(value: &str) -> Result<Category> {
    value.parse::<Category>().map_err(|e| anyhow!(e))
}

/// Format a KRW amount with thousands separators
pub fn format_won(amount: f64) -> String {
    let negative = amount < 0.0;
    let digits = format!("{:.0}", amount.abs());
    let mut out = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    if negative {
        format!("-₩{}", out)
    } else {
        format!("₩{}", out)
    }
}
