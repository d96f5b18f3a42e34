//! Expense commands

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use spendwise_core::expenses::MAX_LIST_LIMIT;
use spendwise_core::models::{Expense, ExpenseQuery, ExpenseUpdate, NewExpense};
use spendwise_server::AppState;

use super::{audit, format_won, parse_category, parse_date_arg, parse_range, truncate};

/// Expense filters as given on the command line
#[derive(Debug, Default, Clone)]
pub struct ExpenseFilter<'a> {
    pub category: Option<&'a str>,
    pub from: Option<&'a str>,
    pub to: Option<&'a str>,
    pub org: Option<&'a str>,
}

impl ExpenseFilter<'_> {
    fn to_query(&self, limit: i64) -> Result<ExpenseQuery> {
        let (start, end) = parse_range(self.from, self.to)?;
        Ok(ExpenseQuery {
            category: self.category.map(parse_category).transpose()?,
            start,
            end,
            organization: self.org.map(String::from),
            limit,
        })
    }
}

/// Fields for a new expense
#[derive(Debug, Default, Clone)]
pub struct ExpenseArgs<'a> {
    pub store: &'a str,
    pub amount: f64,
    pub date: Option<&'a str>,
    pub category: Option<&'a str>,
    pub item: Option<&'a str>,
    pub description: Option<&'a str>,
    pub budget: Option<&'a str>,
}

/// Fields to change on an existing expense
#[derive(Debug, Default, Clone)]
pub struct ExpenseChanges<'a> {
    pub category: Option<&'a str>,
    pub amount: Option<f64>,
    pub date: Option<&'a str>,
    pub store: Option<&'a str>,
    pub item: Option<&'a str>,
    pub description: Option<&'a str>,
    pub budget: Option<&'a str>,
}

fn print_expense_row(expense: &Expense) {
    println!(
        "  {}  {:<24} {:>12}  {:<6} {}",
        expense.date.format("%Y-%m-%d"),
        truncate(&expense.store_name, 24),
        format_won(expense.amount),
        expense.category.as_str(),
        &expense.id[..8.min(expense.id.len())]
    );
}

fn print_expense(expense: &Expense) {
    println!("\n🧾 Expense {}", expense.id);
    println!("{}", "─".repeat(50));
    println!("  Store:      {}", expense.store_name);
    if let Some(item) = &expense.item_name {
        println!("  Item:       {}", item);
    }
    println!("  Amount:     {}", format_won(expense.amount));
    println!("  Date:       {}", expense.date.format("%Y-%m-%d %H:%M:%S"));
    println!(
        "  Category:   {} ({})",
        expense.category.as_str(),
        expense.category.description()
    );
    match expense.classification_confidence {
        Some(confidence) => println!(
            "  Method:     {} ({:.0}%)",
            expense.classification_method.as_str(),
            confidence * 100.0
        ),
        None => println!("  Method:     {}", expense.classification_method.as_str()),
    }
    if let Some(description) = &expense.description {
        println!("  Note:       {}", description);
    }
    if let Some(budget) = &expense.budget_id {
        println!("  Budget:     {}", budget);
    }
    println!("  Receipt:    {}", expense.receipt_id);
}

pub async fn cmd_expenses_add(state: &AppState, user: &str, args: ExpenseArgs<'_>) -> Result<()> {
    let date = match args.date {
        Some(d) => parse_date_arg(d, false)?,
        None => Utc::now().naive_utc(),
    };

    let input = NewExpense {
        store_name: args.store.to_string(),
        amount: args.amount,
        date,
        category: args.category.map(parse_category).transpose()?,
        item_name: args.item.map(String::from),
        description: args.description.map(String::from),
        budget_id: args.budget.map(String::from),
        ..Default::default()
    };

    let expense = state.expenses.create(user, input).await?;
    audit(
        &state.db,
        user,
        "create",
        "expense",
        Some(&expense.id),
        Some(&format!("{} {}", expense.store_name, expense.amount)),
    );

    println!(
        "✅ Recorded {} at {} as {}",
        format_won(expense.amount),
        expense.store_name,
        expense.category.as_str()
    );
    print_expense(&expense);
    Ok(())
}

pub fn cmd_expenses_list(
    state: &AppState,
    user: &str,
    filter: &ExpenseFilter<'_>,
    limit: i64,
) -> Result<()> {
    let query = filter.to_query(limit)?;
    let expenses = state.expenses.list(user, &query)?;

    if expenses.is_empty() {
        println!("No expenses found.");
        return Ok(());
    }

    let total: f64 = expenses.iter().map(|e| e.amount).sum();
    println!("\n💳 Expenses ({})", expenses.len());
    println!("{}", "─".repeat(70));
    for expense in &expenses {
        print_expense_row(expense);
    }
    println!("{}", "─".repeat(70));
    println!("  Total: {}", format_won(total));
    println!();
    Ok(())
}

pub fn cmd_expenses_show(state: &AppState, user: &str, id: &str) -> Result<()> {
    let expense = state.expenses.get(user, id)?;
    print_expense(&expense);
    println!();
    Ok(())
}

pub fn cmd_expenses_update(
    state: &AppState,
    user: &str,
    id: &str,
    changes: ExpenseChanges<'_>,
) -> Result<()> {
    let update = ExpenseUpdate {
        category: changes.category.map(parse_category).transpose()?,
        amount: changes.amount,
        date: changes.date.map(|d| parse_date_arg(d, false)).transpose()?,
        store_name: changes.store.map(String::from),
        item_name: changes.item.map(String::from),
        description: changes.description.map(String::from),
        budget_id: changes.budget.map(String::from),
        ..Default::default()
    };

    let expense = state.expenses.update(user, id, update)?;
    audit(&state.db, user, "update", "expense", Some(id), None);

    println!("✅ Updated expense {}", id);
    print_expense(&expense);
    Ok(())
}

pub fn cmd_expenses_delete(state: &AppState, user: &str, id: &str) -> Result<()> {
    state.expenses.delete(user, id)?;
    audit(&state.db, user, "delete", "expense", Some(id), None);
    println!("🗑️  Deleted expense {}", id);
    Ok(())
}

pub async fn cmd_expenses_reclassify(state: &AppState, user: &str, id: &str) -> Result<()> {
    let before = state.expenses.get(user, id)?;
    let expense = state.expenses.reclassify(user, id).await?;
    audit(
        &state.db,
        user,
        "reclassify",
        "expense",
        Some(id),
        Some(&format!("{} -> {}", before.category, expense.category)),
    );

    if before.category == expense.category {
        println!("✓ Category unchanged: {}", expense.category.as_str());
    } else {
        println!(
            "✅ Reclassified: {} → {}",
            before.category.as_str(),
            expense.category.as_str()
        );
    }
    Ok(())
}

pub fn cmd_expenses_stats(
    state: &AppState,
    user: &str,
    from: Option<&str>,
    to: Option<&str>,
    org: Option<&str>,
) -> Result<()> {
    let (start, end) = parse_range(from, to)?;
    let stats = state.expenses.statistics(user, start, end, org)?;

    println!(
        "\n📊 Spending {} → {}",
        stats.period.start.format("%Y-%m-%d"),
        stats.period.end.format("%Y-%m-%d")
    );
    if let Some(org) = org {
        println!("   Organization: {}", org);
    }
    println!("{}", "─".repeat(50));

    if stats.by_category.is_empty() {
        println!("  No expenses in this period.");
        println!();
        return Ok(());
    }

    for spending in &stats.by_category {
        let bar_len = (spending.percentage / 5.0).round() as usize;
        println!(
            "  {:<6} {:>12} {:>5.1}% {:>4}건 {}",
            spending.category.as_str(),
            format_won(spending.total_amount),
            spending.percentage,
            spending.count,
            "█".repeat(bar_len)
        );
    }
    println!("{}", "─".repeat(50));
    println!(
        "  Total: {} across {} expense(s)",
        format_won(stats.total_amount),
        stats.total_count
    );
    println!();
    Ok(())
}

/// Export expenses as CSV to a file, or stdout when no path is given
pub fn cmd_expenses_export(
    state: &AppState,
    user: &str,
    filter: &ExpenseFilter<'_>,
    output: Option<&Path>,
) -> Result<()> {
    let query = filter.to_query(MAX_LIST_LIMIT)?;
    let csv = state.expenses.export_csv(user, &query)?;
    audit(&state.db, user, "export_expenses", "expense", None, None);

    match output {
        Some(path) => {
            std::fs::write(path, &csv)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            let rows = csv.lines().count().saturating_sub(1);
            println!("✅ Exported {} expense(s) to {}", rows, path.display());
        }
        None => print!("{}", csv),
    }
    Ok(())
}
