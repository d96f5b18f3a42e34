//! Budget commands

use anyhow::{anyhow, Result};
use spendwise_core::models::{BudgetCategory, BudgetWithUsage, NewBudget};
use spendwise_server::AppState;

use super::{audit, format_won, truncate};

fn print_budget_row(b: &BudgetWithUsage) {
    let marker = if b.remaining < 0.0 { "🔴" } else { "🟢" };
    println!(
        "  {} {:<20} {:<6} {:>12} / {:>12}  {} {}",
        marker,
        truncate(&b.budget.name, 20),
        b.budget.category.as_str(),
        format_won(b.spent),
        format_won(b.budget.amount),
        b.budget.organization_name.as_deref().unwrap_or("personal"),
        &b.budget.id[..8.min(b.budget.id.len())]
    );
}

pub fn cmd_budgets_add(
    state: &AppState,
    user: &str,
    name: &str,
    amount: f64,
    category: Option<&str>,
    org: Option<&str>,
) -> Result<()> {
    let category = match category {
        Some(c) => c.parse::<BudgetCategory>().map_err(|e| anyhow!(e))?,
        None => BudgetCategory::All,
    };

    let budget = state.budgets.create(
        user,
        NewBudget {
            name: name.to_string(),
            amount,
            category,
            organization_name: org.map(String::from),
        },
    )?;
    audit(
        &state.db,
        user,
        "create",
        "budget",
        Some(&budget.budget.id),
        Some(&format!("{} {}", budget.budget.name, budget.budget.amount)),
    );

    println!(
        "✅ Created budget '{}' ({}) for {}",
        budget.budget.name,
        format_won(budget.budget.amount),
        budget.budget.category.as_str()
    );
    println!("   ID: {}", budget.budget.id);
    Ok(())
}

pub fn cmd_budgets_list(state: &AppState, user: &str) -> Result<()> {
    let budgets = state.budgets.list(user)?;
    if budgets.is_empty() {
        println!("No budgets. Create one with: spendwise budgets add <name> <amount>");
        return Ok(());
    }

    println!("\n💰 Budgets ({})", budgets.len());
    println!("{}", "─".repeat(80));
    for budget in &budgets {
        print_budget_row(budget);
    }
    println!();
    Ok(())
}

pub fn cmd_budgets_show(state: &AppState, user: &str, id: &str) -> Result<()> {
    let b = state.budgets.get(user, id)?;

    println!("\n💰 {}", b.budget.name);
    println!("{}", "─".repeat(50));
    println!("  ID:         {}", b.budget.id);
    println!("  Category:   {}", b.budget.category.as_str());
    println!("  Amount:     {}", format_won(b.budget.amount));
    println!("  Spent:      {}", format_won(b.spent));
    println!("  Remaining:  {}", format_won(b.remaining));
    match &b.budget.organization_name {
        Some(org) => println!("  Shared:     {}", org),
        None => println!("  Shared:     no (personal)"),
    }
    if b.budget.amount > 0.0 {
        println!("  Used:       {:.1}%", b.spent / b.budget.amount * 100.0);
    }
    println!();
    Ok(())
}

pub fn cmd_budgets_delete(state: &AppState, user: &str, id: &str) -> Result<()> {
    state.budgets.delete(user, id)?;
    audit(&state.db, user, "delete", "budget", Some(id), None);
    println!("🗑️  Deleted budget {}", id);
    Ok(())
}

/// Share every personal budget with the caller's organization
pub fn cmd_budgets_migrate(state: &AppState, user: &str) -> Result<()> {
    let migrated = state.budgets.migrate_to_organization(user)?;
    audit(
        &state.db,
        user,
        "migrate_organization",
        "budget",
        None,
        Some(&format!("migrated={}", migrated)),
    );

    if migrated == 0 {
        println!("No personal budgets to share.");
    } else {
        println!("✅ Shared {} budget(s) with your organization", migrated);
    }
    Ok(())
}
