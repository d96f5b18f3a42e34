//! Spendwise CLI - Receipts to categorized expenses and budgets
//!
//! Usage:
//!   spendwise init                       Initialize database
//!   spendwise receipts upload IMAGE      OCR a receipt and record its expenses
//!   spendwise expenses stats             Spending per category this month
//!   spendwise serve --port 3000          Start web server

mod cli;
mod commands;

#[cfg(test)]
mod tests;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;
use commands::{ExpenseArgs, ExpenseChanges, ExpenseFilter};

impl ExpenseFilterArgs {
    fn as_filter(&self) -> ExpenseFilter<'_> {
        ExpenseFilter {
            category: self.category.as_deref(),
            from: self.from.as_deref(),
            to: self.to.as_deref(),
            org: self.org.as_deref(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let user = cli.user.as_str();

    match cli.command {
        Commands::Init => commands::cmd_init(&cli.db, cli.no_encrypt),
        Commands::Users { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                None | Some(UsersAction::List) => commands::cmd_users_list(&db),
                Some(UsersAction::Add {
                    id,
                    email,
                    name,
                    org,
                }) => commands::cmd_users_add(
                    &db,
                    &id,
                    email.as_deref(),
                    name.as_deref(),
                    org.as_deref(),
                ),
                Some(UsersAction::Org { id, organization }) => {
                    commands::cmd_users_org(&db, &id, organization.as_deref())
                }
            }
        }
        Commands::Expenses { action } => {
            let state = commands::open_app(&cli.db, cli.no_encrypt)?;
            match action {
                None => commands::cmd_expenses_list(&state, user, &ExpenseFilter::default(), 20),
                Some(ExpensesAction::Add {
                    store,
                    amount,
                    date,
                    category,
                    item,
                    description,
                    budget,
                }) => {
                    let args = ExpenseArgs {
                        store: &store,
                        amount,
                        date: date.as_deref(),
                        category: category.as_deref(),
                        item: item.as_deref(),
                        description: description.as_deref(),
                        budget: budget.as_deref(),
                    };
                    commands::cmd_expenses_add(&state, user, args).await
                }
                Some(ExpensesAction::List { filter, limit }) => {
                    commands::cmd_expenses_list(&state, user, &filter.as_filter(), limit)
                }
                Some(ExpensesAction::Show { id }) => commands::cmd_expenses_show(&state, user, &id),
                Some(ExpensesAction::Update {
                    id,
                    category,
                    amount,
                    date,
                    store,
                    item,
                    description,
                    budget,
                }) => {
                    let changes = ExpenseChanges {
                        category: category.as_deref(),
                        amount,
                        date: date.as_deref(),
                        store: store.as_deref(),
                        item: item.as_deref(),
                        description: description.as_deref(),
                        budget: budget.as_deref(),
                    };
                    commands::cmd_expenses_update(&state, user, &id, changes)
                }
                Some(ExpensesAction::Delete { id }) => {
                    commands::cmd_expenses_delete(&state, user, &id)
                }
                Some(ExpensesAction::Stats { from, to, org }) => commands::cmd_expenses_stats(
                    &state,
                    user,
                    from.as_deref(),
                    to.as_deref(),
                    org.as_deref(),
                ),
                Some(ExpensesAction::Reclassify { id }) => {
                    commands::cmd_expenses_reclassify(&state, user, &id).await
                }
                Some(ExpensesAction::Export { filter, output }) => commands::cmd_expenses_export(
                    &state,
                    user,
                    &filter.as_filter(),
                    output.as_deref(),
                ),
            }
        }
        Commands::Classify {
            store,
            item,
            amount,
        } => {
            let settings = spendwise_core::SpendwiseConfig::load(None)?;
            let classifier = settings.build_classifier()?;
            commands::cmd_classify(&classifier, &store, item.as_deref(), amount).await
        }
        Commands::Budgets { action } => {
            let state = commands::open_app(&cli.db, cli.no_encrypt)?;
            match action {
                None | Some(BudgetsAction::List) => commands::cmd_budgets_list(&state, user),
                Some(BudgetsAction::Add {
                    name,
                    amount,
                    category,
                    org,
                }) => commands::cmd_budgets_add(
                    &state,
                    user,
                    &name,
                    amount,
                    category.as_deref(),
                    org.as_deref(),
                ),
                Some(BudgetsAction::Show { id }) => commands::cmd_budgets_show(&state, user, &id),
                Some(BudgetsAction::Delete { id }) => {
                    commands::cmd_budgets_delete(&state, user, &id)
                }
                Some(BudgetsAction::Migrate) => commands::cmd_budgets_migrate(&state, user),
            }
        }
        Commands::Receipts { action } => {
            let state = commands::open_app(&cli.db, cli.no_encrypt)?;
            match action {
                None => commands::cmd_receipts_list(&state, user, None, None, 20),
                Some(ReceiptsAction::Upload { file }) => {
                    commands::cmd_receipts_upload(&state, user, &file).await
                }
                Some(ReceiptsAction::Ocr { file, json }) => {
                    commands::cmd_receipts_ocr(&state, &file, json).await
                }
                Some(ReceiptsAction::List { from, to, limit }) => commands::cmd_receipts_list(
                    &state,
                    user,
                    from.as_deref(),
                    to.as_deref(),
                    limit,
                ),
                Some(ReceiptsAction::Show { id }) => {
                    commands::cmd_receipts_show(&state, user, &id)
                }
                Some(ReceiptsAction::Delete { id, with_expenses }) => {
                    commands::cmd_receipts_delete(&state, user, &id, with_expenses)
                }
            }
        }
        Commands::Share { action } => {
            let state = commands::open_app(&cli.db, cli.no_encrypt)?;
            match action {
                None | Some(ShareAction::List) => commands::cmd_share_list(&state, user),
                Some(ShareAction::Create { days }) => {
                    commands::cmd_share_create(&state, user, days)
                }
                Some(ShareAction::Revoke { token }) => {
                    commands::cmd_share_revoke(&state, user, &token)
                }
            }
        }
        Commands::Admin { action } => {
            let state = commands::open_app(&cli.db, cli.no_encrypt)?;
            match action {
                AdminAction::Cleanup {
                    days,
                    include_successful,
                    dry_run,
                } => commands::cmd_admin_cleanup(&state, user, days, include_successful, dry_run),
                AdminAction::CleanupFailed { days } => {
                    commands::cmd_admin_cleanup_failed(&state, user, days)
                }
                AdminAction::Stats => commands::cmd_admin_stats(&state),
                AdminAction::Archive { days } => commands::cmd_admin_archive(&state, user, days),
                AdminAction::Summary => commands::cmd_admin_summary(&state),
            }
        }
        Commands::Serve {
            port,
            host,
            no_auth,
        } => commands::cmd_serve(&cli.db, &host, port, no_auth, cli.no_encrypt).await,
    }
}
