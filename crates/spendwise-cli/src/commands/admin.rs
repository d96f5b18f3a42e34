//! Retention and storage commands

use anyhow::Result;
use spendwise_core::models::CleanupReport;
use spendwise_server::AppState;

use super::audit;

fn print_cleanup(report: &CleanupReport, what: &str) {
    let verb = if report.dry_run { "Would delete" } else { "Deleted" };
    println!(
        "{} {} {} {} created before {} ({} MB)",
        if report.dry_run { "🔍" } else { "🧹" },
        verb,
        report.deleted_count,
        what,
        report.cutoff_date.format("%Y-%m-%d"),
        report.storage_freed_mb
    );
    for error in &report.errors {
        println!("   ⚠️  {}", error);
    }
}

/// Delete receipts older than `days` (config default when None)
pub fn cmd_admin_cleanup(
    state: &AppState,
    user: &str,
    days: Option<i64>,
    include_successful: bool,
    dry_run: bool,
) -> Result<()> {
    let days = days.unwrap_or(state.retention.days_to_keep);
    let keep_successful_only = !include_successful && state.retention.keep_successful_only;

    let report = state
        .sweeper
        .cleanup_old_receipts(days, keep_successful_only, dry_run)?;
    if !dry_run {
        audit(
            &state.db,
            user,
            "cleanup_receipts",
            "receipt",
            None,
            Some(&format!("days={}, deleted={}", days, report.deleted_count)),
        );
    }

    let what = if keep_successful_only {
        "failed receipt(s)"
    } else {
        "receipt(s)"
    };
    print_cleanup(&report, what);
    Ok(())
}

pub fn cmd_admin_cleanup_failed(state: &AppState, user: &str, days: Option<i64>) -> Result<()> {
    let days = days.unwrap_or(state.retention.failed_days);
    let report = state.sweeper.cleanup_failed_receipts(days)?;
    audit(
        &state.db,
        user,
        "cleanup_failed_receipts",
        "receipt",
        None,
        Some(&format!("days={}, deleted={}", days, report.deleted_count)),
    );

    print_cleanup(&report, "failed receipt(s)");
    Ok(())
}

pub fn cmd_admin_stats(state: &AppState) -> Result<()> {
    let stats = state.sweeper.storage_stats()?;

    println!("\n💾 Receipt Storage");
    println!("{}", "─".repeat(40));
    println!("  Receipts:      {}", stats.total_receipts);
    println!("    completed:   {}", stats.successful_receipts);
    println!("    failed:      {}", stats.failed_receipts);
    println!("  Image storage: {} MB", stats.total_storage_mb);
    println!("  Est. cost:     ${}/month", stats.estimated_monthly_cost_usd);
    println!();
    Ok(())
}

pub fn cmd_admin_archive(state: &AppState, user: &str, days: Option<i64>) -> Result<()> {
    let days = days.unwrap_or(state.retention.archive_days);
    let report = state.sweeper.archive_old_receipts(days)?;
    audit(
        &state.db,
        user,
        "archive_receipts",
        "receipt",
        None,
        Some(&format!("days={}, archived={}", days, report.archived_count)),
    );

    println!(
        "📦 Archived {} receipt(s) created before {}",
        report.archived_count,
        report.cutoff_date.format("%Y-%m-%d")
    );
    for error in &report.errors {
        println!("   ⚠️  {}", error);
    }
    Ok(())
}

pub fn cmd_admin_summary(state: &AppState) -> Result<()> {
    let summary = state.sweeper.receipts_summary()?;

    println!("\n📋 Receipts Summary");
    println!("{}", "─".repeat(40));
    println!("  Total:              {}", summary.total_receipts);
    println!("  Last 30 days:       {}", summary.recent_receipts_30days);
    println!("  Failed:             {}", summary.failed_receipts);
    println!("  Older than 90 days: {}", summary.old_receipts_90days);
    println!("  Success rate:       {:.1}%", summary.success_rate);
    if summary.cleanup_recommended {
        println!("\n  💡 Cleanup recommended: spendwise admin cleanup --dry-run");
    }
    println!();
    Ok(())
}
