//! Background task scheduler for receipt cleanup
//!
//! Provides optional scheduled retention sweeps that can be enabled via
//! environment variables:
//!
//! - `SPENDWISE_CLEANUP_SCHEDULE`: Interval in hours between runs (e.g. "24" for daily)
//!
//! Every run removes old failed receipts and reports storage usage. Every
//! seventh run also removes old receipts according to the retention policy.

use std::time::Duration;

use tokio::time::interval;
use tracing::{error, info, warn};

use spendwise_core::models::{CleanupReport, StorageStats};
use spendwise_core::{Database, RetentionConfig, RetentionSweeper};

/// Receipt count above which each run logs a storage warning
pub const STORAGE_ALERT_RECEIPTS: i64 = 1000;

/// Configuration for scheduled cleanup
#[derive(Debug, Clone)]
pub struct CleanupScheduleConfig {
    /// Interval between runs in hours
    pub interval_hours: u64,
    /// Age in days after which failed receipts are removed each run
    pub failed_days: i64,
    /// Age in days for the periodic retention sweep
    pub days_to_keep: i64,
    pub keep_successful_only: bool,
    /// The retention sweep runs on every n-th run
    pub retention_every: u64,
}

impl CleanupScheduleConfig {
    /// Parse configuration from environment variables
    ///
    /// Returns None if scheduling is not configured (SPENDWISE_CLEANUP_SCHEDULE not set)
    pub fn from_env(retention: &RetentionConfig) -> Option<Self> {
        let interval_hours: u64 = std::env::var("SPENDWISE_CLEANUP_SCHEDULE")
            .ok()
            .and_then(|s| s.parse().ok())?;

        if interval_hours == 0 {
            warn!("SPENDWISE_CLEANUP_SCHEDULE is 0, automatic cleanup disabled");
            return None;
        }

        Some(Self::new(interval_hours, retention))
    }

    pub fn new(interval_hours: u64, retention: &RetentionConfig) -> Self {
        Self {
            interval_hours,
            failed_days: retention.failed_days,
            days_to_keep: retention.days_to_keep,
            keep_successful_only: retention.keep_successful_only,
            retention_every: 7,
        }
    }
}

/// What one scheduled run did
#[derive(Debug, Clone)]
pub struct CleanupCycle {
    pub failed: CleanupReport,
    /// Present on the runs that include the retention sweep
    pub retention: Option<CleanupReport>,
    pub stats: StorageStats,
}

/// Start the cleanup scheduler as a background task
///
/// This function spawns a tokio task that runs indefinitely, sweeping at the
/// configured interval.
pub fn start_cleanup_scheduler(db: Database, sweeper: RetentionSweeper, config: CleanupScheduleConfig) {
    info!(
        "Starting cleanup scheduler: every {} hours, retention sweep every {} runs",
        config.interval_hours, config.retention_every
    );

    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(config.interval_hours * 3600));

        // Skip the first immediate tick - don't sweep on startup
        ticker.tick().await;

        let mut run: u64 = 0;
        loop {
            ticker.tick().await;
            run += 1;

            info!("Running scheduled cleanup (run {})...", run);

            match run_cleanup_cycle(&db, &sweeper, &config, run) {
                Ok(cycle) => {
                    info!(
                        "Scheduled cleanup completed: {} failed receipt(s) removed, {} receipt(s) stored ({} MB)",
                        cycle.failed.deleted_count,
                        cycle.stats.total_receipts,
                        cycle.stats.total_storage_mb
                    );
                }
                Err(e) => {
                    error!("Scheduled cleanup failed: {}", e);
                }
            }
        }
    });
}

/// Run a single scheduled cleanup
///
/// `run` counts from 1; the retention sweep runs when it is a multiple of
/// `retention_every`.
pub fn run_cleanup_cycle(
    db: &Database,
    sweeper: &RetentionSweeper,
    config: &CleanupScheduleConfig,
    run: u64,
) -> Result<CleanupCycle, String> {
    let failed = sweeper
        .cleanup_failed_receipts(config.failed_days)
        .map_err(|e| format!("Failed receipt sweep failed: {}", e))?;
    for err in &failed.errors {
        warn!("Failed receipt sweep: {}", err);
    }

    let retention = if config.retention_every > 0 && run % config.retention_every == 0 {
        let report = sweeper
            .cleanup_old_receipts(config.days_to_keep, config.keep_successful_only, false)
            .map_err(|e| format!("Retention sweep failed: {}", e))?;
        info!(
            "Retention sweep removed {} receipt(s), freed {} MB",
            report.deleted_count, report.storage_freed_mb
        );
        Some(report)
    } else {
        None
    };

    let stats = sweeper
        .storage_stats()
        .map_err(|e| format!("Failed to read storage stats: {}", e))?;
    if stats.total_receipts > STORAGE_ALERT_RECEIPTS {
        warn!(
            "⚠️  {} receipts stored ({} MB, ~${}/month) - consider a retention sweep",
            stats.total_receipts, stats.total_storage_mb, stats.estimated_monthly_cost_usd
        );
    }

    // Log to audit (as "scheduler" user)
    let deleted = failed.deleted_count + retention.as_ref().map_or(0, |r| r.deleted_count);
    if let Err(e) = db.log_audit(
        "scheduler",
        "cleanup_scheduled",
        Some("receipt"),
        None,
        Some(&format!("run={}, deleted={}", run, deleted)),
    ) {
        warn!("Failed to log scheduled cleanup to audit: {}", e);
    }

    Ok(CleanupCycle {
        failed,
        retention,
        stats,
    })
}
