//! Retention and archive sweeps over stored receipts
//!
//! Sweeps walk every candidate receipt, collect per-receipt errors and keep
//! going. Expenses derived from a swept receipt are never touched.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeDelta, Utc};
use tracing::{debug, info, warn};

use crate::db::Database;
use crate::error::{Error, Result};
use crate::images::ImageStore;
use crate::models::{
    bytes_to_mb, ArchiveReport, CleanupReport, OcrStatus, Receipt, ReceiptsSummary, StorageStats,
};

/// Object storage price used for cost estimates
pub const STORAGE_COST_PER_GB_MONTH_USD: f64 = 0.026;

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Receipts older than this count as old in the summary
const SUMMARY_OLD_DAYS: i64 = 90;
const SUMMARY_RECENT_DAYS: i64 = 30;
const OLD_RECEIPTS_ALERT: i64 = 100;
const FAILED_RECEIPTS_ALERT: i64 = 50;

/// Retention sweeper over the receipt collection and image store
#[derive(Clone)]
pub struct RetentionSweeper {
    db: Database,
    images: Arc<dyn ImageStore>,
}

impl RetentionSweeper {
    pub fn new(db: Database, images: Arc<dyn ImageStore>) -> Self {
        Self { db, images }
    }

    /// Delete receipts (and their images) older than `days_to_keep`
    ///
    /// With `keep_successful_only` only failed receipts are removed. A dry run
    /// reports what would be removed without changing anything.
    pub fn cleanup_old_receipts(
        &self,
        days_to_keep: i64,
        keep_successful_only: bool,
        dry_run: bool,
    ) -> Result<CleanupReport> {
        let status = keep_successful_only.then_some(OcrStatus::Failed);
        self.sweep(days_to_keep, status, dry_run)
    }

    /// Delete failed receipts older than `days_old`
    pub fn cleanup_failed_receipts(&self, days_old: i64) -> Result<CleanupReport> {
        self.sweep(days_old, Some(OcrStatus::Failed), false)
    }

    fn sweep(&self, days: i64, status: Option<OcrStatus>, dry_run: bool) -> Result<CleanupReport> {
        let cutoff = cutoff_before(days)?;
        let candidates = self.db.receipts_created_before(&cutoff, status)?;
        debug!(
            "Retention sweep: {} candidates before {} (status {:?}, dry run {})",
            candidates.len(),
            cutoff,
            status.map(|s| s.as_str()),
            dry_run
        );

        let mut report = CleanupReport {
            deleted_count: 0,
            storage_freed_bytes: 0,
            storage_freed_mb: 0.0,
            errors: Vec::new(),
            dry_run,
            cutoff_date: cutoff,
        };

        for receipt in &candidates {
            let size = self.image_size(receipt, &mut report.errors);

            if dry_run {
                report.deleted_count += 1;
                report.storage_freed_bytes += size;
                continue;
            }

            if let Some(url) = receipt.image_url.as_deref() {
                if let Err(e) = self.images.delete(url) {
                    report
                        .errors
                        .push(format!("Failed to delete image of receipt {}: {}", receipt.id, e));
                    continue;
                }
            }

            match self.db.delete_receipt(&receipt.id) {
                Ok(_) => {
                    report.deleted_count += 1;
                    report.storage_freed_bytes += size;
                }
                Err(e) => report
                    .errors
                    .push(format!("Failed to delete receipt {}: {}", receipt.id, e)),
            }
        }

        report.storage_freed_mb = bytes_to_mb(report.storage_freed_bytes);
        info!(
            "Retention sweep{}: {} receipts, {} MB, {} errors",
            if dry_run { " (dry run)" } else { "" },
            report.deleted_count,
            report.storage_freed_mb,
            report.errors.len()
        );
        Ok(report)
    }

    fn image_size(&self, receipt: &Receipt, errors: &mut Vec<String>) -> u64 {
        let Some(url) = receipt.image_url.as_deref() else {
            return 0;
        };
        match self.images.size(url) {
            Ok(size) => size.unwrap_or(0),
            Err(e) => {
                errors.push(format!("Failed to size image of receipt {}: {}", receipt.id, e));
                0
            }
        }
    }

    /// Image storage usage and its estimated monthly cost
    pub fn storage_stats(&self) -> Result<StorageStats> {
        let entries = self.db.receipt_storage_entries()?;

        let mut failed = 0;
        let mut successful = 0;
        let mut bytes = 0u64;
        for (status, url) in &entries {
            match status {
                OcrStatus::Failed => failed += 1,
                OcrStatus::Completed => successful += 1,
                _ => {}
            }
            if let Some(url) = url.as_deref() {
                match self.images.size(url) {
                    Ok(size) => bytes += size.unwrap_or(0),
                    Err(e) => warn!("Skipping unreadable image {}: {}", url, e),
                }
            }
        }

        let cost = bytes as f64 / BYTES_PER_GB * STORAGE_COST_PER_GB_MONTH_USD;
        Ok(StorageStats {
            total_receipts: entries.len() as i64,
            failed_receipts: failed,
            successful_receipts: successful,
            total_storage_bytes: bytes,
            total_storage_mb: bytes_to_mb(bytes),
            estimated_monthly_cost_usd: (cost * 10_000.0).round() / 10_000.0,
        })
    }

    /// Move completed receipts older than `days_to_keep` into the archive
    ///
    /// Images stay where they are. A receipt whose copy already exists in the
    /// archive is only removed from the live collection.
    pub fn archive_old_receipts(&self, days_to_keep: i64) -> Result<ArchiveReport> {
        let cutoff = cutoff_before(days_to_keep)?;
        let candidates = self
            .db
            .receipts_created_before(&cutoff, Some(OcrStatus::Completed))?;

        let mut report = ArchiveReport {
            archived_count: 0,
            errors: Vec::new(),
            cutoff_date: cutoff,
        };

        for receipt in &candidates {
            match self.db.archive_receipt(receipt) {
                Ok(true) => {}
                Ok(false) => debug!("Receipt {} already archived", receipt.id),
                Err(e) => {
                    report
                        .errors
                        .push(format!("Failed to archive receipt {}: {}", receipt.id, e));
                    continue;
                }
            }

            match self.db.delete_receipt(&receipt.id) {
                Ok(_) => report.archived_count += 1,
                Err(e) => report.errors.push(format!(
                    "Archived receipt {} but failed to remove it: {}",
                    receipt.id, e
                )),
            }
        }

        info!(
            "Archive sweep: {} receipts archived, {} errors",
            report.archived_count,
            report.errors.len()
        );
        Ok(report)
    }

    /// Receipt counts for the admin overview
    pub fn receipts_summary(&self) -> Result<ReceiptsSummary> {
        let now = Utc::now();
        let recent_since = now - Duration::days(SUMMARY_RECENT_DAYS);
        let old_before = now - Duration::days(SUMMARY_OLD_DAYS);

        let total = self.db.count_receipts(None, None, None)?;
        let recent = self.db.count_receipts(None, Some(&recent_since), None)?;
        let failed = self.db.count_receipts(Some(OcrStatus::Failed), None, None)?;
        let old = self.db.count_receipts(None, None, Some(&old_before))?;

        let success_rate = if total > 0 {
            ((total - failed) as f64 / total as f64 * 10_000.0).round() / 100.0
        } else {
            0.0
        };

        Ok(ReceiptsSummary {
            total_receipts: total,
            recent_receipts_30days: recent,
            failed_receipts: failed,
            old_receipts_90days: old,
            success_rate,
            cleanup_recommended: old > OLD_RECEIPTS_ALERT || failed > FAILED_RECEIPTS_ALERT,
        })
    }
}

/// Cutoff `days` before now. Negative or out-of-range ages are rejected.
fn cutoff_before(days: i64) -> Result<DateTime<Utc>> {
    if days < 0 {
        return Err(Error::InvalidData(format!(
            "Age in days cannot be negative, got {}",
            days
        )));
    }
    TimeDelta::try_days(days)
        .and_then(|age| Utc::now().checked_sub_signed(age))
        .ok_or_else(|| Error::InvalidData(format!("Age in days out of range: {}", days)))
}
