//! Receipt operations, including the archive namespace

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, OptionalExtension};

use super::{format_datetime, format_naive, new_id, parse_datetime, parse_naive, Database};
use crate::error::Result;
use crate::models::*;

const RECEIPT_COLUMNS: &str = "id, user_id, store_name, store_address, store_phone_number,
     total_amount, purchase_date, items, image_url, ocr_status, ocr_raw_data, content_hash,
     created_at, updated_at, ocr_processed_at";

impl Database {
    /// Create a receipt and return its id
    pub fn create_receipt(&self, receipt: &NewReceipt) -> Result<String> {
        let conn = self.conn()?;
        let id = new_id();
        let purchase_date = receipt
            .purchase_date
            .unwrap_or_else(|| Utc::now().naive_utc());
        let items = serde_json::to_string(&receipt.items)?;
        let raw = receipt
            .ocr_raw_data
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        conn.execute(
            r#"
            INSERT INTO receipts (id, user_id, store_name, store_address, store_phone_number,
                total_amount, purchase_date, items, image_url, ocr_status, ocr_raw_data,
                content_hash, ocr_processed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                id,
                receipt.user_id,
                receipt.store_name,
                receipt.store_address,
                receipt.store_phone_number,
                receipt.total_amount,
                format_naive(&purchase_date),
                items,
                receipt.image_url,
                receipt.ocr_status.as_str(),
                raw,
                receipt.content_hash,
                receipt.ocr_processed_at.as_ref().map(format_datetime),
            ],
        )?;

        Ok(id)
    }

    /// Get receipt by ID
    pub fn get_receipt(&self, id: &str) -> Result<Option<Receipt>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM receipts WHERE id = ?", RECEIPT_COLUMNS);
        let receipt = conn
            .query_row(&sql, params![id], Self::row_to_receipt)
            .optional()?;
        Ok(receipt)
    }

    /// Most recent receipt of a user with the given content hash
    pub fn find_receipt_by_hash(&self, user_id: &str, content_hash: &str) -> Result<Option<Receipt>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM receipts WHERE user_id = ? AND content_hash = ?
             ORDER BY created_at DESC LIMIT 1",
            RECEIPT_COLUMNS
        );
        let receipt = conn
            .query_row(&sql, params![user_id, content_hash], Self::row_to_receipt)
            .optional()?;
        Ok(receipt)
    }

    /// List a user's receipts by purchase date, newest first
    pub fn list_receipts(
        &self,
        user_id: &str,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
        limit: i64,
    ) -> Result<Vec<Receipt>> {
        let conn = self.conn()?;
        let sql = format!(
            r#"
            SELECT {} FROM receipts
            WHERE user_id = ?1
              AND (?2 IS NULL OR purchase_date >= ?2)
              AND (?3 IS NULL OR purchase_date <= ?3)
            ORDER BY purchase_date DESC, created_at DESC
            LIMIT ?4
            "#,
            RECEIPT_COLUMNS
        );

        let mut stmt = conn.prepare(&sql)?;
        let receipts = stmt
            .query_map(
                params![
                    user_id,
                    start.as_ref().map(format_naive),
                    end.as_ref().map(format_naive),
                    limit
                ],
                Self::row_to_receipt,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(receipts)
    }

    /// Receipts created before the cutoff, optionally restricted to one status
    pub fn receipts_created_before(
        &self,
        cutoff: &DateTime<Utc>,
        status: Option<OcrStatus>,
    ) -> Result<Vec<Receipt>> {
        let conn = self.conn()?;
        let sql = format!(
            r#"
            SELECT {} FROM receipts
            WHERE created_at < ?1 AND (?2 IS NULL OR ocr_status = ?2)
            ORDER BY created_at
            "#,
            RECEIPT_COLUMNS
        );

        let mut stmt = conn.prepare(&sql)?;
        let receipts = stmt
            .query_map(
                params![format_datetime(cutoff), status.map(|s| s.as_str())],
                Self::row_to_receipt,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(receipts)
    }

    /// Every receipt's status and image url (for storage accounting)
    pub fn receipt_storage_entries(&self) -> Result<Vec<(OcrStatus, Option<String>)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT ocr_status, image_url FROM receipts")?;
        let entries = stmt
            .query_map([], |row| {
                let status: String = row.get(0)?;
                Ok((status.parse().unwrap_or_default(), row.get(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Count receipts by optional status and creation window
    pub fn count_receipts(
        &self,
        status: Option<OcrStatus>,
        created_after: Option<&DateTime<Utc>>,
        created_before: Option<&DateTime<Utc>>,
    ) -> Result<i64> {
        let conn = self.conn()?;
        let count = conn.query_row(
            r#"
            SELECT COUNT(*) FROM receipts
            WHERE (?1 IS NULL OR ocr_status = ?1)
              AND (?2 IS NULL OR created_at >= ?2)
              AND (?3 IS NULL OR created_at < ?3)
            "#,
            params![
                status.map(|s| s.as_str()),
                created_after.map(format_datetime),
                created_before.map(format_datetime),
            ],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Record the outcome of OCR processing
    pub fn update_receipt_status(
        &self,
        id: &str,
        status: OcrStatus,
        ocr_raw_data: Option<&serde_json::Value>,
    ) -> Result<bool> {
        let conn = self.conn()?;
        let raw = ocr_raw_data.map(serde_json::to_string).transpose()?;
        let processed = matches!(status, OcrStatus::Completed | OcrStatus::Failed);

        let updated = conn.execute(
            r#"
            UPDATE receipts SET
                ocr_status = ?1,
                ocr_raw_data = COALESCE(?2, ocr_raw_data),
                ocr_processed_at = CASE WHEN ?3 THEN CURRENT_TIMESTAMP ELSE ocr_processed_at END,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = ?4
            "#,
            params![status.as_str(), raw, processed, id],
        )?;
        Ok(updated > 0)
    }

    /// Delete a receipt. Returns false if it didn't exist.
    pub fn delete_receipt(&self, id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM receipts WHERE id = ?", params![id])?;
        Ok(deleted > 0)
    }

    /// Copy a receipt into the archive namespace.
    ///
    /// Returns false when the original is already archived.
    pub fn archive_receipt(&self, receipt: &Receipt) -> Result<bool> {
        let conn = self.conn()?;
        let items = serde_json::to_string(&receipt.items)?;
        let raw = receipt
            .ocr_raw_data
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let inserted = conn.execute(
            r#"
            INSERT OR IGNORE INTO receipts_archive (id, original_id, user_id, store_name,
                store_address, store_phone_number, total_amount, purchase_date, items, image_url,
                ocr_status, ocr_raw_data, content_hash, created_at, updated_at, ocr_processed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                new_id(),
                receipt.id,
                receipt.user_id,
                receipt.store_name,
                receipt.store_address,
                receipt.store_phone_number,
                receipt.total_amount,
                format_naive(&receipt.purchase_date),
                items,
                receipt.image_url,
                receipt.ocr_status.as_str(),
                raw,
                receipt.content_hash,
                format_datetime(&receipt.created_at),
                format_datetime(&receipt.updated_at),
                receipt.ocr_processed_at.as_ref().map(format_datetime),
            ],
        )?;

        Ok(inserted > 0)
    }

    /// Get the archived copy of a receipt by its original id
    pub fn get_archived_receipt(&self, original_id: &str) -> Result<Option<ArchivedReceipt>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {}, original_id, archived_at, id AS archive_id FROM receipts_archive WHERE original_id = ?",
            RECEIPT_COLUMNS
        );
        let archived = conn
            .query_row(&sql, params![original_id], |row| {
                let mut receipt = Self::row_to_receipt(row)?;
                let original_id: String = row.get(15)?;
                let archived_at: String = row.get(16)?;
                let archive_id: String = row.get(17)?;
                receipt.id = original_id.clone();
                Ok(ArchivedReceipt {
                    id: archive_id,
                    original_id,
                    archived_at: parse_datetime(&archived_at),
                    receipt,
                })
            })
            .optional()?;
        Ok(archived)
    }

    /// Number of archived receipts
    pub fn count_archived_receipts(&self) -> Result<i64> {
        let conn = self.conn()?;
        let count = conn.query_row("SELECT COUNT(*) FROM receipts_archive", [], |row| row.get(0))?;
        Ok(count)
    }

    fn row_to_receipt(row: &rusqlite::Row) -> rusqlite::Result<Receipt> {
        let purchase_date: String = row.get(6)?;
        let items_json: String = row.get(7)?;
        let status_str: String = row.get(9)?;
        let raw_json: Option<String> = row.get(10)?;
        let created_at: Option<String> = row.get(12)?;
        let updated_at: Option<String> = row.get(13)?;
        let processed_at: Option<String> = row.get(14)?;

        let created_at = created_at
            .as_deref()
            .map(parse_datetime)
            .unwrap_or_else(Utc::now);

        Ok(Receipt {
            id: row.get(0)?,
            user_id: row.get(1)?,
            store_name: row.get(2)?,
            store_address: row.get(3)?,
            store_phone_number: row.get(4)?,
            total_amount: row.get(5)?,
            purchase_date: parse_naive(&purchase_date),
            items: serde_json::from_str(&items_json).unwrap_or_default(),
            image_url: row.get(8)?,
            ocr_status: status_str.parse().unwrap_or_default(),
            ocr_raw_data: raw_json.and_then(|s| serde_json::from_str(&s).ok()),
            content_hash: row.get(11)?,
            created_at,
            updated_at: updated_at.as_deref().map(parse_datetime).unwrap_or(created_at),
            ocr_processed_at: processed_at.as_deref().map(parse_datetime),
        })
    }
}
