//! Receipt lifecycle
//!
//! An upload goes through OCR, the image store and the expense aggregator:
//!
//! 1. OCR the image (bounded by the configured timeout)
//! 2. On failure, keep a `failed` receipt holding `{"error": ...}` and stop
//! 3. Store the image and persist the receipt as `processing`
//! 4. Derive expenses (one for the total, or one per priced line item)
//! 5. Mark the receipt `completed`, or `failed` when nothing could be derived

use std::sync::Arc;

use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::classify::Classification;
use crate::config::ReceiptConfig;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::expenses::ExpenseAggregator;
use crate::extract::{ExtractedReceipt, UNKNOWN_STORE};
use crate::images::{image_name, ImageStore};
use crate::models::{
    Expense, NewExpense, NewReceipt, OcrStatus, Receipt, ReceiptGranularity,
};
use crate::ocr::{OcrClient, OcrProvider};

/// Largest page of receipts a list call may request
pub const MAX_RECEIPT_LIST_LIMIT: i64 = 1000;

/// Receipt together with the expenses derived from it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedReceipt {
    pub receipt: Receipt,
    pub expenses: Vec<Expense>,
}

/// OCR result and suggested category, without persisting anything
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrPreview {
    pub extracted: ExtractedReceipt,
    pub suggestion: Classification,
}

/// What a receipt deletion removed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiptDeletion {
    pub receipt_id: String,
    pub expenses_deleted: usize,
    pub image_deleted: bool,
}

/// Receipt lifecycle manager
#[derive(Clone)]
pub struct ReceiptProcessor {
    db: Database,
    ocr: OcrClient,
    images: Arc<dyn ImageStore>,
    expenses: ExpenseAggregator,
    config: ReceiptConfig,
}

impl ReceiptProcessor {
    pub fn new(
        db: Database,
        ocr: OcrClient,
        images: Arc<dyn ImageStore>,
        expenses: ExpenseAggregator,
        config: ReceiptConfig,
    ) -> Self {
        Self {
            db,
            ocr,
            images,
            expenses,
            config,
        }
    }

    pub fn config(&self) -> &ReceiptConfig {
        &self.config
    }

    /// OCR an uploaded image and turn it into a receipt with expenses
    pub async fn upload_and_process(
        &self,
        user_id: &str,
        image: &[u8],
        file_name: Option<&str>,
    ) -> Result<ProcessedReceipt> {
        if image.is_empty() {
            return Err(Error::InvalidData("Receipt image is empty".into()));
        }

        let content_hash = hex::encode(Sha256::digest(image));
        if let Some(previous) = self.db.find_receipt_by_hash(user_id, &content_hash)? {
            warn!(
                "User {} re-uploaded an image already seen as receipt {} ({})",
                user_id,
                previous.id,
                previous.ocr_status.as_str()
            );
        }

        let (data, raw_response) = match self.run_ocr(image).await {
            Ok(result) => result,
            Err(message) => {
                let receipt_id = self.db.create_receipt(&NewReceipt {
                    user_id: user_id.to_string(),
                    store_name: UNKNOWN_STORE.to_string(),
                    ocr_status: OcrStatus::Failed,
                    ocr_raw_data: Some(json!({ "error": message })),
                    content_hash: Some(content_hash),
                    ocr_processed_at: Some(Utc::now()),
                    ..Default::default()
                })?;
                warn!("OCR failed for receipt {}: {}", receipt_id, message);
                return Err(Error::Ocr(message));
            }
        };

        let image_url = self
            .images
            .upload(image, &image_name(user_id, file_name))
            .map_err(|e| Error::operation("receipt upload", e))?;

        let created = self.db.create_receipt(&NewReceipt {
            user_id: user_id.to_string(),
            store_name: data.store_name.clone(),
            store_address: data.store_address.clone(),
            store_phone_number: data.store_phone_number.clone(),
            total_amount: data.total_amount,
            purchase_date: Some(data.date),
            items: data.items.clone(),
            image_url: Some(image_url.clone()),
            ocr_status: OcrStatus::Processing,
            ocr_raw_data: Some(raw_response),
            content_hash: Some(content_hash),
            ocr_processed_at: None,
        });
        let receipt_id = match created {
            Ok(id) => id,
            Err(e) => {
                if let Err(cleanup) = self.images.delete(&image_url) {
                    warn!("Failed to remove orphaned image {}: {}", image_url, cleanup);
                }
                return Err(Error::operation("receipt upload", e));
            }
        };
        info!(
            "Receipt {} processing: '{}' total {}",
            receipt_id, data.store_name, data.total_amount
        );

        let drafts = expense_drafts(&receipt_id, &data, self.config.granularity);
        if drafts.is_empty() {
            let reason = "영수증에서 금액을 찾을 수 없습니다";
            self.db.update_receipt_status(
                &receipt_id,
                OcrStatus::Failed,
                Some(&json!({ "error": reason })),
            )?;
            warn!("Receipt {} failed: no amount extracted", receipt_id);
            return Ok(ProcessedReceipt {
                receipt: self.load(&receipt_id)?,
                expenses: Vec::new(),
            });
        }

        let mut expenses = Vec::with_capacity(drafts.len());
        for draft in drafts {
            match self.expenses.create(user_id, draft).await {
                Ok(expense) => expenses.push(expense),
                Err(e) => {
                    let removed = self.db.delete_expenses_for_receipt(&receipt_id)?;
                    self.db.update_receipt_status(
                        &receipt_id,
                        OcrStatus::Failed,
                        Some(&json!({ "error": e.to_string() })),
                    )?;
                    warn!(
                        "Receipt {} failed while deriving expenses ({} rolled back): {}",
                        receipt_id, removed, e
                    );
                    return Err(e);
                }
            }
        }

        self.db
            .update_receipt_status(&receipt_id, OcrStatus::Completed, None)?;
        info!(
            "Receipt {} completed with {} expense(s)",
            receipt_id,
            expenses.len()
        );

        Ok(ProcessedReceipt {
            receipt: self.load(&receipt_id)?,
            expenses,
        })
    }

    /// OCR an image and suggest a category without storing anything
    pub async fn ocr_only(&self, image: &[u8]) -> Result<OcrPreview> {
        if image.is_empty() {
            return Err(Error::InvalidData("Receipt image is empty".into()));
        }

        let (extracted, _) = self.run_ocr(image).await.map_err(Error::Ocr)?;
        let hint = extracted.most_expensive_item().map(|item| item.name.clone());
        let suggestion = self
            .expenses
            .classifier()
            .classify(
                &extracted.store_name,
                hint.as_deref(),
                Some(extracted.total_amount),
            )
            .await;

        Ok(OcrPreview {
            extracted,
            suggestion,
        })
    }

    /// A user's receipts by purchase date, newest first
    pub fn list(
        &self,
        user_id: &str,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
        limit: i64,
    ) -> Result<Vec<Receipt>> {
        if !(1..=MAX_RECEIPT_LIST_LIMIT).contains(&limit) {
            return Err(Error::InvalidData(format!(
                "limit must be between 1 and {}",
                MAX_RECEIPT_LIST_LIMIT
            )));
        }
        self.db.list_receipts(user_id, start, end, limit)
    }

    pub fn get_with_expenses(&self, user_id: &str, id: &str) -> Result<ProcessedReceipt> {
        let receipt = self.owned(user_id, id)?;
        let expenses = self.expenses.by_receipt(user_id, id)?;
        Ok(ProcessedReceipt { receipt, expenses })
    }

    /// Delete a receipt and its stored image, and optionally its expenses
    pub fn delete(&self, user_id: &str, id: &str, delete_expenses: bool) -> Result<ReceiptDeletion> {
        let receipt = self.owned(user_id, id)?;

        let expenses_deleted = if delete_expenses {
            self.db
                .delete_expenses_for_receipt(id)
                .map_err(|e| Error::operation("receipt deletion", e))?
        } else {
            0
        };

        let image_deleted = match receipt.image_url.as_deref() {
            Some(url) => match self.images.delete(url) {
                Ok(deleted) => deleted,
                Err(e) => {
                    warn!("Failed to delete image of receipt {}: {}", id, e);
                    false
                }
            },
            None => false,
        };

        self.db
            .delete_receipt(id)
            .map_err(|e| Error::operation("receipt deletion", e))?;
        info!(
            "Deleted receipt {} ({} expenses, image {})",
            id,
            expenses_deleted,
            if image_deleted { "removed" } else { "kept" }
        );

        Ok(ReceiptDeletion {
            receipt_id: id.to_string(),
            expenses_deleted,
            image_deleted,
        })
    }

    /// Run OCR under the timeout. Failures come back as the message to store.
    async fn run_ocr(
        &self,
        image: &[u8],
    ) -> std::result::Result<(ExtractedReceipt, serde_json::Value), String> {
        debug!("Running {} OCR on {} bytes", self.ocr.name(), image.len());

        let response = tokio::time::timeout(self.config.ocr_timeout, self.ocr.process(image))
            .await
            .map_err(|_| {
                format!(
                    "OCR timed out after {} seconds",
                    self.config.ocr_timeout.as_secs()
                )
            })?;

        if !response.is_success() {
            return Err(response
                .message
                .unwrap_or_else(|| "OCR processing failed".to_string()));
        }
        match response.data {
            Some(data) => Ok((data, response.raw_response)),
            None => Err("OCR returned no data".to_string()),
        }
    }

    fn owned(&self, user_id: &str, id: &str) -> Result<Receipt> {
        let receipt = self.load(id)?;
        if receipt.user_id != user_id {
            return Err(Error::Forbidden(format!("Receipt {}", id)));
        }
        Ok(receipt)
    }

    fn load(&self, id: &str) -> Result<Receipt> {
        self.db
            .get_receipt(id)?
            .ok_or_else(|| Error::NotFound(format!("Receipt {}", id)))
    }
}

/// Expenses to create for an extracted receipt
///
/// Item mode falls back to a single total expense when no line item has a
/// price. An empty result means nothing could be derived.
fn expense_drafts(
    receipt_id: &str,
    data: &ExtractedReceipt,
    granularity: ReceiptGranularity,
) -> Vec<NewExpense> {
    let description = format!("{}에서 구매", data.store_name);
    let draft = |amount: f64, item_name: Option<String>| NewExpense {
        receipt_id: Some(receipt_id.to_string()),
        store_name: data.store_name.clone(),
        amount,
        date: data.date,
        category: None,
        item_name,
        description: Some(description.clone()),
        store_address: data.store_address.clone(),
        store_phone_number: data.store_phone_number.clone(),
        budget_id: None,
    };

    if granularity == ReceiptGranularity::Item {
        let items: Vec<NewExpense> = data
            .items
            .iter()
            .filter(|item| item.price > 0.0)
            .map(|item| draft(item.price, Some(item.name.clone())))
            .collect();
        if !items.is_empty() {
            return items;
        }
    }

    if data.total_amount > 0.0 {
        let hint = data.most_expensive_item().map(|item| item.name.clone());
        vec![draft(data.total_amount, hint)]
    } else {
        Vec::new()
    }
}
