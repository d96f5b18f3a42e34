//! Spendwise Core Library
//!
//! Shared functionality for the Spendwise receipt and budget tracker:
//! - Database access and migrations
//! - Field extraction from OCR vendor responses
//! - Tiered category classification (keywords plus a local model)
//! - Expense aggregation and statistics
//! - Budget reconciliation across users and organizations
//! - Receipt lifecycle, retention and archive sweeps
//! - Read-only organization share links
//! - Pluggable OCR backends and image stores

pub mod budgets;
pub mod classify;
pub mod config;
pub mod db;
pub mod error;
pub mod expenses;
pub mod extract;
pub mod images;
pub mod models;
pub mod ocr;
pub mod receipts;
pub mod retention;
pub mod sharing;

/// Test utilities including mock Ollama server
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use budgets::BudgetReconciler;
pub use classify::{
    CategoryClassifier, CategoryModel, CategorySuggestion, Classification, ClassificationTier,
    ClassifierPolicy, KeywordLexicon, MockModel, ModelClient, OllamaModel,
};
pub use config::{ReceiptConfig, RetentionConfig, SpendwiseConfig};
pub use db::{AuditEntry, Database};
pub use error::{Error, Result};
pub use expenses::ExpenseAggregator;
pub use extract::{extract, ExtractedReceipt, VendorFormat};
pub use images::{ImageStore, LocalImageStore};
pub use ocr::{AzureOcr, MockOcr, OcrClient, OcrProvider, OcrResponse, OcrResponseStatus};
pub use receipts::{OcrPreview, ProcessedReceipt, ReceiptDeletion, ReceiptProcessor};
pub use retention::RetentionSweeper;
pub use sharing::ShareLinks;
