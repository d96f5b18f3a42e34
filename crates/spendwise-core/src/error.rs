//! Error types for Spendwise

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The caller is known but may not act on the record
    #[error("No permission: {0}")]
    Forbidden(String),

    #[error("OCR error: {0}")]
    Ocr(String),

    #[error("Image storage error: {0}")]
    Storage(String),

    /// A persistence step failed; `operation` names the user-facing action
    #[error("{operation} failed: {message}")]
    Operation {
        operation: &'static str,
        message: String,
    },
}

impl Error {
    /// Wrap a lower-level failure with the name of the operation it broke.
    ///
    /// Validation, authorization and lookup errors pass through untouched so
    /// callers can still branch on them.
    pub fn operation(operation: &'static str, err: Error) -> Error {
        match err {
            Error::InvalidData(_) | Error::NotFound(_) | Error::Forbidden(_) => err,
            Error::Operation { .. } => err,
            other => Error::Operation {
                operation,
                message: other.to_string(),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
