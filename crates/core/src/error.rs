//! Core error taxonomy for the receipt pipeline.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// Receipt text unreadable or malformed. Fatal for the whole receipt:
    /// no partial receipts are ever persisted.
    #[error("receipt parse error: {0}")]
    Parse(String),

    /// A date value could not be parsed. Fatal per item; the receipt
    /// continues with the keyword fallback where the policy allows it.
    #[error("invalid date: {0}")]
    InvalidDate(String),

    /// The OCR collaborator failed or returned an unusable response.
    #[error("ocr error: {0}")]
    Ocr(String),

    /// A record that the caller referenced does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Storage write/read failure. Surfaced to the caller, except on the
    /// learning path where persistence is best-effort.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;
