//! Error types for defter.

use thiserror::Error;
use uuid::Uuid;

/// Result type alias using defter's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for defter operations.
///
/// Only input validation and storage-layer failures abort an upload. Parser
/// problems are absorbed into the record (`Parser` is what a parser returns,
/// the pipeline never propagates it), and a time-shield rejection is recorded
/// before it is surfaced as `TemporalPolicyViolation`.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Caller input rejected before anything was stored
    #[error("Validation error: {0}")]
    Validation(String),

    /// Upload record not found
    #[error("Upload not found: {0}")]
    UploadNotFound(Uuid),

    /// Uniqueness constraint lost to a concurrent writer
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Content store could not persist or remove bytes
    #[error("Storage error: {0}")]
    Storage(String),

    /// Document parser failed
    #[error("Parser error: {0}")]
    Parser(String),

    /// Document dates fall outside the period under a HARD policy
    #[error("Temporal policy violation for upload {upload_id}: {reason}")]
    TemporalPolicyViolation { upload_id: Uuid, reason: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether a concurrent writer won a uniqueness race.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
