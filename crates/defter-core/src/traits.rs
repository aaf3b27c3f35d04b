//! Core traits for defter abstractions.
//!
//! These traits define the interfaces that concrete implementations
//! must satisfy, enabling pluggable backends and testability.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// UPLOAD REPOSITORY TRAITS
// =============================================================================

/// Durable store for upload records and their audit trail.
///
/// Every mutating method writes the record change and its audit events as one
/// atomic unit. Implementations must enforce that `content_hash` is unique
/// among active records of a scope and report a lost race as
/// [`crate::Error::Conflict`].
#[async_trait]
pub trait UploadRepository: Send + Sync {
    /// Find the active record holding `content_hash` within a scope.
    async fn find_active_by_hash(
        &self,
        scope: &Scope,
        content_hash: &str,
    ) -> Result<Option<UploadRecord>>;

    /// Insert a new record together with its audit events.
    async fn insert_with_events(
        &self,
        record: UploadRecord,
        events: Vec<AuditEvent>,
    ) -> Result<UploadRecord>;

    /// Append a standalone audit event (dedupe skips).
    async fn append_event(&self, event: AuditEvent) -> Result<()>;

    /// Fetch a record by id, active or retired.
    async fn get(&self, id: Uuid) -> Result<Option<UploadRecord>>;

    /// List records for a scope, most recent first.
    async fn list(&self, req: ListDocumentsRequest) -> Result<Vec<UploadRecord>>;

    /// Change a record's document type and append one `OVERRIDE_DOC_TYPE` event.
    async fn override_doc_type(
        &self,
        id: Uuid,
        new_type: DocType,
        reason: &str,
        actor: &str,
    ) -> Result<UploadRecord>;

    /// Soft-deactivate a record and append one `UPLOAD_RETIRED` event.
    async fn retire(&self, id: Uuid, reason: &str, actor: &str) -> Result<UploadRecord>;

    /// Distinct document types among active records of a scope.
    async fn active_doc_types(&self, scope: &Scope) -> Result<BTreeSet<DocType>>;

    /// Audit events for a scope, oldest first.
    async fn list_events(&self, scope: &Scope) -> Result<Vec<AuditEvent>>;

    /// Audit events referencing one upload, oldest first.
    async fn events_for_upload(&self, upload_id: Uuid) -> Result<Vec<AuditEvent>>;
}

// =============================================================================
// PARSER TRAITS
// =============================================================================

/// Normalized output of a type-specific parser.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParseResult {
    pub status: ParseStatus,
    pub doc_date_min: Option<NaiveDate>,
    pub doc_date_max: Option<NaiveDate>,
    pub metadata: DocumentMetadata,
    pub warnings: Vec<String>,
    /// Failure message when `status` is `Error`.
    pub error: Option<String>,
}

impl ParseResult {
    /// A successful result with the given date bounds.
    pub fn ok(
        doc_date_min: Option<NaiveDate>,
        doc_date_max: Option<NaiveDate>,
        metadata: DocumentMetadata,
    ) -> Self {
        Self {
            status: ParseStatus::Ok,
            doc_date_min,
            doc_date_max,
            metadata,
            warnings: Vec::new(),
            error: None,
        }
    }

    /// A failed parse carrying the failure message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: ParseStatus::Error,
            error: Some(message.into()),
            ..Self::default()
        }
    }

    /// Minimal result for document types with no registered parser.
    pub fn passthrough(doc_type: DocType) -> Self {
        Self {
            warnings: vec![format!(
                "no parser registered for {}; stored with shallow parsing only",
                doc_type
            )],
            ..Self::default()
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    pub fn has_dates(&self) -> bool {
        self.doc_date_min.is_some() || self.doc_date_max.is_some()
    }
}

/// Parser for one document type.
///
/// Parsers are external collaborators registered in a `ParserRegistry` and
/// dispatched on the upload's document type. A returned error (or a panic) is
/// recorded as `ParseStatus::Error`; it never aborts the upload.
#[async_trait]
pub trait DocumentParser: Send + Sync {
    /// The document type this parser handles.
    fn doc_type(&self) -> DocType;

    /// Parse raw bytes.
    async fn parse(&self, data: &[u8], filename: &str) -> Result<ParseResult>;

    /// Human-readable name of this parser.
    fn name(&self) -> &str;

    /// Parser version recorded on each upload.
    fn version(&self) -> &str;
}
