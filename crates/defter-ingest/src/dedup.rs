//! Dedup index: content-hash lookup within a tenant/client/period scope.

use std::sync::Arc;

use serde_json::json;
use tracing::debug;

use defter_core::{AuditAction, AuditEvent, Result, Scope, UploadRecord, UploadRepository};

/// Lookup over active records, plus the audit trail for skipped uploads.
#[derive(Clone)]
pub struct DedupIndex {
    repo: Arc<dyn UploadRepository>,
}

impl DedupIndex {
    pub fn new(repo: Arc<dyn UploadRepository>) -> Self {
        Self { repo }
    }

    /// The active record already holding this content in the scope, if any.
    pub async fn lookup(&self, scope: &Scope, content_hash: &str) -> Result<Option<UploadRecord>> {
        let existing = self.repo.find_active_by_hash(scope, content_hash).await?;
        if let Some(record) = &existing {
            debug!(
                subsystem = "ingest",
                component = "dedup",
                op = "lookup",
                tenant_id = %scope.tenant_id,
                client_id = %scope.client_id,
                period_id = %scope.period_id,
                content_hash = %content_hash,
                existing_upload_id = %record.id,
                "Dedupe hit"
            );
        }
        Ok(existing)
    }

    /// Append the single `UPLOAD_DEDUPE_SKIP` event for a duplicate upload.
    pub async fn record_skip(
        &self,
        existing: &UploadRecord,
        actor: &str,
        original_filename: &str,
    ) -> Result<()> {
        let event = AuditEvent::new(
            &existing.scope(),
            actor,
            AuditAction::UploadDedupeSkip,
            Some(existing.id),
            json!({
                "original_filename": original_filename,
                "content_hash": existing.content_hash,
                "existing_upload_id": existing.id,
                "existing_filename": existing.original_filename,
            }),
        );
        self.repo.append_event(event).await
    }
}
