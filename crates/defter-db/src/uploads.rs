//! PostgreSQL upload record repository and audit log.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value as JsonValue};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::debug;
use uuid::Uuid;

use defter_core::{
    AuditAction, AuditEvent, DocType, DocumentMetadata, Error, ListDocumentsRequest, ParseStatus,
    PeriodId, RecordState, Result, Scope, TimeShieldStatus, UploadRecord, UploadRepository,
};

const RECORD_COLUMNS: &str = "id, tenant_id, client_id, period_id, doc_type, original_filename, \
     stored_path, size_bytes, content_hash, received_by, parser_name, parser_version, \
     parse_status, parse_error, doc_date_min, doc_date_max, time_shield_status, \
     time_shield_reason, classification_confidence, user_doc_type_override, override_reason, \
     metadata, is_active, created_at, updated_at";

const EVENT_COLUMNS: &str =
    "id, tenant_id, client_id, period_id, actor, action, upload_id, details, created_at";

/// PostgreSQL implementation of [`UploadRepository`].
#[derive(Clone)]
pub struct PgUploadRepository {
    pool: PgPool,
}

impl PgUploadRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_event_tx(tx: &mut Transaction<'_, Postgres>, event: &AuditEvent) -> Result<()> {
        sqlx::query(
            "INSERT INTO audit_event
             (id, tenant_id, client_id, period_id, actor, action, upload_id, details, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(event.id)
        .bind(&event.tenant_id)
        .bind(&event.client_id)
        .bind(event.period_id.to_string())
        .bind(&event.actor)
        .bind(event.action.as_str())
        .bind(event.upload_id)
        .bind(&event.details)
        .bind(event.created_at)
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn lock_record_tx(
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
    ) -> Result<UploadRecord> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM upload_record WHERE id = $1 FOR UPDATE",
            RECORD_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(Error::Database)?
        .ok_or(Error::UploadNotFound(id))?;
        record_from_row(&row)
    }
}

#[async_trait]
impl UploadRepository for PgUploadRepository {
    async fn find_active_by_hash(
        &self,
        scope: &Scope,
        content_hash: &str,
    ) -> Result<Option<UploadRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM upload_record
             WHERE tenant_id = $1 AND client_id = $2 AND period_id = $3
               AND content_hash = $4 AND is_active",
            RECORD_COLUMNS
        ))
        .bind(&scope.tenant_id)
        .bind(&scope.client_id)
        .bind(scope.period_id.to_string())
        .bind(content_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.map(|r| record_from_row(&r)).transpose()
    }

    async fn insert_with_events(
        &self,
        record: UploadRecord,
        events: Vec<AuditEvent>,
    ) -> Result<UploadRecord> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let metadata = serde_json::to_value(&record.metadata)?;
        let inserted = sqlx::query(
            "INSERT INTO upload_record
             (id, tenant_id, client_id, period_id, doc_type, original_filename, stored_path,
              size_bytes, content_hash, received_by, parser_name, parser_version, parse_status,
              parse_error, doc_date_min, doc_date_max, time_shield_status, time_shield_reason,
              classification_confidence, user_doc_type_override, override_reason, metadata,
              is_active, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                     $17, $18, $19, $20, $21, $22, $23, $24, $25)",
        )
        .bind(record.id)
        .bind(&record.tenant_id)
        .bind(&record.client_id)
        .bind(record.period_id.to_string())
        .bind(record.doc_type.as_str())
        .bind(&record.original_filename)
        .bind(&record.stored_path)
        .bind(record.size_bytes)
        .bind(&record.content_hash)
        .bind(&record.received_by)
        .bind(&record.parser_name)
        .bind(&record.parser_version)
        .bind(record.parse_status.as_str())
        .bind(&record.parse_error)
        .bind(record.doc_date_min)
        .bind(record.doc_date_max)
        .bind(record.time_shield_status.as_str())
        .bind(&record.time_shield_reason)
        .bind(record.classification_confidence)
        .bind(record.user_doc_type_override.map(|t| t.as_str()))
        .bind(&record.override_reason)
        .bind(&metadata)
        .bind(record.is_active())
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&mut *tx)
        .await;

        if let Err(e) = inserted {
            if is_unique_violation(&e) {
                debug!(
                    subsystem = "database",
                    component = "uploads",
                    op = "insert",
                    content_hash = %record.content_hash,
                    "Active record with the same content already exists"
                );
                return Err(Error::Conflict(format!(
                    "content {} already stored in {}",
                    record.content_hash,
                    record.scope()
                )));
            }
            return Err(Error::Database(e));
        }

        for event in &events {
            Self::insert_event_tx(&mut tx, event).await?;
        }

        tx.commit().await.map_err(Error::Database)?;
        Ok(record)
    }

    async fn append_event(&self, event: AuditEvent) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        Self::insert_event_tx(&mut tx, &event).await?;
        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<UploadRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM upload_record WHERE id = $1",
            RECORD_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.map(|r| record_from_row(&r)).transpose()
    }

    async fn list(&self, req: ListDocumentsRequest) -> Result<Vec<UploadRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM upload_record
             WHERE tenant_id = $1 AND client_id = $2 AND period_id = $3
               AND ($4::text IS NULL OR doc_type = $4)
               AND ($5 OR is_active)
             ORDER BY created_at DESC, id DESC",
            RECORD_COLUMNS
        ))
        .bind(&req.scope.tenant_id)
        .bind(&req.scope.client_id)
        .bind(req.scope.period_id.to_string())
        .bind(req.doc_type.map(|t| t.as_str()))
        .bind(req.include_retired)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(record_from_row).collect()
    }

    async fn override_doc_type(
        &self,
        id: Uuid,
        new_type: DocType,
        reason: &str,
        actor: &str,
    ) -> Result<UploadRecord> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        let current = Self::lock_record_tx(&mut tx, id).await?;
        let (updated, event) = apply_override(current, new_type, reason, actor)?;

        sqlx::query(
            "UPDATE upload_record
             SET doc_type = $1, user_doc_type_override = $1, override_reason = $2,
                 updated_at = $3
             WHERE id = $4",
        )
        .bind(new_type.as_str())
        .bind(reason)
        .bind(updated.updated_at)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        Self::insert_event_tx(&mut tx, &event).await?;
        tx.commit().await.map_err(Error::Database)?;
        Ok(updated)
    }

    async fn retire(&self, id: Uuid, reason: &str, actor: &str) -> Result<UploadRecord> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        let current = Self::lock_record_tx(&mut tx, id).await?;
        let (updated, event) = apply_retire(current, reason, actor)?;

        sqlx::query("UPDATE upload_record SET is_active = FALSE, updated_at = $1 WHERE id = $2")
            .bind(updated.updated_at)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        Self::insert_event_tx(&mut tx, &event).await?;
        tx.commit().await.map_err(Error::Database)?;
        Ok(updated)
    }

    async fn active_doc_types(&self, scope: &Scope) -> Result<BTreeSet<DocType>> {
        let rows: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT doc_type FROM upload_record
             WHERE tenant_id = $1 AND client_id = $2 AND period_id = $3 AND is_active",
        )
        .bind(&scope.tenant_id)
        .bind(&scope.client_id)
        .bind(scope.period_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(|s| parse_doc_type(s)).collect()
    }

    async fn list_events(&self, scope: &Scope) -> Result<Vec<AuditEvent>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM audit_event
             WHERE tenant_id = $1 AND client_id = $2 AND period_id = $3
             ORDER BY seq ASC",
            EVENT_COLUMNS
        ))
        .bind(&scope.tenant_id)
        .bind(&scope.client_id)
        .bind(scope.period_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(event_from_row).collect()
    }

    async fn events_for_upload(&self, upload_id: Uuid) -> Result<Vec<AuditEvent>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM audit_event WHERE upload_id = $1 ORDER BY seq ASC",
            EVENT_COLUMNS
        ))
        .bind(upload_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(event_from_row).collect()
    }
}

// =============================================================================
// SHARED MUTATION RULES
// =============================================================================

/// Apply a document type override and build its audit event.
///
/// Shared by every repository implementation so the event shape is identical.
pub(crate) fn apply_override(
    mut record: UploadRecord,
    new_type: DocType,
    reason: &str,
    actor: &str,
) -> Result<(UploadRecord, AuditEvent)> {
    if !record.is_active() {
        return Err(Error::Validation(format!(
            "upload {} is retired and cannot be re-typed",
            record.id
        )));
    }
    let old_type = record.doc_type;
    record.doc_type = new_type;
    record.user_doc_type_override = Some(new_type);
    record.override_reason = Some(reason.to_string());
    record.updated_at = Utc::now();

    let event = AuditEvent::new(
        &record.scope(),
        actor,
        AuditAction::OverrideDocType,
        Some(record.id),
        json!({
            "old_type": old_type,
            "new_type": new_type,
            "reason": reason,
            "classification_confidence": record.classification_confidence,
        }),
    );
    Ok((record, event))
}

/// Retire a record and build its audit event.
pub(crate) fn apply_retire(
    mut record: UploadRecord,
    reason: &str,
    actor: &str,
) -> Result<(UploadRecord, AuditEvent)> {
    if !record.is_active() {
        return Err(Error::Validation(format!(
            "upload {} is already retired",
            record.id
        )));
    }
    record.state = RecordState::Retired;
    record.updated_at = Utc::now();

    let event = AuditEvent::new(
        &record.scope(),
        actor,
        AuditAction::UploadRetired,
        Some(record.id),
        json!({
            "reason": reason,
            "doc_type": record.doc_type,
            "content_hash": record.content_hash,
        }),
    );
    Ok((record, event))
}

// =============================================================================
// ROW MAPPING
// =============================================================================

fn is_unique_violation(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db) => db.is_unique_violation(),
        _ => false,
    }
}

fn parse_doc_type(s: &str) -> Result<DocType> {
    s.parse::<DocType>().map_err(Error::Serialization)
}

fn parse_period(s: &str) -> Result<PeriodId> {
    s.parse::<PeriodId>()
        .map_err(|e| Error::Serialization(format!("stored period id: {}", e)))
}

fn parse_metadata(value: JsonValue) -> Result<DocumentMetadata> {
    serde_json::from_value(value)
        .map_err(|e| Error::Serialization(format!("stored metadata: {}", e)))
}

fn record_from_row(row: &sqlx::postgres::PgRow) -> Result<UploadRecord> {
    let parse_status: String = row.get("parse_status");
    let time_shield_status: String = row.get("time_shield_status");
    let override_type: Option<String> = row.get("user_doc_type_override");
    let metadata: JsonValue = row.get("metadata");
    let period_id: String = row.get("period_id");
    let doc_type: String = row.get("doc_type");

    Ok(UploadRecord {
        id: row.get("id"),
        tenant_id: row.get("tenant_id"),
        client_id: row.get("client_id"),
        period_id: parse_period(&period_id)?,
        doc_type: parse_doc_type(&doc_type)?,
        original_filename: row.get("original_filename"),
        stored_path: row.get("stored_path"),
        size_bytes: row.get("size_bytes"),
        content_hash: row.get("content_hash"),
        received_by: row.get("received_by"),
        parser_name: row.get("parser_name"),
        parser_version: row.get("parser_version"),
        parse_status: parse_status
            .parse::<ParseStatus>()
            .map_err(Error::Serialization)?,
        parse_error: row.get("parse_error"),
        doc_date_min: row.get("doc_date_min"),
        doc_date_max: row.get("doc_date_max"),
        time_shield_status: time_shield_status
            .parse::<TimeShieldStatus>()
            .map_err(Error::Serialization)?,
        time_shield_reason: row.get("time_shield_reason"),
        classification_confidence: row.get("classification_confidence"),
        user_doc_type_override: override_type.as_deref().map(parse_doc_type).transpose()?,
        override_reason: row.get("override_reason"),
        metadata: parse_metadata(metadata)?,
        state: RecordState::from_active(row.get("is_active")),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn event_from_row(row: &sqlx::postgres::PgRow) -> Result<AuditEvent> {
    let period_id: String = row.get("period_id");
    let action: String = row.get("action");
    Ok(AuditEvent {
        id: row.get("id"),
        tenant_id: row.get("tenant_id"),
        client_id: row.get("client_id"),
        period_id: parse_period(&period_id)?,
        actor: row.get("actor"),
        action: action
            .parse::<AuditAction>()
            .map_err(Error::Serialization)?,
        upload_id: row.get("upload_id"),
        details: row.get("details"),
        created_at: row.get("created_at"),
    })
}
