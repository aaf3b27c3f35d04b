//! The ingestion service: one pipeline run per upload request.
//!
//! hash → dedupe → classify → store → parse → time shield → record + audit.
//!
//! Only input validation and storage/database failures are returned as
//! errors. Parser trouble and time-shield verdicts are recorded on the upload
//! and surfaced through [`UploadOutcome`]'s per-stage sub-statuses.

use std::sync::Arc;
use std::time::Instant;

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use defter_core::defaults::{EVIDENCE_SCHEME, MAX_UPLOAD_BYTES};
use defter_core::{
    validate_upload_size, AuditAction, AuditEvent, Classification, CompletenessEvaluator,
    DocType, Error, FormatClassifier, ListDocumentsRequest, ParseStatus, PeriodCompleteness,
    RecordState, Result, Scope, TimeShield, TimeShieldStatus, TimeShieldVerdict, UploadRecord,
    UploadRepository, UploadStatus, VerdictKind,
};
use defter_db::{compute_content_hash, ContentStore};

use crate::dedup::DedupIndex;
use crate::parsers::{ParseOutcome, ParserRegistry};

// =============================================================================
// REQUEST / OUTCOME
// =============================================================================

/// One upload call. Identifiers are raw caller input and are validated.
#[derive(Debug, Clone)]
pub struct UploadRequest<'a> {
    pub tenant_id: &'a str,
    pub client_id: &'a str,
    pub period_id: &'a str,
    pub data: &'a [u8],
    pub filename: &'a str,
    /// Caller-supplied type; bypasses the classifier.
    pub doc_type: Option<&'a str>,
    pub actor: &'a str,
}

impl<'a> UploadRequest<'a> {
    pub fn new(
        tenant_id: &'a str,
        client_id: &'a str,
        period_id: &'a str,
        data: &'a [u8],
        filename: &'a str,
        actor: &'a str,
    ) -> Self {
        Self {
            tenant_id,
            client_id,
            period_id,
            data,
            filename,
            doc_type: None,
            actor,
        }
    }

    pub fn with_doc_type(mut self, doc_type: &'a str) -> Self {
        self.doc_type = Some(doc_type);
        self
    }
}

/// Parser sub-status of an upload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParseSummary {
    pub parser_name: String,
    pub parser_version: String,
    pub status: ParseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub doc_date_min: Option<NaiveDate>,
    pub doc_date_max: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl ParseSummary {
    fn from_record(record: &UploadRecord) -> Self {
        Self {
            parser_name: record.parser_name.clone(),
            parser_version: record.parser_version.clone(),
            status: record.parse_status,
            error: record.parse_error.clone(),
            doc_date_min: record.doc_date_min,
            doc_date_max: record.doc_date_max,
            warnings: Vec::new(),
        }
    }
}

/// Time-shield sub-status of an upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimeShieldSummary {
    pub status: TimeShieldStatus,
    pub reason: String,
}

impl From<&TimeShieldVerdict> for TimeShieldSummary {
    fn from(verdict: &TimeShieldVerdict) -> Self {
        Self {
            status: verdict.status,
            reason: verdict.reason.clone(),
        }
    }
}

/// Composite result of one upload call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadOutcome {
    pub status: UploadStatus,
    /// The bytes were already stored in this scope; `record` is the original.
    pub dedupe: bool,
    pub record: UploadRecord,
    pub classification: Classification,
    pub time_shield: TimeShieldSummary,
    pub parse_summary: ParseSummary,
    pub evidence_ref: String,
}

impl UploadOutcome {
    /// Turn a time-shield rejection into `Error::TemporalPolicyViolation`.
    ///
    /// The record is already durably stored either way.
    pub fn into_result(self) -> Result<Self> {
        if self.time_shield.status == TimeShieldStatus::Reject {
            return Err(Error::TemporalPolicyViolation {
                upload_id: self.record.id,
                reason: self.time_shield.reason,
            });
        }
        Ok(self)
    }
}

/// Overall status from the parse status and the time-shield verdict.
///
/// Missing dates and a low-confidence classification are advisory and do not
/// lower the status.
pub fn overall_status(parse_status: ParseStatus, verdict: &TimeShieldVerdict) -> UploadStatus {
    combine_status(parse_status, verdict.status, verdict.is_out_of_range_warning())
}

/// Overall status of a stored record, as first reported when it was ingested.
///
/// A shield WARN with any document date present can only be out of range;
/// without dates it is the advisory "unextractable" warning.
pub fn recorded_status(record: &UploadRecord) -> UploadStatus {
    let has_dates = record.doc_date_min.is_some() || record.doc_date_max.is_some();
    combine_status(
        record.parse_status,
        record.time_shield_status,
        record.time_shield_status == TimeShieldStatus::Warn && has_dates,
    )
}

fn combine_status(
    parse_status: ParseStatus,
    shield_status: TimeShieldStatus,
    out_of_range_warning: bool,
) -> UploadStatus {
    if parse_status == ParseStatus::Error || shield_status == TimeShieldStatus::Reject {
        return UploadStatus::Error;
    }
    if matches!(parse_status, ParseStatus::Warn | ParseStatus::Empty) || out_of_range_warning {
        return UploadStatus::Warn;
    }
    UploadStatus::Ok
}

/// `evidence://{tenant}/{client}/{period}/{upload_id}#sha256:{hex}`
pub fn evidence_ref(record: &UploadRecord) -> String {
    format!(
        "{}{}/{}/{}/{}#{}",
        EVIDENCE_SCHEME,
        record.tenant_id,
        record.client_id,
        record.period_id,
        record.id,
        record.content_hash
    )
}

/// Parse a caller-supplied document type.
pub fn parse_doc_type(value: &str) -> Result<DocType> {
    value.parse::<DocType>().map_err(Error::Validation)
}

fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::Validation(format!("{} must not be empty", field)));
    }
    Ok(())
}

// =============================================================================
// SERVICE
// =============================================================================

/// Explicitly constructed ingestion service owning its collaborators.
pub struct IngestService {
    repo: Arc<dyn UploadRepository>,
    store: ContentStore,
    dedup: DedupIndex,
    classifier: FormatClassifier,
    time_shield: TimeShield,
    parsers: ParserRegistry,
    completeness: CompletenessEvaluator,
    max_upload_bytes: u64,
}

impl IngestService {
    /// Service with built-in parsers, policies and thresholds.
    pub fn new(repo: Arc<dyn UploadRepository>, store: ContentStore) -> Self {
        Self {
            dedup: DedupIndex::new(repo.clone()),
            repo,
            store,
            classifier: FormatClassifier::new(),
            time_shield: TimeShield::default(),
            parsers: ParserRegistry::with_builtin_parsers(),
            completeness: CompletenessEvaluator::new(),
            max_upload_bytes: MAX_UPLOAD_BYTES,
        }
    }

    pub fn with_classifier(mut self, classifier: FormatClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_time_shield(mut self, time_shield: TimeShield) -> Self {
        self.time_shield = time_shield;
        self
    }

    pub fn with_parsers(mut self, parsers: ParserRegistry) -> Self {
        self.parsers = parsers;
        self
    }

    pub fn with_completeness(mut self, completeness: CompletenessEvaluator) -> Self {
        self.completeness = completeness;
        self
    }

    pub fn with_max_upload_bytes(mut self, max_upload_bytes: u64) -> Self {
        self.max_upload_bytes = max_upload_bytes;
        self
    }

    /// Run the full pipeline for one upload.
    pub async fn upload(&self, req: UploadRequest<'_>) -> Result<UploadOutcome> {
        let start = Instant::now();

        let scope = Scope::parse(req.tenant_id, req.client_id, req.period_id)?;
        require_non_empty("actor", req.actor)?;
        validate_upload_size(req.data.len(), self.max_upload_bytes)?;
        let requested_type = req.doc_type.map(parse_doc_type).transpose()?;

        let content_hash = compute_content_hash(req.data);

        if let Some(existing) = self.dedup.lookup(&scope, &content_hash).await? {
            return self.dedupe_outcome(existing, req.actor, req.filename).await;
        }

        let classification = match requested_type {
            Some(doc_type) => Classification::user_specified(doc_type),
            None => self.classifier.classify(req.data, req.filename),
        };
        let doc_type = classification.doc_type;

        let upload_id = Uuid::now_v7();
        let stored = self
            .store
            .store(&scope, doc_type, upload_id, req.filename, req.data)
            .await
            .inspect_err(|e| {
                tracing::error!(
                    subsystem = "ingest",
                    component = "pipeline",
                    op = "store",
                    tenant_id = %scope.tenant_id,
                    upload_id = %upload_id,
                    error = %e,
                    "Failed to persist upload bytes"
                );
            })?;

        let parsed = self.parsers.dispatch(doc_type, req.data, req.filename).await;
        let verdict = self.time_shield.evaluate(
            doc_type,
            scope.period_id,
            parsed.result.doc_date_min,
            parsed.result.doc_date_max,
        );

        let now = Utc::now();
        let record = UploadRecord {
            id: upload_id,
            tenant_id: scope.tenant_id.clone(),
            client_id: scope.client_id.clone(),
            period_id: scope.period_id,
            doc_type,
            original_filename: req.filename.to_string(),
            stored_path: stored.path.clone(),
            size_bytes: stored.size_bytes,
            content_hash: content_hash.clone(),
            received_by: req.actor.to_string(),
            parser_name: parsed.parser_name.clone(),
            parser_version: parsed.parser_version.clone(),
            parse_status: parsed.result.status,
            parse_error: parsed.result.error.clone(),
            doc_date_min: parsed.result.doc_date_min,
            doc_date_max: parsed.result.doc_date_max,
            time_shield_status: verdict.status,
            time_shield_reason: verdict.reason.clone(),
            classification_confidence: classification.confidence,
            user_doc_type_override: None,
            override_reason: None,
            metadata: parsed.result.metadata.clone(),
            state: RecordState::Active,
            created_at: now,
            updated_at: now,
        };
        let events = milestone_events(&scope, req.actor, &record, &classification, &parsed, &verdict);

        let record = match self.repo.insert_with_events(record, events).await {
            Ok(record) => record,
            Err(e) if e.is_conflict() => {
                // Lost the check-then-insert race to an identical upload
                warn!(
                    subsystem = "ingest",
                    component = "pipeline",
                    op = "insert",
                    tenant_id = %scope.tenant_id,
                    client_id = %scope.client_id,
                    period_id = %scope.period_id,
                    content_hash = %content_hash,
                    "Concurrent identical upload won, falling back to dedupe"
                );
                self.store.discard(&stored.path).await;
                return match self.dedup.lookup(&scope, &content_hash).await? {
                    Some(existing) => self.dedupe_outcome(existing, req.actor, req.filename).await,
                    None => Err(e),
                };
            }
            Err(e) => {
                tracing::error!(
                    subsystem = "ingest",
                    component = "pipeline",
                    op = "insert",
                    upload_id = %upload_id,
                    error = %e,
                    "Failed to record upload, removing stored bytes"
                );
                self.store.discard(&stored.path).await;
                return Err(e);
            }
        };

        let status = overall_status(record.parse_status, &verdict);
        if verdict.is_reject() {
            warn!(
                subsystem = "ingest",
                component = "pipeline",
                op = "upload",
                upload_id = %record.id,
                doc_type = %doc_type,
                reason = %verdict.reason,
                "Time shield rejected upload; record kept for audit"
            );
        }
        info!(
            subsystem = "ingest",
            component = "pipeline",
            op = "upload",
            tenant_id = %record.tenant_id,
            client_id = %record.client_id,
            period_id = %record.period_id,
            upload_id = %record.id,
            doc_type = %doc_type,
            size_bytes = record.size_bytes,
            parse_status = %record.parse_status,
            time_shield = %verdict.status,
            status = %status,
            duration_ms = start.elapsed().as_millis() as u64,
            "Upload processed"
        );

        Ok(UploadOutcome {
            status,
            dedupe: false,
            evidence_ref: evidence_ref(&record),
            time_shield: TimeShieldSummary::from(&verdict),
            parse_summary: ParseSummary {
                parser_name: parsed.parser_name,
                parser_version: parsed.parser_version,
                status: parsed.result.status,
                error: parsed.result.error,
                doc_date_min: parsed.result.doc_date_min,
                doc_date_max: parsed.result.doc_date_max,
                warnings: parsed.result.warnings,
            },
            classification,
            record,
        })
    }

    async fn dedupe_outcome(
        &self,
        existing: UploadRecord,
        actor: &str,
        filename: &str,
    ) -> Result<UploadOutcome> {
        self.dedup.record_skip(&existing, actor, filename).await?;
        let status = recorded_status(&existing);
        info!(
            subsystem = "ingest",
            component = "pipeline",
            op = "upload",
            tenant_id = %existing.tenant_id,
            upload_id = %existing.id,
            dedupe = true,
            status = %status,
            "Duplicate upload skipped"
        );

        let classification = Classification {
            doc_type: existing.doc_type,
            confidence: existing.classification_confidence,
            rationale: format!("duplicate of upload {}; stored classification reused", existing.id),
            low_confidence: false,
            user_specified: false,
            detected_mime: None,
            candidates: Vec::new(),
        };
        Ok(UploadOutcome {
            status,
            dedupe: true,
            evidence_ref: evidence_ref(&existing),
            time_shield: TimeShieldSummary {
                status: existing.time_shield_status,
                reason: existing.time_shield_reason.clone(),
            },
            parse_summary: ParseSummary::from_record(&existing),
            classification,
            record: existing,
        })
    }

    /// Active records for a scope, most recent first.
    pub async fn list_documents(
        &self,
        tenant_id: &str,
        client_id: &str,
        period_id: &str,
        doc_type: Option<&str>,
    ) -> Result<Vec<UploadRecord>> {
        let scope = Scope::parse(tenant_id, client_id, period_id)?;
        let doc_type = doc_type.map(parse_doc_type).transpose()?;
        self.repo
            .list(ListDocumentsRequest::new(scope).with_doc_type(doc_type))
            .await
    }

    /// Records for an arbitrary listing request (e.g. including retired).
    pub async fn list_documents_with(&self, req: ListDocumentsRequest) -> Result<Vec<UploadRecord>> {
        self.repo.list(req).await
    }

    pub async fn get_document(&self, record_id: Uuid) -> Result<UploadRecord> {
        self.repo
            .get(record_id)
            .await?
            .ok_or(Error::UploadNotFound(record_id))
    }

    /// Re-type a record; the prior type is kept in the audit trail.
    pub async fn override_doc_type(
        &self,
        record_id: Uuid,
        new_type: &str,
        reason: &str,
        actor: &str,
    ) -> Result<UploadRecord> {
        let new_type = parse_doc_type(new_type)?;
        require_non_empty("reason", reason)?;
        require_non_empty("actor", actor)?;

        let updated = self
            .repo
            .override_doc_type(record_id, new_type, reason, actor)
            .await?;
        info!(
            subsystem = "ingest",
            component = "pipeline",
            op = "override_doc_type",
            upload_id = %record_id,
            doc_type = %new_type,
            actor = %actor,
            "Document type overridden"
        );
        Ok(updated)
    }

    /// Soft-retire a record. It leaves dedupe and completeness, not the audit trail.
    pub async fn retire_document(
        &self,
        record_id: Uuid,
        reason: &str,
        actor: &str,
    ) -> Result<UploadRecord> {
        require_non_empty("reason", reason)?;
        require_non_empty("actor", actor)?;

        let retired = self.repo.retire(record_id, reason, actor).await?;
        info!(
            subsystem = "ingest",
            component = "pipeline",
            op = "retire_document",
            upload_id = %record_id,
            actor = %actor,
            "Upload retired"
        );
        Ok(retired)
    }

    pub async fn get_completeness(
        &self,
        tenant_id: &str,
        client_id: &str,
        period_id: &str,
    ) -> Result<PeriodCompleteness> {
        let scope = Scope::parse(tenant_id, client_id, period_id)?;
        let present = self.repo.active_doc_types(&scope).await?;
        Ok(self.completeness.evaluate(&scope, &present))
    }

    /// Audit trail of a scope, oldest first.
    pub async fn list_events(
        &self,
        tenant_id: &str,
        client_id: &str,
        period_id: &str,
    ) -> Result<Vec<AuditEvent>> {
        let scope = Scope::parse(tenant_id, client_id, period_id)?;
        self.repo.list_events(&scope).await
    }

    pub async fn events_for_upload(&self, record_id: Uuid) -> Result<Vec<AuditEvent>> {
        self.repo.events_for_upload(record_id).await
    }
}

/// UPLOAD_RECEIVED, PARSE_* and TIME_SHIELD_* for one new record.
fn milestone_events(
    scope: &Scope,
    actor: &str,
    record: &UploadRecord,
    classification: &Classification,
    parsed: &ParseOutcome,
    verdict: &TimeShieldVerdict,
) -> Vec<AuditEvent> {
    let received = AuditEvent::new(
        scope,
        actor,
        AuditAction::UploadReceived,
        Some(record.id),
        json!({
            "original_filename": record.original_filename,
            "stored_path": record.stored_path,
            "size_bytes": record.size_bytes,
            "content_hash": record.content_hash,
            "doc_type": record.doc_type,
            "classification": {
                "confidence": classification.confidence,
                "rationale": classification.rationale,
                "low_confidence": classification.low_confidence,
                "user_specified": classification.user_specified,
                "detected_mime": classification.detected_mime,
            },
        }),
    );
    let parse = AuditEvent::new(
        scope,
        actor,
        AuditAction::for_parse(parsed.result.status),
        Some(record.id),
        json!({
            "parser_name": parsed.parser_name,
            "parser_version": parsed.parser_version,
            "status": parsed.result.status,
            "error": parsed.result.error,
            "warnings": parsed.result.warnings,
            "doc_date_min": parsed.result.doc_date_min,
            "doc_date_max": parsed.result.doc_date_max,
        }),
    );
    let shield = AuditEvent::new(
        scope,
        actor,
        AuditAction::for_time_shield(verdict.status),
        Some(record.id),
        json!({
            "status": verdict.status,
            "reason": verdict.reason,
            "strictness": verdict.strictness,
            "unextractable": verdict.kind == VerdictKind::Unextractable,
        }),
    );
    vec![received, parse, shield]
}
