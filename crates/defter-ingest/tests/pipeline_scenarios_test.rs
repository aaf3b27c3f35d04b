//! End-to-end pipeline behaviour against the in-memory repository and a
//! temporary filesystem store.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;
use uuid::Uuid;

use defter_ingest::{
    AuditAction, AuditEvent, ContentStore, DocType, DocumentParser, Error, FilesystemBackend,
    InMemoryUploadRepository, IngestService, ListDocumentsRequest, ParseResult, ParseStatus,
    ParserRegistry, PolicyTable, Result, Scope, StorageBackend, Strictness, TimeShield,
    TimeShieldStatus, UploadRecord, UploadRepository, UploadRequest, UploadStatus,
};

const MIZAN_NO_DATES: &[u8] = b"Hesap Kodu;Hesap Adi;Borc;Alacak\n100;Kasa;10;0\n320;Saticilar;0;10\n";

struct Harness {
    service: IngestService,
    repo: InMemoryUploadRepository,
    dir: TempDir,
}

fn harness() -> Harness {
    let dir = TempDir::new().unwrap();
    let repo = InMemoryUploadRepository::new();
    let store = ContentStore::new(FilesystemBackend::new(dir.path()));
    let service = IngestService::new(Arc::new(repo.clone()), store);
    Harness { service, repo, dir }
}

fn count_files(dir: &Path) -> usize {
    let mut count = 0;
    for entry in std::fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
            count += count_files(&path);
        } else {
            count += 1;
        }
    }
    count
}

fn req<'a>(data: &'a [u8], filename: &'a str) -> UploadRequest<'a> {
    UploadRequest::new("T1", "C1", "2025-Q2", data, filename, "alice")
}

fn actions(events: &[AuditEvent]) -> Vec<AuditAction> {
    events.iter().map(|e| e.action).collect()
}

// =============================================================================
// SCENARIOS
// =============================================================================

#[tokio::test]
async fn test_warn_policy_without_dates_is_ok_and_hard_policy_out_of_range_is_rejected() {
    let h = harness();

    let mizan = h.service.upload(req(MIZAN_NO_DATES, "mizan_2025Q2.csv")).await.unwrap();
    assert_eq!(mizan.record.doc_type, DocType::Mizan);
    assert!(!mizan.classification.user_specified);
    assert_eq!(mizan.time_shield.status, TimeShieldStatus::Warn);
    assert!(mizan.time_shield.reason.contains("date unextractable"));
    assert_eq!(mizan.status, UploadStatus::Ok);
    assert!(!mizan.dedupe);

    let berat_data = b"<edefter:berat>\n<baslangic>2025-01-01</baslangic>\n<bitis>2025-01-31</bitis>\n</edefter:berat>";
    let berat = h.service.upload(req(berat_data, "berat.xml")).await.unwrap();
    assert_eq!(berat.record.doc_type, DocType::LedgerBerat);
    assert_eq!(berat.time_shield.status, TimeShieldStatus::Reject);
    assert_eq!(berat.status, UploadStatus::Error);
    assert!(berat.time_shield.reason.contains("2025-04-01..2025-06-30"));

    // Rejected uploads stay visible for audit
    let listed = h
        .service
        .list_documents("T1", "C1", "2025-Q2", None)
        .await
        .unwrap();
    let ids: Vec<Uuid> = listed.iter().map(|r| r.id).collect();
    assert!(ids.contains(&berat.record.id));
    assert!(ids.contains(&mizan.record.id));

    let rejected_id = berat.record.id;
    match berat.into_result() {
        Err(Error::TemporalPolicyViolation { upload_id, .. }) => assert_eq!(upload_id, rejected_id),
        other => panic!("expected temporal policy violation, got {other:?}"),
    }

    let events = h.service.events_for_upload(rejected_id).await.unwrap();
    assert_eq!(
        actions(&events),
        vec![
            AuditAction::UploadReceived,
            AuditAction::ParseOk,
            AuditAction::TimeShieldReject
        ]
    );
}

#[tokio::test]
async fn test_required_types_present_completes_period() {
    let h = harness();

    let before = h.service.get_completeness("T1", "C1", "2025-Q2").await.unwrap();
    assert!(!before.is_complete);
    assert_eq!(before.missing_required, vec![DocType::Mizan, DocType::BankStatement]);

    h.service
        .upload(req(MIZAN_NO_DATES, "m.csv").with_doc_type("MIZAN"))
        .await
        .unwrap();
    h.service
        .upload(req(b"02.04.2025;Havale;100,00\n", "b.csv").with_doc_type("BANK_STATEMENT"))
        .await
        .unwrap();

    let after = h.service.get_completeness("T1", "C1", "2025-Q2").await.unwrap();
    assert!(after.is_complete);
    assert!(after.missing_required.is_empty());
    assert!(after.blocked_checks.is_empty());

    // Other periods are unaffected
    let other = h.service.get_completeness("T1", "C1", "2025-Q3").await.unwrap();
    assert!(!other.is_complete);
}

#[tokio::test]
async fn test_override_appends_exactly_one_event() {
    let h = harness();
    let bank = h
        .service
        .upload(req(b"IBAN TR33 0006 1005 1978 6457 8413 26\n", "ekstre.csv").with_doc_type("BANK_STATEMENT"))
        .await
        .unwrap();
    let before = h.repo.all_events().len();

    let updated = h
        .service
        .override_doc_type(bank.record.id, "MIZAN", "mislabelled by client", "auditor")
        .await
        .unwrap();
    assert_eq!(updated.doc_type, DocType::Mizan);
    assert_eq!(
        h.service.get_document(bank.record.id).await.unwrap().doc_type,
        DocType::Mizan
    );

    let events = h.repo.all_events();
    assert_eq!(events.len(), before + 1);
    let last = events.last().unwrap();
    assert_eq!(last.action, AuditAction::OverrideDocType);
    assert_eq!(last.actor, "auditor");
    assert_eq!(last.details["old_type"], "BANK_STATEMENT");
    assert_eq!(last.details["new_type"], "MIZAN");

    // Completeness follows the corrected type
    let report = h.service.get_completeness("T1", "C1", "2025-Q2").await.unwrap();
    assert_eq!(report.missing_required, vec![DocType::BankStatement]);
}

// =============================================================================
// DEDUPLICATION
// =============================================================================

#[tokio::test]
async fn test_identical_bytes_are_stored_once() {
    let h = harness();
    let first = h.service.upload(req(MIZAN_NO_DATES, "mizan.csv")).await.unwrap();
    let second = h.service.upload(req(MIZAN_NO_DATES, "mizan (1).csv")).await.unwrap();

    assert!(second.dedupe);
    assert_eq!(second.status, UploadStatus::Ok);
    assert_eq!(second.record.id, first.record.id);
    assert_eq!(second.evidence_ref, first.evidence_ref);
    assert_eq!(h.repo.record_count(), 1);
    assert_eq!(count_files(h.dir.path()), 1);

    let skips: Vec<_> = h
        .repo
        .all_events()
        .into_iter()
        .filter(|e| e.action == AuditAction::UploadDedupeSkip)
        .collect();
    assert_eq!(skips.len(), 1);
    assert_eq!(skips[0].upload_id, Some(first.record.id));
    assert_eq!(skips[0].details["original_filename"], "mizan (1).csv");
}

#[tokio::test]
async fn test_duplicate_of_rejected_upload_reports_error() {
    let h = harness();
    let berat_data = b"<edefter:berat>\n<baslangic>2025-01-01</baslangic>\n<bitis>2025-01-31</bitis>\n</edefter:berat>";
    let first = h.service.upload(req(berat_data, "berat.xml")).await.unwrap();
    assert_eq!(first.status, UploadStatus::Error);

    let again = h.service.upload(req(berat_data, "berat-copy.xml")).await.unwrap();
    assert!(again.dedupe);
    assert_eq!(again.record.id, first.record.id);
    assert_eq!(again.status, UploadStatus::Error);
    assert_eq!(again.time_shield.status, TimeShieldStatus::Reject);
    assert!(matches!(
        again.into_result(),
        Err(Error::TemporalPolicyViolation { .. })
    ));
    assert_eq!(h.repo.record_count(), 1);
}

#[tokio::test]
async fn test_duplicate_of_out_of_range_warning_reports_warn() {
    let h = harness();
    // Mizan runs under a WARN policy
    let data = b"Tarih;Hesap Kodu;Borc\n2025-01-15;100;10\n";
    let first = h
        .service
        .upload(req(data, "mizan.csv").with_doc_type("MIZAN"))
        .await
        .unwrap();
    assert_eq!(first.time_shield.status, TimeShieldStatus::Warn);
    assert_eq!(first.status, UploadStatus::Warn);

    let again = h
        .service
        .upload(req(data, "mizan.csv").with_doc_type("MIZAN"))
        .await
        .unwrap();
    assert!(again.dedupe);
    assert_eq!(again.status, UploadStatus::Warn);
}

#[tokio::test]
async fn test_dedupe_is_scoped_to_period_and_client() {
    let h = harness();
    h.service.upload(req(MIZAN_NO_DATES, "mizan.csv")).await.unwrap();

    let other_period = h
        .service
        .upload(UploadRequest::new("T1", "C1", "2025-Q3", MIZAN_NO_DATES, "mizan.csv", "alice"))
        .await
        .unwrap();
    let other_client = h
        .service
        .upload(UploadRequest::new("T1", "C2", "2025-Q2", MIZAN_NO_DATES, "mizan.csv", "alice"))
        .await
        .unwrap();

    assert!(!other_period.dedupe);
    assert!(!other_client.dedupe);
    assert_eq!(h.repo.record_count(), 3);
}

#[tokio::test]
async fn test_concurrent_identical_uploads_leave_one_record() {
    let h = harness();
    let (a, b) = tokio::join!(
        h.service.upload(req(MIZAN_NO_DATES, "a.csv")),
        h.service.upload(req(MIZAN_NO_DATES, "b.csv")),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.record.id, b.record.id);
    assert_eq!([a.dedupe, b.dedupe].iter().filter(|d| **d).count(), 1);
    assert_eq!(h.repo.record_count(), 1);
    assert_eq!(count_files(h.dir.path()), 1);
}

#[tokio::test]
async fn test_retired_content_can_be_uploaded_again() {
    let h = harness();
    let first = h.service.upload(req(MIZAN_NO_DATES, "mizan.csv")).await.unwrap();
    h.service
        .retire_document(first.record.id, "wrong client", "auditor")
        .await
        .unwrap();

    let report = h.service.get_completeness("T1", "C1", "2025-Q2").await.unwrap();
    assert!(report.missing_required.contains(&DocType::Mizan));

    let again = h.service.upload(req(MIZAN_NO_DATES, "mizan.csv")).await.unwrap();
    assert!(!again.dedupe);
    assert_ne!(again.record.id, first.record.id);

    let active = h.service.list_documents("T1", "C1", "2025-Q2", None).await.unwrap();
    assert_eq!(active.len(), 1);

    let scope = Scope::parse("T1", "C1", "2025-Q2").unwrap();
    let all = h
        .service
        .list_documents_with(ListDocumentsRequest::new(scope).including_retired())
        .await
        .unwrap();
    assert_eq!(all.len(), 2);

    let retired = h.service.get_document(first.record.id).await.unwrap();
    assert!(!retired.is_active());
    assert!(matches!(
        h.service.retire_document(first.record.id, "again", "auditor").await,
        Err(Error::Validation(_))
    ));
}

// =============================================================================
// TIME SHIELD POLICY
// =============================================================================

#[tokio::test]
async fn test_out_of_period_dates_follow_type_policy() {
    let h = harness();
    let policies = PolicyTable::default();

    for doc_type in DocType::ALL.into_iter().filter(|t| *t != DocType::Other) {
        let data = format!("{} belge tarihi 2025-01-15\n", doc_type);
        let outcome = h
            .service
            .upload(req(data.as_bytes(), "belge.txt").with_doc_type(doc_type.as_str()))
            .await
            .unwrap();

        match policies.strictness(doc_type) {
            Strictness::Hard => {
                assert_eq!(outcome.time_shield.status, TimeShieldStatus::Reject, "{doc_type}");
                assert_eq!(outcome.status, UploadStatus::Error, "{doc_type}");
            }
            Strictness::Warn => {
                assert_eq!(outcome.time_shield.status, TimeShieldStatus::Warn, "{doc_type}");
                assert_eq!(outcome.status, UploadStatus::Warn, "{doc_type}");
            }
        }
    }
}

#[tokio::test]
async fn test_in_period_dates_pass() {
    let h = harness();
    let outcome = h
        .service
        .upload(req(b"Tahakkuk fisi 2025-04-26 2025-05-26", "tahakkuk.txt"))
        .await
        .unwrap();
    assert_eq!(outcome.record.doc_type, DocType::Tahakkuk);
    assert_eq!(outcome.time_shield.status, TimeShieldStatus::Pass);
    assert_eq!(outcome.status, UploadStatus::Ok);
    assert!(outcome.clone().into_result().is_ok());
}

#[tokio::test]
async fn test_custom_policy_table_relaxes_rejection() {
    let dir = TempDir::new().unwrap();
    let repo = InMemoryUploadRepository::new();
    let service = IngestService::new(
        Arc::new(repo),
        ContentStore::new(FilesystemBackend::new(dir.path())),
    )
    .with_time_shield(TimeShield::new(
        PolicyTable::default().with_override(DocType::LedgerBerat, Strictness::Warn),
    ));

    let outcome = service
        .upload(req(b"2025-01-01 2025-01-31", "berat.xml").with_doc_type("LEDGER_BERAT"))
        .await
        .unwrap();
    assert_eq!(outcome.time_shield.status, TimeShieldStatus::Warn);
    assert_eq!(outcome.status, UploadStatus::Warn);
}

// =============================================================================
// PARSER ISOLATION
// =============================================================================

struct FailingParser;

#[async_trait]
impl DocumentParser for FailingParser {
    fn doc_type(&self) -> DocType {
        DocType::Mizan
    }
    async fn parse(&self, _data: &[u8], _filename: &str) -> Result<ParseResult> {
        Err(Error::Parser("unbalanced columns".to_string()))
    }
    fn name(&self) -> &str {
        "strict_mizan"
    }
    fn version(&self) -> &str {
        "2"
    }
}

struct PanickingParser;

#[async_trait]
impl DocumentParser for PanickingParser {
    fn doc_type(&self) -> DocType {
        DocType::BankStatement
    }
    async fn parse(&self, _data: &[u8], _filename: &str) -> Result<ParseResult> {
        panic!("index out of bounds");
    }
    fn name(&self) -> &str {
        "fragile_bank"
    }
    fn version(&self) -> &str {
        "1"
    }
}

#[tokio::test]
async fn test_parser_failures_are_recorded_not_raised() {
    let dir = TempDir::new().unwrap();
    let repo = InMemoryUploadRepository::new();
    let mut parsers = ParserRegistry::with_builtin_parsers();
    parsers.register(Arc::new(FailingParser));
    parsers.register(Arc::new(PanickingParser));
    let service = IngestService::new(
        Arc::new(repo.clone()),
        ContentStore::new(FilesystemBackend::new(dir.path())),
    )
    .with_parsers(parsers);

    let failed = service
        .upload(req(MIZAN_NO_DATES, "m.csv").with_doc_type("MIZAN"))
        .await
        .unwrap();
    assert_eq!(failed.status, UploadStatus::Error);
    assert_eq!(failed.record.parse_status, ParseStatus::Error);
    assert_eq!(failed.record.parser_name, "strict_mizan");
    assert!(failed.parse_summary.error.as_deref().unwrap().contains("unbalanced columns"));

    let panicked = service
        .upload(req(b"02.04.2025;EFT", "b.csv").with_doc_type("BANK_STATEMENT"))
        .await
        .unwrap();
    assert_eq!(panicked.status, UploadStatus::Error);
    assert!(panicked
        .record
        .parse_error
        .as_deref()
        .unwrap()
        .starts_with("parser panicked"));

    // Both records persisted with a PARSE_ERROR event
    assert_eq!(repo.record_count(), 2);
    let parse_errors = repo
        .all_events()
        .into_iter()
        .filter(|e| e.action == AuditAction::ParseError)
        .count();
    assert_eq!(parse_errors, 2);
}

#[tokio::test]
async fn test_unregistered_type_uses_passthrough() {
    let h = harness();
    let outcome = h
        .service
        .upload(req(b"random notes", "notes.txt"))
        .await
        .unwrap();
    assert_eq!(outcome.record.doc_type, DocType::Other);
    assert_eq!(outcome.record.parser_name, "passthrough");
    assert_eq!(outcome.classification.confidence, 0.0);
    assert_eq!(outcome.status, UploadStatus::Ok);
}

#[tokio::test]
async fn test_binary_statement_is_accepted() {
    let h = harness();
    let outcome = h
        .service
        .upload(req(b"%PDF-1.7\n%\xe2\xe3\xcf\xd3\n1 0 obj", "ekstre.pdf").with_doc_type("BANK_STATEMENT"))
        .await
        .unwrap();
    assert_eq!(outcome.record.parse_status, ParseStatus::Ok);
    assert!(outcome
        .parse_summary
        .warnings
        .iter()
        .any(|w| w.contains("binary content")));
    assert_eq!(outcome.time_shield.status, TimeShieldStatus::Warn);
    assert_eq!(outcome.status, UploadStatus::Ok);
}

// =============================================================================
// VALIDATION AND FAILURES
// =============================================================================

#[tokio::test]
async fn test_invalid_requests_store_nothing() {
    let h = harness();
    let service = &h.service;

    let bad = [
        service
            .upload(UploadRequest::new("T1", "C1", "2025-Q5", MIZAN_NO_DATES, "m.csv", "alice"))
            .await,
        service
            .upload(UploadRequest::new("", "C1", "2025-Q2", MIZAN_NO_DATES, "m.csv", "alice"))
            .await,
        service
            .upload(UploadRequest::new("../T1", "C1", "2025-Q2", MIZAN_NO_DATES, "m.csv", "alice"))
            .await,
        service.upload(req(b"", "empty.csv")).await,
        service.upload(req(MIZAN_NO_DATES, "m.csv").with_doc_type("BALANCE_SHEET")).await,
        service
            .upload(UploadRequest::new("T1", "C1", "2025-Q2", MIZAN_NO_DATES, "m.csv", " "))
            .await,
    ];
    for result in bad {
        assert!(matches!(result, Err(Error::Validation(_))), "got {result:?}");
    }

    assert_eq!(h.repo.record_count(), 0);
    assert!(h.repo.all_events().is_empty());
    assert_eq!(count_files(h.dir.path()), 0);
}

#[tokio::test]
async fn test_oversized_upload_is_rejected() {
    let dir = TempDir::new().unwrap();
    let service = IngestService::new(
        Arc::new(InMemoryUploadRepository::new()),
        ContentStore::new(FilesystemBackend::new(dir.path())),
    )
    .with_max_upload_bytes(16);

    let result = service.upload(req(MIZAN_NO_DATES, "m.csv")).await;
    assert!(matches!(result, Err(Error::Validation(_))));
}

#[tokio::test]
async fn test_override_and_lookup_errors() {
    let h = harness();
    let missing = Uuid::now_v7();
    assert!(matches!(
        h.service.override_doc_type(missing, "MIZAN", "r", "a").await,
        Err(Error::UploadNotFound(id)) if id == missing
    ));
    assert!(matches!(
        h.service.get_document(missing).await,
        Err(Error::UploadNotFound(_))
    ));

    let up = h.service.upload(req(MIZAN_NO_DATES, "m.csv")).await.unwrap();
    assert!(matches!(
        h.service.override_doc_type(up.record.id, "NOPE", "r", "a").await,
        Err(Error::Validation(_))
    ));
    assert!(matches!(
        h.service.override_doc_type(up.record.id, "OTHER", "", "a").await,
        Err(Error::Validation(_))
    ));
}

/// Fails every write; remembers what it was asked to delete.
#[derive(Clone, Default)]
struct BrokenStorage {
    deleted: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl StorageBackend for BrokenStorage {
    async fn write(&self, _path: &str, _data: &[u8]) -> Result<()> {
        Err(Error::Storage("disk full".to_string()))
    }
    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        Err(Error::Storage(format!("no such object: {}", path)))
    }
    async fn delete(&self, path: &str) -> Result<()> {
        self.deleted.lock().unwrap().push(path.to_string());
        Ok(())
    }
    async fn exists(&self, _path: &str) -> Result<bool> {
        Ok(false)
    }
}

#[tokio::test]
async fn test_storage_failure_leaves_no_record() {
    let repo = InMemoryUploadRepository::new();
    let storage = BrokenStorage::default();
    let service = IngestService::new(Arc::new(repo.clone()), ContentStore::new(storage.clone()));

    let result = service.upload(req(MIZAN_NO_DATES, "m.csv")).await;
    assert!(matches!(result, Err(Error::Storage(_))));
    assert_eq!(repo.record_count(), 0);
    assert!(repo.all_events().is_empty());

    // Whatever the backend half-wrote is cleaned up
    let deleted = storage.deleted.lock().unwrap().clone();
    assert_eq!(deleted.len(), 1);
    assert!(deleted[0].starts_with("T1/C1/2025-Q2/MIZAN/"));
    assert!(deleted[0].ends_with("/m.csv"));
}

/// Delegates to the in-memory repository but refuses every insert.
struct InsertFailsRepository {
    inner: InMemoryUploadRepository,
}

#[async_trait]
impl UploadRepository for InsertFailsRepository {
    async fn find_active_by_hash(&self, scope: &Scope, hash: &str) -> Result<Option<UploadRecord>> {
        self.inner.find_active_by_hash(scope, hash).await
    }
    async fn insert_with_events(
        &self,
        _record: UploadRecord,
        _events: Vec<AuditEvent>,
    ) -> Result<UploadRecord> {
        Err(Error::Internal("connection reset".to_string()))
    }
    async fn append_event(&self, event: AuditEvent) -> Result<()> {
        self.inner.append_event(event).await
    }
    async fn get(&self, id: Uuid) -> Result<Option<UploadRecord>> {
        self.inner.get(id).await
    }
    async fn list(&self, req: ListDocumentsRequest) -> Result<Vec<UploadRecord>> {
        self.inner.list(req).await
    }
    async fn override_doc_type(
        &self,
        id: Uuid,
        new_type: DocType,
        reason: &str,
        actor: &str,
    ) -> Result<UploadRecord> {
        self.inner.override_doc_type(id, new_type, reason, actor).await
    }
    async fn retire(&self, id: Uuid, reason: &str, actor: &str) -> Result<UploadRecord> {
        self.inner.retire(id, reason, actor).await
    }
    async fn active_doc_types(&self, scope: &Scope) -> Result<BTreeSet<DocType>> {
        self.inner.active_doc_types(scope).await
    }
    async fn list_events(&self, scope: &Scope) -> Result<Vec<AuditEvent>> {
        self.inner.list_events(scope).await
    }
    async fn events_for_upload(&self, upload_id: Uuid) -> Result<Vec<AuditEvent>> {
        self.inner.events_for_upload(upload_id).await
    }
}

#[tokio::test]
async fn test_failed_insert_removes_stored_bytes() {
    let dir = TempDir::new().unwrap();
    let service = IngestService::new(
        Arc::new(InsertFailsRepository {
            inner: InMemoryUploadRepository::new(),
        }),
        ContentStore::new(FilesystemBackend::new(dir.path())),
    );

    let result = service.upload(req(MIZAN_NO_DATES, "m.csv")).await;
    assert!(matches!(result, Err(Error::Internal(_))));
    assert_eq!(count_files(dir.path()), 0);
}

// =============================================================================
// OUTPUT SHAPE
// =============================================================================

#[tokio::test]
async fn test_evidence_ref_and_storage_layout() {
    let h = harness();
    let outcome = h.service.upload(req(MIZAN_NO_DATES, "Mizan Q2.csv")).await.unwrap();
    let record = &outcome.record;

    let prefix = format!("evidence://T1/C1/2025-Q2/{}#sha256:", record.id);
    assert!(outcome.evidence_ref.starts_with(&prefix), "{}", outcome.evidence_ref);
    let hex = &outcome.evidence_ref[prefix.len()..];
    assert_eq!(hex.len(), 64);
    assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));

    assert!(record.stored_path.starts_with("T1/C1/2025-Q2/MIZAN/"));
    assert!(record.stored_path.contains(&record.id.to_string()));
    let on_disk = std::fs::read(h.dir.path().join(&record.stored_path)).unwrap();
    assert_eq!(on_disk, MIZAN_NO_DATES);
    assert_eq!(record.size_bytes, MIZAN_NO_DATES.len() as i64);

    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["status"], "OK");
    assert_eq!(json["time_shield"]["status"], "WARN");
    assert_eq!(json["record"]["doc_type"], "MIZAN");
}

#[tokio::test]
async fn test_scope_events_are_in_pipeline_order() {
    let h = harness();
    h.service.upload(req(MIZAN_NO_DATES, "mizan.csv")).await.unwrap();
    h.service.upload(req(MIZAN_NO_DATES, "mizan.csv")).await.unwrap();

    let events = h.service.list_events("T1", "C1", "2025-Q2").await.unwrap();
    assert_eq!(
        actions(&events),
        vec![
            AuditAction::UploadReceived,
            AuditAction::ParseOk,
            AuditAction::TimeShieldWarn,
            AuditAction::UploadDedupeSkip,
        ]
    );
    assert!(events.iter().all(|e| e.actor == "alice"));
}
