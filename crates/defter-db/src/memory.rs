//! In-process [`UploadRepository`] for tests and single-node tooling.
//!
//! Mirrors the PostgreSQL semantics: record and events are committed under one
//! lock, and inserting a second active record with the same content hash in a
//! scope fails with [`Error::Conflict`], like the partial unique index.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use uuid::Uuid;

use defter_core::{
    AuditEvent, DocType, Error, ListDocumentsRequest, Result, Scope, UploadRecord,
    UploadRepository,
};

use crate::uploads::{apply_override, apply_retire};

#[derive(Default)]
struct State {
    /// Insertion order; listing sorts by `created_at`.
    records: Vec<UploadRecord>,
    /// Append order is the audit order.
    events: Vec<AuditEvent>,
}

/// Mutex-guarded in-memory repository.
#[derive(Clone, Default)]
pub struct InMemoryUploadRepository {
    state: Arc<Mutex<State>>,
}

impl InMemoryUploadRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| Error::Internal("upload repository lock poisoned".to_string()))
    }

    /// Number of records, active or retired.
    pub fn record_count(&self) -> usize {
        self.lock().map(|s| s.records.len()).unwrap_or(0)
    }

    /// Snapshot of every event, in append order.
    pub fn all_events(&self) -> Vec<AuditEvent> {
        self.lock().map(|s| s.events.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl UploadRepository for InMemoryUploadRepository {
    async fn find_active_by_hash(
        &self,
        scope: &Scope,
        content_hash: &str,
    ) -> Result<Option<UploadRecord>> {
        let state = self.lock()?;
        Ok(state
            .records
            .iter()
            .find(|r| r.is_active() && r.in_scope(scope) && r.content_hash == content_hash)
            .cloned())
    }

    async fn insert_with_events(
        &self,
        record: UploadRecord,
        events: Vec<AuditEvent>,
    ) -> Result<UploadRecord> {
        let mut state = self.lock()?;
        let scope = record.scope();
        if record.is_active()
            && state.records.iter().any(|r| {
                r.is_active() && r.in_scope(&scope) && r.content_hash == record.content_hash
            })
        {
            return Err(Error::Conflict(format!(
                "content {} already stored in {}",
                record.content_hash, scope
            )));
        }
        if state.records.iter().any(|r| r.id == record.id) {
            return Err(Error::Conflict(format!("upload {} already exists", record.id)));
        }
        state.records.push(record.clone());
        state.events.extend(events);
        Ok(record)
    }

    async fn append_event(&self, event: AuditEvent) -> Result<()> {
        self.lock()?.events.push(event);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<UploadRecord>> {
        let state = self.lock()?;
        Ok(state.records.iter().find(|r| r.id == id).cloned())
    }

    async fn list(&self, req: ListDocumentsRequest) -> Result<Vec<UploadRecord>> {
        let state = self.lock()?;
        let mut records: Vec<(usize, UploadRecord)> = state
            .records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.in_scope(&req.scope))
            .filter(|(_, r)| req.include_retired || r.is_active())
            .filter(|(_, r)| req.doc_type.map_or(true, |t| r.doc_type == t))
            .map(|(i, r)| (i, r.clone()))
            .collect();
        // Most recent first; insertion order breaks timestamp ties
        records.sort_by(|(ia, a), (ib, b)| b.created_at.cmp(&a.created_at).then(ib.cmp(ia)));
        Ok(records.into_iter().map(|(_, r)| r).collect())
    }

    async fn override_doc_type(
        &self,
        id: Uuid,
        new_type: DocType,
        reason: &str,
        actor: &str,
    ) -> Result<UploadRecord> {
        let mut state = self.lock()?;
        let idx = state
            .records
            .iter()
            .position(|r| r.id == id)
            .ok_or(Error::UploadNotFound(id))?;
        let (updated, event) = apply_override(state.records[idx].clone(), new_type, reason, actor)?;
        state.records[idx] = updated.clone();
        state.events.push(event);
        Ok(updated)
    }

    async fn retire(&self, id: Uuid, reason: &str, actor: &str) -> Result<UploadRecord> {
        let mut state = self.lock()?;
        let idx = state
            .records
            .iter()
            .position(|r| r.id == id)
            .ok_or(Error::UploadNotFound(id))?;
        let (updated, event) = apply_retire(state.records[idx].clone(), reason, actor)?;
        state.records[idx] = updated.clone();
        state.events.push(event);
        Ok(updated)
    }

    async fn active_doc_types(&self, scope: &Scope) -> Result<BTreeSet<DocType>> {
        let state = self.lock()?;
        Ok(state
            .records
            .iter()
            .filter(|r| r.is_active() && r.in_scope(scope))
            .map(|r| r.doc_type)
            .collect())
    }

    async fn list_events(&self, scope: &Scope) -> Result<Vec<AuditEvent>> {
        let state = self.lock()?;
        Ok(state
            .events
            .iter()
            .filter(|e| {
                e.tenant_id == scope.tenant_id
                    && e.client_id == scope.client_id
                    && e.period_id == scope.period_id
            })
            .cloned()
            .collect())
    }

    async fn events_for_upload(&self, upload_id: Uuid) -> Result<Vec<AuditEvent>> {
        let state = self.lock()?;
        Ok(state
            .events
            .iter()
            .filter(|e| e.upload_id == Some(upload_id))
            .cloned()
            .collect())
    }
}
