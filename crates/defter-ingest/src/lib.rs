//! # defter-ingest
//!
//! Ingestion pipeline for financial source documents.
//!
//! This crate provides:
//! - Content-hash deduplication within a tenant/client/period scope
//! - Parser dispatch with failure isolation
//! - The [`IngestService`] orchestrating classify, store, parse, time shield
//!   and audit for every upload
//! - Environment configuration and the `defter` command-line tool
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use defter_ingest::{ContentStore, FilesystemBackend, IngestService, PoolConfig, UploadRequest};
//!
//! let db = defter_db::Database::connect_with_config("postgres://...", PoolConfig::new()).await?;
//! let store = ContentStore::new(FilesystemBackend::new("/var/lib/defter/uploads"));
//! let service = IngestService::new(Arc::new(db.uploads.clone()), store);
//!
//! let outcome = service
//!     .upload(UploadRequest::new("T1", "C1", "2025-Q2", &bytes, "mizan.csv", "alice"))
//!     .await?;
//! println!("{} {}", outcome.status, outcome.evidence_ref);
//! ```

pub mod adapters;
pub mod config;
pub mod dedup;
pub mod parsers;
pub mod pipeline;

// Re-export storage and core types
pub use defter_db::*;

pub use adapters::{scan_dates, DateScanParser};
pub use config::IngestConfig;
pub use dedup::DedupIndex;
pub use parsers::{ParseOutcome, ParserRegistry};
pub use pipeline::{
    evidence_ref, overall_status, parse_doc_type, recorded_status, IngestService, ParseSummary,
    TimeShieldSummary, UploadOutcome, UploadRequest,
};
