//! # defter-core
//!
//! Core types, policies, and traits for the defter document ingestion
//! pipeline.
//!
//! Everything here is free of I/O: the classifier, the time shield and the
//! completeness evaluator are pure functions over their inputs. Storage and
//! orchestration live in `defter-db` and `defter-ingest`.

pub mod classifier;
pub mod completeness;
pub mod defaults;
pub mod error;
pub mod file_safety;
pub mod models;
pub mod period;
pub mod time_shield;
pub mod traits;

// Re-export commonly used types at crate root
pub use classifier::{Classification, FormatClassifier, Signal, SignalSource, SignalTable};
pub use completeness::{
    BlockedCheck, CompletenessEvaluator, PeriodCompleteness, RemediationAction, Requirement,
    RiskLevel,
};
pub use error::{Error, Result};
pub use file_safety::{sanitize_filename, validate_scope_id, validate_upload_size};
pub use models::*;
pub use period::PeriodId;
pub use time_shield::{PolicyTable, Strictness, TimeShield, TimeShieldVerdict, VerdictKind};
pub use traits::*;
