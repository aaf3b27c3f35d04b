//! Centralized default constants for defter.
//!
//! **This module is the single source of truth** for shared default values.
//! Crates and the CLI reference these constants instead of defining their own
//! magic numbers. Organized by domain area.

// =============================================================================
// UPLOAD LIMITS
// =============================================================================

/// Maximum accepted upload size in bytes (50 MB).
pub const MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;

/// Maximum length of a tenant or client identifier.
pub const MAX_SCOPE_ID_LEN: usize = 64;

/// Maximum length of a stored filename (bytes).
pub const MAX_FILENAME_LEN: usize = 255;

/// Replacement name when sanitisation leaves nothing behind.
pub const UNNAMED_FILE: &str = "unnamed_file";

// =============================================================================
// CLASSIFIER
// =============================================================================

/// Minimum accumulated score for a classification to be authoritative.
pub const CLASSIFIER_MIN_SCORE: f32 = 1.0;

/// Accumulated score at which confidence saturates at 1.0.
pub const CLASSIFIER_SATURATION_SCORE: f32 = 3.0;

/// Number of leading bytes decoded for keyword matching.
pub const CLASSIFIER_SNIFF_BYTES: usize = 64 * 1024;

/// Confidence recorded when the caller names the document type.
pub const CONFIDENCE_USER_SPECIFIED: f32 = 1.0;

/// Rationale recorded when the caller names the document type.
pub const RATIONALE_USER_SPECIFIED: &str = "user specified";

// =============================================================================
// PARSING
// =============================================================================

/// Parser name reported by the pass-through fallback.
pub const PASSTHROUGH_PARSER_NAME: &str = "passthrough";

/// Parser version reported by the pass-through fallback.
pub const PASSTHROUGH_PARSER_VERSION: &str = "0";

// =============================================================================
// STORAGE
// =============================================================================

/// Default content store root.
pub const STORAGE_PATH: &str = "/var/lib/defter/uploads";

/// Scheme prefix for evidence references.
pub const EVIDENCE_SCHEME: &str = "evidence://";

// =============================================================================
// DATABASE
// =============================================================================

/// Default database URL.
pub const DATABASE_URL: &str = "postgres://localhost/defter";

/// Default maximum number of pooled connections.
pub const DB_MAX_CONNECTIONS: u32 = 10;

/// Default pool acquire timeout in seconds.
pub const DB_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default idle connection timeout in seconds.
pub const DB_IDLE_TIMEOUT_SECS: u64 = 600;
