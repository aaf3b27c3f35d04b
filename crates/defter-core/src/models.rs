//! Core data models for defter.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::Result;
use crate::file_safety::validate_scope_id;
use crate::period::PeriodId;

// =============================================================================
// DOCUMENT TYPES
// =============================================================================

/// Kind of financial source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocType {
    /// Trial balance export.
    Mizan,
    /// Bank account statement.
    BankStatement,
    /// E-ledger submission receipt (berat).
    LedgerBerat,
    /// E-ledger journal (yevmiye defteri).
    LedgerYevmiye,
    /// E-ledger general ledger (büyük defter / kebir).
    LedgerKebir,
    /// VAT return.
    KdvBeyanname,
    /// Withholding tax return.
    MuhtasarBeyanname,
    /// Tax accrual slip.
    Tahakkuk,
    /// E-invoice listing.
    EfaturaList,
    /// Anything the pipeline cannot place.
    Other,
}

impl DocType {
    /// Every document type, in classifier tie-break order.
    pub const ALL: [DocType; 10] = [
        DocType::Mizan,
        DocType::BankStatement,
        DocType::LedgerBerat,
        DocType::LedgerYevmiye,
        DocType::LedgerKebir,
        DocType::KdvBeyanname,
        DocType::MuhtasarBeyanname,
        DocType::Tahakkuk,
        DocType::EfaturaList,
        DocType::Other,
    ];

    /// Wire name, e.g. `BANK_STATEMENT`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mizan => "MIZAN",
            Self::BankStatement => "BANK_STATEMENT",
            Self::LedgerBerat => "LEDGER_BERAT",
            Self::LedgerYevmiye => "LEDGER_YEVMIYE",
            Self::LedgerKebir => "LEDGER_KEBIR",
            Self::KdvBeyanname => "KDV_BEYANNAME",
            Self::MuhtasarBeyanname => "MUHTASAR_BEYANNAME",
            Self::Tahakkuk => "TAHAKKUK",
            Self::EfaturaList => "EFATURA_LIST",
            Self::Other => "OTHER",
        }
    }

    /// Document family, which decides the shape of parsed metadata.
    pub fn family(&self) -> DocFamily {
        match self {
            Self::Mizan => DocFamily::TrialBalance,
            Self::BankStatement => DocFamily::Bank,
            Self::LedgerBerat | Self::LedgerYevmiye | Self::LedgerKebir => DocFamily::Ledger,
            Self::KdvBeyanname | Self::MuhtasarBeyanname | Self::Tahakkuk => DocFamily::TaxFiling,
            Self::EfaturaList => DocFamily::Invoices,
            Self::Other => DocFamily::Unclassified,
        }
    }
}

impl fmt::Display for DocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        DocType::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| format!("Invalid document type: {}", s))
    }
}

/// Grouping of document types that share a metadata shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocFamily {
    TrialBalance,
    Bank,
    Ledger,
    TaxFiling,
    Invoices,
    Unclassified,
}

// =============================================================================
// STAGE STATUSES
// =============================================================================

/// Outcome reported by a parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParseStatus {
    #[default]
    Ok,
    Warn,
    Error,
    Empty,
}

impl ParseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Empty => "EMPTY",
        }
    }
}

impl fmt::Display for ParseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParseStatus {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "OK" => Ok(Self::Ok),
            "WARN" => Ok(Self::Warn),
            "ERROR" => Ok(Self::Error),
            "EMPTY" => Ok(Self::Empty),
            _ => Err(format!("Invalid parse status: {}", s)),
        }
    }
}

/// Terminal state of the time shield.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeShieldStatus {
    Pass,
    Warn,
    Reject,
}

impl TimeShieldStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Warn => "WARN",
            Self::Reject => "REJECT",
        }
    }
}

impl fmt::Display for TimeShieldStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeShieldStatus {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PASS" => Ok(Self::Pass),
            "WARN" => Ok(Self::Warn),
            "REJECT" => Ok(Self::Reject),
            _ => Err(format!("Invalid time shield status: {}", s)),
        }
    }
}

/// Overall status of one upload call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UploadStatus {
    Ok,
    Warn,
    Error,
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ok => "OK",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        })
    }
}

/// Lifecycle tag of an upload record. Records are retired, never deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RecordState {
    #[default]
    Active,
    Retired,
}

impl RecordState {
    pub fn from_active(is_active: bool) -> Self {
        if is_active {
            Self::Active
        } else {
            Self::Retired
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

// =============================================================================
// SCOPE
// =============================================================================

/// Tenant + client + period: the isolation unit for dedupe and completeness.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    pub tenant_id: String,
    pub client_id: String,
    pub period_id: PeriodId,
}

impl Scope {
    /// Build a scope from raw caller input, validating every component.
    pub fn parse(tenant_id: &str, client_id: &str, period_id: &str) -> Result<Self> {
        validate_scope_id("tenant_id", tenant_id)?;
        validate_scope_id("client_id", client_id)?;
        let period_id: PeriodId = period_id.parse()?;
        Ok(Self {
            tenant_id: tenant_id.to_string(),
            client_id: client_id.to_string(),
            period_id,
        })
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.tenant_id, self.client_id, self.period_id)
    }
}

// =============================================================================
// PARSED METADATA
// =============================================================================

/// Structured metadata produced by a parser, keyed by document family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DocumentMetadata {
    TrialBalance {
        account_count: u64,
    },
    BankStatement {
        #[serde(skip_serializing_if = "Option::is_none")]
        iban: Option<String>,
        transaction_count: u64,
    },
    Ledger {
        entry_count: u64,
    },
    TaxFiling {
        form_code: String,
    },
    Invoices {
        invoice_count: u64,
    },
    /// Free-form fields for documents whose shape is not known.
    Unclassified {
        #[serde(default)]
        fields: BTreeMap<String, JsonValue>,
    },
}

impl DocumentMetadata {
    /// An empty unclassified map.
    pub fn empty() -> Self {
        Self::Unclassified {
            fields: BTreeMap::new(),
        }
    }
}

impl Default for DocumentMetadata {
    fn default() -> Self {
        Self::empty()
    }
}

// =============================================================================
// UPLOAD RECORD
// =============================================================================

/// Durable record of one accepted, non-duplicate upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadRecord {
    pub id: Uuid,
    pub tenant_id: String,
    pub client_id: String,
    pub period_id: PeriodId,
    pub doc_type: DocType,
    pub original_filename: String,
    pub stored_path: String,
    pub size_bytes: i64,
    /// `sha256:{hex}` digest of the uploaded bytes.
    pub content_hash: String,
    pub received_by: String,
    pub parser_name: String,
    pub parser_version: String,
    pub parse_status: ParseStatus,
    pub parse_error: Option<String>,
    pub doc_date_min: Option<NaiveDate>,
    pub doc_date_max: Option<NaiveDate>,
    pub time_shield_status: TimeShieldStatus,
    pub time_shield_reason: String,
    pub classification_confidence: f32,
    pub user_doc_type_override: Option<DocType>,
    pub override_reason: Option<String>,
    pub metadata: DocumentMetadata,
    pub state: RecordState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UploadRecord {
    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    pub fn scope(&self) -> Scope {
        Scope {
            tenant_id: self.tenant_id.clone(),
            client_id: self.client_id.clone(),
            period_id: self.period_id,
        }
    }

    pub fn in_scope(&self, scope: &Scope) -> bool {
        self.tenant_id == scope.tenant_id
            && self.client_id == scope.client_id
            && self.period_id == scope.period_id
    }
}

/// Filter for listing upload records.
#[derive(Debug, Clone)]
pub struct ListDocumentsRequest {
    pub scope: Scope,
    pub doc_type: Option<DocType>,
    /// Include retired records (default: active only).
    pub include_retired: bool,
}

impl ListDocumentsRequest {
    pub fn new(scope: Scope) -> Self {
        Self {
            scope,
            doc_type: None,
            include_retired: false,
        }
    }

    pub fn with_doc_type(mut self, doc_type: Option<DocType>) -> Self {
        self.doc_type = doc_type;
        self
    }

    pub fn including_retired(mut self) -> Self {
        self.include_retired = true;
        self
    }
}

// =============================================================================
// AUDIT LOG
// =============================================================================

/// Pipeline milestone recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    UploadReceived,
    UploadDedupeSkip,
    ParseOk,
    ParseWarn,
    ParseError,
    TimeShieldPass,
    TimeShieldWarn,
    TimeShieldReject,
    OverrideDocType,
    UploadRetired,
}

impl AuditAction {
    pub const ALL: [AuditAction; 10] = [
        AuditAction::UploadReceived,
        AuditAction::UploadDedupeSkip,
        AuditAction::ParseOk,
        AuditAction::ParseWarn,
        AuditAction::ParseError,
        AuditAction::TimeShieldPass,
        AuditAction::TimeShieldWarn,
        AuditAction::TimeShieldReject,
        AuditAction::OverrideDocType,
        AuditAction::UploadRetired,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UploadReceived => "UPLOAD_RECEIVED",
            Self::UploadDedupeSkip => "UPLOAD_DEDUPE_SKIP",
            Self::ParseOk => "PARSE_OK",
            Self::ParseWarn => "PARSE_WARN",
            Self::ParseError => "PARSE_ERROR",
            Self::TimeShieldPass => "TIME_SHIELD_PASS",
            Self::TimeShieldWarn => "TIME_SHIELD_WARN",
            Self::TimeShieldReject => "TIME_SHIELD_REJECT",
            Self::OverrideDocType => "OVERRIDE_DOC_TYPE",
            Self::UploadRetired => "UPLOAD_RETIRED",
        }
    }

    /// Audit action for a parse outcome. EMPTY is logged as a warning.
    pub fn for_parse(status: ParseStatus) -> Self {
        match status {
            ParseStatus::Ok => Self::ParseOk,
            ParseStatus::Warn | ParseStatus::Empty => Self::ParseWarn,
            ParseStatus::Error => Self::ParseError,
        }
    }

    pub fn for_time_shield(status: TimeShieldStatus) -> Self {
        match status {
            TimeShieldStatus::Pass => Self::TimeShieldPass,
            TimeShieldStatus::Warn => Self::TimeShieldWarn,
            TimeShieldStatus::Reject => Self::TimeShieldReject,
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        AuditAction::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| format!("Invalid audit action: {}", s))
    }
}

/// One immutable entry in the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub tenant_id: String,
    pub client_id: String,
    pub period_id: PeriodId,
    pub actor: String,
    pub action: AuditAction,
    pub upload_id: Option<Uuid>,
    pub details: JsonValue,
    pub created_at: DateTime<Utc>,
}

impl AuditEvent {
    /// Create a new event stamped now.
    pub fn new(
        scope: &Scope,
        actor: &str,
        action: AuditAction,
        upload_id: Option<Uuid>,
        details: JsonValue,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            tenant_id: scope.tenant_id.clone(),
            client_id: scope.client_id.clone(),
            period_id: scope.period_id,
            actor: actor.to_string(),
            action,
            upload_id,
            details,
            created_at: Utc::now(),
        }
    }
}
