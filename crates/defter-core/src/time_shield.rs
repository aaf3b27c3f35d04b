//! Time Shield: per-type temporal policy over extracted document dates.

use std::collections::HashMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::{DocType, TimeShieldStatus};
use crate::period::PeriodId;

/// How strictly a document type's dates are held to the declared period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Strictness {
    /// Out-of-period dates reject the upload.
    Hard,
    /// Out-of-period dates are flagged but accepted.
    Warn,
}

impl fmt::Display for Strictness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Hard => "HARD",
            Self::Warn => "WARN",
        })
    }
}

/// Strictness per document type.
///
/// Filings and e-ledger artefacts are period-bound by law and default to
/// `Hard`. Working documents that routinely straddle a quarter default to
/// `Warn`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyTable {
    overrides: HashMap<DocType, Strictness>,
}

impl PolicyTable {
    pub fn new() -> Self {
        Self {
            overrides: HashMap::new(),
        }
    }

    /// Replace the strictness for one type.
    pub fn with_override(mut self, doc_type: DocType, strictness: Strictness) -> Self {
        self.overrides.insert(doc_type, strictness);
        self
    }

    pub fn strictness(&self, doc_type: DocType) -> Strictness {
        self.overrides
            .get(&doc_type)
            .copied()
            .unwrap_or_else(|| Self::builtin_strictness(doc_type))
    }

    fn builtin_strictness(doc_type: DocType) -> Strictness {
        match doc_type {
            DocType::LedgerBerat
            | DocType::LedgerYevmiye
            | DocType::LedgerKebir
            | DocType::KdvBeyanname
            | DocType::MuhtasarBeyanname
            | DocType::Tahakkuk => Strictness::Hard,
            DocType::Mizan | DocType::BankStatement | DocType::EfaturaList | DocType::Other => {
                Strictness::Warn
            }
        }
    }
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Why the shield reached its verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictKind {
    InRange,
    Unextractable,
    OutOfRange,
}

/// Terminal verdict of the time shield for one upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeShieldVerdict {
    pub status: TimeShieldStatus,
    pub kind: VerdictKind,
    pub strictness: Strictness,
    pub reason: String,
}

impl TimeShieldVerdict {
    pub fn is_reject(&self) -> bool {
        self.status == TimeShieldStatus::Reject
    }

    /// A WARN caused by out-of-period dates, as opposed to missing dates.
    pub fn is_out_of_range_warning(&self) -> bool {
        self.status == TimeShieldStatus::Warn && self.kind == VerdictKind::OutOfRange
    }
}

/// The temporal validator.
#[derive(Debug, Clone, Default)]
pub struct TimeShield {
    policies: PolicyTable,
}

impl TimeShield {
    pub fn new(policies: PolicyTable) -> Self {
        Self { policies }
    }

    pub fn policies(&self) -> &PolicyTable {
        &self.policies
    }

    /// Evaluate extracted date bounds against a period.
    ///
    /// A single present bound stands for both ends. The range passes only when
    /// it lies entirely inside the period; partial overlap counts as outside.
    pub fn evaluate(
        &self,
        doc_type: DocType,
        period: PeriodId,
        doc_date_min: Option<NaiveDate>,
        doc_date_max: Option<NaiveDate>,
    ) -> TimeShieldVerdict {
        let strictness = self.policies.strictness(doc_type);

        let (min, max) = match (doc_date_min, doc_date_max) {
            (None, None) => {
                return self.finish(
                    doc_type,
                    TimeShieldVerdict {
                        status: TimeShieldStatus::Warn,
                        kind: VerdictKind::Unextractable,
                        strictness,
                        reason: format!(
                            "date unextractable; period {} is {}",
                            period,
                            period.range_label()
                        ),
                    },
                );
            }
            (Some(a), None) | (None, Some(a)) => (a, a),
            (Some(a), Some(b)) if a <= b => (a, b),
            (Some(a), Some(b)) => (b, a),
        };

        let document_range = format!("{}..{}", min, max);
        let verdict = if period.contains(min) && period.contains(max) {
            TimeShieldVerdict {
                status: TimeShieldStatus::Pass,
                kind: VerdictKind::InRange,
                strictness,
                reason: format!(
                    "document dates {} within period {} ({})",
                    document_range,
                    period,
                    period.range_label()
                ),
            }
        } else {
            let status = match strictness {
                Strictness::Hard => TimeShieldStatus::Reject,
                Strictness::Warn => TimeShieldStatus::Warn,
            };
            TimeShieldVerdict {
                status,
                kind: VerdictKind::OutOfRange,
                strictness,
                reason: format!(
                    "document dates {} outside period {} ({}); {} policy for {}",
                    document_range,
                    period,
                    period.range_label(),
                    strictness,
                    doc_type
                ),
            }
        };
        self.finish(doc_type, verdict)
    }

    fn finish(&self, doc_type: DocType, verdict: TimeShieldVerdict) -> TimeShieldVerdict {
        debug!(
            subsystem = "core",
            component = "time_shield",
            op = "evaluate",
            doc_type = %doc_type,
            status = %verdict.status,
            reason = %verdict.reason,
            "Time shield verdict"
        );
        verdict
    }
}
