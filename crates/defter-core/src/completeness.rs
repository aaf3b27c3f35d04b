//! Period completeness: which required and optional documents are present.
//!
//! Stateless. The evaluator receives the set of document types among active
//! records of a scope and derives the gaps, the downstream checks they block,
//! and one remediation action per missing required type.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::{DocType, Scope};
use crate::period::PeriodId;

/// Risk of leaving a gap unresolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        })
    }
}

/// A downstream check that cannot run without a required document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedCheck {
    pub check: String,
    pub blocked_by: DocType,
}

/// Suggested step to close one gap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemediationAction {
    pub doc_type: DocType,
    pub action: String,
    pub effort_minutes: u32,
    pub risk: RiskLevel,
}

/// Requirement rule for one required document type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub doc_type: DocType,
    pub blocks: Vec<&'static str>,
    pub action: &'static str,
    pub effort_minutes: u32,
    pub risk: RiskLevel,
}

/// Derived, non-persisted completeness view for a period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodCompleteness {
    pub tenant_id: String,
    pub client_id: String,
    pub period_id: PeriodId,
    pub required: Vec<DocType>,
    pub optional: Vec<DocType>,
    pub present: Vec<DocType>,
    pub missing_required: Vec<DocType>,
    pub missing_optional: Vec<DocType>,
    pub is_complete: bool,
    pub blocked_checks: Vec<BlockedCheck>,
    pub rationale: String,
    pub remediation: Vec<RemediationAction>,
}

/// The completeness evaluator.
#[derive(Debug, Clone)]
pub struct CompletenessEvaluator {
    requirements: Vec<Requirement>,
    optional: BTreeSet<DocType>,
}

impl CompletenessEvaluator {
    /// Evaluator with the built-in quarterly requirements.
    pub fn new() -> Self {
        let requirements = vec![
            Requirement {
                doc_type: DocType::Mizan,
                blocks: vec!["kdv_reconciliation", "balance_sheet_consistency"],
                action: "Export the quarter-end trial balance (mizan) from the accounting package and upload it",
                effort_minutes: 15,
                risk: RiskLevel::High,
            },
            Requirement {
                doc_type: DocType::BankStatement,
                blocks: vec!["bank_reconciliation", "cash_flow_check"],
                action: "Request the bank statement covering the full quarter for every account and upload it",
                effort_minutes: 30,
                risk: RiskLevel::Medium,
            },
        ];
        let required: BTreeSet<DocType> = requirements.iter().map(|r| r.doc_type).collect();
        let optional = DocType::ALL
            .into_iter()
            .filter(|t| *t != DocType::Other && !required.contains(t))
            .collect();
        Self {
            requirements,
            optional,
        }
    }

    /// Evaluator with custom requirement rules and optional set.
    pub fn with_rules(requirements: Vec<Requirement>, optional: BTreeSet<DocType>) -> Self {
        let required: BTreeSet<DocType> = requirements.iter().map(|r| r.doc_type).collect();
        Self {
            requirements,
            optional: optional.difference(&required).copied().collect(),
        }
    }

    pub fn required(&self) -> BTreeSet<DocType> {
        self.requirements.iter().map(|r| r.doc_type).collect()
    }

    pub fn optional(&self) -> &BTreeSet<DocType> {
        &self.optional
    }

    /// Evaluate the document types present among active records of a scope.
    pub fn evaluate(&self, scope: &Scope, present: &BTreeSet<DocType>) -> PeriodCompleteness {
        let required = self.required();

        let missing_required: Vec<DocType> = required.difference(present).copied().collect();
        let missing_optional: Vec<DocType> = self.optional.difference(present).copied().collect();

        let mut blocked_checks = Vec::new();
        let mut remediation = Vec::new();
        for rule in &self.requirements {
            if present.contains(&rule.doc_type) {
                continue;
            }
            blocked_checks.extend(rule.blocks.iter().map(|check| BlockedCheck {
                check: (*check).to_string(),
                blocked_by: rule.doc_type,
            }));
            remediation.push(RemediationAction {
                doc_type: rule.doc_type,
                action: rule.action.to_string(),
                effort_minutes: rule.effort_minutes,
                risk: rule.risk,
            });
        }

        let rationale = if missing_required.is_empty() {
            format!(
                "all required documents present for {} ({})",
                scope.period_id,
                join_types(&required.iter().copied().collect::<Vec<_>>())
            )
        } else {
            let parts: Vec<String> = self
                .requirements
                .iter()
                .filter(|r| !present.contains(&r.doc_type))
                .map(|r| format!("missing {} blocks {}", r.doc_type, r.blocks.join(", ")))
                .collect();
            parts.join("; ")
        };

        PeriodCompleteness {
            tenant_id: scope.tenant_id.clone(),
            client_id: scope.client_id.clone(),
            period_id: scope.period_id,
            required: required.iter().copied().collect(),
            optional: self.optional.iter().copied().collect(),
            present: present.iter().copied().collect(),
            is_complete: missing_required.is_empty(),
            missing_required,
            missing_optional,
            blocked_checks,
            rationale,
            remediation,
        }
    }
}

impl Default for CompletenessEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

fn join_types(types: &[DocType]) -> String {
    types
        .iter()
        .map(DocType::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> Scope {
        Scope::parse("T1", "C1", "2025-Q2").unwrap()
    }

    fn set(types: &[DocType]) -> BTreeSet<DocType> {
        types.iter().copied().collect()
    }

    #[test]
    fn test_empty_period_is_incomplete() {
        let eval = CompletenessEvaluator::new();
        let result = eval.evaluate(&scope(), &BTreeSet::new());
        assert!(!result.is_complete);
        assert_eq!(result.missing_required, vec![DocType::Mizan, DocType::BankStatement]);
        assert_eq!(result.remediation.len(), 2);
        assert!(result.rationale.contains("missing MIZAN blocks kdv_reconciliation"));
        assert!(result.rationale.contains("missing BANK_STATEMENT blocks bank_reconciliation"));
        assert_eq!(result.blocked_checks.len(), 4);
    }

    #[test]
    fn test_required_present_is_complete() {
        let eval = CompletenessEvaluator::new();
        let result = eval.evaluate(&scope(), &set(&[DocType::Mizan, DocType::BankStatement]));
        assert!(result.is_complete);
        assert!(result.missing_required.is_empty());
        assert!(result.remediation.is_empty());
        assert!(result.blocked_checks.is_empty());
        assert!(result.missing_optional.contains(&DocType::KdvBeyanname));
    }

    #[test]
    fn test_remediation_carries_effort_and_risk() {
        let eval = CompletenessEvaluator::new();
        let result = eval.evaluate(&scope(), &set(&[DocType::BankStatement]));
        assert_eq!(result.remediation.len(), 1);
        let action = &result.remediation[0];
        assert_eq!(action.doc_type, DocType::Mizan);
        assert_eq!(action.risk, RiskLevel::High);
        assert!(action.effort_minutes > 0);
    }

    #[test]
    fn test_optional_set_excludes_required_and_other() {
        let eval = CompletenessEvaluator::new();
        assert!(!eval.optional().contains(&DocType::Mizan));
        assert!(!eval.optional().contains(&DocType::Other));
        assert!(eval.optional().contains(&DocType::LedgerBerat));
    }

    #[test]
    fn test_adding_required_type_is_monotonic() {
        let eval = CompletenessEvaluator::new();
        let required: Vec<DocType> = eval.required().into_iter().collect();

        // Every order of adding required types, starting from every optional-only base
        for base in [vec![], vec![DocType::KdvBeyanname], vec![DocType::Other, DocType::Tahakkuk]] {
            for order in [required.clone(), required.iter().rev().copied().collect()] {
                let mut present = set(&base);
                let mut previous = eval.evaluate(&scope(), &present);
                for t in order {
                    present.insert(t);
                    let next = eval.evaluate(&scope(), &present);
                    let mut expected = previous.missing_required.clone();
                    expected.retain(|m| *m != t);
                    assert_eq!(next.missing_required, expected);
                    assert!(!previous.is_complete || next.is_complete);
                    previous = next;
                }
                assert!(previous.is_complete);
            }
        }
    }

    #[test]
    fn test_evaluation_is_repeatable() {
        let eval = CompletenessEvaluator::new();
        let present = set(&[DocType::Mizan]);
        assert_eq!(eval.evaluate(&scope(), &present), eval.evaluate(&scope(), &present));
    }

    #[test]
    fn test_custom_rules() {
        let eval = CompletenessEvaluator::with_rules(
            vec![Requirement {
                doc_type: DocType::KdvBeyanname,
                blocks: vec!["vat_filing_check"],
                action: "Upload the VAT return",
                effort_minutes: 10,
                risk: RiskLevel::High,
            }],
            set(&[DocType::KdvBeyanname, DocType::Tahakkuk]),
        );
        let result = eval.evaluate(&scope(), &BTreeSet::new());
        assert_eq!(result.missing_required, vec![DocType::KdvBeyanname]);
        assert_eq!(result.optional, vec![DocType::Tahakkuk]);
    }
}
