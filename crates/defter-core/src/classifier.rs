//! Format Detective: heuristic document-type classification.
//!
//! Scores every candidate type by summing the weights of the signals it
//! matches. Filename signals are matched against the lower-cased filename,
//! content signals against the lower-cased leading window of the decoded
//! bytes. Each pattern counts once no matter how often it occurs. The highest
//! score wins; ties go to the type listed first in the table.
//!
//! Weights live in [`SignalTable`] so they can be tuned and tested separately
//! from the scoring loop.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::defaults::{
    CLASSIFIER_MIN_SCORE, CLASSIFIER_SATURATION_SCORE, CLASSIFIER_SNIFF_BYTES,
    CONFIDENCE_USER_SPECIFIED, RATIONALE_USER_SPECIFIED,
};
use crate::models::DocType;

/// Where a signal is looked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    Filename,
    Content,
}

impl SignalSource {
    fn label(&self) -> &'static str {
        match self {
            Self::Filename => "filename",
            Self::Content => "content",
        }
    }
}

/// One weighted substring signal. Patterns are stored lower-case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub source: SignalSource,
    pub pattern: String,
    pub weight: f32,
}

impl Signal {
    pub fn filename(pattern: &str, weight: f32) -> Self {
        Self {
            source: SignalSource::Filename,
            pattern: fold_case(pattern),
            weight,
        }
    }

    pub fn content(pattern: &str, weight: f32) -> Self {
        Self {
            source: SignalSource::Content,
            pattern: fold_case(pattern),
            weight,
        }
    }
}

/// Data table mapping each document type to its signals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalTable {
    entries: Vec<(DocType, Vec<Signal>)>,
}

impl SignalTable {
    /// An empty table.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Add signals for a type, appending to any already present.
    pub fn with(mut self, doc_type: DocType, signals: Vec<Signal>) -> Self {
        if let Some((_, existing)) = self.entries.iter_mut().find(|(t, _)| *t == doc_type) {
            existing.extend(signals);
        } else {
            self.entries.push((doc_type, signals));
        }
        self
    }

    pub fn signals_for(&self, doc_type: DocType) -> &[Signal] {
        self.entries
            .iter()
            .find(|(t, _)| *t == doc_type)
            .map(|(_, s)| s.as_slice())
            .unwrap_or(&[])
    }

    pub fn entries(&self) -> &[(DocType, Vec<Signal>)] {
        &self.entries
    }

    /// The built-in weights for Turkish accounting documents.
    pub fn builtin() -> Self {
        use Signal as S;
        Self::new()
            .with(
                DocType::Mizan,
                vec![
                    S::filename("mizan", 1.0),
                    S::filename("trial_balance", 0.8),
                    S::filename("trial-balance", 0.8),
                    S::content("mizan", 0.6),
                    S::content("trial balance", 0.6),
                    S::content("borç bakiye", 0.5),
                    S::content("alacak bakiye", 0.5),
                    S::content("hesap kodu", 0.3),
                    S::content("borç toplamı", 0.3),
                ],
            )
            .with(
                DocType::BankStatement,
                vec![
                    S::filename("ekstre", 0.8),
                    S::filename("statement", 0.8),
                    S::filename("hesap_hareket", 0.8),
                    S::filename("banka", 0.6),
                    S::content("hesap hareketleri", 0.6),
                    S::content("account statement", 0.6),
                    S::content("iban", 0.5),
                    S::content("devreden bakiye", 0.4),
                    S::content("opening balance", 0.4),
                    S::content("valör", 0.4),
                ],
            )
            .with(
                DocType::LedgerBerat,
                vec![
                    S::filename("berat", 1.0),
                    S::content("<edefter:berat", 1.2),
                    S::content("berat", 0.4),
                    S::content("e-defter", 0.2),
                ],
            )
            .with(
                DocType::LedgerYevmiye,
                vec![
                    S::filename("yevmiye", 1.0),
                    S::content("yevmiye", 0.6),
                    S::content("<edefter:defter", 0.5),
                    S::content("gl-cor:entryheader", 0.4),
                    S::content("xbrli", 0.2),
                ],
            )
            .with(
                DocType::LedgerKebir,
                vec![
                    S::filename("kebir", 1.0),
                    S::filename("buyuk_defter", 0.8),
                    S::content("kebir", 0.6),
                    S::content("büyük defter", 0.6),
                    S::content("<edefter:defter", 0.4),
                ],
            )
            .with(
                DocType::KdvBeyanname,
                vec![
                    S::filename("kdv", 0.8),
                    S::filename("beyanname", 0.4),
                    S::content("katma değer vergisi", 0.8),
                    S::content("kdv beyannamesi", 0.8),
                    S::content("kdv1", 0.4),
                    S::content("<beyanname", 0.3),
                ],
            )
            .with(
                DocType::MuhtasarBeyanname,
                vec![
                    S::filename("muhtasar", 1.0),
                    S::filename("beyanname", 0.4),
                    S::content("muhtasar", 0.8),
                    S::content("stopaj", 0.4),
                    S::content("<beyanname", 0.3),
                ],
            )
            .with(
                DocType::Tahakkuk,
                vec![
                    S::filename("tahakkuk", 1.0),
                    S::content("tahakkuk fişi", 0.8),
                    S::content("tahakkuk", 0.4),
                    S::content("vergi dairesi", 0.2),
                ],
            )
            .with(
                DocType::EfaturaList,
                vec![
                    S::filename("efatura", 1.0),
                    S::filename("e-fatura", 1.0),
                    S::filename("fatura", 0.6),
                    S::filename("invoice", 0.6),
                    S::content("<invoice", 1.0),
                    S::content("urn:oasis:names:specification:ubl", 0.6),
                    S::content("fatura no", 0.4),
                    S::content("ettn", 0.4),
                ],
            )
    }
}

impl Default for SignalTable {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Accumulated score for one candidate type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    pub doc_type: DocType,
    pub score: f32,
    pub matched: Vec<String>,
}

/// Classifier verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub doc_type: DocType,
    /// Confidence in `[0, 1]`.
    pub confidence: f32,
    pub rationale: String,
    /// Below the minimum score: advisory only.
    pub low_confidence: bool,
    /// The caller named the type; the classifier did not run.
    pub user_specified: bool,
    /// MIME type sniffed from magic bytes, when recognisable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected_mime: Option<String>,
    /// Candidates with a non-zero score, best first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<CandidateScore>,
}

impl Classification {
    /// Verdict for a caller-supplied document type.
    pub fn user_specified(doc_type: DocType) -> Self {
        Self {
            doc_type,
            confidence: CONFIDENCE_USER_SPECIFIED,
            rationale: RATIONALE_USER_SPECIFIED.to_string(),
            low_confidence: false,
            user_specified: true,
            detected_mime: None,
            candidates: Vec::new(),
        }
    }
}

/// The Format Detective.
#[derive(Debug, Clone)]
pub struct FormatClassifier {
    table: SignalTable,
    min_score: f32,
    saturation_score: f32,
    sniff_bytes: usize,
}

impl FormatClassifier {
    /// Classifier with the built-in signal table and default thresholds.
    pub fn new() -> Self {
        Self::with_table(SignalTable::builtin())
    }

    pub fn with_table(table: SignalTable) -> Self {
        Self {
            table,
            min_score: CLASSIFIER_MIN_SCORE,
            saturation_score: CLASSIFIER_SATURATION_SCORE,
            sniff_bytes: CLASSIFIER_SNIFF_BYTES,
        }
    }

    /// Set the minimum score for an authoritative verdict.
    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }

    pub fn table(&self) -> &SignalTable {
        &self.table
    }

    /// Classify raw bytes and a filename. Pure and deterministic.
    pub fn classify(&self, data: &[u8], filename: &str) -> Classification {
        let name = fold_case(filename);
        let detected_mime = infer::get(data).map(|kind| kind.mime_type().to_string());
        let scan_content = detected_mime.as_deref().map_or(true, is_textual_mime);
        let content = if scan_content {
            let window = &data[..data.len().min(self.sniff_bytes)];
            fold_case(&String::from_utf8_lossy(window))
        } else {
            String::new()
        };

        let mut candidates: Vec<CandidateScore> = Vec::new();
        for (doc_type, signals) in self.table.entries() {
            let mut score = 0.0f32;
            let mut matched = Vec::new();
            for signal in signals {
                let haystack = match signal.source {
                    SignalSource::Filename => &name,
                    SignalSource::Content => &content,
                };
                if !signal.pattern.is_empty() && haystack.contains(signal.pattern.as_str()) {
                    score += signal.weight;
                    matched.push(format!(
                        "{}:'{}' (+{:.2})",
                        signal.source.label(),
                        signal.pattern,
                        signal.weight
                    ));
                }
            }
            if score > 0.0 {
                candidates.push(CandidateScore {
                    doc_type: *doc_type,
                    score,
                    matched,
                });
            }
        }

        // Stable sort keeps table order among equal scores
        candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

        let mut notes = Vec::new();
        if !scan_content {
            if let Some(mime) = &detected_mime {
                notes.push(format!("binary container {} (content not scanned)", mime));
            }
        }

        let classification = match candidates.first() {
            None => {
                notes.insert(0, "no signals matched".to_string());
                Classification {
                    doc_type: DocType::Other,
                    confidence: 0.0,
                    rationale: notes.join("; "),
                    low_confidence: true,
                    user_specified: false,
                    detected_mime,
                    candidates,
                }
            }
            Some(best) => {
                let mut rationale = format!(
                    "{} scored {:.2} from {}",
                    best.doc_type,
                    best.score,
                    best.matched.join(", ")
                );
                if let Some(runner_up) = candidates.get(1) {
                    rationale.push_str(&format!(
                        "; runner-up {} scored {:.2}",
                        runner_up.doc_type, runner_up.score
                    ));
                }
                let low_confidence = best.score < self.min_score;
                if low_confidence {
                    rationale.push_str(&format!(
                        "; below minimum score {:.2}, advisory only",
                        self.min_score
                    ));
                }
                for note in &notes {
                    rationale.push_str("; ");
                    rationale.push_str(note);
                }
                Classification {
                    doc_type: best.doc_type,
                    confidence: (best.score / self.saturation_score).clamp(0.0, 1.0),
                    rationale,
                    low_confidence,
                    user_specified: false,
                    detected_mime,
                    candidates,
                }
            }
        };

        debug!(
            subsystem = "core",
            component = "classifier",
            op = "classify",
            doc_type = %classification.doc_type,
            confidence = classification.confidence,
            low_confidence = classification.low_confidence,
            "Classified upload"
        );
        classification
    }
}

impl Default for FormatClassifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Lower-case with the combining dot of a lower-cased `İ` dropped, so that
/// `İBAN` and `iban` compare equal.
fn fold_case(s: &str) -> String {
    s.to_lowercase().replace('\u{307}', "")
}

fn is_textual_mime(mime: &str) -> bool {
    mime.starts_with("text/") || mime.contains("xml") || mime == "application/json"
}
