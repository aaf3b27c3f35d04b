//! DateScan parser - shallow text parser shared by every named document type.
//!
//! Decodes the bytes as text, finds calendar dates written as `YYYY-MM-DD`,
//! `DD.MM.YYYY` or `DD/MM/YYYY`, and reports their min/max. Metadata is built
//! for the document's family with a few cheap counts.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::NaiveDate;
use regex::Regex;
use serde_json::json;

use defter_core::{
    DocFamily, DocType, DocumentMetadata, DocumentParser, ParseResult, ParseStatus, Result,
};

static DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{4})-(\d{2})-(\d{2})|(\d{2})([./])(\d{2})([./])(\d{4})")
        .expect("date pattern compiles")
});

static ACCOUNT_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*\d{3}(?:[.\-]\d+)*[\s;,\t]").expect("account pattern compiles")
});

static IBAN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"TR\d{2}(?:\s?\d{4}){5}\s?\d{2}").expect("iban pattern compiles")
});

static FORM_CODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(KDV1|KDV2|MUHSGK|MUHTASAR|GEKAP|DAMGA)\b").expect("form code pattern compiles")
});

static INVOICE_NO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Z0-9]{3}20\d{2}\d{9}\b").expect("invoice number pattern compiles")
});

const MIN_YEAR: i32 = 1900;
const MAX_YEAR: i32 = 2100;

/// Shallow parser for one document type.
pub struct DateScanParser {
    doc_type: DocType,
}

impl DateScanParser {
    pub fn new(doc_type: DocType) -> Self {
        Self { doc_type }
    }

    fn is_binary(data: &[u8]) -> bool {
        match infer::get(data) {
            Some(kind) => {
                let mime = kind.mime_type();
                !(mime.starts_with("text/") || mime.contains("xml"))
            }
            None => data.iter().take(8192).any(|b| *b == 0),
        }
    }

    fn metadata_for(&self, text: &str, dated_lines: u64) -> DocumentMetadata {
        match self.doc_type.family() {
            DocFamily::TrialBalance => DocumentMetadata::TrialBalance {
                account_count: ACCOUNT_LINE_RE.find_iter(text).count() as u64,
            },
            DocFamily::Bank => DocumentMetadata::BankStatement {
                iban: IBAN_RE
                    .find(text)
                    .map(|m| m.as_str().chars().filter(|c| !c.is_whitespace()).collect()),
                transaction_count: dated_lines,
            },
            DocFamily::Ledger => {
                let headers = text.matches("<gl-cor:entryHeader").count() as u64;
                DocumentMetadata::Ledger {
                    entry_count: if headers > 0 { headers } else { dated_lines },
                }
            }
            DocFamily::TaxFiling => DocumentMetadata::TaxFiling {
                form_code: FORM_CODE_RE
                    .find(text)
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_else(|| default_form_code(self.doc_type).to_string()),
            },
            DocFamily::Invoices => {
                let xml_invoices = text.to_lowercase().matches("<invoice").count() as u64;
                DocumentMetadata::Invoices {
                    invoice_count: if xml_invoices > 0 {
                        xml_invoices
                    } else {
                        INVOICE_NO_RE.find_iter(text).count() as u64
                    },
                }
            }
            DocFamily::Unclassified => {
                let mut fields = BTreeMap::new();
                fields.insert("line_count".to_string(), json!(text.lines().count()));
                fields.insert("dated_lines".to_string(), json!(dated_lines));
                DocumentMetadata::Unclassified { fields }
            }
        }
    }
}

fn default_form_code(doc_type: DocType) -> &'static str {
    match doc_type {
        DocType::KdvBeyanname => "KDV1",
        DocType::MuhtasarBeyanname => "MUHSGK",
        _ => "UNKNOWN",
    }
}

/// Every valid calendar date in `text`, in order of appearance.
pub fn scan_dates(text: &str) -> Vec<NaiveDate> {
    let mut dates = Vec::new();
    for caps in DATE_RE.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        let before = text[..whole.start()].chars().next_back();
        let after = text[whole.end()..].chars().next();
        if before.is_some_and(|c| c.is_ascii_digit()) || after.is_some_and(|c| c.is_ascii_digit()) {
            continue;
        }

        let num = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());
        let date = if caps.get(1).is_some() {
            match (num(1), num(2), num(3)) {
                (Some(y), Some(m), Some(d)) => NaiveDate::from_ymd_opt(y as i32, m, d),
                _ => None,
            }
        } else {
            let same_separator = caps.get(5).map(|m| m.as_str()) == caps.get(7).map(|m| m.as_str());
            match (same_separator, num(4), num(6), num(8)) {
                (true, Some(d), Some(m), Some(y)) => NaiveDate::from_ymd_opt(y as i32, m, d),
                _ => None,
            }
        };

        if let Some(date) = date.filter(|d| (MIN_YEAR..=MAX_YEAR).contains(&chrono::Datelike::year(d))) {
            dates.push(date);
        }
    }
    dates
}

#[async_trait]
impl DocumentParser for DateScanParser {
    fn doc_type(&self) -> DocType {
        self.doc_type
    }

    async fn parse(&self, data: &[u8], _filename: &str) -> Result<ParseResult> {
        // Binary documents are accepted as-is; the shield sees no dates
        if Self::is_binary(data) {
            return Ok(ParseResult {
                status: ParseStatus::Ok,
                metadata: DocumentMetadata::empty(),
                warnings: vec!["binary content; dates not scanned".to_string()],
                ..ParseResult::default()
            });
        }

        let text = String::from_utf8_lossy(data);
        if text.trim().is_empty() {
            return Ok(ParseResult {
                status: ParseStatus::Empty,
                warnings: vec!["no text content".to_string()],
                ..ParseResult::default()
            });
        }

        let dated_lines = text
            .lines()
            .filter(|line| !scan_dates(line).is_empty())
            .count() as u64;
        let dates = scan_dates(&text);
        let metadata = self.metadata_for(&text, dated_lines);

        let result = ParseResult::ok(
            dates.iter().min().copied(),
            dates.iter().max().copied(),
            metadata,
        );
        if dates.is_empty() {
            Ok(result.with_warning("no dates found"))
        } else {
            Ok(result)
        }
    }

    fn name(&self) -> &str {
        "date_scan"
    }

    fn version(&self) -> &str {
        "1"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_scan_recognises_all_formats() {
        let text = "Dönem 2025-04-01..2025-06-30, fiş 15.05.2025, valör 20/05/2025";
        assert_eq!(
            scan_dates(text),
            vec![d(2025, 4, 1), d(2025, 6, 30), d(2025, 5, 15), d(2025, 5, 20)]
        );
    }

    #[test]
    fn test_scan_skips_invalid_and_embedded_numbers() {
        let text = "2025-02-30 31.04.2025 12025-01-01 1.500,00 TL 01.02/2025 3000-01-01";
        assert!(scan_dates(text).is_empty());
    }

    #[test]
    fn test_scan_accepts_datetime_suffix() {
        assert_eq!(scan_dates("2025-05-01T10:00:00Z"), vec![d(2025, 5, 1)]);
    }

    #[tokio::test]
    async fn test_bank_statement_metadata() {
        let parser = DateScanParser::new(DocType::BankStatement);
        let data = "IBAN: TR33 0006 1005 1978 6457 8413 26\n\
                    02.04.2025;Havale;1.000,00\n\
                    15.04.2025;EFT;-250,00\n";
        let result = parser.parse(data.as_bytes(), "ekstre.csv").await.unwrap();
        assert_eq!(result.status, ParseStatus::Ok);
        assert_eq!(result.doc_date_min, Some(d(2025, 4, 2)));
        assert_eq!(result.doc_date_max, Some(d(2025, 4, 15)));
        assert_eq!(
            result.metadata,
            DocumentMetadata::BankStatement {
                iban: Some("TR330006100519786457841326".to_string()),
                transaction_count: 2,
            }
        );
    }

    #[tokio::test]
    async fn test_trial_balance_counts_account_lines() {
        let parser = DateScanParser::new(DocType::Mizan);
        let data = "Hesap Kodu;Hesap Adı;Borç;Alacak\n100;Kasa;10;0\n102.01;Banka;5;0\n320;Satıcılar;0;15\n";
        let result = parser.parse(data.as_bytes(), "mizan.csv").await.unwrap();
        assert_eq!(result.metadata, DocumentMetadata::TrialBalance { account_count: 3 });
        assert!(!result.has_dates());
        assert_eq!(result.warnings, vec!["no dates found".to_string()]);
        assert_eq!(result.status, ParseStatus::Ok);
    }

    #[tokio::test]
    async fn test_tax_filing_form_code() {
        let parser = DateScanParser::new(DocType::KdvBeyanname);
        let result = parser
            .parse(b"Beyanname turu: KDV2 donem 2025-05-31", "kdv.txt")
            .await
            .unwrap();
        assert_eq!(
            result.metadata,
            DocumentMetadata::TaxFiling {
                form_code: "KDV2".to_string()
            }
        );

        let fallback = parser.parse(b"2025-05-31", "kdv.txt").await.unwrap();
        assert_eq!(
            fallback.metadata,
            DocumentMetadata::TaxFiling {
                form_code: "KDV1".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_ledger_counts_entry_headers() {
        let parser = DateScanParser::new(DocType::LedgerYevmiye);
        let data = "<gl-cor:entryHeader><gl-cor:enteredDate>2025-04-03</gl-cor:enteredDate></gl-cor:entryHeader>\
                    <gl-cor:entryHeader><gl-cor:enteredDate>2025-04-09</gl-cor:enteredDate></gl-cor:entryHeader>";
        let result = parser.parse(data.as_bytes(), "yevmiye.xml").await.unwrap();
        assert_eq!(result.metadata, DocumentMetadata::Ledger { entry_count: 2 });
        assert_eq!(result.doc_date_max, Some(d(2025, 4, 9)));
    }

    #[tokio::test]
    async fn test_whitespace_only_is_empty() {
        let parser = DateScanParser::new(DocType::Mizan);
        let result = parser.parse(b"  \n\t ", "mizan.csv").await.unwrap();
        assert_eq!(result.status, ParseStatus::Empty);
        assert!(!result.has_dates());
    }

    #[tokio::test]
    async fn test_binary_content_is_accepted_with_warning() {
        let parser = DateScanParser::new(DocType::BankStatement);
        let result = parser.parse(b"%PDF-1.7\n2025-04-01", "ekstre.pdf").await.unwrap();
        assert_eq!(result.status, ParseStatus::Ok);
        assert_eq!(result.warnings, vec!["binary content; dates not scanned".to_string()]);
        assert!(!result.has_dates());
    }
}
