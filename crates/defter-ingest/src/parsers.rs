//! Parser dispatch: routes an upload to the parser registered for its type.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::warn;

use defter_core::defaults::{PASSTHROUGH_PARSER_NAME, PASSTHROUGH_PARSER_VERSION};
use defter_core::{DocType, DocumentParser, ParseResult, ParseStatus};

use crate::adapters::DateScanParser;

/// Result of one dispatch, with the parser identity recorded on the upload.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseOutcome {
    pub parser_name: String,
    pub parser_version: String,
    pub result: ParseResult,
}

/// Registry of document parsers keyed by document type.
pub struct ParserRegistry {
    parsers: HashMap<DocType, Arc<dyn DocumentParser>>,
}

impl ParserRegistry {
    /// Create an empty registry; every type gets the passthrough result.
    pub fn new() -> Self {
        Self {
            parsers: HashMap::new(),
        }
    }

    /// Registry with the date-scan parser for every named type.
    pub fn with_builtin_parsers() -> Self {
        let mut registry = Self::new();
        for doc_type in DocType::ALL.into_iter().filter(|t| *t != DocType::Other) {
            registry.register(Arc::new(DateScanParser::new(doc_type)));
        }
        registry
    }

    /// Register a parser. Replaces any existing parser for the same type.
    pub fn register(&mut self, parser: Arc<dyn DocumentParser>) {
        self.parsers.insert(parser.doc_type(), parser);
    }

    pub fn has_parser(&self, doc_type: DocType) -> bool {
        self.parsers.contains_key(&doc_type)
    }

    pub fn registered_types(&self) -> Vec<DocType> {
        let mut types: Vec<DocType> = self.parsers.keys().copied().collect();
        types.sort();
        types
    }

    /// Run the parser for `doc_type`. Never fails: returned errors and panics
    /// become `ParseStatus::Error` with the failure message.
    pub async fn dispatch(&self, doc_type: DocType, data: &[u8], filename: &str) -> ParseOutcome {
        let Some(parser) = self.parsers.get(&doc_type) else {
            return ParseOutcome {
                parser_name: PASSTHROUGH_PARSER_NAME.to_string(),
                parser_version: PASSTHROUGH_PARSER_VERSION.to_string(),
                result: ParseResult::passthrough(doc_type),
            };
        };

        let parsed = AssertUnwindSafe(parser.parse(data, filename))
            .catch_unwind()
            .await;

        let result = match parsed {
            Ok(Ok(mut result)) => {
                if result.status == ParseStatus::Error && result.error.is_none() {
                    result.error = Some("parser reported an error without a message".to_string());
                }
                result
            }
            Ok(Err(e)) => {
                warn!(
                    subsystem = "ingest",
                    component = "parsers",
                    op = "dispatch",
                    parser = parser.name(),
                    doc_type = %doc_type,
                    error = %e,
                    "Parser failed, recording parse error"
                );
                ParseResult::failed(e.to_string())
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(
                    subsystem = "ingest",
                    component = "parsers",
                    op = "dispatch",
                    parser = parser.name(),
                    doc_type = %doc_type,
                    panic = %message,
                    "Parser panicked, recording parse error"
                );
                ParseResult::failed(format!("parser panicked: {}", message))
            }
        };

        ParseOutcome {
            parser_name: parser.name().to_string(),
            parser_version: parser.version().to_string(),
            result,
        }
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::with_builtin_parsers()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
