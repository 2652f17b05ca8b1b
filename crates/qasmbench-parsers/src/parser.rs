//! Parser bindings.
//!
//! A binding only answers "does this source parse?". The AST itself is
//! opaque to the harness and is dropped as soon as the parse completes.

use std::path::PathBuf;

use oq3_source_file::{SourceTrait, parse_source_string};
use tracing::trace;

use crate::error::{ParserError, ParserResult};

/// Message reported for any source `oq3` flags with parse errors.
pub const PARSE_FAILED: &str = "Parsing failed";

/// A QASM-3 parser that can be benchmarked.
pub trait QasmParser: Send + Sync {
    /// Stable name used in configuration and reports.
    fn name(&self) -> &'static str;

    /// Parse `source`, discarding the resulting tree.
    fn parse(&self, source: &str) -> ParserResult<()>;
}

/// The `oq3_source_file` front end.
#[derive(Debug, Clone, Copy, Default)]
pub struct Oq3Parser;

impl QasmParser for Oq3Parser {
    fn name(&self) -> &'static str {
        "oq3"
    }

    fn parse(&self, source: &str) -> ParserResult<()> {
        // Include resolution is disabled: no file path, no search path.
        let parsed = parse_source_string::<&str, PathBuf>(source, None, None);
        if parsed.any_parse_errors() {
            trace!(bytes = source.len(), "oq3 reported parse errors");
            Err(ParserError::Rejected(PARSE_FAILED.to_string()))
        } else {
            Ok(())
        }
    }
}

/// Names accepted by [`parser_by_name`].
pub fn available_parsers() -> &'static [&'static str] {
    &["oq3"]
}

/// Look up a parser binding by name.
pub fn parser_by_name(name: &str) -> ParserResult<Box<dyn QasmParser>> {
    match name.to_lowercase().as_str() {
        "oq3" | "oq3_source_file" => Ok(Box::new(Oq3Parser)),
        _ => Err(ParserError::UnknownParser {
            name: name.to_string(),
            available: available_parsers().join(", "),
        }),
    }
}
