//! Error types for parser bindings.

use thiserror::Error;

/// Result type for parser operations.
pub type ParserResult<T> = Result<T, ParserError>;

/// Errors raised by a parser binding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParserError {
    /// The parser rejected the source text.
    #[error("{0}")]
    Rejected(String),

    /// No parser is registered under this name.
    #[error("Unknown parser: {name} (available: {available})")]
    UnknownParser { name: String, available: String },
}
