//! qasmbench parser bindings
//!
//! Every parser under test is reached through [`QasmParser`]. The same
//! binding can be called in-process by the harness or served over the wire
//! protocol by the `qasm-parse-server` binary:
//!
//! ```text
//!   harness ──in-process──→ QasmParser
//!   harness ──stdin/stdout──→ qasm-parse-server ──→ ParserHandler ──→ QasmParser
//! ```

pub mod error;
pub mod handler;
pub mod parser;

pub use error::{ParserError, ParserResult};
pub use handler::ParserHandler;
pub use parser::{Oq3Parser, PARSE_FAILED, QasmParser, available_parsers, parser_by_name};
