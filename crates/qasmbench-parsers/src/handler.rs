//! Adapts a [`QasmParser`] to the protocol's request handler seam.

use qasmbench_protocol::{HandlerError, RequestHandler};

use crate::error::ParserError;
use crate::parser::QasmParser;

/// Serves parse requests with a boxed parser binding.
pub struct ParserHandler {
    parser: Box<dyn QasmParser>,
}

impl ParserHandler {
    pub fn new(parser: Box<dyn QasmParser>) -> Self {
        Self { parser }
    }

    /// Name of the wrapped parser.
    pub fn parser_name(&self) -> &'static str {
        self.parser.name()
    }
}

impl RequestHandler for ParserHandler {
    fn handle(&mut self, request: &str) -> Result<(), HandlerError> {
        self.parser.parse(request).map_err(|e| match e {
            ParserError::Rejected(msg) => HandlerError::Rejected(msg),
            other => HandlerError::Internal(other.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Oq3Parser;

    #[test]
    fn test_handler_maps_rejection() {
        let mut handler = ParserHandler::new(Box::new(Oq3Parser));
        assert_eq!(handler.parser_name(), "oq3");
        assert!(handler.handle("OPENQASM 3.0;\nqubit q;").is_ok());
        assert_eq!(
            handler.handle("qubit[ q;"),
            Err(HandlerError::Rejected("Parsing failed".into()))
        );
    }
}
