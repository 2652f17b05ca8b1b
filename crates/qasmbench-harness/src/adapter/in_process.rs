//! Direct library calls.

use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use qasmbench_parsers::{ParserError, QasmParser};
use tracing::warn;

use super::{Adapter, AdapterKind};
use crate::sample::{FailureKind, ParseOutcome, SampleInput};

/// Calls a [`QasmParser`] on the harness thread and times the call.
pub struct InProcessAdapter {
    id: String,
    parser: Box<dyn QasmParser>,
}

impl InProcessAdapter {
    pub fn new(id: impl Into<String>, parser: Box<dyn QasmParser>) -> Self {
        Self {
            id: id.into(),
            parser,
        }
    }
}

#[async_trait]
impl Adapter for InProcessAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> AdapterKind {
        AdapterKind::InProcess
    }

    async fn parse(&mut self, sample: &SampleInput) -> (ParseOutcome, Duration) {
        let parser = &self.parser;
        let start = Instant::now();
        let result = panic::catch_unwind(AssertUnwindSafe(|| parser.parse(&sample.source)));
        let elapsed = start.elapsed();

        let outcome = match result {
            Ok(Ok(())) => ParseOutcome::Success,
            Ok(Err(ParserError::Rejected(msg))) => ParseOutcome::failure(FailureKind::Parse, msg),
            Ok(Err(other)) => ParseOutcome::failure(FailureKind::Server, other.to_string()),
            Err(_) => {
                warn!(adapter = %self.id, sample = %sample.id, "parser panicked");
                ParseOutcome::failure(FailureKind::Server, "parser panicked")
            }
        };
        (outcome, elapsed)
    }

    async fn teardown(&mut self) {}
}
