//! Samples, outcomes and timed records.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// One QASM program to parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleInput {
    /// Identifier, usually the file name.
    pub id: String,
    pub source: String,
}

impl SampleInput {
    pub fn new(id: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
        }
    }
}

/// Why a sample did not parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The parser rejected the input.
    Parse,
    /// Fault inside the parse server or harness, not in the input.
    Server,
    /// No response within the request timeout.
    Timeout,
    /// The server process died while handling the request.
    Crash,
    /// The server broke the wire protocol.
    Protocol,
    /// The adapter could not be started or has no restarts left.
    Unavailable,
    /// The adapter's artifact failed to build.
    Build,
}

impl FailureKind {
    pub fn name(&self) -> &'static str {
        match self {
            FailureKind::Parse => "parse",
            FailureKind::Server => "server",
            FailureKind::Timeout => "timeout",
            FailureKind::Crash => "crash",
            FailureKind::Protocol => "protocol",
            FailureKind::Unavailable => "unavailable",
            FailureKind::Build => "build",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of parsing one sample once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ParseOutcome {
    Success,
    Failure { kind: FailureKind, message: String },
}

impl ParseOutcome {
    pub fn failure(kind: FailureKind, message: impl Into<String>) -> Self {
        ParseOutcome::Failure {
            kind,
            message: message.into(),
        }
    }

    /// The outcome of every request on an adapter that cannot serve.
    pub fn unavailable() -> Self {
        Self::failure(FailureKind::Unavailable, "adapter unavailable")
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ParseOutcome::Success)
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            ParseOutcome::Success => None,
            ParseOutcome::Failure { kind, .. } => Some(*kind),
        }
    }
}

/// Whether a record feeds the statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Warmup,
    Measured,
}

/// One timed parse, as recorded by the collector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimedSample {
    pub adapter_id: String,
    pub sample_id: String,
    /// Measured pass index; always 0 for warm-up.
    pub iteration: u32,
    pub phase: Phase,
    pub outcome: ParseOutcome,
    pub duration_ns: u64,
}

impl TimedSample {
    pub fn duration(&self) -> Duration {
        Duration::from_nanos(self.duration_ns)
    }

    pub fn duration_ms(&self) -> f64 {
        self.duration_ns as f64 / 1_000_000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_string(&ParseOutcome::unavailable()).unwrap();
        assert_eq!(
            json,
            r#"{"status":"failure","kind":"unavailable","message":"adapter unavailable"}"#
        );
        let json = serde_json::to_string(&ParseOutcome::Success).unwrap();
        assert_eq!(json, r#"{"status":"success"}"#);
    }
}
