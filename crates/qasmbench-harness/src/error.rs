//! Error handling for the benchmark harness.
//!
//! Per-sample failures are [`crate::ParseOutcome`] values and never surface
//! here. These errors describe adapter-level and run-level faults.

use std::path::PathBuf;
use std::time::Duration;

use qasmbench_cache::CacheError;
use qasmbench_protocol::ProtocolError;
use thiserror::Error;

use crate::config::ConfigError;

/// Result type for harness operations.
pub type HarnessResult<T> = Result<T, HarnessError>;

/// Errors that can occur while running a benchmark.
#[derive(Error, Debug)]
pub enum HarnessError {
    /// A bounded wait on a parse server expired.
    #[error("Timed out after {after:?} waiting for {what}")]
    ProtocolTimeout { what: &'static str, after: Duration },

    /// The adapter could not be brought to ready, or its restart budget is spent.
    #[error("Adapter {adapter} unavailable: {reason}")]
    AdapterUnavailable { adapter: String, reason: String },

    /// Producing the adapter's artifact failed.
    #[error("Build failed for adapter {adapter}: {source}")]
    Build {
        adapter: String,
        #[source]
        source: CacheError,
    },

    /// The run as a whole cannot proceed.
    #[error("Orchestration fault: {0}")]
    Orchestration(String),

    /// Wire protocol violation.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Filesystem failure.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HarnessError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn unavailable(adapter: &str, reason: impl Into<String>) -> Self {
        Self::AdapterUnavailable {
            adapter: adapter.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether this error must abort the whole run.
    pub fn is_orchestration_fault(&self) -> bool {
        matches!(
            self,
            HarnessError::Orchestration(_) | HarnessError::Config(_) | HarnessError::Io { .. }
        )
    }
}
