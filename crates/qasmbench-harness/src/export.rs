//! JSON export of benchmark reports.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, HarnessResult};
use crate::report::BenchmarkReport;

/// Export configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Whether to pretty-print JSON output.
    pub pretty: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self { pretty: true }
    }
}

/// Serialize a report to a JSON string.
pub fn to_json(report: &BenchmarkReport, config: &ExportConfig) -> HarnessResult<String> {
    if config.pretty {
        serde_json::to_string_pretty(report).map_err(HarnessError::from)
    } else {
        serde_json::to_string(report).map_err(HarnessError::from)
    }
}

/// Write a report to `path`, creating missing parent directories.
pub async fn to_file(
    report: &BenchmarkReport,
    path: &Path,
    config: &ExportConfig,
) -> HarnessResult<()> {
    let json = to_json(report, config)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| HarnessError::io(parent, e))?;
    }
    tokio::fs::write(path, json)
        .await
        .map_err(|e| HarnessError::io(path, e))
}
