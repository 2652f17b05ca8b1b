//! Reproducibility: versions, platform and CLI snapshot for a run.

use serde::{Deserialize, Serialize};

/// Version of the JSON results layout.
pub const SCHEMA_VERSION: &str = "0.1.0";

/// Information for reproducing a benchmark run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReproducibilityInfo {
    /// qasmbench version used.
    pub qasmbench_version: String,
    /// Schema version of the output format.
    pub schema_version: String,
    /// CLI arguments used for this run.
    pub cli_args: Vec<String>,
    /// Target OS and architecture of the harness binary.
    pub platform: String,
    /// `rustc --version` output, when any cargo adapter was built.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toolchain: Option<String>,
    /// Parsers compiled into this harness.
    pub builtin_parsers: Vec<String>,
}

impl ReproducibilityInfo {
    /// Capture current reproducibility context.
    pub fn capture(cli_args: &[String]) -> Self {
        Self {
            qasmbench_version: env!("CARGO_PKG_VERSION").to_string(),
            schema_version: SCHEMA_VERSION.into(),
            cli_args: cli_args.to_vec(),
            platform: format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH),
            toolchain: None,
            builtin_parsers: qasmbench_parsers::available_parsers()
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }

    pub fn with_toolchain(mut self, toolchain: Option<String>) -> Self {
        self.toolchain = toolchain;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reproducibility_capture() {
        let args = vec![
            "qasmbench".into(),
            "--iterations".into(),
            "3".into(),
        ];
        let info = ReproducibilityInfo::capture(&args);

        assert!(!info.qasmbench_version.is_empty());
        assert_eq!(info.cli_args.len(), 3);
        assert_eq!(info.schema_version, SCHEMA_VERSION);
        assert!(info.builtin_parsers.iter().any(|p| p == "oq3"));
        assert!(info.toolchain.is_none());
    }
}
