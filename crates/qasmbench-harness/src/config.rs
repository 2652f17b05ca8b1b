//! Benchmark configuration.
//!
//! Supports loading configuration from:
//! 1. A YAML file (`qasmbench.yaml`)
//! 2. Environment variables (with `QASMBENCH_` prefix)
//! 3. `.env` files
//!
//! Configuration precedence (highest to lowest):
//! 1. Environment variables
//! 2. Configuration file
//! 3. Default values

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use qasmbench_protocol::Framing;
use serde::{Deserialize, Serialize};

/// Complete benchmark configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchConfig {
    /// Run parameters
    #[serde(default)]
    pub run: RunConfig,

    /// Build cache
    #[serde(default)]
    pub cache: CacheConfig,

    /// Logging
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Parsers under test, benchmarked in this order
    #[serde(default = "default_adapters")]
    pub adapters: Vec<AdapterSpec>,
}

/// Run parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Directory holding `*.qasm` / `*.qasm3` samples
    #[serde(default = "default_corpus_dir")]
    pub corpus_dir: PathBuf,

    /// Results file
    #[serde(default = "default_output")]
    pub output: PathBuf,

    /// Measured passes over the corpus per adapter
    #[serde(default = "default_iterations")]
    pub iterations: u32,

    /// Upper bound on a single parse request, in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Upper bound on the READY handshake, in milliseconds
    #[serde(default = "default_ready_timeout_ms")]
    pub ready_timeout_ms: u64,

    /// Subprocess restarts allowed per adapter after a crash or timeout
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,

    /// Time a server gets to exit after its input closes, in milliseconds
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

/// Build cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache directory (default: the platform cache dir)
    #[serde(default)]
    pub dir: Option<PathBuf>,

    /// Maximum number of cached artifacts
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,

    /// Keep an index on disk so artifacts survive across runs
    #[serde(default = "default_true")]
    pub persistent: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "console" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

/// One parser under test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdapterSpec {
    /// Direct library call in the harness process.
    InProcess {
        id: String,
        #[serde(default = "default_parser")]
        parser: String,
    },
    /// Protocol server running as a task on an in-memory pipe.
    Loopback {
        id: String,
        #[serde(default = "default_parser")]
        parser: String,
        #[serde(default)]
        framing: Framing,
    },
    /// An existing executable speaking the protocol on stdin/stdout.
    Subprocess {
        id: String,
        program: PathBuf,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        framing: Framing,
    },
    /// A cargo binary target built through the cache, then run as a subprocess.
    Cargo {
        id: String,
        crate_dir: PathBuf,
        bin: String,
        #[serde(default = "default_profile")]
        profile: String,
        #[serde(default)]
        features: Vec<String>,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        framing: Framing,
    },
}

impl AdapterSpec {
    pub fn id(&self) -> &str {
        match self {
            AdapterSpec::InProcess { id, .. }
            | AdapterSpec::Loopback { id, .. }
            | AdapterSpec::Subprocess { id, .. }
            | AdapterSpec::Cargo { id, .. } => id,
        }
    }

    /// Configuration tag of this adapter.
    pub fn kind_name(&self) -> &'static str {
        match self {
            AdapterSpec::InProcess { .. } => "in_process",
            AdapterSpec::Loopback { .. } => "loopback",
            AdapterSpec::Subprocess { .. } => "subprocess",
            AdapterSpec::Cargo { .. } => "cargo",
        }
    }
}

fn default_corpus_dir() -> PathBuf {
    PathBuf::from("qasm")
}

fn default_output() -> PathBuf {
    PathBuf::from("results/benchmark_results.json")
}

fn default_iterations() -> u32 {
    10
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_ready_timeout_ms() -> u64 {
    30_000
}

fn default_max_restarts() -> u32 {
    1
}

fn default_shutdown_grace_ms() -> u64 {
    1_000
}

fn default_cache_capacity() -> usize {
    8
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "console".to_string()
}

fn default_parser() -> String {
    "oq3".to_string()
}

fn default_profile() -> String {
    "release".to_string()
}

/// Package that provides `qasm-parse-server`, located relative to this crate.
fn default_parsers_crate_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../qasmbench-parsers")
}

fn default_adapters() -> Vec<AdapterSpec> {
    vec![
        AdapterSpec::InProcess {
            id: "oq3-in-process".to_string(),
            parser: default_parser(),
        },
        AdapterSpec::Loopback {
            id: "oq3-loopback".to_string(),
            parser: default_parser(),
            framing: Framing::Nul,
        },
        AdapterSpec::Cargo {
            id: "oq3-subprocess".to_string(),
            crate_dir: default_parsers_crate_dir(),
            bin: "qasm-parse-server".to_string(),
            profile: default_profile(),
            features: Vec::new(),
            args: Vec::new(),
            framing: Framing::Nul,
        },
    ]
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            run: RunConfig::default(),
            cache: CacheConfig::default(),
            logging: LoggingConfig::default(),
            adapters: default_adapters(),
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            corpus_dir: default_corpus_dir(),
            output: default_output(),
            iterations: default_iterations(),
            request_timeout_ms: default_request_timeout_ms(),
            ready_timeout_ms: default_ready_timeout_ms(),
            max_restarts: default_max_restarts(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: None,
            capacity: default_cache_capacity(),
            persistent: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl RunConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

impl CacheConfig {
    /// Configured directory, else `<platform cache dir>/qasmbench`.
    pub fn resolved_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .map(|d| d.join("qasmbench"))
                .unwrap_or_else(|| PathBuf::from(".qasmbench-cache"))
        })
    }
}

impl BenchConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ConfigError::IoError(format!("{}: {}", path.as_ref().display(), e))
        })?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from YAML text.
    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let config: BenchConfig =
            serde_yaml_ng::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with the following precedence:
    /// 1. Load .env file if it exists
    /// 2. Load from file if provided
    /// 3. Apply environment variable overrides
    pub fn load(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = match config_file {
            Some(path) => Self::from_file(path)?,
            None => BenchConfig::default(),
        };

        let config = config.merge_env();
        config.validate()?;
        Ok(config)
    }

    /// Merge `QASMBENCH_*` environment variables into this configuration.
    pub fn merge_env(self) -> Self {
        self.merge_env_with(|key| std::env::var(key).ok())
    }

    /// Merge overrides from `lookup`. Only keys it returns a value for
    /// override the current settings; unparsable numbers are ignored.
    pub fn merge_env_with<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        // Run
        if let Some(v) = lookup("QASMBENCH_CORPUS_DIR") {
            self.run.corpus_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("QASMBENCH_OUTPUT") {
            self.run.output = PathBuf::from(v);
        }
        if let Some(val) = lookup("QASMBENCH_ITERATIONS").and_then(|v| v.parse().ok()) {
            self.run.iterations = val;
        }
        if let Some(val) = lookup("QASMBENCH_REQUEST_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.run.request_timeout_ms = val;
        }
        if let Some(val) = lookup("QASMBENCH_READY_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.run.ready_timeout_ms = val;
        }
        if let Some(val) = lookup("QASMBENCH_MAX_RESTARTS").and_then(|v| v.parse().ok()) {
            self.run.max_restarts = val;
        }

        // Cache
        if let Some(v) = lookup("QASMBENCH_CACHE_DIR") {
            self.cache.dir = Some(PathBuf::from(v));
        }
        if let Some(val) = lookup("QASMBENCH_CACHE_CAPACITY").and_then(|v| v.parse().ok()) {
            self.cache.capacity = val;
        }
        if let Some(val) = lookup("QASMBENCH_CACHE_PERSISTENT").and_then(|v| v.parse().ok()) {
            self.cache.persistent = val;
        }

        // Logging
        if let Some(v) = lookup("QASMBENCH_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = lookup("QASMBENCH_LOG_FORMAT") {
            self.logging.format = v;
        }

        self
    }

    /// Keep only the adapters named in `ids`, in configuration order.
    pub fn select_adapters(&mut self, ids: &[String]) -> Result<(), ConfigError> {
        if ids.is_empty() {
            return Ok(());
        }
        if let Some(unknown) = ids.iter().find(|id| !self.adapters.iter().any(|a| a.id() == id.as_str())) {
            let known: Vec<&str> = self.adapters.iter().map(AdapterSpec::id).collect();
            return Err(ConfigError::ValidationError(format!(
                "Unknown adapter: {unknown} (configured: {})",
                known.join(", ")
            )));
        }
        self.adapters.retain(|a| ids.iter().any(|id| id == a.id()));
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.run.iterations == 0 {
            return Err(ConfigError::ValidationError(
                "iterations must be greater than 0".to_string(),
            ));
        }
        if self.run.request_timeout_ms == 0 || self.run.ready_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "timeouts must be greater than 0".to_string(),
            ));
        }
        if self.cache.capacity == 0 {
            return Err(ConfigError::ValidationError(
                "cache capacity must be greater than 0".to_string(),
            ));
        }

        // Validate log level
        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log level: {other}"
                )));
            }
        }

        // Validate log format
        match self.logging.format.as_str() {
            "console" | "json" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log format: {other}"
                )));
            }
        }

        // Validate adapters
        if self.adapters.is_empty() {
            return Err(ConfigError::ValidationError(
                "at least one adapter must be configured".to_string(),
            ));
        }
        let mut seen = BTreeSet::new();
        for adapter in &self.adapters {
            let id = adapter.id();
            if id.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "adapter id must not be empty".to_string(),
                ));
            }
            if !seen.insert(id) {
                return Err(ConfigError::ValidationError(format!(
                    "Duplicate adapter id: {id}"
                )));
            }
            if let AdapterSpec::Subprocess { program, .. } = adapter {
                if program.as_os_str().is_empty() {
                    return Err(ConfigError::ValidationError(format!(
                        "adapter {id}: program must not be empty"
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BenchConfig::default();
        assert_eq!(config.run.corpus_dir, PathBuf::from("qasm"));
        assert_eq!(config.run.iterations, 10);
        assert_eq!(config.run.max_restarts, 1);
        assert_eq!(config.adapters.len(), 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_sections_and_adapter_tags() {
        let yaml = r#"
run:
  iterations: 3
  request_timeout_ms: 500
cache:
  capacity: 2
  persistent: false
adapters:
  - kind: in_process
    id: lib
  - kind: subprocess
    id: external
    program: /usr/local/bin/parse-server
    args: ["--framing", "length"]
    framing: length
"#;
        let config = BenchConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.run.iterations, 3);
        assert_eq!(config.run.ready_timeout_ms, 30_000);
        assert!(!config.cache.persistent);
        assert_eq!(
            config.adapters[0],
            AdapterSpec::InProcess {
                id: "lib".into(),
                parser: "oq3".into()
            }
        );
        assert!(matches!(
            &config.adapters[1],
            AdapterSpec::Subprocess { framing: Framing::Length, args, .. } if args.len() == 2
        ));
    }

    #[test]
    fn test_env_overrides_file_values() {
        let config = BenchConfig::from_yaml("run:\n  iterations: 3\n").unwrap();
        let config = config.merge_env_with(|key| match key {
            "QASMBENCH_ITERATIONS" => Some("7".into()),
            "QASMBENCH_CACHE_CAPACITY" => Some("not a number".into()),
            "QASMBENCH_LOG_FORMAT" => Some("json".into()),
            _ => None,
        });
        assert_eq!(config.run.iterations, 7);
        assert_eq!(config.cache.capacity, 8);
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut config = BenchConfig::default();
        config.run.iterations = 0;
        assert!(config.validate().is_err());

        let mut config = BenchConfig::default();
        config.cache.capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = BenchConfig::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_adapter_ids_rejected() {
        let yaml = "adapters:\n  - kind: in_process\n    id: a\n  - kind: loopback\n    id: a\n";
        assert!(matches!(
            BenchConfig::from_yaml(yaml),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_select_adapters() {
        let mut config = BenchConfig::default();
        config.select_adapters(&["oq3-loopback".into()]).unwrap();
        assert_eq!(config.adapters.len(), 1);
        assert_eq!(config.adapters[0].kind_name(), "loopback");

        let mut config = BenchConfig::default();
        assert!(config.select_adapters(&["antlr".into()]).is_err());
    }
}
