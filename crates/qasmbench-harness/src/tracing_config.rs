//! Tracing setup shared by the qasmbench binaries.
//!
//! - Console output (human-readable)
//! - JSON structured logging
//!
//! Everything goes to stderr; stdout belongs to reports and, in the parse
//! server, to the protocol.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use crate::config::LoggingConfig;

/// Tracing output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracingFormat {
    /// Human-readable console output.
    Console,
    /// JSON structured logging.
    Json,
}

impl TracingFormat {
    /// Parse a format name; anything but `json` is console.
    pub fn from_name(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "json" => TracingFormat::Json,
            _ => TracingFormat::Console,
        }
    }
}

/// Tracing configuration.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Log level filter (e.g., "info", "debug", "qasmbench_harness=trace").
    pub log_level: String,
    /// Output format (console or JSON).
    pub format: TracingFormat,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            format: TracingFormat::Console,
        }
    }
}

impl TracingConfig {
    /// Build from the logging section, letting `-v` flags raise the level.
    ///
    /// `verbosity` 0 keeps the configured level, 1 asks for debug, 2+ for
    /// trace. A configured level that is already more verbose is kept, as is
    /// any configured directive list.
    pub fn from_logging(logging: &LoggingConfig, verbosity: u8) -> Self {
        let requested = match verbosity {
            0 => None,
            1 => Some(LevelFilter::DEBUG),
            _ => Some(LevelFilter::TRACE),
        };
        let log_level = match (requested, logging.level.parse::<LevelFilter>()) {
            (Some(requested), Ok(configured)) if requested > configured => requested.to_string(),
            _ => logging.level.clone(),
        };
        Self {
            log_level,
            format: TracingFormat::from_name(&logging.format),
        }
    }

    /// The filter `init_tracing` would install. `RUST_LOG` wins when set.
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.log_level))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Initialize the global tracing subscriber.
pub fn init_tracing(config: &TracingConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let fmt_layer = match config.format {
        TracingFormat::Console => fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(false)
            .boxed(),
        TracingFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_current_span(true)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(config.env_filter())
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}
