//! qasmbench harness
//!
//! Runs QASM parsers over a corpus and reports how fast they are:
//!
//! - **Adapters**: [`InProcessAdapter`] calls a parser directly,
//!   [`ServerAdapter`] talks to a parse server over the line protocol, either
//!   in memory or through a child process
//! - **Orchestrator**: warm-up pass, N measured passes, teardown, per adapter
//! - **Timing**: latency statistics over measured successes only
//! - **Report**: JSON export and terminal tables
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use qasmbench_harness::{BenchConfig, BenchmarkReport, Corpus, Orchestrator, ReproducibilityInfo};
//! use qasmbench_cache::BuildCache;
//!
//! let config = BenchConfig::load(None)?;
//! let corpus = Corpus::load(&config.run.corpus_dir)?;
//! let cache = Arc::new(BuildCache::in_memory(config.cache.capacity)?);
//! let mut orchestrator = Orchestrator::new(config.run.clone(), cache);
//! let plans = config.adapters.into_iter().map(Into::into).collect();
//! let run = orchestrator.run(&corpus, plans).await?;
//! let report = BenchmarkReport::from_run(run, ReproducibilityInfo::capture(&[]));
//! println!("{}", report.render_table());
//! ```

pub mod adapter;
pub mod config;
pub mod corpus;
pub mod error;
pub mod export;
pub mod orchestrator;
pub mod report;
pub mod reproducibility;
pub mod sample;
pub mod timing;
pub mod tracing_config;

pub use adapter::{
    Adapter, AdapterHandle, AdapterKind, Attempt, CommandLauncher, Connection, HandleSettings,
    HandleState, InProcessAdapter, Launcher, LoopbackLauncher, ServerAdapter, ServerProcess,
};
pub use config::{AdapterSpec, BenchConfig, CacheConfig, ConfigError, LoggingConfig, RunConfig};
pub use corpus::Corpus;
pub use error::{HarnessError, HarnessResult};
pub use export::{ExportConfig, to_file, to_json};
pub use orchestrator::{AdapterPlan, AdapterRun, AdapterStatus, BenchmarkRun, Orchestrator};
pub use report::{BenchmarkReport, RunSummary};
pub use reproducibility::{ReproducibilityInfo, SCHEMA_VERSION};
pub use sample::{FailureKind, ParseOutcome, Phase, SampleInput, TimedSample};
pub use timing::{AdapterStats, LatencyStats, SampleStats, TimingCollector};
pub use tracing_config::{TracingConfig, TracingFormat, init_tracing};
