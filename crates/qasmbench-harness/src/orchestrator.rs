//! Orchestrator: runs every adapter over the corpus and collects timings.
//!
//! ```text
//!   for each adapter (sequentially):
//!     prepare ──→ warm-up pass ──→ N measured passes ──→ teardown
//!     (build)      (untimed)        (corpus order)        (always)
//! ```
//!
//! A sample failure never stops an adapter, and an adapter failure never
//! stops the run. Only orchestration faults (no corpus, unusable cache)
//! abort.

use std::sync::Arc;
use std::time::{Duration, Instant};

use qasmbench_cache::{BuildCache, CacheKey, CargoBuild, toolchain_version};
use qasmbench_parsers::parser_by_name;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::adapter::{
    Adapter, AdapterKind, CommandLauncher, HandleSettings, InProcessAdapter, LoopbackLauncher,
    ServerAdapter,
};
use crate::config::{AdapterSpec, RunConfig};
use crate::corpus::Corpus;
use crate::error::{HarnessError, HarnessResult};
use crate::sample::{FailureKind, ParseOutcome, Phase};
use crate::timing::TimingCollector;

/// What to benchmark: a configured adapter, or one constructed by the caller.
pub enum AdapterPlan {
    Spec(AdapterSpec),
    Ready(Box<dyn Adapter>),
}

impl From<AdapterSpec> for AdapterPlan {
    fn from(spec: AdapterSpec) -> Self {
        AdapterPlan::Spec(spec)
    }
}

impl From<Box<dyn Adapter>> for AdapterPlan {
    fn from(adapter: Box<dyn Adapter>) -> Self {
        AdapterPlan::Ready(adapter)
    }
}

/// How an adapter's run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AdapterStatus {
    /// All passes ran (individual samples may still have failed).
    Completed,
    /// The artifact build failed; every sample is `Failure { build }`.
    BuildFailed { message: String },
    /// The adapter could not be constructed; every sample is `Failure { unavailable }`.
    Unavailable { message: String },
}

/// Per-adapter run metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterRun {
    pub adapter_id: String,
    pub kind: AdapterKind,
    pub status: AdapterStatus,
    /// Wall time from prepare through teardown.
    pub wall_ms: u64,
}

/// Everything a run produced.
#[derive(Debug, Clone)]
pub struct BenchmarkRun {
    pub sample_ids: Vec<String>,
    pub iterations: u32,
    pub adapters: Vec<AdapterRun>,
    pub timing: TimingCollector,
}

impl BenchmarkRun {
    /// Whether any adapter failed to build or could not be constructed.
    pub fn has_adapter_failures(&self) -> bool {
        self.adapters
            .iter()
            .any(|a| a.status != AdapterStatus::Completed)
    }
}

/// Runs adapters one after another over a shared corpus.
pub struct Orchestrator {
    run: RunConfig,
    cache: Arc<BuildCache>,
    toolchain: Option<String>,
}

impl Orchestrator {
    pub fn new(run: RunConfig, cache: Arc<BuildCache>) -> Self {
        Self {
            run,
            cache,
            toolchain: None,
        }
    }

    pub fn cache(&self) -> &Arc<BuildCache> {
        &self.cache
    }

    /// Toolchain version, once a cargo adapter has needed it.
    pub fn toolchain(&self) -> Option<&str> {
        self.toolchain.as_deref()
    }

    /// Benchmark every plan in order.
    pub async fn run(
        &mut self,
        corpus: &Corpus,
        plans: Vec<AdapterPlan>,
    ) -> HarnessResult<BenchmarkRun> {
        if corpus.is_empty() {
            return Err(HarnessError::Orchestration("corpus is empty".into()));
        }
        if self.run.iterations == 0 {
            return Err(HarnessError::Orchestration(
                "iterations must be greater than 0".into(),
            ));
        }

        info!(
            samples = corpus.len(),
            adapters = plans.len(),
            iterations = self.run.iterations,
            "starting benchmark run"
        );
        let mut timing = TimingCollector::new();
        let mut adapters = Vec::with_capacity(plans.len());

        for plan in plans {
            let started = Instant::now();
            let (adapter_id, kind, prepared) = match plan {
                AdapterPlan::Ready(adapter) => {
                    (adapter.id().to_string(), adapter.kind(), Ok(adapter))
                }
                AdapterPlan::Spec(spec) => {
                    let kind = spec_kind(&spec);
                    let id = spec.id().to_string();
                    let prepared = self.prepare(&spec).await;
                    (id, kind, prepared)
                }
            };

            let status = match prepared {
                Ok(mut adapter) => {
                    self.benchmark_adapter(adapter.as_mut(), corpus, &mut timing)
                        .await;
                    AdapterStatus::Completed
                }
                Err(e) if e.is_orchestration_fault() => return Err(e),
                Err(e) => {
                    warn!(adapter = %adapter_id, error = %e, "adapter preparation failed");
                    let message = e.to_string();
                    let (failure_kind, status) = match e {
                        HarnessError::Build { .. } => (
                            FailureKind::Build,
                            AdapterStatus::BuildFailed {
                                message: message.clone(),
                            },
                        ),
                        _ => (
                            FailureKind::Unavailable,
                            AdapterStatus::Unavailable {
                                message: message.clone(),
                            },
                        ),
                    };
                    self.record_prepare_failure(
                        &adapter_id,
                        failure_kind,
                        &message,
                        corpus,
                        &mut timing,
                    );
                    status
                }
            };

            adapters.push(AdapterRun {
                adapter_id,
                kind,
                status,
                wall_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            });
        }

        if let Err(e) = self.cache.persist().await {
            warn!(error = %e, "could not persist the build cache index");
        }
        info!(samples = timing.samples().len(), "benchmark run finished");
        Ok(BenchmarkRun {
            sample_ids: corpus.ids(),
            iterations: self.run.iterations,
            adapters,
            timing,
        })
    }

    /// Warm-up pass, measured passes, then teardown on every path.
    async fn benchmark_adapter(
        &self,
        adapter: &mut dyn Adapter,
        corpus: &Corpus,
        timing: &mut TimingCollector,
    ) {
        let id = adapter.id().to_string();
        info!(adapter = %id, kind = %adapter.kind(), "warm-up pass");

        match adapter.warmup(corpus).await {
            Ok(attempts) => {
                let failed = attempts.iter().filter(|a| !a.outcome.is_success()).count();
                if failed > 0 {
                    warn!(adapter = %id, failed, "warm-up pass had failures");
                }
                for attempt in attempts {
                    timing.record_attempt(&id, Phase::Warmup, 0, attempt);
                }
            }
            Err(e) => warn!(adapter = %id, error = %e, "warm-up could not start the adapter"),
        }

        for iteration in 0..self.run.iterations {
            for sample in corpus.iter() {
                let (outcome, duration) = adapter.parse(sample).await;
                timing.record(&id, &sample.id, iteration, Phase::Measured, outcome, duration);
            }
        }

        adapter.teardown().await;
        info!(adapter = %id, "adapter finished");
    }

    /// Mark every measured sample of an adapter that never got to run.
    fn record_prepare_failure(
        &self,
        adapter_id: &str,
        kind: FailureKind,
        message: &str,
        corpus: &Corpus,
        timing: &mut TimingCollector,
    ) {
        for iteration in 0..self.run.iterations {
            for sample in corpus.iter() {
                timing.record(
                    adapter_id,
                    &sample.id,
                    iteration,
                    Phase::Measured,
                    ParseOutcome::failure(kind, message),
                    Duration::ZERO,
                );
            }
        }
    }

    /// Turn a configured adapter into a runnable one, building it if needed.
    async fn prepare(&mut self, spec: &AdapterSpec) -> HarnessResult<Box<dyn Adapter>> {
        match spec {
            AdapterSpec::InProcess { id, parser } => {
                let parser =
                    parser_by_name(parser).map_err(|e| HarnessError::unavailable(id, e.to_string()))?;
                Ok(Box::new(InProcessAdapter::new(id.clone(), parser)))
            }
            AdapterSpec::Loopback {
                id,
                parser,
                framing,
            } => {
                let launcher = LoopbackLauncher::new(parser.clone(), *framing)
                    .map_err(|e| HarnessError::unavailable(id, e.to_string()))?;
                let settings = HandleSettings::from_run(&self.run, *framing);
                Ok(Box::new(ServerAdapter::loopback(id.clone(), launcher, settings)))
            }
            AdapterSpec::Subprocess {
                id,
                program,
                args,
                framing,
            } => {
                let launcher = CommandLauncher::new(program.clone()).with_args(with_framing_arg(
                    args,
                    *framing,
                    false,
                ));
                let settings = HandleSettings::from_run(&self.run, *framing);
                Ok(Box::new(ServerAdapter::subprocess(id.clone(), launcher, settings)))
            }
            AdapterSpec::Cargo {
                id,
                crate_dir,
                bin,
                profile,
                features,
                args,
                framing,
            } => {
                let build = CargoBuild::new(crate_dir.clone(), bin.clone())
                    .with_profile(profile.clone())
                    .with_features(features.clone());
                let exe = self
                    .build_artifact(id, &build)
                    .await
                    .map_err(|source| HarnessError::Build {
                        adapter: id.clone(),
                        source,
                    })?;
                info!(adapter = %id, artifact = %exe.display(), "artifact ready");

                let launcher = CommandLauncher::new(exe).with_args(with_framing_arg(
                    args,
                    *framing,
                    true,
                ));
                let settings = HandleSettings::from_run(&self.run, *framing);
                Ok(Box::new(ServerAdapter::subprocess(id.clone(), launcher, settings)))
            }
        }
    }

    async fn build_artifact(
        &mut self,
        label: &str,
        build: &CargoBuild,
    ) -> Result<std::path::PathBuf, qasmbench_cache::CacheError> {
        let toolchain = match &self.toolchain {
            Some(version) => version.clone(),
            None => {
                let version = toolchain_version("rustc").await?;
                self.toolchain = Some(version.clone());
                version
            }
        };
        let key = CacheKey::derive(&build.inputs(label, &toolchain).await?);
        let target_dir = self.cache.build_dir(&key);
        self.cache
            .get_or_build(&key, || build.run(&target_dir))
            .await
    }
}

fn spec_kind(spec: &AdapterSpec) -> AdapterKind {
    match spec {
        AdapterSpec::InProcess { .. } => AdapterKind::InProcess,
        AdapterSpec::Loopback { .. } => AdapterKind::Loopback,
        AdapterSpec::Subprocess { .. } | AdapterSpec::Cargo { .. } => AdapterKind::Subprocess,
    }
}

/// Servers built from this workspace take `--framing`; add it unless the
/// configured args already choose one.
fn with_framing_arg(
    args: &[String],
    framing: qasmbench_protocol::Framing,
    own_server: bool,
) -> Vec<String> {
    let mut out = args.to_vec();
    if own_server && !args.iter().any(|a| a == "--framing" || a.starts_with("--framing=")) {
        out.push("--framing".to_string());
        out.push(framing.name().to_string());
    }
    out
}
