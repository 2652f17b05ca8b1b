//! The benchmark run behind the CLI.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use qasmbench_cache::BuildCache;
use qasmbench_harness::{
    AdapterPlan, AdapterStatus, BenchConfig, BenchmarkReport, Corpus, ExportConfig, Orchestrator,
    ReproducibilityInfo, TracingConfig, init_tracing, to_file, to_json,
};
use tracing::info;

use crate::{Cli, OutputFormat};

/// How a run that reached the end went.
#[derive(Debug)]
pub enum Outcome {
    Completed,
    /// Ids of adapters that never got to parse anything.
    AdapterFailures(Vec<String>),
}

pub async fn execute(cli: &Cli) -> Result<Outcome> {
    let config = load_config(cli)?;

    init_tracing(&TracingConfig::from_logging(&config.logging, cli.verbose))
        .map_err(|e| anyhow::anyhow!("failed to initialise logging: {e}"))?;

    if cli.list_adapters {
        for adapter in &config.adapters {
            println!("{:<24} {}", adapter.id(), adapter.kind_name());
        }
        return Ok(Outcome::Completed);
    }

    let corpus = Corpus::load(&config.run.corpus_dir)?;
    info!(
        corpus = %config.run.corpus_dir.display(),
        samples = corpus.len(),
        "corpus loaded"
    );

    let cache = open_cache(&config).await?;
    let mut orchestrator = Orchestrator::new(config.run.clone(), cache);
    let plans: Vec<AdapterPlan> = config.adapters.iter().cloned().map(Into::into).collect();

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(format!(
        "Benchmarking {} adapter(s) over {} sample(s) x {} iteration(s)...",
        plans.len(),
        corpus.len(),
        config.run.iterations
    ));
    spinner.enable_steady_tick(Duration::from_millis(100));

    let run = orchestrator.run(&corpus, plans).await;
    spinner.finish_and_clear();
    let run = run?;

    let args: Vec<String> = std::env::args().collect();
    let reproducibility =
        ReproducibilityInfo::capture(&args).with_toolchain(orchestrator.toolchain().map(String::from));
    let report = BenchmarkReport::from_run(run, reproducibility);

    to_file(&report, &config.run.output, &ExportConfig::default())
        .await
        .with_context(|| format!("writing {}", config.run.output.display()))?;

    match cli.format {
        OutputFormat::Table => {
            print!("{}", report.render_table());
            println!();
            println!(
                "{} results written to {}",
                style("✓").green().bold(),
                config.run.output.display()
            );
        }
        OutputFormat::Json => println!("{}", to_json(&report, &ExportConfig::default())?),
    }

    let failed: Vec<String> = report
        .adapters
        .iter()
        .filter(|a| a.status != AdapterStatus::Completed)
        .map(|a| a.adapter_id.clone())
        .collect();
    if failed.is_empty() {
        Ok(Outcome::Completed)
    } else {
        Ok(Outcome::AdapterFailures(failed))
    }
}

/// Config file, then environment, then command-line flags.
fn load_config(cli: &Cli) -> Result<BenchConfig> {
    let path = cli.config_path();
    let mut config = BenchConfig::load(path.as_deref()).with_context(|| match &path {
        Some(p) => format!("loading configuration from {}", p.display()),
        None => "loading default configuration".to_string(),
    })?;

    if let Some(corpus) = &cli.corpus {
        config.run.corpus_dir = corpus.clone();
    }
    if let Some(output) = &cli.output {
        config.run.output = output.clone();
    }
    if let Some(iterations) = cli.iterations {
        config.run.iterations = iterations;
    }
    config.select_adapters(&cli.adapters)?;
    config.validate()?;
    Ok(config)
}

async fn open_cache(config: &BenchConfig) -> Result<Arc<BuildCache>> {
    let cache = if config.cache.persistent {
        let dir = config.cache.resolved_dir();
        BuildCache::open(&dir, config.cache.capacity)
            .await
            .with_context(|| format!("opening build cache at {}", dir.display()))?
    } else {
        BuildCache::in_memory(config.cache.capacity)?
    };
    Ok(Arc::new(cache))
}
