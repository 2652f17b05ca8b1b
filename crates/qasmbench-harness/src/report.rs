//! Benchmark report structure.
//!
//! The top-level report combining run metadata, aggregates and the raw
//! sample table. Every measured sample's outcome is present, failed or not.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::orchestrator::{AdapterRun, AdapterStatus, BenchmarkRun};
use crate::reproducibility::{ReproducibilityInfo, SCHEMA_VERSION};
use crate::sample::TimedSample;
use crate::timing::{AdapterStats, SampleStats};

/// Run-wide counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub samples: usize,
    pub adapters: usize,
    pub iterations: u32,
    pub measured: usize,
    pub successes: usize,
    pub failures: usize,
    /// Adapters that could not be built or constructed.
    pub failed_adapters: Vec<String>,
}

/// Complete benchmark report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkReport {
    /// Schema version for forward compatibility.
    pub schema_version: String,
    pub run_id: Uuid,
    /// Timestamp of the run.
    pub timestamp: DateTime<Utc>,
    pub reproducibility: ReproducibilityInfo,
    pub summary: RunSummary,
    pub adapters: Vec<AdapterRun>,
    pub adapter_stats: Vec<AdapterStats>,
    pub sample_stats: Vec<SampleStats>,
    /// Raw table, warm-up included.
    pub samples: Vec<TimedSample>,
}

impl BenchmarkReport {
    pub fn from_run(run: BenchmarkRun, reproducibility: ReproducibilityInfo) -> Self {
        let adapter_stats = run.timing.all_adapter_stats();
        let sample_stats = run.timing.sample_stats(&run.sample_ids);

        let summary = RunSummary {
            samples: run.sample_ids.len(),
            adapters: run.adapters.len(),
            iterations: run.iterations,
            measured: adapter_stats.iter().map(|s| s.measured).sum(),
            successes: adapter_stats.iter().map(|s| s.successes).sum(),
            failures: adapter_stats.iter().map(|s| s.failures).sum(),
            failed_adapters: run
                .adapters
                .iter()
                .filter(|a| a.status != AdapterStatus::Completed)
                .map(|a| a.adapter_id.clone())
                .collect(),
        };

        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            run_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            reproducibility,
            summary,
            adapters: run.adapters,
            adapter_stats,
            sample_stats,
            samples: run.timing.into_samples(),
        }
    }

    /// Plain-text tables for the terminal.
    pub fn render_table(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Run {} | {} samples x {} iterations | {} adapters",
            self.run_id, self.summary.samples, self.summary.iterations, self.summary.adapters
        );
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "{:<24} {:>8} {:>8} {:>10} {:>10} {:>10} {:>10} {:>10}",
            "adapter", "ok", "failed", "success%", "mean ms", "median ms", "min ms", "std ms"
        );
        for stats in &self.adapter_stats {
            let (mean, median, min, std) = match &stats.latency {
                Some(l) => (
                    format!("{:.3}", l.mean_ms),
                    format!("{:.3}", l.median_ms),
                    format!("{:.3}", l.min_ms),
                    format!("{:.3}", l.std_dev_ms),
                ),
                None => ("-".into(), "-".into(), "-".into(), "-".into()),
            };
            let _ = writeln!(
                out,
                "{:<24} {:>8} {:>8} {:>9.1}% {:>10} {:>10} {:>10} {:>10}",
                stats.adapter_id,
                stats.successes,
                stats.failures,
                stats.success_rate * 100.0,
                mean,
                median,
                min,
                std
            );
            for (kind, count) in &stats.failures_by_kind {
                let _ = writeln!(out, "{:<24}   {kind}: {count}", "");
            }
        }

        if !self.sample_stats.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "{:<40} {:<24} {:>10}", "sample", "fastest", "mean ms");
            for sample in &self.sample_stats {
                let fastest = sample.fastest_adapter.as_deref().unwrap_or("-");
                let mean = sample
                    .adapters
                    .iter()
                    .find(|a| Some(a.adapter_id.as_str()) == sample.fastest_adapter.as_deref())
                    .and_then(|a| a.latency.as_ref())
                    .map_or_else(|| "-".to_string(), |l| format!("{:.3}", l.mean_ms));
                let _ = writeln!(out, "{:<40} {:<24} {:>10}", sample.sample_id, fastest, mean);
            }
        }

        for adapter in &self.adapters {
            match &adapter.status {
                AdapterStatus::Completed => {}
                AdapterStatus::BuildFailed { message } | AdapterStatus::Unavailable { message } => {
                    let _ = writeln!(out);
                    let _ = writeln!(out, "{}: {message}", adapter.adapter_id);
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::AdapterKind;
    use crate::sample::{FailureKind, ParseOutcome, Phase};
    use crate::timing::TimingCollector;
    use std::time::Duration;

    fn run() -> BenchmarkRun {
        let mut timing = TimingCollector::new();
        timing.record("fast", "a.qasm", 0, Phase::Warmup, ParseOutcome::Success, Duration::from_millis(9));
        timing.record("fast", "a.qasm", 0, Phase::Measured, ParseOutcome::Success, Duration::from_millis(2));
        timing.record(
            "fast",
            "b.qasm",
            0,
            Phase::Measured,
            ParseOutcome::failure(FailureKind::Parse, "Parsing failed"),
            Duration::from_millis(1),
        );
        timing.record(
            "broken",
            "a.qasm",
            0,
            Phase::Measured,
            ParseOutcome::failure(FailureKind::Build, "cargo exited with 101"),
            Duration::ZERO,
        );
        timing.record(
            "broken",
            "b.qasm",
            0,
            Phase::Measured,
            ParseOutcome::failure(FailureKind::Build, "cargo exited with 101"),
            Duration::ZERO,
        );

        BenchmarkRun {
            sample_ids: vec!["a.qasm".into(), "b.qasm".into()],
            iterations: 1,
            adapters: vec![
                AdapterRun {
                    adapter_id: "fast".into(),
                    kind: AdapterKind::InProcess,
                    status: AdapterStatus::Completed,
                    wall_ms: 12,
                },
                AdapterRun {
                    adapter_id: "broken".into(),
                    kind: AdapterKind::Subprocess,
                    status: AdapterStatus::BuildFailed {
                        message: "cargo exited with 101".into(),
                    },
                    wall_ms: 300,
                },
            ],
            timing,
        }
    }

    #[test]
    fn test_summary_counts_measured_only() {
        let report = BenchmarkReport::from_run(run(), ReproducibilityInfo::capture(&[]));
        assert_eq!(report.schema_version, SCHEMA_VERSION);
        assert_eq!(report.summary.measured, 4);
        assert_eq!(report.summary.successes, 1);
        assert_eq!(report.summary.failures, 3);
        assert_eq!(report.summary.failed_adapters, vec!["broken".to_string()]);
        assert_eq!(report.samples.len(), 5);
    }

    #[test]
    fn test_render_table_lists_every_adapter() {
        let report = BenchmarkReport::from_run(run(), ReproducibilityInfo::capture(&[]));
        let table = report.render_table();
        assert!(table.contains("fast"));
        assert!(table.contains("broken"));
        assert!(table.contains("build: 2"));
        assert!(table.contains("broken: cargo exited with 101"));
    }
}
