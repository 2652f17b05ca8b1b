//! Timing collection and latency statistics.
//!
//! Only `measured` samples with a `Success` outcome feed latency statistics.
//! Warm-up samples are kept for the raw table but never aggregated, and
//! failures are counted per kind instead of timed.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::adapter::Attempt;
use crate::sample::{FailureKind, ParseOutcome, Phase, TimedSample};

/// Summary statistics over a set of durations, in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    pub count: usize,
    pub mean_ms: f64,
    pub median_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    /// Sample variance (n - 1 denominator); zero for a single value.
    pub variance_ms2: f64,
    pub std_dev_ms: f64,
}

impl LatencyStats {
    /// Statistics over `values`, or `None` if there are none.
    pub fn from_millis(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);

        let n = sorted.len();
        let mean = sorted.iter().sum::<f64>() / n as f64;
        let median = if n % 2 == 1 {
            sorted[n / 2]
        } else {
            (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
        };
        let variance = if n > 1 {
            sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64
        } else {
            0.0
        };

        Some(Self {
            count: n,
            mean_ms: mean,
            median_ms: median,
            min_ms: sorted[0],
            max_ms: sorted[n - 1],
            variance_ms2: variance,
            std_dev_ms: variance.sqrt(),
        })
    }
}

/// Warm-up pass summary. Reported, never aggregated into latency.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WarmupSummary {
    pub samples: usize,
    pub successes: usize,
    pub total_ms: f64,
}

/// Aggregates for one adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterStats {
    pub adapter_id: String,
    /// Measured samples recorded.
    pub measured: usize,
    pub successes: usize,
    pub failures: usize,
    pub failures_by_kind: BTreeMap<FailureKind, usize>,
    /// `successes / measured`, zero when nothing was measured.
    pub success_rate: f64,
    /// Latency over measured successes only.
    pub latency: Option<LatencyStats>,
    pub warmup: WarmupSummary,
}

/// One adapter's results for one sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleAdapterStats {
    pub adapter_id: String,
    pub successes: usize,
    pub failures: usize,
    pub latency: Option<LatencyStats>,
}

/// Results for one sample across adapters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleStats {
    pub sample_id: String,
    pub adapters: Vec<SampleAdapterStats>,
    /// Adapter with the lowest mean latency on this sample.
    pub fastest_adapter: Option<String>,
}

/// Accumulates timed samples in the order they are recorded.
#[derive(Debug, Clone, Default)]
pub struct TimingCollector {
    samples: Vec<TimedSample>,
    adapter_order: Vec<String>,
}

impl TimingCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &mut self,
        adapter_id: &str,
        sample_id: &str,
        iteration: u32,
        phase: Phase,
        outcome: ParseOutcome,
        duration: Duration,
    ) {
        if !self.adapter_order.iter().any(|a| a == adapter_id) {
            self.adapter_order.push(adapter_id.to_string());
        }
        self.samples.push(TimedSample {
            adapter_id: adapter_id.to_string(),
            sample_id: sample_id.to_string(),
            iteration,
            phase,
            outcome,
            duration_ns: u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX),
        });
    }

    /// Record an adapter's attempt for a given phase and iteration.
    pub fn record_attempt(&mut self, adapter_id: &str, phase: Phase, iteration: u32, attempt: Attempt) {
        self.record(
            adapter_id,
            &attempt.sample_id,
            iteration,
            phase,
            attempt.outcome,
            attempt.duration,
        );
    }

    pub fn samples(&self) -> &[TimedSample] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<TimedSample> {
        self.samples
    }

    /// Adapter ids in the order they first recorded a sample.
    pub fn adapter_ids(&self) -> &[String] {
        &self.adapter_order
    }

    fn measured<'a>(&'a self, adapter_id: &'a str) -> impl Iterator<Item = &'a TimedSample> + 'a {
        self.samples
            .iter()
            .filter(move |s| s.adapter_id == adapter_id && s.phase == Phase::Measured)
    }

    /// Aggregate statistics for one adapter.
    pub fn adapter_stats(&self, adapter_id: &str) -> AdapterStats {
        let mut successes_ms = Vec::new();
        let mut failures_by_kind = BTreeMap::new();
        let mut measured = 0;
        for sample in self.measured(adapter_id) {
            measured += 1;
            match sample.outcome.failure_kind() {
                None => successes_ms.push(sample.duration_ms()),
                Some(kind) => *failures_by_kind.entry(kind).or_insert(0) += 1,
            }
        }

        let mut warmup = WarmupSummary::default();
        for sample in self
            .samples
            .iter()
            .filter(|s| s.adapter_id == adapter_id && s.phase == Phase::Warmup)
        {
            warmup.samples += 1;
            warmup.total_ms += sample.duration_ms();
            if sample.outcome.is_success() {
                warmup.successes += 1;
            }
        }

        let successes = successes_ms.len();
        AdapterStats {
            adapter_id: adapter_id.to_string(),
            measured,
            successes,
            failures: measured - successes,
            failures_by_kind,
            success_rate: if measured > 0 {
                successes as f64 / measured as f64
            } else {
                0.0
            },
            latency: LatencyStats::from_millis(&successes_ms),
            warmup,
        }
    }

    /// Aggregates for every adapter, in recording order.
    pub fn all_adapter_stats(&self) -> Vec<AdapterStats> {
        self.adapter_order
            .iter()
            .map(|id| self.adapter_stats(id))
            .collect()
    }

    /// Per-sample statistics across adapters, for `sample_ids` in order.
    pub fn sample_stats(&self, sample_ids: &[String]) -> Vec<SampleStats> {
        sample_ids
            .iter()
            .map(|sample_id| {
                let adapters: Vec<SampleAdapterStats> = self
                    .adapter_order
                    .iter()
                    .map(|adapter_id| {
                        let mut ok_ms = Vec::new();
                        let mut failures = 0;
                        for s in self.measured(adapter_id).filter(|s| &s.sample_id == sample_id) {
                            if s.outcome.is_success() {
                                ok_ms.push(s.duration_ms());
                            } else {
                                failures += 1;
                            }
                        }
                        SampleAdapterStats {
                            adapter_id: adapter_id.clone(),
                            successes: ok_ms.len(),
                            failures,
                            latency: LatencyStats::from_millis(&ok_ms),
                        }
                    })
                    .collect();

                let fastest_adapter = adapters
                    .iter()
                    .filter_map(|a| a.latency.as_ref().map(|l| (a, l.mean_ms)))
                    .min_by(|a, b| a.1.total_cmp(&b.1))
                    .map(|(a, _)| a.adapter_id.clone());

                SampleStats {
                    sample_id: sample_id.clone(),
                    adapters,
                    fastest_adapter,
                }
            })
            .collect()
    }
}
