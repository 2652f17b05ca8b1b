//! End-to-end runs over configured adapters.

use std::path::PathBuf;
use std::sync::Arc;

use qasmbench_cache::BuildCache;
use qasmbench_harness::{
    AdapterPlan, AdapterSpec, AdapterStatus, BenchmarkReport, Corpus, FailureKind, Orchestrator,
    ParseOutcome, Phase, ReproducibilityInfo, RunConfig, SampleInput,
};
use qasmbench_protocol::Framing;

const GOOD: &str = "OPENQASM 3.0;\nqubit q;";
const BAD: &str = "not valid qasm ###";

fn run_config(iterations: u32) -> RunConfig {
    RunConfig {
        iterations,
        request_timeout_ms: 5_000,
        ready_timeout_ms: 5_000,
        shutdown_grace_ms: 200,
        ..RunConfig::default()
    }
}

fn orchestrator(iterations: u32) -> Orchestrator {
    let cache = Arc::new(BuildCache::in_memory(4).unwrap());
    Orchestrator::new(run_config(iterations), cache)
}

fn builtin_plans() -> Vec<AdapterPlan> {
    vec![
        AdapterSpec::InProcess {
            id: "direct".into(),
            parser: "oq3".into(),
        }
        .into(),
        AdapterSpec::Loopback {
            id: "loop".into(),
            parser: "oq3".into(),
            framing: Framing::Length,
        }
        .into(),
    ]
}

#[tokio::test]
async fn test_one_success_one_failure() {
    let corpus = Corpus::from_samples(vec![
        SampleInput::new("good.qasm", GOOD),
        SampleInput::new("bad.qasm", BAD),
    ])
    .unwrap();

    let run = orchestrator(3).run(&corpus, builtin_plans()).await.unwrap();
    assert!(!run.has_adapter_failures());

    for id in ["direct", "loop"] {
        let stats = run.timing.adapter_stats(id);
        assert_eq!(stats.measured, 6, "{id}");
        assert_eq!(stats.successes, 3, "{id}");
        assert_eq!(stats.failures_by_kind.get(&FailureKind::Parse), Some(&3), "{id}");
        // Latency covers the successful sample only.
        assert_eq!(stats.latency.as_ref().map(|l| l.count), Some(3), "{id}");
        assert!((stats.success_rate - 0.5).abs() < f64::EPSILON);
    }

    let failed: Vec<_> = run
        .timing
        .samples()
        .iter()
        .filter(|s| s.sample_id == "bad.qasm" && s.phase == Phase::Measured)
        .map(|s| s.outcome.clone())
        .collect();
    assert_eq!(failed.len(), 6);
    assert!(failed.iter().all(|o| *o == ParseOutcome::failure(FailureKind::Parse, "Parsing failed")));
}

#[tokio::test]
async fn test_warmup_excluded_from_measurements() {
    let corpus = Corpus::from_samples(vec![
        SampleInput::new("a.qasm", GOOD),
        SampleInput::new("b.qasm", GOOD),
        SampleInput::new("c.qasm", GOOD),
    ])
    .unwrap();

    let run = orchestrator(1).run(&corpus, builtin_plans()).await.unwrap();

    for id in ["direct", "loop"] {
        let stats = run.timing.adapter_stats(id);
        assert_eq!(stats.measured, corpus.len());
        assert_eq!(stats.warmup.samples, corpus.len());
        assert_eq!(stats.latency.map(|l| l.count), Some(corpus.len()));
    }

    // Measured samples come in corpus order.
    let order: Vec<_> = run
        .timing
        .samples()
        .iter()
        .filter(|s| s.adapter_id == "loop" && s.phase == Phase::Measured)
        .map(|s| s.sample_id.as_str())
        .collect();
    assert_eq!(order, ["a.qasm", "b.qasm", "c.qasm"]);
}

#[tokio::test]
async fn test_build_failure_degrades_only_that_adapter() {
    let corpus = Corpus::from_samples(vec![SampleInput::new("good.qasm", GOOD)]).unwrap();
    let missing = tempfile::tempdir().unwrap().path().join("no-such-crate");

    let mut plans = builtin_plans();
    plans.push(
        AdapterSpec::Cargo {
            id: "unbuildable".into(),
            crate_dir: missing,
            bin: "qasm-parse-server".into(),
            profile: "release".into(),
            features: Vec::new(),
            args: Vec::new(),
            framing: Framing::Nul,
        }
        .into(),
    );

    let run = orchestrator(2).run(&corpus, plans).await.unwrap();
    assert!(run.has_adapter_failures());

    let broken = run
        .adapters
        .iter()
        .find(|a| a.adapter_id == "unbuildable")
        .unwrap();
    assert!(matches!(broken.status, AdapterStatus::BuildFailed { .. }));

    let stats = run.timing.adapter_stats("unbuildable");
    assert_eq!(stats.measured, 2);
    assert_eq!(stats.failures_by_kind.get(&FailureKind::Build), Some(&2));
    assert_eq!(run.timing.adapter_stats("direct").successes, 2);
    assert_eq!(run.timing.adapter_stats("loop").successes, 2);

    let report = BenchmarkReport::from_run(run, ReproducibilityInfo::capture(&[]));
    assert_eq!(report.summary.failed_adapters, vec!["unbuildable".to_string()]);
}

#[tokio::test]
async fn test_missing_program_is_unavailable() {
    let corpus = Corpus::from_samples(vec![SampleInput::new("good.qasm", GOOD)]).unwrap();
    let plans = vec![AdapterPlan::Spec(AdapterSpec::Subprocess {
        id: "ghost".into(),
        program: PathBuf::from("/nonexistent/qasm-parse-server"),
        args: Vec::new(),
        framing: Framing::Nul,
    })];

    let run = orchestrator(2).run(&corpus, plans).await.unwrap();
    let stats = run.timing.adapter_stats("ghost");
    assert_eq!(stats.measured, 2);
    assert_eq!(stats.failures_by_kind.get(&FailureKind::Unavailable), Some(&2));
    assert!(stats.latency.is_none());
}

#[tokio::test]
async fn test_zero_iterations_is_a_fault() {
    let corpus = Corpus::from_samples(vec![SampleInput::new("good.qasm", GOOD)]).unwrap();
    let err = orchestrator(0).run(&corpus, builtin_plans()).await.unwrap_err();
    assert!(err.is_orchestration_fault());
}
