//! Crashing and hanging servers, driven by scripted in-memory launchers.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use qasmbench_cache::BuildCache;
use qasmbench_harness::{
    Adapter, AdapterHandle, AdapterKind, AdapterPlan, AdapterSpec, Connection, Corpus,
    FailureKind, HandleSettings, HandleState, HarnessResult, Launcher, Orchestrator,
    ParseOutcome, Phase, RunConfig, SampleInput, ServerAdapter, ServerProcess,
};
use qasmbench_protocol::Framing;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

const GOOD: &str = "OPENQASM 3.0;\nqubit q;";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Reply,
    Crash,
    Hang,
}

/// Launches a fake server that consults `script` with a request counter
/// shared across all launches.
struct ScriptedLauncher {
    requests: Arc<AtomicUsize>,
    launches: Arc<AtomicU32>,
    script: fn(usize) -> Action,
}

impl ScriptedLauncher {
    fn new(script: fn(usize) -> Action) -> Self {
        Self {
            requests: Arc::new(AtomicUsize::new(0)),
            launches: Arc::new(AtomicU32::new(0)),
            script,
        }
    }
}

async fn scripted_server(io: DuplexStream, requests: Arc<AtomicUsize>, script: fn(usize) -> Action) {
    let (read, mut write) = tokio::io::split(io);
    let mut reader = BufReader::new(read);
    if write.write_all(b"READY\n").await.is_err() {
        return;
    }
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(0, &mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
        match script(requests.fetch_add(1, Ordering::SeqCst)) {
            Action::Reply => {
                if write.write_all(b"SUCCESS\n").await.is_err() {
                    return;
                }
            }
            Action::Crash => return,
            Action::Hang => std::future::pending::<()>().await,
        }
    }
}

#[async_trait]
impl Launcher for ScriptedLauncher {
    fn describe(&self) -> String {
        "scripted".to_string()
    }

    async fn launch(&self) -> HarnessResult<Connection> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        let (client, server) = tokio::io::duplex(4096);
        let task = tokio::spawn(scripted_server(server, self.requests.clone(), self.script));
        let (read, write) = tokio::io::split(client);
        Ok(Connection {
            reader: Box::new(BufReader::new(read)),
            writer: Box::new(write),
            process: ServerProcess::task(task),
        })
    }
}

fn settings(max_restarts: u32) -> HandleSettings {
    HandleSettings {
        framing: Framing::Nul,
        request_timeout: Duration::from_millis(200),
        ready_timeout: Duration::from_secs(2),
        max_restarts,
        shutdown_grace: Duration::from_millis(100),
    }
}

#[tokio::test]
async fn test_timeout_triggers_restart() {
    let launcher = ScriptedLauncher::new(|n| if n == 1 { Action::Hang } else { Action::Reply });
    let launches = launcher.launches.clone();
    let mut handle = AdapterHandle::new("hangs-once", Box::new(launcher), settings(1));

    assert_eq!(handle.request(GOOD).await.0, ParseOutcome::Success);

    let (outcome, _) = handle.request(GOOD).await;
    assert_eq!(outcome.failure_kind(), Some(FailureKind::Timeout));
    assert_eq!(handle.state(), HandleState::NotStarted);

    assert_eq!(handle.request(GOOD).await.0, ParseOutcome::Success);
    assert_eq!(handle.restarts(), 1);
    assert_eq!(launches.load(Ordering::SeqCst), 2);

    handle.teardown().await;
    assert_eq!(handle.state(), HandleState::Terminated);
}

#[tokio::test]
async fn test_exhausted_budget_is_unavailable() {
    let launcher = ScriptedLauncher::new(|_| Action::Crash);
    let launches = launcher.launches.clone();
    let mut handle = AdapterHandle::new("always-crashes", Box::new(launcher), settings(1));

    assert_eq!(handle.request(GOOD).await.0.failure_kind(), Some(FailureKind::Crash));
    assert_eq!(handle.request(GOOD).await.0.failure_kind(), Some(FailureKind::Crash));
    assert_eq!(handle.request(GOOD).await.0, ParseOutcome::unavailable());
    assert!(handle.is_unavailable());
    assert_eq!(launches.load(Ordering::SeqCst), 2);

    // No further launches once the budget is spent.
    assert_eq!(handle.request(GOOD).await.0, ParseOutcome::unavailable());
    assert_eq!(launches.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_nul_in_sample_does_not_poison() {
    let launcher = ScriptedLauncher::new(|_| Action::Reply);
    let launches = launcher.launches.clone();
    let mut handle = AdapterHandle::new("nul", Box::new(launcher), settings(0));

    let (outcome, _) = handle.request("qubit\0q;").await;
    assert_eq!(outcome.failure_kind(), Some(FailureKind::Protocol));
    assert_eq!(launches.load(Ordering::SeqCst), 0);

    assert_eq!(handle.request(GOOD).await.0, ParseOutcome::Success);
    assert_eq!(handle.restarts(), 0);
}

#[tokio::test]
async fn test_crash_mid_run_leaves_other_adapters_intact() {
    let corpus = Corpus::from_samples(vec![
        SampleInput::new("a.qasm", GOOD),
        SampleInput::new("b.qasm", GOOD),
        SampleInput::new("c.qasm", GOOD),
    ])
    .unwrap();

    // Warm-up consumes requests 0..3; the server dies on the second measured one.
    let launcher = ScriptedLauncher::new(|n| if n == 4 { Action::Crash } else { Action::Reply });
    let flaky: Box<dyn Adapter> = Box::new(ServerAdapter::new(
        "flaky",
        AdapterKind::Subprocess,
        Box::new(launcher),
        settings(0),
    ));

    let plans = vec![
        AdapterPlan::Ready(flaky),
        AdapterSpec::InProcess {
            id: "direct".into(),
            parser: "oq3".into(),
        }
        .into(),
    ];

    let run_config = RunConfig {
        iterations: 2,
        ..RunConfig::default()
    };
    let cache = Arc::new(BuildCache::in_memory(1).unwrap());
    let run = Orchestrator::new(run_config, cache)
        .run(&corpus, plans)
        .await
        .unwrap();

    let measured: Vec<_> = run
        .timing
        .samples()
        .iter()
        .filter(|s| s.adapter_id == "flaky" && s.phase == Phase::Measured)
        .map(|s| s.outcome.failure_kind())
        .collect();
    assert_eq!(
        measured,
        vec![
            None,
            Some(FailureKind::Crash),
            Some(FailureKind::Unavailable),
            Some(FailureKind::Unavailable),
            Some(FailureKind::Unavailable),
            Some(FailureKind::Unavailable),
        ]
    );

    let direct = run.timing.adapter_stats("direct");
    assert_eq!(direct.measured, 6);
    assert_eq!(direct.successes, 6);
}
