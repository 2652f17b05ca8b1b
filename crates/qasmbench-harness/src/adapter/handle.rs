//! Lifecycle of one parse server as seen from the harness.
//!
//! ```text
//!   NotStarted ──ensure_ready()──→ Ready ──request()──→ Serving ─┐
//!       ↑                            │                    ↑______│
//!       └──────── poison (timeout, crash, protocol error) ───────┤
//!                                                                 │
//!   any state ─────────────────teardown()─────────────────→ Terminated
//! ```
//!
//! A poisoned connection is dropped (killing the server) and the handle
//! falls back to `NotStarted`; the next request relaunches the server if the
//! restart budget allows. Once the budget is spent every request answers
//! `Failure { unavailable }` without touching the launcher again.

use std::fmt;
use std::time::{Duration, Instant};

use qasmbench_protocol::{Framing, ProtocolClient, ProtocolError, Response};
use qasmbench_protocol::response::SERVER_ERROR_PREFIX;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::launcher::{BoxedReader, BoxedWriter, Launcher, ServerProcess};
use crate::config::RunConfig;
use crate::error::{HarnessError, HarnessResult};
use crate::sample::{FailureKind, ParseOutcome};

/// Timeouts and restart policy of a handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleSettings {
    pub framing: Framing,
    pub request_timeout: Duration,
    pub ready_timeout: Duration,
    /// Relaunches allowed after the first launch.
    pub max_restarts: u32,
    pub shutdown_grace: Duration,
}

impl Default for HandleSettings {
    fn default() -> Self {
        Self::from_run(&RunConfig::default(), Framing::default())
    }
}

impl HandleSettings {
    pub fn from_run(run: &RunConfig, framing: Framing) -> Self {
        Self {
            framing,
            request_timeout: run.request_timeout(),
            ready_timeout: run.ready_timeout(),
            max_restarts: run.max_restarts,
            shutdown_grace: run.shutdown_grace(),
        }
    }
}

/// Where a handle is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandleState {
    NotStarted,
    /// `READY` observed, no request sent yet.
    Ready,
    Serving,
    Terminated,
}

impl fmt::Display for HandleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HandleState::NotStarted => "not-started",
            HandleState::Ready => "ready",
            HandleState::Serving => "serving",
            HandleState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

struct Live {
    client: ProtocolClient<BoxedReader, BoxedWriter>,
    process: ServerProcess,
}

/// Exclusive owner of one server's I/O and process.
pub struct AdapterHandle {
    adapter_id: String,
    launcher: Box<dyn Launcher>,
    settings: HandleSettings,
    state: HandleState,
    live: Option<Live>,
    launches: u32,
    unavailable: Option<String>,
}

impl AdapterHandle {
    pub fn new(
        adapter_id: impl Into<String>,
        launcher: Box<dyn Launcher>,
        settings: HandleSettings,
    ) -> Self {
        Self {
            adapter_id: adapter_id.into(),
            launcher,
            settings,
            state: HandleState::NotStarted,
            live: None,
            launches: 0,
            unavailable: None,
        }
    }

    pub fn state(&self) -> HandleState {
        self.state
    }

    pub fn settings(&self) -> &HandleSettings {
        &self.settings
    }

    /// Number of times the server has been launched.
    pub fn launches(&self) -> u32 {
        self.launches
    }

    pub fn restarts(&self) -> u32 {
        self.launches.saturating_sub(1)
    }

    /// Whether the restart budget is spent.
    pub fn is_unavailable(&self) -> bool {
        self.unavailable.is_some()
    }

    /// OS process id of the live server, if it is a child process.
    pub fn pid(&self) -> Option<u32> {
        self.live.as_ref().and_then(|live| live.process.pid())
    }

    /// Make sure a server is running and has announced `READY`.
    ///
    /// Failed launches are retried immediately while the budget lasts.
    pub async fn ensure_ready(&mut self) -> HarnessResult<()> {
        if self.state == HandleState::Terminated {
            return Err(HarnessError::unavailable(&self.adapter_id, "adapter torn down"));
        }
        if let Some(reason) = &self.unavailable {
            return Err(HarnessError::unavailable(&self.adapter_id, reason.clone()));
        }
        if self.live.is_some() {
            return Ok(());
        }

        let mut last_error = String::new();
        while self.launches <= self.settings.max_restarts {
            self.launches += 1;
            if self.launches > 1 {
                info!(
                    adapter = %self.adapter_id,
                    restart = self.launches - 1,
                    budget = self.settings.max_restarts,
                    "restarting parse server"
                );
            }
            match launch_once(self.launcher.as_ref(), &self.settings).await {
                Ok(live) => {
                    self.live = Some(live);
                    self.state = HandleState::Ready;
                    info!(adapter = %self.adapter_id, server = %self.launcher.describe(), "server ready");
                    return Ok(());
                }
                Err(e) => {
                    warn!(adapter = %self.adapter_id, error = %e, "server failed to start");
                    last_error = e.to_string();
                }
            }
        }

        let reason = format!(
            "no restarts left after {} launch(es): {last_error}",
            self.launches
        );
        warn!(adapter = %self.adapter_id, %reason, "adapter unavailable");
        self.unavailable = Some(reason.clone());
        Err(HarnessError::unavailable(&self.adapter_id, reason))
    }

    /// Send one source text and wait for its response.
    ///
    /// The duration covers the write of the request through the read of its
    /// response line. Launch time is never included.
    pub async fn request(&mut self, source: &str) -> (ParseOutcome, Duration) {
        if self.settings.framing == Framing::Nul && source.contains('\0') {
            return (
                ParseOutcome::failure(
                    FailureKind::Protocol,
                    "sample contains a NUL byte and cannot be sent with nul framing",
                ),
                Duration::ZERO,
            );
        }

        if let Err(e) = self.ensure_ready().await {
            debug!(adapter = %self.adapter_id, error = %e, "request skipped");
            return (ParseOutcome::unavailable(), Duration::ZERO);
        }
        let Some(live) = self.live.as_mut() else {
            return (ParseOutcome::unavailable(), Duration::ZERO);
        };

        let after = self.settings.request_timeout;
        let start = Instant::now();
        let result = tokio::time::timeout(after, live.client.request(source)).await;
        let elapsed = start.elapsed();

        let outcome = match result {
            Ok(Ok(Response::Success)) => ParseOutcome::Success,
            Ok(Ok(Response::Error(msg))) if msg.starts_with(SERVER_ERROR_PREFIX) => {
                ParseOutcome::failure(FailureKind::Server, msg)
            }
            Ok(Ok(Response::Error(msg))) => ParseOutcome::failure(FailureKind::Parse, msg),
            Ok(Ok(Response::Ready)) => {
                self.poison("unexpected READY").await;
                ParseOutcome::failure(FailureKind::Protocol, "unexpected READY")
            }
            Ok(Err(e)) => {
                let kind = match e {
                    ProtocolError::Closed | ProtocolError::Io(_) => FailureKind::Crash,
                    _ => FailureKind::Protocol,
                };
                self.poison(&e.to_string()).await;
                ParseOutcome::failure(kind, e.to_string())
            }
            Err(_) => {
                self.poison("request timed out").await;
                ParseOutcome::failure(
                    FailureKind::Timeout,
                    format!("no response within {} ms", after.as_millis()),
                )
            }
        };

        if self.live.is_some() {
            self.state = HandleState::Serving;
        }
        (outcome, elapsed)
    }

    /// Drop the connection and kill the server; the next request relaunches.
    async fn poison(&mut self, reason: &str) {
        if let Some(mut live) = self.live.take() {
            warn!(adapter = %self.adapter_id, %reason, "dropping server connection");
            live.process.kill().await;
        }
        self.state = HandleState::NotStarted;
    }

    /// Close the server's input, give it `shutdown_grace` to exit, then kill it.
    pub async fn teardown(&mut self) {
        if let Some(live) = self.live.take() {
            let Live {
                mut client,
                mut process,
            } = live;
            if let Err(e) = client.shutdown().await {
                debug!(adapter = %self.adapter_id, "closing server input failed: {e}");
            }
            // Dropping the client closes both pipe ends.
            drop(client);

            if process.wait_exit(self.settings.shutdown_grace).await {
                debug!(adapter = %self.adapter_id, "server exited");
            } else {
                warn!(
                    adapter = %self.adapter_id,
                    grace_ms = self.settings.shutdown_grace.as_millis() as u64,
                    "server did not exit in time, killing"
                );
                process.kill().await;
            }
        }
        if self.state != HandleState::Terminated {
            info!(adapter = %self.adapter_id, restarts = self.restarts(), "adapter terminated");
        }
        self.state = HandleState::Terminated;
    }
}

async fn launch_once(launcher: &dyn Launcher, settings: &HandleSettings) -> HarnessResult<Live> {
    let conn = launcher.launch().await?;
    let mut process = conn.process;
    let mut client = ProtocolClient::new(conn.reader, conn.writer, settings.framing);

    let after = settings.ready_timeout;
    match tokio::time::timeout(after, client.await_ready()).await {
        Ok(Ok(())) => Ok(Live { client, process }),
        Ok(Err(e)) => {
            process.kill().await;
            Err(e.into())
        }
        Err(_) => {
            process.kill().await;
            Err(HarnessError::ProtocolTimeout {
                what: "READY",
                after,
            })
        }
    }
}

impl fmt::Debug for AdapterHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterHandle")
            .field("adapter_id", &self.adapter_id)
            .field("server", &self.launcher.describe())
            .field("state", &self.state)
            .field("launches", &self.launches)
            .field("unavailable", &self.unavailable)
            .finish()
    }
}
