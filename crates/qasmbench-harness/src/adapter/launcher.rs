//! Starting parse servers.
//!
//! A [`Launcher`] produces a fresh [`Connection`] each time it is called, so
//! a handle can restart its server after a crash without knowing whether
//! the server is a child process or an in-process task.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use qasmbench_parsers::{ParserHandler, parser_by_name};
use qasmbench_protocol::{DEFAULT_MAX_FRAME_BYTES, FrameDecoder, Framing, ServerSession, serve};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{HarnessError, HarnessResult};

/// Buffer size of the in-memory pipe used by loopback servers.
const LOOPBACK_PIPE_BYTES: usize = 64 * 1024;

pub type BoxedReader = Box<dyn AsyncBufRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// A freshly started server: its output, its input, and whatever runs it.
pub struct Connection {
    /// Server output (responses).
    pub reader: BoxedReader,
    /// Server input (requests).
    pub writer: BoxedWriter,
    pub process: ServerProcess,
}

/// Whatever executes a server. Dropping it stops the server.
#[derive(Debug, Default)]
pub struct ServerProcess {
    child: Option<Child>,
    task: Option<JoinHandle<()>>,
}

impl ServerProcess {
    /// A child process. It must have been spawned with `kill_on_drop(true)`.
    pub fn child(child: Child) -> Self {
        Self {
            child: Some(child),
            task: None,
        }
    }

    /// A task on the current runtime.
    pub fn task(task: JoinHandle<()>) -> Self {
        Self {
            child: None,
            task: Some(task),
        }
    }

    /// OS process id, if this is a live child.
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(Child::id)
    }

    /// Wait up to `grace` for the server to stop on its own.
    pub async fn wait_exit(&mut self, grace: Duration) -> bool {
        if let Some(child) = self.child.as_mut() {
            return match tokio::time::timeout(grace, child.wait()).await {
                Ok(Ok(status)) => {
                    debug!(%status, "server process exited");
                    true
                }
                Ok(Err(e)) => {
                    warn!("Failed to wait for server process: {e}");
                    false
                }
                Err(_) => false,
            };
        }
        if let Some(task) = self.task.as_mut() {
            return tokio::time::timeout(grace, task).await.is_ok();
        }
        true
    }

    /// Stop the server immediately.
    pub async fn kill(&mut self) {
        if let Some(child) = self.child.as_mut() {
            if let Err(e) = child.kill().await {
                debug!("kill on server process failed: {e}");
            }
        }
        if let Some(task) = self.task.as_ref() {
            task.abort();
        }
    }
}

impl Drop for ServerProcess {
    fn drop(&mut self) {
        // Children are reaped by kill_on_drop.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Starts one parse server.
#[async_trait]
pub trait Launcher: Send + Sync {
    /// Short description for logs.
    fn describe(&self) -> String;

    /// Start a new server instance.
    async fn launch(&self) -> HarnessResult<Connection>;
}

/// Runs an executable and talks to it over stdin/stdout.
///
/// The child's stderr is forwarded line by line to `tracing` at debug level.
#[derive(Debug, Clone)]
pub struct CommandLauncher {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub current_dir: Option<PathBuf>,
}

impl CommandLauncher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }
}

#[async_trait]
impl Launcher for CommandLauncher {
    fn describe(&self) -> String {
        std::iter::once(self.program.display().to_string())
            .chain(self.args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    async fn launch(&self) -> HarnessResult<Connection> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| HarnessError::io(&self.program, e))?;
        let pid = child.id();
        let missing = |stream: &str| {
            HarnessError::Orchestration(format!("{stream} of {} was not piped", self.describe()))
        };
        let stdin = child.stdin.take().ok_or_else(|| missing("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "qasmbench::server", pid, "{line}");
                }
            });
        }

        debug!(pid, command = %self.describe(), "spawned parse server");
        Ok(Connection {
            reader: Box::new(BufReader::new(stdout)),
            writer: Box::new(stdin),
            process: ServerProcess::child(child),
        })
    }
}

/// Runs the protocol server loop as a task behind an in-memory pipe.
#[derive(Debug, Clone)]
pub struct LoopbackLauncher {
    parser: String,
    framing: Framing,
    max_frame_bytes: usize,
}

impl LoopbackLauncher {
    /// Fails if no parser is registered under `parser`.
    pub fn new(parser: impl Into<String>, framing: Framing) -> HarnessResult<Self> {
        let parser = parser.into();
        parser_by_name(&parser).map_err(|e| HarnessError::Orchestration(e.to_string()))?;
        Ok(Self {
            parser,
            framing,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        })
    }
}

#[async_trait]
impl Launcher for LoopbackLauncher {
    fn describe(&self) -> String {
        format!("loopback:{} ({})", self.parser, self.framing)
    }

    async fn launch(&self) -> HarnessResult<Connection> {
        let parser = parser_by_name(&self.parser)
            .map_err(|e| HarnessError::Orchestration(e.to_string()))?;
        let session = ServerSession::new(
            ParserHandler::new(parser),
            FrameDecoder::with_limit(self.framing, self.max_frame_bytes),
        );

        let (client_io, server_io) = tokio::io::duplex(LOOPBACK_PIPE_BYTES);
        let (server_read, server_write) = tokio::io::split(server_io);
        let task = tokio::spawn(async move {
            if let Err(e) = serve(server_read, server_write, session).await {
                warn!("loopback server stopped: {e}");
            }
        });

        let (client_read, client_write) = tokio::io::split(client_io);
        Ok(Connection {
            reader: Box::new(BufReader::new(client_read)),
            writer: Box::new(client_write),
            process: ServerProcess::task(task),
        })
    }
}
