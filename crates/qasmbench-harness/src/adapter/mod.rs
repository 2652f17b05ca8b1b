//! Adapters: one uniform interface over every way of invoking a parser.
//!
//! ```text
//!   start() ──→ warmup(corpus) ──→ parse(sample)* ──→ teardown()
//!   (async)      (async, untimed)   (async, timed)     (async, always)
//! ```
//!
//! | Adapter | Transport | Measures |
//! |---------|-----------|----------|
//! | [`InProcessAdapter`] | direct call | parser only |
//! | [`ServerAdapter`] over [`LoopbackLauncher`] | in-memory pipe | parser + protocol codec |
//! | [`ServerAdapter`] over [`CommandLauncher`] | child stdin/stdout | parser + codec + IPC |
//!
//! `parse` never fails: every problem with a sample, including a dead or
//! hung server, comes back as a [`ParseOutcome`] value.

mod handle;
mod in_process;
mod launcher;
mod server;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::corpus::Corpus;
use crate::error::HarnessResult;
use crate::sample::{ParseOutcome, SampleInput};

pub use handle::{AdapterHandle, HandleSettings, HandleState};
pub use in_process::InProcessAdapter;
pub use launcher::{
    BoxedReader, BoxedWriter, CommandLauncher, Connection, Launcher, LoopbackLauncher, ServerProcess,
};
pub use server::ServerAdapter;

/// How an adapter reaches its parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterKind {
    InProcess,
    Loopback,
    Subprocess,
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AdapterKind::InProcess => "in_process",
            AdapterKind::Loopback => "loopback",
            AdapterKind::Subprocess => "subprocess",
        };
        f.write_str(name)
    }
}

/// One parse of one sample, before it is stamped with phase and iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub sample_id: String,
    pub outcome: ParseOutcome,
    pub duration: Duration,
}

/// A parser under test.
#[async_trait]
pub trait Adapter: Send {
    /// Unique id used in reports.
    fn id(&self) -> &str;

    fn kind(&self) -> AdapterKind;

    /// Bring the adapter to ready. Adapters without a server have nothing to do.
    async fn start(&mut self) -> HarnessResult<()> {
        Ok(())
    }

    /// Untimed pass: start the adapter, then parse every sample once.
    ///
    /// A start failure is returned after nothing has been parsed; per-sample
    /// failures are part of the returned attempts.
    async fn warmup(&mut self, corpus: &Corpus) -> HarnessResult<Vec<Attempt>> {
        self.start().await?;
        let mut attempts = Vec::with_capacity(corpus.len());
        for sample in corpus.iter() {
            let (outcome, duration) = self.parse(sample).await;
            attempts.push(Attempt {
                sample_id: sample.id.clone(),
                outcome,
                duration,
            });
        }
        Ok(attempts)
    }

    /// Parse one sample and report how long it took.
    async fn parse(&mut self, sample: &SampleInput) -> (ParseOutcome, Duration);

    /// Release every resource. Must be safe to call more than once.
    async fn teardown(&mut self);
}
