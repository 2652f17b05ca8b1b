//! Adapters backed by a protocol server.

use std::time::Duration;

use async_trait::async_trait;

use super::handle::{AdapterHandle, HandleSettings};
use super::launcher::{CommandLauncher, Launcher, LoopbackLauncher};
use super::{Adapter, AdapterKind};
use crate::error::HarnessResult;
use crate::sample::{ParseOutcome, SampleInput};

/// Sends each sample to a parse server and waits for its response line.
#[derive(Debug)]
pub struct ServerAdapter {
    id: String,
    kind: AdapterKind,
    handle: AdapterHandle,
}

impl ServerAdapter {
    pub fn new(
        id: impl Into<String>,
        kind: AdapterKind,
        launcher: Box<dyn Launcher>,
        settings: HandleSettings,
    ) -> Self {
        let id = id.into();
        Self {
            handle: AdapterHandle::new(id.clone(), launcher, settings),
            id,
            kind,
        }
    }

    /// Server running as a child process.
    pub fn subprocess(
        id: impl Into<String>,
        launcher: CommandLauncher,
        settings: HandleSettings,
    ) -> Self {
        Self::new(id, AdapterKind::Subprocess, Box::new(launcher), settings)
    }

    /// Server running as a task on an in-memory pipe.
    pub fn loopback(
        id: impl Into<String>,
        launcher: LoopbackLauncher,
        settings: HandleSettings,
    ) -> Self {
        Self::new(id, AdapterKind::Loopback, Box::new(launcher), settings)
    }

    pub fn handle(&self) -> &AdapterHandle {
        &self.handle
    }
}

#[async_trait]
impl Adapter for ServerAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> AdapterKind {
        self.kind
    }

    async fn start(&mut self) -> HarnessResult<()> {
        self.handle.ensure_ready().await
    }

    async fn parse(&mut self, sample: &SampleInput) -> (ParseOutcome, Duration) {
        self.handle.request(&sample.source).await
    }

    async fn teardown(&mut self) {
        self.handle.teardown().await;
    }
}
