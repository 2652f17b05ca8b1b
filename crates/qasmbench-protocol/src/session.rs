//! Server-side session state machine.
//!
//! ```text
//!   Starting ──mark_ready()──→ Ready ──feed()──→ Serving ──feed()──┐
//!       │                        │                  ↑______________│
//!       └────────────────────────┴──────terminate()─────→ Terminated
//! ```
//!
//! The session owns the framing buffer and the wrapped request handler. It
//! performs no I/O: [`crate::server::serve`] pumps bytes in and writes the
//! returned responses out, which keeps the state machine testable on its own.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{ProtocolError, ProtocolResult};
use crate::frame::{Frame, FrameDecoder, Framing};
use crate::response::Response;

/// Lifecycle of a server session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Initialising; no request is legal yet.
    Starting,
    /// `READY` has been emitted; no request handled yet.
    Ready,
    /// At least one request has been handled.
    Serving,
    /// Input closed or shutdown requested.
    Terminated,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Starting => "starting",
            SessionState::Ready => "ready",
            SessionState::Serving => "serving",
            SessionState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// How a handler refused a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// The wrapped parser rejected the input.
    Rejected(String),
    /// Something outside the parser went wrong.
    Internal(String),
}

/// The single operation a parse server wraps.
pub trait RequestHandler: Send {
    /// Handle one complete request.
    fn handle(&mut self, request: &str) -> Result<(), HandlerError>;
}

impl<F> RequestHandler for F
where
    F: FnMut(&str) -> Result<(), HandlerError> + Send,
{
    fn handle(&mut self, request: &str) -> Result<(), HandlerError> {
        self(request)
    }
}

/// Counters reported when a session ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Requests answered.
    pub requests: u64,
    /// Requests answered with `SUCCESS`.
    pub successes: u64,
    /// Requests answered with `ERROR:`.
    pub errors: u64,
    /// Bytes still buffered (an incomplete trailing request) at termination.
    pub discarded_bytes: usize,
}

/// Explicit server session: framing buffer + state field + handler.
pub struct ServerSession<H> {
    state: SessionState,
    decoder: FrameDecoder,
    handler: H,
    summary: SessionSummary,
}

impl<H: RequestHandler> ServerSession<H> {
    /// Create a session in the `Starting` state.
    pub fn new(handler: H, decoder: FrameDecoder) -> Self {
        Self {
            state: SessionState::Starting,
            decoder,
            handler,
            summary: SessionSummary::default(),
        }
    }

    /// Create a session with the default frame size limit.
    pub fn with_framing(handler: H, framing: Framing) -> Self {
        Self::new(handler, FrameDecoder::new(framing))
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Counters so far.
    pub fn summary(&self) -> SessionSummary {
        self.summary
    }

    /// Finish initialisation. Returns the `READY` response to emit; legal once.
    pub fn mark_ready(&mut self) -> ProtocolResult<Response> {
        self.transition(SessionState::Starting, SessionState::Ready)?;
        info!(framing = %self.decoder.framing(), "session ready");
        Ok(Response::Ready)
    }

    /// Feed bytes read from the input stream.
    ///
    /// Returns one response per complete request found, in arrival order.
    pub fn feed(&mut self, chunk: &[u8]) -> ProtocolResult<Vec<Response>> {
        match self.state {
            SessionState::Ready | SessionState::Serving => {}
            other => {
                return Err(ProtocolError::InvalidTransition {
                    from: other,
                    to: SessionState::Serving,
                });
            }
        }

        debug!(bytes = chunk.len(), "received data");
        self.decoder.extend(chunk);

        let mut responses = Vec::new();
        while let Some(frame) = self.decoder.next_frame() {
            self.state = SessionState::Serving;
            let response = self.respond(frame);
            self.summary.requests += 1;
            match &response {
                Response::Success => self.summary.successes += 1,
                _ => self.summary.errors += 1,
            }
            responses.push(response);
        }
        Ok(responses)
    }

    /// End the session. Idempotent.
    pub fn terminate(&mut self) -> SessionSummary {
        if self.state != SessionState::Terminated {
            self.summary.discarded_bytes = self.decoder.pending_bytes();
            if self.summary.discarded_bytes > 0 {
                warn!(
                    bytes = self.summary.discarded_bytes,
                    "input closed with an incomplete request buffered"
                );
            }
            info!(
                requests = self.summary.requests,
                from = %self.state,
                "session terminated"
            );
            self.state = SessionState::Terminated;
        }
        self.summary
    }

    fn respond(&mut self, frame: Frame) -> Response {
        let payload = match frame {
            Frame::Request(payload) => payload,
            Frame::Invalid(fault) => {
                warn!(%fault, "rejecting malformed frame");
                return Response::server_error(fault);
            }
        };

        let request = match String::from_utf8(payload) {
            Ok(text) => text,
            Err(e) => {
                warn!("request is not valid UTF-8: {e}");
                return Response::server_error(format!("request is not valid UTF-8: {e}"));
            }
        };

        let handler = &mut self.handler;
        match panic::catch_unwind(AssertUnwindSafe(|| handler.handle(&request))) {
            Ok(Ok(())) => {
                info!(bytes = request.len(), "parse succeeded");
                Response::Success
            }
            Ok(Err(HandlerError::Rejected(msg))) => {
                info!(error = %msg, "parse failed");
                Response::Error(msg)
            }
            Ok(Err(HandlerError::Internal(msg))) => {
                warn!(error = %msg, "handler fault");
                Response::server_error(msg)
            }
            Err(payload) => {
                let msg = panic_message(payload.as_ref());
                warn!(error = %msg, "handler panicked");
                Response::server_error(format!("parser panicked: {msg}"))
            }
        }
    }

    fn transition(&mut self, from: SessionState, to: SessionState) -> ProtocolResult<()> {
        if self.state != from {
            return Err(ProtocolError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
