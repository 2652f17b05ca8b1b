//! Client side of the protocol.
//!
//! The client keeps a FIFO of outstanding request ids: the N-th response line
//! is attributed to the N-th request, which is the only pairing the protocol
//! guarantees. Callers that want strict one-at-a-time semantics use
//! [`ProtocolClient::request`]; pipelining is possible with
//! [`ProtocolClient::send`] / [`ProtocolClient::recv`].

use std::collections::VecDeque;
use std::fmt;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::error::{ProtocolError, ProtocolResult};
use crate::frame::Framing;
use crate::response::Response;

/// Sequence number of a submitted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A protocol client over any buffered reader / writer pair.
pub struct ProtocolClient<R, W> {
    reader: R,
    writer: W,
    framing: Framing,
    pending: VecDeque<RequestId>,
    next_id: u64,
    ready: bool,
    line: String,
}

impl<R, W> ProtocolClient<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Wrap the server's output (`reader`) and input (`writer`) streams.
    pub fn new(reader: R, writer: W, framing: Framing) -> Self {
        Self {
            reader,
            writer,
            framing,
            pending: VecDeque::new(),
            next_id: 0,
            ready: false,
            line: String::new(),
        }
    }

    /// Framing used for outgoing requests.
    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// Whether the `READY` handshake has been observed.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Number of requests sent whose response has not been read yet.
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    /// Wait for the `READY` line. It must be the first line the server writes.
    pub async fn await_ready(&mut self) -> ProtocolResult<()> {
        if self.ready {
            return Err(ProtocolError::DuplicateReady);
        }
        match self.read_response().await? {
            Response::Ready => {
                self.ready = true;
                Ok(())
            }
            other => Err(ProtocolError::UnexpectedLine(other.to_string())),
        }
    }

    /// Frame and write one request without waiting for its response.
    pub async fn send(&mut self, payload: &str) -> ProtocolResult<RequestId> {
        if !self.ready {
            return Err(ProtocolError::NotReady);
        }
        let frame = self.framing.encode(payload.as_bytes())?;
        self.writer.write_all(&frame).await?;
        self.writer.flush().await?;

        let id = RequestId(self.next_id);
        self.next_id += 1;
        self.pending.push_back(id);
        trace!(request = %id, bytes = payload.len(), "request sent");
        Ok(id)
    }

    /// Read the next response and pair it with the oldest outstanding request.
    pub async fn recv(&mut self) -> ProtocolResult<(RequestId, Response)> {
        let response = self.read_response().await?;
        if response == Response::Ready {
            return Err(ProtocolError::DuplicateReady);
        }
        match self.pending.pop_front() {
            Some(id) => {
                trace!(request = %id, response = %response, "response received");
                Ok((id, response))
            }
            None => Err(ProtocolError::NoPendingRequest(response.to_string())),
        }
    }

    /// Send one request and wait for its response.
    pub async fn request(&mut self, payload: &str) -> ProtocolResult<Response> {
        let id = self.send(payload).await?;
        let (answered, response) = self.recv().await?;
        debug_assert_eq!(id, answered, "responses must pair FIFO with requests");
        Ok(response)
    }

    /// Close the write side so the server sees end-of-input.
    pub async fn shutdown(&mut self) -> ProtocolResult<()> {
        self.writer.shutdown().await?;
        Ok(())
    }

    /// Give back the underlying streams.
    pub fn into_parts(self) -> (R, W) {
        (self.reader, self.writer)
    }

    async fn read_response(&mut self) -> ProtocolResult<Response> {
        self.line.clear();
        let n = self.reader.read_line(&mut self.line).await?;
        if n == 0 {
            return Err(ProtocolError::Closed);
        }
        Response::decode(&self.line)
    }
}
