//! Error types for the wire protocol.

use thiserror::Error;

use crate::session::SessionState;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while speaking the protocol, on either side of the pipe.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Underlying stream failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed its output stream.
    #[error("Connection closed by peer")]
    Closed,

    /// A line that is neither `READY`, `SUCCESS` nor `ERROR:<message>`.
    #[error("Unexpected line from server: {0:?}")]
    UnexpectedLine(String),

    /// `READY` arrived after the handshake had already completed.
    #[error("Server announced READY more than once")]
    DuplicateReady,

    /// A request was submitted before `READY` was observed.
    #[error("Request submitted before the server was ready")]
    NotReady,

    /// The payload cannot be framed with the selected framing.
    #[error("Payload contains the {0} frame delimiter")]
    DelimiterInPayload(&'static str),

    /// A response arrived while no request was outstanding.
    #[error("Response received with no request in flight: {0:?}")]
    NoPendingRequest(String),

    /// The server session was driven through an illegal state change.
    #[error("Invalid session transition: {from} -> {to}")]
    InvalidTransition {
        from: SessionState,
        to: SessionState,
    },
}
