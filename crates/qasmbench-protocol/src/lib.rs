//! qasmbench wire protocol
//!
//! Parse servers are long-lived processes that accept QASM source on their
//! input stream and answer every request with exactly one line on their
//! output stream. This crate holds both halves of that conversation.
//!
//! # Overview
//!
//! - **Framing**: how request payloads are delimited ([`Framing::Nul`] or
//!   [`Framing::Length`])
//! - **Responses**: `READY`, `SUCCESS` and `ERROR:<message>` lines
//! - **Server session**: an explicit state machine that owns the framing
//!   buffer and the wrapped parser
//! - **Client**: FIFO pairing of responses with outstanding requests
//!
//! # Wire format
//!
//! ```text
//!  client                                server
//!    |  <------------------------------  READY\n
//!    |  OPENQASM 3;\n qubit q;\0  ---->
//!    |  <------------------------------  SUCCESS\n
//!    |  qubit[;\0  ------------------>
//!    |  <------------------------------  ERROR:Parsing failed\n
//!    |  (close stdin)  -------------->   session terminated
//! ```
//!
//! # Example
//!
//! ```ignore
//! use qasmbench_protocol::{serve, Framing, HandlerError, ServerSession};
//!
//! let session = ServerSession::with_framing(
//!     |src: &str| if src.is_empty() { Err(HandlerError::Rejected("empty".into())) } else { Ok(()) },
//!     Framing::Nul,
//! );
//! serve(tokio::io::stdin(), tokio::io::stdout(), session).await?;
//! ```

pub mod client;
pub mod error;
pub mod frame;
pub mod response;
pub mod server;
pub mod session;

pub use client::{ProtocolClient, RequestId};
pub use error::{ProtocolError, ProtocolResult};
pub use frame::{DEFAULT_MAX_FRAME_BYTES, Frame, FrameDecoder, FrameFault, Framing};
pub use response::Response;
pub use server::serve;
pub use session::{HandlerError, RequestHandler, ServerSession, SessionState, SessionSummary};
