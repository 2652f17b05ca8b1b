//! Response lines written by a parse server.

use std::fmt;

use crate::error::{ProtocolError, ProtocolResult};

/// Literal handshake line.
pub const READY: &str = "READY";
/// Literal success line.
pub const SUCCESS: &str = "SUCCESS";
/// Prefix of every error line.
pub const ERROR_PREFIX: &str = "ERROR:";
/// Prefix distinguishing harness faults from parser rejections.
pub const SERVER_ERROR_PREFIX: &str = "Server error: ";

/// One line on the server's output stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Startup handshake, emitted once.
    Ready,
    /// The request parsed without error.
    Success,
    /// The request failed; the message is always a single line.
    Error(String),
}

impl Response {
    /// Error response for a fault in the server rather than in the input.
    pub fn server_error(message: impl fmt::Display) -> Self {
        Response::Error(format!("{SERVER_ERROR_PREFIX}{message}"))
    }

    /// Whether this is an error raised by the server itself.
    pub fn is_server_error(&self) -> bool {
        matches!(self, Response::Error(msg) if msg.starts_with(SERVER_ERROR_PREFIX))
    }

    /// Render as a newline-terminated line.
    pub fn encode(&self) -> String {
        match self {
            Response::Ready => format!("{READY}\n"),
            Response::Success => format!("{SUCCESS}\n"),
            Response::Error(msg) => format!("{ERROR_PREFIX}{}\n", single_line(msg)),
        }
    }

    /// Parse one line read from a server. Trailing `\r\n`/`\n` is ignored.
    pub fn decode(line: &str) -> ProtocolResult<Self> {
        let line = line.trim_end_matches(['\n', '\r']);
        if line == READY {
            Ok(Response::Ready)
        } else if line == SUCCESS {
            Ok(Response::Success)
        } else if let Some(msg) = line.strip_prefix(ERROR_PREFIX) {
            Ok(Response::Error(msg.to_string()))
        } else {
            Err(ProtocolError::UnexpectedLine(line.to_string()))
        }
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.encode().trim_end())
    }
}

fn single_line(msg: &str) -> String {
    msg.trim().replace(['\r', '\n'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_lines() {
        assert_eq!(Response::Ready.encode(), "READY\n");
        assert_eq!(Response::Success.encode(), "SUCCESS\n");
        assert_eq!(
            Response::Error("line 1\nline 2\r\n".into()).encode(),
            "ERROR:line 1 line 2\n"
        );
    }

    #[test]
    fn test_decode_lines() {
        assert_eq!(Response::decode("READY\n").unwrap(), Response::Ready);
        assert_eq!(Response::decode("SUCCESS\r\n").unwrap(), Response::Success);
        assert_eq!(
            Response::decode("ERROR:unexpected token").unwrap(),
            Response::Error("unexpected token".into())
        );
        assert!(matches!(
            Response::decode("parsed ok"),
            Err(ProtocolError::UnexpectedLine(_))
        ));
    }

    #[test]
    fn test_server_error_prefix() {
        let resp = Response::server_error("request is not valid UTF-8");
        assert!(resp.is_server_error());
        assert_eq!(
            resp.encode(),
            "ERROR:Server error: request is not valid UTF-8\n"
        );
        assert!(!Response::Error("bad token".into()).is_server_error());
    }
}
