//! Request framing.
//!
//! A stream transport may hand a request over in several reads, or hand
//! several requests over in one read. Requests are therefore delimited
//! explicitly, using one of two framings:
//!
//! | Framing | Encoding | Constraint |
//! |---------|----------|------------|
//! | [`Framing::Nul`] | `<payload>\0` | payload must not contain NUL |
//! | [`Framing::Length`] | `<decimal length>\n<payload>` | none |
//!
//! [`FrameDecoder`] buffers partial input and yields complete frames. Faults
//! (oversized frames, malformed length headers) are yielded in-band as
//! [`Frame::Invalid`] so the server can answer them and keep serving.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, ProtocolResult};

/// Default upper bound on a single request payload (16 MiB).
pub const DEFAULT_MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Length headers longer than this cannot describe a valid `usize`.
const MAX_HEADER_BYTES: usize = 20;

/// Request framing selected for one client/server pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Framing {
    /// Each request is terminated by a single NUL byte.
    #[default]
    Nul,
    /// Each request is preceded by its byte length and a newline.
    Length,
}

impl Framing {
    /// Parse a framing name (`nul` or `length`).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "nul" | "null" | "zero" => Some(Self::Nul),
            "length" | "len" | "length-prefixed" => Some(Self::Length),
            _ => None,
        }
    }

    /// Canonical name, as accepted by [`Framing::from_name`].
    pub fn name(&self) -> &'static str {
        match self {
            Self::Nul => "nul",
            Self::Length => "length",
        }
    }

    /// Encode one request payload into its on-wire form.
    pub fn encode(&self, payload: &[u8]) -> ProtocolResult<Vec<u8>> {
        match self {
            Self::Nul => {
                if payload.contains(&0) {
                    return Err(ProtocolError::DelimiterInPayload("NUL"));
                }
                let mut out = Vec::with_capacity(payload.len() + 1);
                out.extend_from_slice(payload);
                out.push(0);
                Ok(out)
            }
            Self::Length => {
                let header = format!("{}\n", payload.len());
                let mut out = Vec::with_capacity(header.len() + payload.len());
                out.extend_from_slice(header.as_bytes());
                out.extend_from_slice(payload);
                Ok(out)
            }
        }
    }
}

impl fmt::Display for Framing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A decoded unit of input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A complete request payload.
    Request(Vec<u8>),
    /// Input that could not be turned into a request.
    Invalid(FrameFault),
}

/// Why a unit of input was rejected by the decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameFault {
    /// The payload exceeds the configured limit. `declared` is set when a
    /// length header announced the size up front.
    Oversized { limit: usize, declared: Option<usize> },
    /// A length header that is not a decimal number.
    BadHeader(String),
}

impl fmt::Display for FrameFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameFault::Oversized {
                limit,
                declared: Some(len),
            } => write!(f, "request of {len} bytes exceeds the {limit} byte limit"),
            FrameFault::Oversized {
                limit,
                declared: None,
            } => write!(f, "request exceeds the {limit} byte limit"),
            FrameFault::BadHeader(header) => write!(f, "malformed length header {header:?}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeMode {
    /// Looking for a delimiter (NUL) or a header newline (length).
    Scan,
    /// Length header read; waiting for this many payload bytes.
    Body(usize),
    /// Dropping the remainder of an oversized delimited request.
    DiscardToDelimiter,
    /// Dropping the remainder of a malformed length header.
    DiscardToNewline,
    /// Dropping this many bytes of an oversized length-prefixed request.
    Skip(usize),
}

/// Incremental decoder turning an arbitrarily chunked byte stream into frames.
#[derive(Debug)]
pub struct FrameDecoder {
    framing: Framing,
    max_frame_bytes: usize,
    buf: Vec<u8>,
    /// Leading bytes of `buf` already searched for the current delimiter.
    scanned: usize,
    mode: DecodeMode,
}

impl FrameDecoder {
    /// Create a decoder with the default frame size limit.
    pub fn new(framing: Framing) -> Self {
        Self::with_limit(framing, DEFAULT_MAX_FRAME_BYTES)
    }

    /// Create a decoder with an explicit frame size limit.
    pub fn with_limit(framing: Framing, max_frame_bytes: usize) -> Self {
        Self {
            framing,
            max_frame_bytes,
            buf: Vec::new(),
            scanned: 0,
            mode: DecodeMode::Scan,
        }
    }

    /// The framing this decoder understands.
    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// Bytes buffered but not yet part of a complete frame.
    pub fn pending_bytes(&self) -> usize {
        self.buf.len()
    }

    /// Append freshly read bytes.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Pop the next complete frame, if the buffer holds one.
    pub fn next_frame(&mut self) -> Option<Frame> {
        loop {
            match self.mode {
                DecodeMode::Scan => {
                    return match self.framing {
                        Framing::Nul => self.scan_delimited(),
                        Framing::Length => match self.scan_header() {
                            // A header was consumed; the body may already be buffered.
                            None if matches!(self.mode, DecodeMode::Body(_) | DecodeMode::Skip(_)) => {
                                continue;
                            }
                            other => other,
                        },
                    };
                }
                DecodeMode::Body(len) => {
                    if self.buf.len() < len {
                        return None;
                    }
                    let payload: Vec<u8> = self.buf.drain(..len).collect();
                    self.mode = DecodeMode::Scan;
                    return Some(Frame::Request(payload));
                }
                DecodeMode::Skip(remaining) => {
                    let n = remaining.min(self.buf.len());
                    self.buf.drain(..n);
                    if n < remaining {
                        self.mode = DecodeMode::Skip(remaining - n);
                        return None;
                    }
                    self.mode = DecodeMode::Scan;
                }
                DecodeMode::DiscardToDelimiter => {
                    if !self.discard_through(0) {
                        return None;
                    }
                }
                DecodeMode::DiscardToNewline => {
                    if !self.discard_through(b'\n') {
                        return None;
                    }
                }
            }
        }
    }

    /// Drain every complete frame currently buffered.
    pub fn drain_frames(&mut self) -> Vec<Frame> {
        std::iter::from_fn(|| self.next_frame()).collect()
    }

    /// Find `delimiter` in the buffer, resuming where the previous search
    /// stopped so a request split over many reads is scanned once.
    fn find_delimiter(&mut self, delimiter: u8) -> Option<usize> {
        match self.buf[self.scanned..].iter().position(|&b| b == delimiter) {
            Some(offset) => {
                let end = self.scanned + offset;
                self.scanned = 0;
                Some(end)
            }
            None => {
                self.scanned = self.buf.len();
                None
            }
        }
    }

    fn clear_buffer(&mut self) {
        self.buf.clear();
        self.scanned = 0;
    }

    fn scan_delimited(&mut self) -> Option<Frame> {
        match self.find_delimiter(0) {
            Some(end) => {
                let frame = if end > self.max_frame_bytes {
                    Frame::Invalid(FrameFault::Oversized {
                        limit: self.max_frame_bytes,
                        declared: None,
                    })
                } else {
                    Frame::Request(self.buf[..end].to_vec())
                };
                self.buf.drain(..=end);
                Some(frame)
            }
            None if self.buf.len() > self.max_frame_bytes => {
                self.clear_buffer();
                self.mode = DecodeMode::DiscardToDelimiter;
                Some(Frame::Invalid(FrameFault::Oversized {
                    limit: self.max_frame_bytes,
                    declared: None,
                }))
            }
            None => None,
        }
    }

    fn scan_header(&mut self) -> Option<Frame> {
        let Some(end) = self.find_delimiter(b'\n') else {
            if self.buf.len() > MAX_HEADER_BYTES {
                let header = String::from_utf8_lossy(&self.buf[..MAX_HEADER_BYTES]).into_owned();
                self.clear_buffer();
                self.mode = DecodeMode::DiscardToNewline;
                return Some(Frame::Invalid(FrameFault::BadHeader(header)));
            }
            return None;
        };

        let raw: Vec<u8> = self.buf.drain(..=end).collect();
        let header = String::from_utf8_lossy(&raw[..end]);
        let header = header.trim_end_matches('\r');

        let parsed = if header.is_empty() || !header.bytes().all(|b| b.is_ascii_digit()) {
            None
        } else {
            header.parse::<usize>().ok()
        };

        match parsed {
            None => Some(Frame::Invalid(FrameFault::BadHeader(header.to_string()))),
            Some(len) if len > self.max_frame_bytes => {
                self.mode = DecodeMode::Skip(len);
                Some(Frame::Invalid(FrameFault::Oversized {
                    limit: self.max_frame_bytes,
                    declared: Some(len),
                }))
            }
            Some(len) => {
                self.mode = DecodeMode::Body(len);
                None
            }
        }
    }

    /// Drop bytes up to and including `delimiter`. Returns whether it was found.
    fn discard_through(&mut self, delimiter: u8) -> bool {
        match self.buf.iter().position(|&b| b == delimiter) {
            Some(end) => {
                self.buf.drain(..=end);
                self.mode = DecodeMode::Scan;
                true
            }
            None => {
                self.clear_buffer();
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn requests(frames: Vec<Frame>) -> Vec<String> {
        frames
            .into_iter()
            .map(|f| match f {
                Frame::Request(bytes) => String::from_utf8(bytes).unwrap(),
                Frame::Invalid(fault) => format!("<{fault}>"),
            })
            .collect()
    }

    #[test]
    fn test_framing_names() {
        assert_eq!(Framing::from_name("nul"), Some(Framing::Nul));
        assert_eq!(Framing::from_name("LENGTH"), Some(Framing::Length));
        assert_eq!(Framing::from_name("newline"), None);
        assert_eq!(Framing::Length.to_string(), "length");
        assert_eq!(Framing::default(), Framing::Nul);
    }

    #[test]
    fn test_nul_rejects_embedded_delimiter() {
        let err = Framing::Nul.encode(b"qubit q;\0").unwrap_err();
        assert!(matches!(err, ProtocolError::DelimiterInPayload("NUL")));
    }

    #[test]
    fn test_length_encoding() {
        let encoded = Framing::Length.encode(b"qubit q;\n").unwrap();
        assert_eq!(encoded, b"9\nqubit q;\n");
    }

    #[test]
    fn test_nul_split_across_reads() {
        let mut decoder = FrameDecoder::new(Framing::Nul);
        decoder.extend(b"OPENQASM 3;\nqu");
        assert!(decoder.next_frame().is_none());
        decoder.extend(b"bit q;\0");
        assert_eq!(
            requests(decoder.drain_frames()),
            vec!["OPENQASM 3;\nqubit q;"]
        );
        assert_eq!(decoder.pending_bytes(), 0);
    }

    #[test]
    fn test_nul_coalesced_requests() {
        let mut decoder = FrameDecoder::new(Framing::Nul);
        decoder.extend(b"a;\0b;\0c");
        assert_eq!(requests(decoder.drain_frames()), vec!["a;", "b;"]);
        assert_eq!(decoder.pending_bytes(), 1);
    }

    #[test]
    fn test_length_header_and_body_split() {
        let mut decoder = FrameDecoder::new(Framing::Length);
        decoder.extend(b"1");
        assert!(decoder.next_frame().is_none());
        decoder.extend(b"2\nqubit q;");
        assert!(decoder.next_frame().is_none());
        decoder.extend(b"\n\n3\nx;\n");
        assert_eq!(
            requests(decoder.drain_frames()),
            vec!["qubit q;\n\n", "x;\n"]
        );
    }

    #[test]
    fn test_length_bad_header_resyncs() {
        let mut decoder = FrameDecoder::new(Framing::Length);
        decoder.extend(b"abc\n2\nok");
        let frames = decoder.drain_frames();
        assert_eq!(frames.len(), 2);
        assert!(matches!(&frames[0], Frame::Invalid(FrameFault::BadHeader(h)) if h == "abc"));
        assert_eq!(frames[1], Frame::Request(b"ok".to_vec()));
    }

    #[test]
    fn test_length_oversized_is_skipped() {
        let mut decoder = FrameDecoder::with_limit(Framing::Length, 4);
        decoder.extend(b"6\nabc");
        let frames = decoder.drain_frames();
        assert!(matches!(
            frames[..],
            [Frame::Invalid(FrameFault::Oversized {
                limit: 4,
                declared: Some(6)
            })]
        ));
        decoder.extend(b"def2\nok");
        assert_eq!(requests(decoder.drain_frames()), vec!["ok"]);
    }

    #[test]
    fn test_nul_oversized_discards_until_delimiter() {
        let mut decoder = FrameDecoder::with_limit(Framing::Nul, 4);
        decoder.extend(b"abcdefgh");
        let frames = decoder.drain_frames();
        assert_eq!(frames.len(), 1);
        assert!(matches!(frames[0], Frame::Invalid(FrameFault::Oversized { .. })));
        decoder.extend(b"ij\0ok\0");
        assert_eq!(requests(decoder.drain_frames()), vec!["ok"]);
    }

    #[test]
    fn test_byte_at_a_time_resumes_scan() {
        let payload = "qubit q;\n".repeat(200);
        let mut decoder = FrameDecoder::new(Framing::Nul);
        for (i, byte) in payload.bytes().enumerate() {
            decoder.extend(&[byte]);
            assert!(decoder.next_frame().is_none());
            assert_eq!(decoder.scanned, i + 1);
        }
        decoder.extend(b"\0tail");
        assert_eq!(requests(decoder.drain_frames()), vec![payload]);
        assert_eq!(decoder.scanned, "tail".len());

        decoder.extend(b"\0");
        assert_eq!(requests(decoder.drain_frames()), vec!["tail"]);
        assert_eq!(decoder.scanned, 0);
        assert_eq!(decoder.pending_bytes(), 0);
    }

    #[test]
    fn test_length_header_resumes_scan() {
        let mut decoder = FrameDecoder::new(Framing::Length);
        for byte in b"11" {
            decoder.extend(&[*byte]);
            assert!(decoder.next_frame().is_none());
        }
        assert_eq!(decoder.scanned, 2);
        decoder.extend(b"\nqubit q;\n\n\n");
        assert_eq!(requests(decoder.drain_frames()), vec!["qubit q;\n\n\n"]);
        assert_eq!(decoder.scanned, 0);
    }

    #[test]
    fn test_empty_payload_is_a_request() {
        let mut decoder = FrameDecoder::new(Framing::Nul);
        decoder.extend(b"\0");
        assert_eq!(decoder.next_frame(), Some(Frame::Request(Vec::new())));

        let mut decoder = FrameDecoder::new(Framing::Length);
        decoder.extend(b"0\n");
        assert_eq!(decoder.next_frame(), Some(Frame::Request(Vec::new())));
    }
}
