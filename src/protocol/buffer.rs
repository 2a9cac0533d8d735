//! Decode buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for zero-copy buffer management and a state
//! machine for handling fragmented frames:
//! - `Head`: scanning for a complete command + header section
//! - `SizedBody`: head parsed, reading a `content-length` body plus NUL
//! - `UnsizedBody`: head parsed, scanning for the NUL terminator
//!
//! One buffer exists per client or broker stream. Buffered undecoded bytes
//! are bounded; crossing the bound is fatal for the stream, and a failed
//! buffer keeps returning its error instead of decoding further input.
//!
//! # Example
//!
//! ```
//! use stomp_relay::protocol::DecodeBuffer;
//!
//! let mut buffer = DecodeBuffer::new();
//!
//! // Data arrives in arbitrary chunks from the socket.
//! let frames = buffer.push(b"SEND\ndestination:/a\n\nhel").unwrap();
//! assert!(frames.is_empty());
//!
//! let frames = buffer.push(b"lo\0").unwrap();
//! assert_eq!(frames.len(), 1);
//! assert_eq!(&frames[0].body[..], b"hello");
//! ```

use bytes::BytesMut;

use super::codec::{self, CR, LF, NUL};
use super::command::Command;
use super::frame::headers::CONTENT_LENGTH;
use super::frame::{Frame, Headers};
use crate::error::{RelayError, Result};

/// Default cap on buffered undecoded bytes per stream (64 KiB).
pub const DEFAULT_BUFFER_SIZE_LIMIT: usize = 64 * 1024;

/// State machine for frame parsing.
#[derive(Debug, Clone)]
enum State {
    /// Scanning for a complete command + header section.
    Head,
    /// Head consumed; body is exactly `length` bytes followed by NUL.
    SizedBody {
        command: Command,
        headers: Headers,
        length: usize,
    },
    /// Head consumed, no declared length; scanning for the NUL terminator.
    /// The first `scanned` buffered bytes are known NUL-free.
    UnsizedBody {
        command: Command,
        headers: Headers,
        scanned: usize,
    },
}

/// Terminal decode failure, replayed on every later push.
#[derive(Debug, Clone)]
enum Failure {
    Overflow,
    Malformed(String),
}

/// Buffer for accumulating incoming bytes and extracting complete frames.
///
/// All data is stored in a single `BytesMut` buffer to minimize allocations.
pub struct DecodeBuffer {
    /// Accumulated bytes from socket reads.
    buffer: BytesMut,
    /// Current parsing state.
    state: State,
    /// Maximum allowed undecoded bytes.
    limit: usize,
    /// Set after a fatal error; the buffer never recovers.
    failed: Option<Failure>,
}

impl DecodeBuffer {
    /// Create a decode buffer with the default 64 KiB limit.
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_BUFFER_SIZE_LIMIT)
    }

    /// Create a decode buffer with a custom size limit.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            state: State::Head,
            limit,
            failed: None,
        }
    }

    /// Push data into the buffer and extract all complete frames.
    ///
    /// This is the main API for processing incoming stream data. Returns the
    /// complete frames in arrival order; fragmented remainders are buffered
    /// for the next push. Never blocks.
    ///
    /// # Errors
    ///
    /// `BufferOverflow` once undecoded bytes exceed the limit,
    /// `MalformedFrame` for unparsable input. Both are terminal: every
    /// subsequent push replays the failure.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Frame>> {
        if let Some(err) = self.replay_failure() {
            return Err(err);
        }

        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        loop {
            match self.try_extract_one() {
                Ok(Some(frame)) => frames.push(frame),
                Ok(None) => break,
                Err(err) => {
                    self.fail(&err);
                    return Err(err);
                }
            }
        }

        // Complete frames never count against the limit, leftovers do.
        if self.buffer.len() > self.limit {
            let err = RelayError::BufferOverflow { limit: self.limit };
            self.fail(&err);
            return Err(err);
        }

        Ok(frames)
    }

    /// Get the number of buffered undecoded bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Try to extract a single frame from the buffer.
    ///
    /// Returns:
    /// - `Ok(Some(frame))` if a complete frame was extracted
    /// - `Ok(None)` if more data is needed
    /// - `Err(...)` on a protocol violation
    fn try_extract_one(&mut self) -> Result<Option<Frame>> {
        match std::mem::replace(&mut self.state, State::Head) {
            State::Head => self.scan_head(),

            State::SizedBody {
                command,
                headers,
                length,
            } => {
                if self.buffer.len() < length + 1 {
                    self.state = State::SizedBody {
                        command,
                        headers,
                        length,
                    };
                    return Ok(None);
                }
                if self.buffer[length] != NUL {
                    return Err(RelayError::MalformedFrame(
                        "body does not end at declared content-length".to_string(),
                    ));
                }

                // Extract body, drop the NUL (zero-copy freeze).
                let mut body = self.buffer.split_to(length + 1);
                body.truncate(length);

                Ok(Some(Frame {
                    command,
                    headers,
                    body: body.freeze(),
                }))
            }

            State::UnsizedBody {
                command,
                headers,
                scanned,
            } => match self.buffer[scanned..].iter().position(|&b| b == NUL) {
                None => {
                    self.state = State::UnsizedBody {
                        command,
                        headers,
                        scanned: self.buffer.len(),
                    };
                    Ok(None)
                }
                Some(offset) => {
                    let length = scanned + offset;
                    let mut body = self.buffer.split_to(length + 1);
                    body.truncate(length);

                    Ok(Some(Frame {
                        command,
                        headers,
                        body: body.freeze(),
                    }))
                }
            },
        }
    }

    /// Scan for heartbeats or a complete command + header section.
    ///
    /// Called with the state already reset to `Head`.
    fn scan_head(&mut self) -> Result<Option<Frame>> {
        // A bare EOL before any command line is a heartbeat. This also
        // absorbs optional end-of-line padding between frames.
        match self.buffer.first() {
            None => return Ok(None),
            Some(&LF) => {
                let _ = self.buffer.split_to(1);
                return Ok(Some(Frame::heartbeat()));
            }
            Some(&CR) => {
                if self.buffer.len() < 2 {
                    return Ok(None);
                }
                if self.buffer[1] == LF {
                    let _ = self.buffer.split_to(2);
                    return Ok(Some(Frame::heartbeat()));
                }
                return Err(RelayError::MalformedFrame(
                    "bare carriage return before command".to_string(),
                ));
            }
            Some(_) => {}
        }

        let body_start = match find_head_end(&self.buffer) {
            Some(pos) => pos,
            None => return Ok(None),
        };

        let head = self.buffer.split_to(body_start);
        let (command, headers) = parse_head(&head)?;

        match declared_length(&headers)? {
            Some(length) => {
                // A body this long can never fit under the limit.
                if length >= self.limit {
                    return Err(RelayError::BufferOverflow { limit: self.limit });
                }
                self.state = State::SizedBody {
                    command,
                    headers,
                    length,
                };
            }
            None => {
                self.state = State::UnsizedBody {
                    command,
                    headers,
                    scanned: 0,
                };
            }
        }

        // The body may already be buffered in full.
        self.try_extract_one()
    }

    /// Record a terminal failure and drop any buffered bytes.
    fn fail(&mut self, err: &RelayError) {
        self.failed = Some(match err {
            RelayError::MalformedFrame(msg) => Failure::Malformed(msg.clone()),
            _ => Failure::Overflow,
        });
        self.buffer.clear();
        self.state = State::Head;
    }

    /// Rebuild the stored failure, if any.
    fn replay_failure(&self) -> Option<RelayError> {
        self.failed.as_ref().map(|failure| match failure {
            Failure::Overflow => RelayError::BufferOverflow { limit: self.limit },
            Failure::Malformed(msg) => RelayError::MalformedFrame(msg.clone()),
        })
    }

    /// Get the current state for debugging.
    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match &self.state {
            State::Head => "Head",
            State::SizedBody { .. } => "SizedBody",
            State::UnsizedBody { .. } => "UnsizedBody",
        }
    }
}

impl Default for DecodeBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Find the end of the command + header section: the first empty line.
///
/// Returns the offset just past the blank line (the body start), or `None`
/// if the section is still incomplete. Accepts `\r\n` line endings.
fn find_head_end(buf: &[u8]) -> Option<usize> {
    let mut i = 0;
    while i + 1 < buf.len() {
        if buf[i] == LF {
            if buf[i + 1] == LF {
                return Some(i + 2);
            }
            if buf[i + 1] == CR && i + 2 < buf.len() && buf[i + 2] == LF {
                return Some(i + 3);
            }
        }
        i += 1;
    }
    None
}

/// Parse a consumed head section (command line + header lines + blank line).
fn parse_head(head: &[u8]) -> Result<(Command, Headers)> {
    let mut lines = head.split(|&b| b == LF);

    let command_line = strip_cr(lines.next().unwrap_or(b""));
    let command = codec::parse_command_line(codec::line_str(command_line)?)?;

    let mut headers = Headers::new();
    for line in lines {
        let line = strip_cr(line);
        if line.is_empty() {
            break;
        }
        let (name, value) = codec::parse_header_line(codec::line_str(line)?)?;
        headers.push(name, value);
    }

    Ok((command, headers))
}

/// The `content-length` a head declares, if any.
fn declared_length(headers: &Headers) -> Result<Option<usize>> {
    match headers.get(CONTENT_LENGTH) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<usize>()
            .map(Some)
            .map_err(|_| RelayError::MalformedFrame(format!("invalid content-length {:?}", raw))),
    }
}

/// Strip one trailing carriage return, if present.
fn strip_cr(line: &[u8]) -> &[u8] {
    match line.last() {
        Some(&CR) => &line[..line.len() - 1],
        _ => line,
    }
}
