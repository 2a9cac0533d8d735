//! Wire format encoding and decoding helpers.
//!
//! A STOMP frame on the wire:
//!
//! ```text
//! COMMAND\n
//! header-name:header-value\n
//! ...\n
//! \n
//! BODY\0
//! ```
//!
//! Header names and values carry escape sequences for backslash, newline,
//! carriage return and colon. A bare `\n` with no command line is a
//! heartbeat. Body length comes from a `content-length` header when present,
//! otherwise from the first NUL.
//!
//! Encoding never fails for well-formed [`Frame`] values. The incremental
//! decode path lives in [`DecodeBuffer`](super::DecodeBuffer); this module
//! holds the pure byte-level pieces it is built from.

use bytes::{BufMut, Bytes, BytesMut};

use super::command::Command;
use super::frame::{headers, Frame};
use crate::error::{RelayError, Result};

/// Frame terminator.
pub const NUL: u8 = 0;

/// Line terminator; also a complete heartbeat frame on its own.
pub const LF: u8 = b'\n';

/// Tolerated before `LF` on decode, never emitted on encode.
pub const CR: u8 = b'\r';

/// Encode a frame to its exact wire byte sequence.
///
/// `content-length` is appended only when the frame does not already carry
/// one and the body is non-empty. Heartbeats encode as a single `\n`.
///
/// # Example
///
/// ```
/// use stomp_relay::protocol::{encode_frame, Command, Frame};
///
/// let frame = Frame::new(Command::Send)
///     .header("destination", "/a")
///     .with_body("hello");
/// let wire = encode_frame(&frame);
/// assert_eq!(&wire[..], b"SEND\ndestination:/a\ncontent-length:5\n\nhello\0");
/// ```
pub fn encode_frame(frame: &Frame) -> Bytes {
    if frame.is_heartbeat() {
        return Bytes::from_static(b"\n");
    }

    let mut buf = BytesMut::with_capacity(64 + frame.body.len());
    buf.put_slice(frame.command.as_str().as_bytes());
    buf.put_u8(LF);

    for (name, value) in frame.headers.iter() {
        buf.put_slice(escape_header_value(name).as_bytes());
        buf.put_u8(b':');
        buf.put_slice(escape_header_value(value).as_bytes());
        buf.put_u8(LF);
    }

    if !frame.body.is_empty() && !frame.headers.contains(headers::CONTENT_LENGTH) {
        buf.put_slice(headers::CONTENT_LENGTH.as_bytes());
        buf.put_u8(b':');
        buf.put_slice(frame.body.len().to_string().as_bytes());
        buf.put_u8(LF);
    }

    buf.put_u8(LF);
    buf.put_slice(&frame.body);
    buf.put_u8(NUL);
    buf.freeze()
}

/// Escape a header name or value for the wire.
///
/// Order matters: backslash first, so later escapes are not re-escaped.
pub fn escape_header_value(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

/// Undo wire escaping in a header name or value.
///
/// # Errors
///
/// Any backslash not starting one of the four defined sequences is a
/// `MalformedFrame` error, including a trailing lone backslash.
pub fn unescape_header_value(raw: &str) -> Result<String> {
    if !raw.contains('\\') {
        return Ok(raw.to_string());
    }

    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                return Err(RelayError::MalformedFrame(format!(
                    "invalid escape sequence \\{}",
                    other
                )));
            }
            None => {
                return Err(RelayError::MalformedFrame(
                    "dangling backslash in header".to_string(),
                ));
            }
        }
    }
    Ok(out)
}

/// Interpret a raw line as UTF-8.
pub fn line_str(line: &[u8]) -> Result<&str> {
    std::str::from_utf8(line)
        .map_err(|_| RelayError::MalformedFrame("non-UTF-8 bytes in frame head".to_string()))
}

/// Parse a command line (CR already stripped).
pub fn parse_command_line(line: &str) -> Result<Command> {
    Command::from_wire(line)
        .ok_or_else(|| RelayError::MalformedFrame(format!("unknown command {:?}", line)))
}

/// Parse one `name:value` header line (CR already stripped), unescaping
/// both sides. Escaped colons are `\c` on the wire, so splitting at the
/// first raw colon is unambiguous.
pub fn parse_header_line(line: &str) -> Result<(String, String)> {
    let (name, value) = line
        .split_once(':')
        .ok_or_else(|| RelayError::MalformedFrame(format!("header line without colon: {:?}", line)))?;
    Ok((unescape_header_value(name)?, unescape_header_value(value)?))
}
