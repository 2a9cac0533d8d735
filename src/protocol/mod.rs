//! Protocol module - STOMP wire format, framing, and frame types.
//!
//! This module implements the STOMP frame layer:
//! - command words and classification
//! - frame struct with ordered headers and typed accessors
//! - wire encoding with header escaping
//! - decode buffer for accumulating partial reads

mod buffer;
mod codec;
mod command;
mod frame;

pub use buffer::{DecodeBuffer, DEFAULT_BUFFER_SIZE_LIMIT};
pub use codec::{
    encode_frame, escape_header_value, line_str, parse_command_line, parse_header_line,
    unescape_header_value, CR, LF, NUL,
};
pub use command::Command;
pub use frame::{headers, Frame, Headers};

/// STOMP versions this relay can negotiate, highest preference first.
pub const SUPPORTED_VERSIONS: &[&str] = &["1.2", "1.1", "1.0"];
