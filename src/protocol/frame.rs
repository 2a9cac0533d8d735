//! Frame and header types with typed accessors.
//!
//! A [`Frame`] is one STOMP protocol unit: a [`Command`], an ordered header
//! list, and an opaque body. Uses `bytes::Bytes` for zero-copy body sharing.
//!
//! # Example
//!
//! ```
//! use stomp_relay::protocol::{Command, Frame};
//!
//! let frame = Frame::new(Command::Send)
//!     .header("destination", "/queue/orders")
//!     .with_body("hello");
//!
//! assert_eq!(frame.command, Command::Send);
//! assert_eq!(frame.destination(), Some("/queue/orders"));
//! assert_eq!(&frame.body[..], b"hello");
//! ```

use bytes::Bytes;

use super::command::Command;

/// Well-known STOMP header names.
pub mod headers {
    /// Body length in bytes, emitted when the sender did not set one.
    pub const CONTENT_LENGTH: &str = "content-length";
    /// MIME type of the body; drives payload conversion.
    pub const CONTENT_TYPE: &str = "content-type";
    /// Comma-separated versions the client offers on CONNECT.
    pub const ACCEPT_VERSION: &str = "accept-version";
    /// Negotiated version on CONNECTED.
    pub const VERSION: &str = "version";
    /// Heartbeat intervals, `cx,cy` in milliseconds.
    pub const HEART_BEAT: &str = "heart-beat";
    /// Target destination of SEND / SUBSCRIBE / MESSAGE frames.
    pub const DESTINATION: &str = "destination";
    /// Subscription id a MESSAGE frame is delivered for.
    pub const SUBSCRIPTION: &str = "subscription";
    /// Short human-readable description on ERROR frames.
    pub const MESSAGE: &str = "message";
    /// Authenticated user, stamped onto CONNECTED frames.
    pub const USER_NAME: &str = "user-name";
}

/// Ordered header list.
///
/// STOMP permits repeated header names; the first occurrence wins for
/// lookups while every entry is preserved for re-serialization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    /// Create an empty header list.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Look up a header value. First occurrence wins.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Append an entry, keeping any existing entries with the same name.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Replace every entry with this name by a single one.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.entries.retain(|(n, _)| *n != name);
        self.entries.push((name, value.into()));
    }

    /// Check if any entry has this name.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    /// Iterate over all entries in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Number of entries, duplicates included.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if there are no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A complete STOMP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The command word.
    pub command: Command,
    /// Ordered headers.
    pub headers: Headers,
    /// Body bytes (zero-copy via `bytes::Bytes`; empty for most commands).
    pub body: Bytes,
}

impl Frame {
    /// Create a frame with no headers and an empty body.
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    /// Create the heartbeat marker frame (a bare newline on the wire).
    pub fn heartbeat() -> Self {
        Self::new(Command::Heartbeat)
    }

    /// Append a header (builder style).
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(name, value);
        self
    }

    /// Set the body (builder style).
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Check if this frame is a heartbeat.
    #[inline]
    pub fn is_heartbeat(&self) -> bool {
        self.command.is_heartbeat()
    }

    /// The `destination` header, if present.
    #[inline]
    pub fn destination(&self) -> Option<&str> {
        self.headers.get(headers::DESTINATION)
    }

    /// The `subscription` header, if present.
    #[inline]
    pub fn subscription(&self) -> Option<&str> {
        self.headers.get(headers::SUBSCRIPTION)
    }

    /// The `content-type` header, if present.
    #[inline]
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(headers::CONTENT_TYPE)
    }

    /// The declared `content-length`, when present and numeric.
    pub fn content_length(&self) -> Option<usize> {
        self.headers
            .get(headers::CONTENT_LENGTH)
            .and_then(|v| v.parse().ok())
    }

    /// Versions offered by the client's `accept-version` header.
    ///
    /// Empty when the header is absent or blank, as with STOMP 1.0 clients.
    pub fn accept_versions(&self) -> Vec<&str> {
        self.headers
            .get(headers::ACCEPT_VERSION)
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }
}
