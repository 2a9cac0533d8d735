//! Application message boundary.
//!
//! [`SessionMessage`] is the normalized in-process form of a frame: the
//! session it belongs to, an optional command, STOMP headers, a payload, and
//! out-of-band routing metadata. Decoded wire frames become session messages
//! on their way through the bridges; the embedding application hands them in
//! directly on the inbound side and receives them on the outbound side.
//!
//! [`ClientBound`] is the event type the broker read loop emits toward the
//! outbound bridge: a connect acknowledgment (not itself a wire frame) or a
//! message to deliver.

use bytes::Bytes;

use crate::protocol::{Command, Frame, Headers};

/// Payload of an application-level message.
///
/// Wire frames always carry `Bytes`. The structured variants exist for
/// application senders and are converted to bytes by a payload converter
/// according to the message's declared content type before forwarding.
#[derive(Debug, Clone)]
pub enum Payload {
    /// Raw bytes, ready for the wire.
    Bytes(Bytes),
    /// Text, forwarded as its UTF-8 encoding.
    Text(String),
    /// Structured value, serialized per the declared content type.
    Json(serde_json::Value),
}

impl Payload {
    /// An empty byte payload.
    pub fn empty() -> Self {
        Payload::Bytes(Bytes::new())
    }

    /// Short name of the payload kind, for log and error context.
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Bytes(_) => "bytes",
            Payload::Text(_) => "text",
            Payload::Json(_) => "json",
        }
    }

    /// The raw bytes, when this payload already is one.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Payload::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }
}

/// A frame-shaped message tied to a client session.
#[derive(Debug, Clone)]
pub struct SessionMessage {
    /// Client session this message belongs to.
    pub session_id: String,
    /// STOMP command. `None` on bare application sends; each bridge applies
    /// its own default (SEND toward the broker, MESSAGE toward the client).
    pub command: Option<Command>,
    /// Headers to carry onto the wire frame.
    pub headers: Headers,
    /// Message payload.
    pub payload: Payload,
    /// Point-to-point destination substitution; when set, the rendered
    /// frame's destination header is overwritten with this value.
    pub user_destination: Option<String>,
}

impl SessionMessage {
    /// Create an empty message for a session.
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            command: None,
            headers: Headers::new(),
            payload: Payload::empty(),
            user_destination: None,
        }
    }

    /// Wrap a decoded wire frame. Headers and body move without copying.
    pub fn from_frame(session_id: impl Into<String>, frame: Frame) -> Self {
        Self {
            session_id: session_id.into(),
            command: Some(frame.command),
            headers: frame.headers,
            payload: Payload::Bytes(frame.body),
            user_destination: None,
        }
    }

    /// Set the command (builder style).
    pub fn with_command(mut self, command: Command) -> Self {
        self.command = Some(command);
        self
    }

    /// Append a header (builder style).
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(name, value);
        self
    }

    /// Set the payload (builder style).
    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    /// Set the point-to-point destination override (builder style).
    pub fn with_user_destination(mut self, destination: impl Into<String>) -> Self {
        self.user_destination = Some(destination.into());
        self
    }
}

/// Events flowing from the broker side toward a client session.
#[derive(Debug)]
pub enum ClientBound {
    /// The broker acknowledged this session's CONNECT.
    ConnectAck { session_id: String },
    /// A message to shape and deliver to the client.
    Message(SessionMessage),
}

impl ClientBound {
    /// The session this event targets.
    pub fn session_id(&self) -> &str {
        match self {
            ClientBound::ConnectAck { session_id } => session_id,
            ClientBound::Message(message) => &message.session_id,
        }
    }
}
