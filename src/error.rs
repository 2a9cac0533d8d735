//! Error types for the relay.

use thiserror::Error;

/// Main error type for all relay operations.
///
/// Decode-time errors (`BufferOverflow`, `MalformedFrame`) and version
/// negotiation failures are fatal for the session: the client receives an
/// ERROR frame and the transport is closed. Everything else is local to a
/// single message, which is logged and dropped.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Buffered undecoded bytes exceeded the configured limit.
    /// Fatal for the session; no further frames decode.
    #[error("decode buffer exceeded {limit} bytes")]
    BufferOverflow { limit: usize },

    /// Wire bytes that cannot be parsed as a STOMP frame.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// None of the client's accept-version values is supported.
    #[error("unsupported STOMP versions: {requested}")]
    UnsupportedVersion { requested: String },

    /// A byte payload was required but the message carried something else.
    #[error("expected byte payload, got {actual}")]
    TypeMismatch { actual: &'static str },

    /// No relay session registered under the given session id.
    #[error("no relay session for {0}")]
    SessionNotFound(String),

    /// The rendezvous wait ended without a usable broker connection
    /// (cancelled, timed out, or the session closed).
    #[error("relay connection unavailable for {0}")]
    RelayUnavailable(String),

    /// An application message arrived with no STOMP command and no default.
    #[error("message has no STOMP command")]
    MissingCommand,

    /// Payload conversion failed while forwarding.
    #[error("payload conversion failed: {0}")]
    Conversion(String),

    /// I/O error on a client or broker transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON payload serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MessagePack payload serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// Writer task or transport gone.
    #[error("connection closed")]
    ConnectionClosed,
}

impl RelayError {
    /// Whether this error must terminate the client session
    /// (ERROR frame then close) rather than drop a single message.
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            RelayError::BufferOverflow { .. }
                | RelayError::MalformedFrame(_)
                | RelayError::UnsupportedVersion { .. }
        )
    }
}

/// Result type alias using RelayError.
pub type Result<T> = std::result::Result<T, RelayError>;
