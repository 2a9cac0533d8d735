//! STOMP command words.
//!
//! One variant per command defined by STOMP 1.0–1.2, plus a marker for the
//! heartbeat frame (a bare newline on the wire). Dispatch throughout the
//! crate is a `match` on this enum, never string comparison.

use std::fmt;

/// A STOMP command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    // Client commands.
    Connect,
    Stomp,
    Send,
    Subscribe,
    Unsubscribe,
    Ack,
    Nack,
    Begin,
    Commit,
    Abort,
    Disconnect,
    // Server commands.
    Connected,
    Message,
    Receipt,
    Error,
    /// Keep-alive marker; encodes as a single `\n`, carries nothing.
    Heartbeat,
}

impl Command {
    /// The wire spelling of this command. Empty for heartbeats.
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Stomp => "STOMP",
            Command::Send => "SEND",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Ack => "ACK",
            Command::Nack => "NACK",
            Command::Begin => "BEGIN",
            Command::Commit => "COMMIT",
            Command::Abort => "ABORT",
            Command::Disconnect => "DISCONNECT",
            Command::Connected => "CONNECTED",
            Command::Message => "MESSAGE",
            Command::Receipt => "RECEIPT",
            Command::Error => "ERROR",
            Command::Heartbeat => "",
        }
    }

    /// Parse a command line as read off the wire.
    ///
    /// Returns `None` for anything that is not an exact (case-sensitive)
    /// STOMP command word; the decoder treats that as a malformed frame.
    pub fn from_wire(word: &str) -> Option<Self> {
        match word {
            "CONNECT" => Some(Command::Connect),
            "STOMP" => Some(Command::Stomp),
            "SEND" => Some(Command::Send),
            "SUBSCRIBE" => Some(Command::Subscribe),
            "UNSUBSCRIBE" => Some(Command::Unsubscribe),
            "ACK" => Some(Command::Ack),
            "NACK" => Some(Command::Nack),
            "BEGIN" => Some(Command::Begin),
            "COMMIT" => Some(Command::Commit),
            "ABORT" => Some(Command::Abort),
            "DISCONNECT" => Some(Command::Disconnect),
            "CONNECTED" => Some(Command::Connected),
            "MESSAGE" => Some(Command::Message),
            "RECEIPT" => Some(Command::Receipt),
            "ERROR" => Some(Command::Error),
            _ => None,
        }
    }

    /// Check if this command opens a session (CONNECT or its 1.2 alias).
    #[inline]
    pub fn is_connect(&self) -> bool {
        matches!(self, Command::Connect | Command::Stomp)
    }

    /// Check if this is the heartbeat marker.
    #[inline]
    pub fn is_heartbeat(&self) -> bool {
        matches!(self, Command::Heartbeat)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
