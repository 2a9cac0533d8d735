//! Transport seams between the bridge core and the outside world.
//!
//! The bridge never owns sockets directly. Client-bound frames leave through
//! a [`ClientTransport`] supplied by the embedding server, and the broker leg
//! of every session is opened through a [`BrokerConnector`]. Production use
//! pairs the bridge with [`TcpRelayConnector`]; tests substitute in-memory
//! duplex streams.
//!
//! # Example
//!
//! ```ignore
//! use stomp_relay::transport::{BrokerConnector, TcpRelayConnector};
//!
//! let connector = TcpRelayConnector::default();
//! let conn = connector.connect("session-1").await?;
//! let (reader, writer) = conn.into_split();
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use crate::error::Result;

/// Default broker address: a local STOMP listener on the conventional port.
pub const DEFAULT_RELAY_ADDR: &str = "127.0.0.1:61613";

/// Why the bridge is closing a client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Orderly shutdown (client disconnected, session ended).
    Normal,
    /// The client violated the protocol; an ERROR frame precedes the close.
    ProtocolError,
}

/// Client-facing write side of one session.
///
/// Implemented by the embedding server over whatever carries the session
/// (WebSocket, TCP, an in-memory pair in tests). Frames arrive already
/// wire-encoded; the transport only moves bytes.
#[async_trait]
pub trait ClientTransport: Send + Sync {
    /// Session identifier this transport serves.
    fn session_id(&self) -> &str;

    /// Authenticated user bound to the session, if any.
    ///
    /// When present, the CONNECTED frame is stamped with a `user-name` header
    /// and the session is registered for user-addressed delivery.
    fn user_name(&self) -> Option<&str> {
        None
    }

    /// Write one encoded frame to the client.
    async fn send(&self, frame: Bytes) -> Result<()>;

    /// Close the connection toward the client.
    async fn close(&self, reason: CloseReason);
}

/// Boxed read half of a broker connection.
pub type BrokerReader = Box<dyn AsyncRead + Send + Unpin>;

/// Boxed write half of a broker connection.
pub type BrokerWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// A freshly opened broker connection, ready to be split.
///
/// The write half feeds a relay writer task; the read half feeds the decode
/// loop that turns broker bytes back into client-bound events.
pub struct BrokerConnection {
    reader: BrokerReader,
    writer: BrokerWriter,
}

impl BrokerConnection {
    /// Wrap an already-opened pair of halves.
    pub fn new(
        reader: impl AsyncRead + Send + Unpin + 'static,
        writer: impl AsyncWrite + Send + Unpin + 'static,
    ) -> Self {
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
        }
    }

    /// Take ownership of the read and write halves.
    pub fn into_split(self) -> (BrokerReader, BrokerWriter) {
        (self.reader, self.writer)
    }
}

impl std::fmt::Debug for BrokerConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerConnection").finish_non_exhaustive()
    }
}

/// Opens one broker connection per client session.
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    /// Establish a new broker connection on behalf of `session_id`.
    async fn connect(&self, session_id: &str) -> Result<BrokerConnection>;
}

/// [`BrokerConnector`] that opens a plain TCP connection per session.
pub struct TcpRelayConnector {
    addr: String,
}

impl TcpRelayConnector {
    /// Connector targeting `addr` (`host:port`).
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }

    /// The broker address this connector dials.
    #[inline]
    pub fn addr(&self) -> &str {
        &self.addr
    }
}

impl Default for TcpRelayConnector {
    fn default() -> Self {
        Self::new(DEFAULT_RELAY_ADDR)
    }
}

#[async_trait]
impl BrokerConnector for TcpRelayConnector {
    async fn connect(&self, _session_id: &str) -> Result<BrokerConnection> {
        let stream = TcpStream::connect(&self.addr).await?;
        // STOMP frames are small; don't let Nagle hold them back.
        stream.set_nodelay(true)?;
        let (reader, writer) = stream.into_split();
        Ok(BrokerConnection::new(reader, writer))
    }
}

/// Tracks which session carries which authenticated user.
///
/// The outbound bridge registers the pair when it sends a CONNECTED frame for
/// a session with a known user, and unregisters on teardown, so the embedding
/// server can resolve user-addressed destinations to a live session.
pub trait UserRegistry: Send + Sync {
    /// Record that `session_id` belongs to `user_name`.
    fn register(&self, user_name: &str, session_id: &str);

    /// Drop any registration held by `session_id`.
    fn unregister(&self, session_id: &str);
}

/// [`UserRegistry`] that keeps no state.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopUserRegistry;

impl UserRegistry for NoopUserRegistry {
    fn register(&self, _user_name: &str, _session_id: &str) {}

    fn unregister(&self, _session_id: &str) {}
}
