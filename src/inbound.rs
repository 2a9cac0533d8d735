//! Inbound bridge: client frames toward the broker.
//!
//! Dispatch per decoded frame:
//! 1. CONNECT / STOMP: register a relay session, open the broker leg
//!    asynchronously, forward the CONNECT once the connection is up, and
//!    keep a read loop alive for broker replies.
//! 2. Any other command: look up the relay session, wait out the
//!    rendezvous, convert the payload, and forward the re-encoded frame.
//!
//! Forwarding failures are logged and the message is dropped; the session
//! stays up. Only decode-level errors (handled upstream) and a failed broker
//! connection terminate a session.

use std::sync::Arc;

use crate::config::RelayConfig;
use crate::convert::convert_payload;
use crate::delivery::ClientBoundSink;
use crate::error::{RelayError, Result};
use crate::message::{ClientBound, SessionMessage};
use crate::protocol::{encode_frame, headers, Command, DecodeBuffer, Frame};
use crate::registry::ConnectionRegistry;
use crate::session::RelaySession;
use crate::transport::{BrokerConnector, BrokerReader};
use crate::writer::spawn_relay_writer;

/// Client-to-broker half of the bridge.
pub struct InboundBridge {
    registry: Arc<ConnectionRegistry>,
    connector: Arc<dyn BrokerConnector>,
    config: RelayConfig,
    sink: Arc<dyn ClientBoundSink>,
}

impl InboundBridge {
    /// Create the inbound half. Broker replies are dispatched into `sink`.
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        connector: Arc<dyn BrokerConnector>,
        config: RelayConfig,
        sink: Arc<dyn ClientBoundSink>,
    ) -> Self {
        Self {
            registry,
            connector,
            config,
            sink,
        }
    }

    /// Dispatch one session message by its command.
    ///
    /// Messages without a command are a caller bug: the sender must declare
    /// the protocol command it wants relayed. Plain publishes go through
    /// [`InboundBridge::forward`], which defaults the command to SEND.
    pub async fn handle_message(&self, msg: SessionMessage) -> Result<()> {
        match msg.command {
            Some(command) if command.is_connect() => self.handle_connect(msg).await,
            Some(Command::Heartbeat) => {
                tracing::trace!(session_id = %msg.session_id, "heartbeat; nothing to forward");
                Ok(())
            }
            Some(_) => {
                self.forward(msg).await;
                Ok(())
            }
            None => Err(RelayError::MissingCommand),
        }
    }

    /// Handle a CONNECT (or STOMP) frame: register the session and open the
    /// broker leg without blocking the caller.
    async fn handle_connect(&self, msg: SessionMessage) -> Result<()> {
        let command = msg.command.unwrap_or(Command::Connect);
        let mut connect = Frame::new(command);
        connect.headers = msg.headers;

        let session = Arc::new(RelaySession::new(msg.session_id, connect));
        self.registry.insert_session(session.clone()).await;

        tracing::debug!(session_id = %session.id(), "opening relay connection");

        let connector = self.connector.clone();
        let sink = self.sink.clone();
        let queue_depth = self.config.relay_queue_depth;
        let buffer_size_limit = self.config.buffer_size_limit;

        tokio::spawn(async move {
            open_relay(connector, session, sink, queue_depth, buffer_size_limit).await;
        });

        Ok(())
    }

    /// Forward a message to the session's broker connection.
    ///
    /// Blocks until the session's rendezvous completes (bounded by the
    /// configured timeout). A missing session, an unavailable relay, or a
    /// payload conversion failure drops the message with a log line; none of
    /// them tear the session down.
    pub async fn forward(&self, msg: SessionMessage) {
        let session = match self.registry.session(&msg.session_id).await {
            Some(session) => session,
            None => {
                tracing::warn!(
                    session_id = %msg.session_id,
                    "no relay session; message cannot be forwarded"
                );
                return;
            }
        };

        let relay = match session.await_relay(self.config.rendezvous_timeout).await {
            Ok(relay) => relay,
            Err(e) => {
                tracing::warn!(
                    session_id = %msg.session_id,
                    error = %e,
                    "relay unavailable; message not forwarded"
                );
                return;
            }
        };

        let session_id = msg.session_id;
        let command = msg.command.unwrap_or(Command::Send);
        let body = match convert_payload(&msg.payload, msg.headers.get(headers::CONTENT_TYPE)) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(
                    session_id = %session_id,
                    command = %command,
                    error = %e,
                    "payload conversion failed; message dropped"
                );
                return;
            }
        };

        let frame = Frame {
            command,
            headers: msg.headers,
            body,
        };

        match relay.send(encode_frame(&frame)).await {
            Ok(()) => {
                tracing::trace!(session_id = %session_id, command = %command, "frame forwarded");
            }
            Err(e) => {
                tracing::error!(
                    session_id = %session_id,
                    command = %command,
                    error = %e,
                    "failed to forward frame"
                );
            }
        }
    }
}

/// Connect task: open the broker connection, forward CONNECT, then run the
/// read loop until the broker goes away.
async fn open_relay(
    connector: Arc<dyn BrokerConnector>,
    session: Arc<RelaySession>,
    sink: Arc<dyn ClientBoundSink>,
    queue_depth: usize,
    buffer_size_limit: usize,
) {
    let connection = match connector.connect(session.id()).await {
        Ok(connection) => connection,
        Err(e) => {
            tracing::error!(session_id = %session.id(), error = %e, "broker connection failed");
            session.close();
            return;
        }
    };

    let (reader, writer) = connection.into_split();
    let (relay, _writer_task) = spawn_relay_writer(writer, queue_depth);
    session.attach_relay(relay.clone());

    // Forward the stored CONNECT with broker heartbeats pinned off. The
    // stored frame keeps its original headers for version negotiation.
    let stored = session.connect_frame();
    let mut connect = Frame::new(stored.command);
    connect.headers = stored.headers.clone();
    connect.headers.set(headers::HEART_BEAT, "0,0");

    if let Err(e) = relay.send(encode_frame(&connect)).await {
        tracing::error!(session_id = %session.id(), error = %e, "failed to forward CONNECT");
        session.close();
        return;
    }

    // The session holds the only handle now; closing it lets the writer
    // drain and exit.
    drop(relay);

    relay_read_loop(reader, session, sink, buffer_size_limit).await;
}

/// Read loop over the broker connection: decode frames, record CONNECTED,
/// and dispatch everything else toward the outbound bridge.
async fn relay_read_loop(
    mut reader: BrokerReader,
    session: Arc<RelaySession>,
    sink: Arc<dyn ClientBoundSink>,
    buffer_size_limit: usize,
) {
    use tokio::io::AsyncReadExt;

    let mut decoder = DecodeBuffer::with_limit(buffer_size_limit);
    let mut buf = vec![0u8; 8 * 1024];

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => {
                tracing::debug!(session_id = %session.id(), "broker closed the connection");
                break;
            }
            Ok(n) => n,
            Err(e) => {
                tracing::error!(session_id = %session.id(), error = %e, "broker read failed");
                break;
            }
        };

        let frames = match decoder.push(&buf[..n]) {
            Ok(frames) => frames,
            Err(e) => {
                tracing::error!(session_id = %session.id(), error = %e, "broker frame decode failed");
                break;
            }
        };

        for frame in frames {
            if frame.is_heartbeat() {
                tracing::trace!(session_id = %session.id(), "heartbeat from broker");
                continue;
            }

            if frame.command == Command::Connected {
                session.mark_connected();
                let ack = ClientBound::ConnectAck {
                    session_id: session.id().to_string(),
                };
                if sink.dispatch(ack).await.is_err() {
                    tracing::debug!(session_id = %session.id(), "client-bound delivery unavailable");
                    session.close();
                    return;
                }
                continue;
            }

            tracing::trace!(session_id = %session.id(), command = %frame.command, "frame from broker");
            let message = SessionMessage::from_frame(session.id(), frame);
            if sink.dispatch(ClientBound::Message(message)).await.is_err() {
                tracing::debug!(session_id = %session.id(), "client-bound delivery unavailable");
                session.close();
                return;
            }
        }
    }

    session.close();
}
