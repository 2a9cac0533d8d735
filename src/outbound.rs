//! Outbound bridge: broker and application messages toward the client.
//!
//! Every client-bound event is shaped before it touches the transport:
//! - a connect acknowledgment becomes a CONNECTED frame with the negotiated
//!   protocol version (and the authenticated user's name, when known),
//! - a plain message becomes a MESSAGE frame, but only if it names the
//!   subscription it answers,
//! - ERROR frames close the client connection right after the write.
//!
//! Writes for one session never interleave: the per-session write lock is
//! held across the full frame write.

use std::sync::Arc;

use crate::error::{RelayError, Result};
use crate::message::{ClientBound, Payload, SessionMessage};
use crate::protocol::{encode_frame, headers, Command, Frame, SUPPORTED_VERSIONS};
use crate::registry::ConnectionRegistry;
use crate::transport::{CloseReason, UserRegistry};

/// Pick the protocol version for a CONNECTED frame.
///
/// Highest mutually supported version wins. An empty accept list means the
/// client predates version negotiation, so no version header is sent at all.
pub fn negotiate_version(accept: &[&str]) -> Result<Option<&'static str>> {
    if accept.is_empty() {
        return Ok(None);
    }
    for &version in SUPPORTED_VERSIONS {
        if accept.contains(&version) {
            return Ok(Some(version));
        }
    }
    Err(RelayError::UnsupportedVersion {
        requested: accept.join(","),
    })
}

/// Broker-to-client half of the bridge.
pub struct OutboundBridge {
    registry: Arc<ConnectionRegistry>,
    users: Arc<dyn UserRegistry>,
}

impl OutboundBridge {
    /// Create the outbound half over the shared registry.
    pub fn new(registry: Arc<ConnectionRegistry>, users: Arc<dyn UserRegistry>) -> Self {
        Self { registry, users }
    }

    /// Shape and deliver one client-bound event.
    pub async fn handle_event(&self, event: ClientBound) {
        match event {
            ClientBound::ConnectAck { session_id } => self.handle_connect_ack(&session_id).await,
            ClientBound::Message(msg) => self.deliver(msg).await,
        }
    }

    /// Render the CONNECTED frame for a session whose broker leg just
    /// acknowledged the CONNECT.
    async fn handle_connect_ack(&self, session_id: &str) {
        let session = match self.registry.session(session_id).await {
            Some(session) => session,
            None => {
                tracing::warn!(session_id = %session_id, "CONNECT ack for unknown session");
                return;
            }
        };

        let accept = session.connect_frame().accept_versions();
        let version = match negotiate_version(&accept) {
            Ok(version) => version,
            Err(e) => {
                tracing::error!(session_id = %session_id, error = %e, "version negotiation failed");
                self.send_error(session_id, &e.to_string()).await;
                return;
            }
        };

        let mut connected = Frame::new(Command::Connected);
        if let Some(version) = version {
            connected.headers.set(headers::VERSION, version);
        }
        // No heartbeat support on the relay leg.
        connected.headers.set(headers::HEART_BEAT, "0,0");

        if let Some(client) = self.registry.client(session_id).await {
            if let Some(user) = client.transport.user_name() {
                connected.headers.set(headers::USER_NAME, user);
                self.users.register(user, session_id);
            }
        }

        self.send_frame(session_id, connected).await;
    }

    /// Shape a generic client-bound message into a wire frame.
    async fn deliver(&self, msg: SessionMessage) {
        let session_id = msg.session_id.clone();
        let command = msg.command.unwrap_or(Command::Message);

        if command == Command::Message && msg.headers.get(headers::SUBSCRIPTION).is_none() {
            tracing::error!(
                session_id = %session_id,
                "ignoring message without subscription header"
            );
            return;
        }

        let mut frame_headers = msg.headers;
        if let Some(destination) = msg.user_destination {
            frame_headers.set(headers::DESTINATION, destination);
        }

        let body = match msg.payload {
            Payload::Bytes(body) => body,
            other => {
                let err = RelayError::TypeMismatch {
                    actual: other.kind(),
                };
                tracing::error!(
                    session_id = %session_id,
                    error = %err,
                    "ignoring message, expected byte payload"
                );
                return;
            }
        };

        let frame = Frame {
            command,
            headers: frame_headers,
            body,
        };
        self.send_frame(&session_id, frame).await;
    }

    /// Encode and write one frame to the session's client transport.
    ///
    /// The write happens under the session's write lock, so concurrent
    /// callers never interleave bytes. An ERROR frame closes the transport
    /// right after the write, whether or not the write succeeded.
    pub async fn send_frame(&self, session_id: &str, frame: Frame) {
        let client = match self.registry.client(session_id).await {
            Some(client) => client,
            None => {
                tracing::warn!(session_id = %session_id, "no client transport; frame dropped");
                return;
            }
        };

        tracing::trace!(session_id = %session_id, command = %frame.command, "frame to client");
        let is_error = frame.command == Command::Error;
        let bytes = encode_frame(&frame);

        let send_result = {
            let _write = client.write_lock.lock().await;
            client.transport.send(bytes).await
        };

        if is_error {
            client.transport.close(CloseReason::ProtocolError).await;
            return;
        }

        if let Err(e) = send_result {
            tracing::error!(
                session_id = %session_id,
                error = %e,
                "failed to send frame to client; terminating session"
            );
            self.send_error(session_id, "failed to send message").await;
        }
    }

    /// Send an ERROR frame and close the client transport.
    ///
    /// Best effort: a failed write is logged and the close happens anyway.
    pub async fn send_error(&self, session_id: &str, message: &str) {
        let client = match self.registry.client(session_id).await {
            Some(client) => client,
            None => return,
        };

        let mut frame = Frame::new(Command::Error);
        if !message.is_empty() {
            frame.headers.set(headers::MESSAGE, message);
        }
        let bytes = encode_frame(&frame);

        {
            let _write = client.write_lock.lock().await;
            if let Err(e) = client.transport.send(bytes).await {
                tracing::debug!(session_id = %session_id, error = %e, "ERROR frame not delivered");
            }
        }

        client.transport.close(CloseReason::ProtocolError).await;
    }

    /// Tear down everything held for a finished client session.
    ///
    /// Drops the decoder state, unregisters any user association, tells the
    /// broker side to release its session with a synthesized DISCONNECT, and
    /// removes the relay session. The DISCONNECT never waits on the
    /// rendezvous: if the relay never became ready the frame is dropped.
    pub async fn session_ended(&self, session_id: &str) {
        tracing::debug!(session_id = %session_id, "client session ended");

        self.registry.end_client(session_id).await;
        self.users.unregister(session_id);

        let session = match self.registry.remove_session(session_id).await {
            Some(session) => session,
            None => return,
        };

        match session.try_relay() {
            Some(relay) => {
                let disconnect = Frame::new(Command::Disconnect);
                if let Err(e) = relay.send(encode_frame(&disconnect)).await {
                    tracing::debug!(session_id = %session_id, error = %e, "DISCONNECT not forwarded");
                }
            }
            None => {
                tracing::debug!(session_id = %session_id, "relay not ready; DISCONNECT not forwarded");
            }
        }

        session.close();
    }
}
