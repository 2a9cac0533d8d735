//! Bridge builder and runtime facade.
//!
//! The [`RelayBridgeBuilder`] provides a fluent API for configuring the
//! broker connector, user registry, and relay tunables. The [`RelayBridge`]
//! ties both halves together:
//! 1. Register a client transport (`session_started`)
//! 2. Feed raw bytes from that client (`on_data`)
//! 3. The inbound half opens a broker leg on CONNECT and forwards frames
//! 4. The outbound half ships broker frames back through the transport
//! 5. Tear down on disconnect (`session_ended`)
//!
//! # Example
//!
//! ```ignore
//! use stomp_relay::RelayBridge;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bridge = RelayBridge::builder()
//!         .buffer_size_limit(128 * 1024)
//!         .build();
//!
//!     // transport implements ClientTransport for one accepted connection
//!     bridge.session_started(transport).await;
//!     bridge.on_data("session-1", b"CONNECT\naccept-version:1.2\n\n\0").await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use crate::config::RelayConfig;
use crate::delivery::{ClientBoundSink, DeliveryRouter};
use crate::error::{RelayError, Result};
use crate::inbound::InboundBridge;
use crate::message::{ClientBound, SessionMessage};
use crate::outbound::OutboundBridge;
use crate::registry::ConnectionRegistry;
use crate::session::SessionState;
use crate::transport::{
    BrokerConnector, ClientTransport, NoopUserRegistry, TcpRelayConnector, UserRegistry,
};

/// Builder for configuring and creating a relay bridge.
///
/// Defaults: TCP connector against the local broker, no user registry,
/// [`RelayConfig::default`] tunables.
pub struct RelayBridgeBuilder {
    config: RelayConfig,
    connector: Option<Arc<dyn BrokerConnector>>,
    users: Option<Arc<dyn UserRegistry>>,
}

impl RelayBridgeBuilder {
    /// Create a new bridge builder.
    pub fn new() -> Self {
        Self {
            config: RelayConfig::default(),
            connector: None,
            users: None,
        }
    }

    /// Replace the full tunable set at once.
    pub fn config(mut self, config: RelayConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the per-session decode buffer cap in bytes.
    ///
    /// Default: 64 KiB
    pub fn buffer_size_limit(mut self, limit: usize) -> Self {
        self.config.buffer_size_limit = limit;
        self
    }

    /// Bound the rendezvous wait for forwarded messages.
    ///
    /// `None` waits indefinitely. Default: 30 seconds
    pub fn rendezvous_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.rendezvous_timeout = timeout;
        self
    }

    /// Set the queue depth of each broker connection's writer task.
    ///
    /// Default: 256
    pub fn relay_queue_depth(mut self, depth: usize) -> Self {
        self.config.relay_queue_depth = depth;
        self
    }

    /// Use a custom broker connector instead of the default TCP dialer.
    pub fn connector(mut self, connector: Arc<dyn BrokerConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Register authenticated users with this registry when their sessions
    /// complete the STOMP handshake.
    pub fn user_registry(mut self, users: Arc<dyn UserRegistry>) -> Self {
        self.users = Some(users);
        self
    }

    /// Build the bridge.
    pub fn build(self) -> RelayBridge {
        let connector = self
            .connector
            .unwrap_or_else(|| Arc::new(TcpRelayConnector::default()));
        let users = self.users.unwrap_or_else(|| Arc::new(NoopUserRegistry));
        RelayBridge::start(self.config, connector, users)
    }
}

impl Default for RelayBridgeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running relay bridge.
///
/// One instance manages any number of concurrent client sessions. All state
/// is scoped to the instance; two bridges never share sessions.
pub struct RelayBridge {
    /// Shared session and transport maps.
    registry: Arc<ConnectionRegistry>,
    /// Client-to-broker half.
    inbound: InboundBridge,
    /// Broker-to-client half.
    outbound: Arc<OutboundBridge>,
    /// Per-session client-bound delivery queues.
    router: Arc<DeliveryRouter>,
    /// Tunables this bridge was built with.
    config: RelayConfig,
}

impl RelayBridge {
    /// Create a new bridge builder.
    pub fn builder() -> RelayBridgeBuilder {
        RelayBridgeBuilder::new()
    }

    /// Wire up both halves around the per-session delivery router.
    fn start(
        config: RelayConfig,
        connector: Arc<dyn BrokerConnector>,
        users: Arc<dyn UserRegistry>,
    ) -> Self {
        // 1. Shared registry for both halves
        let registry = Arc::new(ConnectionRegistry::new(config.buffer_size_limit));

        // 2. Outbound half (broker events toward the client)
        let outbound = Arc::new(OutboundBridge::new(registry.clone(), users));

        // 3. Delivery router: one bounded queue per client session
        let router = Arc::new(DeliveryRouter::new(
            outbound.clone(),
            registry.clone(),
            config.relay_queue_depth,
        ));

        // 4. Inbound half (client bytes toward the broker)
        let inbound = InboundBridge::new(
            registry.clone(),
            connector,
            config.clone(),
            router.clone(),
        );

        RelayBridge {
            registry,
            inbound,
            outbound,
            router,
            config,
        }
    }

    /// Tunables this bridge runs with.
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Register a freshly accepted client transport.
    ///
    /// Allocates the session's decode buffer and write lock. Must be called
    /// before any `on_data` for the transport's session id.
    pub async fn session_started(&self, transport: Arc<dyn ClientTransport>) {
        tracing::debug!(session_id = %transport.session_id(), "client session started");
        self.registry.start_client(transport).await;
    }

    /// Feed raw bytes read from a client transport.
    ///
    /// Complete frames are dispatched to the inbound half. A decode failure
    /// is fatal for the session: the client gets an ERROR frame, the
    /// transport is closed, and the error is returned so the caller stops
    /// reading. Dispatch failures only drop the affected frame.
    pub async fn on_data(&self, session_id: &str, data: &[u8]) -> Result<()> {
        let client = self
            .registry
            .client(session_id)
            .await
            .ok_or_else(|| RelayError::SessionNotFound(session_id.to_string()))?;

        // Decode under the buffer lock, dispatch outside it: forwarding can
        // block on the rendezvous and must not pin the decoder.
        let frames = {
            let mut decoder = client.decoder.lock().await;
            match decoder.push(data) {
                Ok(frames) => frames,
                Err(e) => {
                    tracing::error!(
                        session_id = %session_id,
                        error = %e,
                        "client stream decode failed"
                    );
                    if e.is_session_fatal() {
                        self.outbound.send_error(session_id, &e.to_string()).await;
                    }
                    return Err(e);
                }
            }
        };

        for frame in frames {
            let msg = SessionMessage::from_frame(session_id, frame);
            if let Err(e) = self.inbound.handle_message(msg).await {
                tracing::error!(session_id = %session_id, error = %e, "frame dropped");
            }
        }
        Ok(())
    }

    /// Hand the inbound half an already-decoded message.
    ///
    /// This is the entry point for hosts that run their own STOMP decoding.
    /// A message without a command is rejected.
    pub async fn on_app_message(&self, msg: SessionMessage) -> Result<()> {
        self.inbound.handle_message(msg).await
    }

    /// Publish a message toward the broker on an established session.
    ///
    /// The command defaults to SEND. Delivery is best effort: failures are
    /// logged and the message is dropped.
    pub async fn publish(&self, msg: SessionMessage) {
        self.inbound.forward(msg).await;
    }

    /// Queue a message for delivery to a client.
    ///
    /// Enters the session's delivery queue, so it keeps order with broker
    /// traffic heading to the same client and never contends with other
    /// sessions.
    pub async fn send_to_client(&self, msg: SessionMessage) -> Result<()> {
        self.router.dispatch(ClientBound::Message(msg)).await
    }

    /// Tear down everything held for a client session.
    ///
    /// Drops the delivery queue, releases the decoder, unregisters the user,
    /// synthesizes a DISCONNECT for the broker leg when it is up, and closes
    /// the relay session.
    pub async fn session_ended(&self, session_id: &str) {
        self.router.end_session(session_id);
        self.outbound.session_ended(session_id).await;
    }

    /// Current relay state of a session, if it exists.
    pub async fn session_state(&self, session_id: &str) -> Option<SessionState> {
        Some(self.registry.session(session_id).await?.state())
    }

    /// Number of live relay sessions.
    pub async fn session_count(&self) -> usize {
        self.registry.session_count().await
    }
}
