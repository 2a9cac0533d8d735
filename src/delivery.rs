//! Per-session delivery of client-bound events.
//!
//! Broker read loops and host callers hand their events to a
//! [`ClientBoundSink`]. The production sink is the [`DeliveryRouter`]: one
//! bounded queue per client session, each drained by its own task into the
//! outbound bridge. A stalled client write therefore backs up only that
//! session's queue (and, through it, that session's broker read loop),
//! never delivery to other sessions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{RelayError, Result};
use crate::message::ClientBound;
use crate::outbound::OutboundBridge;
use crate::registry::ConnectionRegistry;

/// Where client-bound events are handed off for delivery.
#[async_trait]
pub trait ClientBoundSink: Send + Sync {
    /// Hand one event over.
    ///
    /// Fails when the target session can no longer accept events; the
    /// caller treats that as the end of the session.
    async fn dispatch(&self, event: ClientBound) -> Result<()>;
}

struct SessionQueue {
    sender: mpsc::Sender<ClientBound>,
    task: JoinHandle<()>,
}

/// Routes client-bound events into per-session delivery queues.
pub struct DeliveryRouter {
    outbound: Arc<OutboundBridge>,
    registry: Arc<ConnectionRegistry>,
    queue_depth: usize,
    // Lock held for map operations only, never across an await.
    queues: Mutex<HashMap<String, SessionQueue>>,
}

impl DeliveryRouter {
    /// Create a router delivering through `outbound`.
    pub fn new(
        outbound: Arc<OutboundBridge>,
        registry: Arc<ConnectionRegistry>,
        queue_depth: usize,
    ) -> Self {
        Self {
            outbound,
            registry,
            queue_depth,
            queues: Mutex::new(HashMap::new()),
        }
    }

    /// Queue sender for a session, spawning its delivery task on first use.
    fn queue(&self, session_id: &str) -> mpsc::Sender<ClientBound> {
        let mut queues = self.queues.lock().unwrap();
        if let Some(queue) = queues.get(session_id) {
            return queue.sender.clone();
        }

        let (sender, receiver) = mpsc::channel(self.queue_depth);
        let outbound = self.outbound.clone();
        let id = session_id.to_string();
        let task = tokio::spawn(async move {
            delivery_loop(id, receiver, outbound).await;
        });
        queues.insert(
            session_id.to_string(),
            SessionQueue {
                sender: sender.clone(),
                task,
            },
        );
        sender
    }

    /// Drop a session's queue and stop its delivery task.
    ///
    /// Undelivered events are discarded; the client is gone. A later event
    /// for a session re-registered under the same id starts a fresh queue.
    pub fn end_session(&self, session_id: &str) {
        if let Some(queue) = self.queues.lock().unwrap().remove(session_id) {
            queue.task.abort();
        }
    }
}

#[async_trait]
impl ClientBoundSink for DeliveryRouter {
    async fn dispatch(&self, event: ClientBound) -> Result<()> {
        let session_id = event.session_id().to_string();
        if self.registry.client(&session_id).await.is_none() {
            tracing::warn!(session_id = %session_id, "no client transport; event dropped");
            return Err(RelayError::SessionNotFound(session_id));
        }

        // A full queue blocks here. The queue is per session, so a slow
        // client only ever holds up its own traffic.
        self.queue(&session_id)
            .send(event)
            .await
            .map_err(|_| RelayError::ConnectionClosed)
    }
}

impl Drop for DeliveryRouter {
    fn drop(&mut self) {
        for (_, queue) in self.queues.lock().unwrap().drain() {
            queue.task.abort();
        }
    }
}

/// Drain one session's queue into the outbound bridge.
async fn delivery_loop(
    session_id: String,
    mut receiver: mpsc::Receiver<ClientBound>,
    outbound: Arc<OutboundBridge>,
) {
    while let Some(event) = receiver.recv().await {
        outbound.handle_event(event).await;
    }
    tracing::debug!(session_id = %session_id, "client delivery stopped");
}
