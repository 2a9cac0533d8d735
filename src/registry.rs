//! Connection registries scoped to one bridge instance.
//!
//! A single [`ConnectionRegistry`] owns both per-session maps: session id →
//! relay session, and session id → client transport state (transport handle,
//! decode buffer, write lock). Everything goes through scoped
//! insert/lookup/remove operations; nothing is process-global. The map locks
//! are held for map operations only, never across I/O, so cross-session
//! traffic does not contend beyond that.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::protocol::DecodeBuffer;
use crate::session::RelaySession;
use crate::transport::ClientTransport;

/// Client-transport-side state for one session.
pub struct ClientState {
    /// Write side of the client connection.
    pub transport: Arc<dyn ClientTransport>,
    /// Incremental decoder for the session's inbound byte stream.
    /// Locked per chunk; a chunk is decoded before the next is fed.
    pub decoder: Mutex<DecodeBuffer>,
    /// Serializes frame writes to the client transport. Held across the
    /// write await, independent of (and never nested with) the session's
    /// rendezvous state.
    pub write_lock: Mutex<()>,
}

impl ClientState {
    fn new(transport: Arc<dyn ClientTransport>, buffer_size_limit: usize) -> Self {
        Self {
            transport,
            decoder: Mutex::new(DecodeBuffer::with_limit(buffer_size_limit)),
            write_lock: Mutex::new(()),
        }
    }
}

/// Owner of the session and decoder maps.
pub struct ConnectionRegistry {
    sessions: RwLock<HashMap<String, Arc<RelaySession>>>,
    clients: RwLock<HashMap<String, Arc<ClientState>>>,
    buffer_size_limit: usize,
}

impl ConnectionRegistry {
    /// Create an empty registry; decode buffers are created with the
    /// given size limit.
    pub fn new(buffer_size_limit: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            clients: RwLock::new(HashMap::new()),
            buffer_size_limit,
        }
    }

    /// Allocate transport-side state for a starting client session, keyed
    /// by the transport's session id.
    pub async fn start_client(&self, transport: Arc<dyn ClientTransport>) -> Arc<ClientState> {
        let session_id = transport.session_id().to_string();
        let state = Arc::new(ClientState::new(transport, self.buffer_size_limit));
        let mut clients = self.clients.write().await;
        clients.insert(session_id, state.clone());
        state
    }

    /// Look up a session's transport-side state.
    pub async fn client(&self, session_id: &str) -> Option<Arc<ClientState>> {
        self.clients.read().await.get(session_id).cloned()
    }

    /// Remove a session's transport-side state, discarding its decoder.
    pub async fn end_client(&self, session_id: &str) -> Option<Arc<ClientState>> {
        self.clients.write().await.remove(session_id)
    }

    /// Register a relay session under its id.
    ///
    /// The map never holds two sessions for one id: a stale entry is
    /// replaced and closed so its waiters release.
    pub async fn insert_session(&self, session: Arc<RelaySession>) {
        let replaced = {
            let mut sessions = self.sessions.write().await;
            sessions.insert(session.id().to_string(), session.clone())
        };
        if let Some(stale) = replaced {
            tracing::warn!(session_id = %stale.id(), "replacing stale relay session");
            stale.close();
        }
    }

    /// Look up a relay session by id.
    pub async fn session(&self, session_id: &str) -> Option<Arc<RelaySession>> {
        self.sessions.read().await.get(session_id).cloned()
    }

    /// Remove a relay session by id.
    pub async fn remove_session(&self, session_id: &str) -> Option<Arc<RelaySession>> {
        self.sessions.write().await.remove(session_id)
    }

    /// Number of registered relay sessions.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}
