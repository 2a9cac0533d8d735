//! Relay session lifecycle and connection rendezvous.
//!
//! A [`RelaySession`] exists per client session from its CONNECT frame until
//! transport teardown. Forwarding becomes legal only after two independent
//! signals have both fired, in either order:
//!
//! - *transport connected* - the broker-side connection is up, recorded by
//!   [`attach_relay`](RelaySession::attach_relay)
//! - *protocol connected* - the broker answered with a CONNECTED frame,
//!   recorded by [`mark_connected`](RelaySession::mark_connected)
//!
//! The signals travel through a per-session `tokio::sync::watch` channel,
//! so contention is scoped to one session and a waiter parked in
//! [`await_relay`](RelaySession::await_relay) is released exactly when the
//! second signal lands. Dropping the wait future (caller cancelled) simply
//! abandons the wait; timeout and session close resolve it to an
//! "unavailable" error rather than hanging or panicking, and the caller is
//! expected to log and drop the pending message.

use std::time::Duration;

use tokio::sync::watch;

use crate::error::{RelayError, Result};
use crate::protocol::Frame;
use crate::writer::RelayHandle;

/// Lifecycle phase of a relay session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Registered; neither rendezvous signal has fired yet.
    Created,
    /// Exactly one of the two signals is still pending.
    AwaitingRendezvous,
    /// Both signals fired; forwarding is permitted.
    Ready,
    /// Torn down; forwards resolve unavailable.
    Closed,
}

/// Rendezvous flags broadcast through the session's watch channel.
#[derive(Debug, Clone, Default)]
struct Rendezvous {
    /// Broker answered CONNECTED.
    connected: bool,
    /// Broker transport is up; handle for forwarding.
    relay: Option<RelayHandle>,
    /// Session torn down.
    closed: bool,
}

impl Rendezvous {
    fn is_ready(&self) -> bool {
        self.connected && self.relay.is_some()
    }
}

/// Per-session relay state: the stored CONNECT frame plus the rendezvous
/// between transport-connected and protocol-connected.
#[derive(Debug)]
pub struct RelaySession {
    id: String,
    connect_frame: Frame,
    tx: watch::Sender<Rendezvous>,
}

impl RelaySession {
    /// Create a session for a client's CONNECT frame.
    pub fn new(id: impl Into<String>, connect_frame: Frame) -> Self {
        let (tx, _rx) = watch::channel(Rendezvous::default());
        Self {
            id: id.into(),
            connect_frame,
            tx,
        }
    }

    /// The client session id.
    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The CONNECT frame that opened this session.
    ///
    /// Version negotiation reads the accept-version header from here when
    /// the broker's acknowledgment comes back.
    #[inline]
    pub fn connect_frame(&self) -> &Frame {
        &self.connect_frame
    }

    /// Record the protocol-connected signal (broker sent CONNECTED).
    pub fn mark_connected(&self) {
        self.tx.send_modify(|state| state.connected = true);
    }

    /// Record the transport-connected signal and cache the write handle.
    pub fn attach_relay(&self, relay: RelayHandle) {
        self.tx.send_modify(|state| state.relay = Some(relay));
    }

    /// Tear the session down, releasing every parked waiter.
    ///
    /// Also drops the cached write handle so the broker writer task can
    /// drain and exit once nothing else holds one.
    pub fn close(&self) {
        self.tx.send_modify(|state| {
            state.closed = true;
            state.relay = None;
        });
    }

    /// Current lifecycle phase.
    pub fn state(&self) -> SessionState {
        let rendezvous = self.tx.borrow();
        if rendezvous.closed {
            SessionState::Closed
        } else if rendezvous.is_ready() {
            SessionState::Ready
        } else if rendezvous.connected || rendezvous.relay.is_some() {
            SessionState::AwaitingRendezvous
        } else {
            SessionState::Created
        }
    }

    /// Check if both rendezvous signals have fired.
    #[inline]
    pub fn is_ready(&self) -> bool {
        self.state() == SessionState::Ready
    }

    /// Check if the session has been torn down.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.tx.borrow().closed
    }

    /// Suspend until the session is ready, then return the write handle.
    ///
    /// `timeout` bounds the wait; `None` waits until the rendezvous
    /// completes or the session closes.
    ///
    /// # Errors
    ///
    /// `RelayUnavailable` when the wait times out or the session closes
    /// first. Callers treat that as "log and drop the message".
    pub async fn await_relay(&self, timeout: Option<Duration>) -> Result<RelayHandle> {
        let mut rx = self.tx.subscribe();
        let wait = rx.wait_for(|state| state.closed || state.is_ready());

        let outcome = match timeout {
            Some(limit) => match tokio::time::timeout(limit, wait).await {
                Ok(outcome) => outcome,
                Err(_) => return Err(RelayError::RelayUnavailable(self.id.clone())),
            },
            None => wait.await,
        };

        match outcome {
            Ok(state) if !state.closed => state
                .relay
                .clone()
                .ok_or_else(|| RelayError::RelayUnavailable(self.id.clone())),
            // Closed, or the channel itself is gone.
            _ => Err(RelayError::RelayUnavailable(self.id.clone())),
        }
    }

    /// Non-blocking variant of [`await_relay`](Self::await_relay).
    ///
    /// Used on teardown paths that must never suspend: a session that is
    /// not ready has nothing downstream worth waiting for.
    pub fn try_relay(&self) -> Option<RelayHandle> {
        let state = self.tx.borrow();
        if state.closed {
            return None;
        }
        if !state.connected {
            return None;
        }
        state.relay.clone()
    }
}
