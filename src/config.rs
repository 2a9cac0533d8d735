//! Relay configuration.

use std::time::Duration;

use crate::protocol::DEFAULT_BUFFER_SIZE_LIMIT;
use crate::writer::DEFAULT_RELAY_QUEUE_DEPTH;

/// Default bound on the rendezvous wait before a forward gives up.
pub const DEFAULT_RENDEZVOUS_TIMEOUT: Duration = Duration::from_secs(30);

/// Tunables shared by every session the relay manages.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Per-stream cap on buffered undecoded bytes. Crossing it is fatal
    /// for that session.
    pub buffer_size_limit: usize,
    /// How long a forward may wait for the broker rendezvous before the
    /// message is dropped. `None` waits indefinitely, which reproduces the
    /// behavior of relays that only ever give up on cancellation.
    pub rendezvous_timeout: Option<Duration>,
    /// Queue depth of each broker connection's writer task.
    pub relay_queue_depth: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            buffer_size_limit: DEFAULT_BUFFER_SIZE_LIMIT,
            rendezvous_timeout: Some(DEFAULT_RENDEZVOUS_TIMEOUT),
            relay_queue_depth: DEFAULT_RELAY_QUEUE_DEPTH,
        }
    }
}
