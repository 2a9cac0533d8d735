//! Dedicated writer task per broker connection.
//!
//! The broker write half is owned by a single task fed through a bounded
//! mpsc channel:
//!
//! ```text
//! forward (session A) ─┐
//! forward (session A) ─┼─► mpsc::Sender<Bytes> ─► writer task ─► broker
//! teardown DISCONNECT ─┘
//! ```
//!
//! Forwards enqueue fully-encoded frames; the task writes them out in
//! order, so broker-side writes never interleave and no lock is held
//! across I/O. When the last [`RelayHandle`] drops, the task drains the
//! queue and exits, closing the connection.

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{RelayError, Result};

/// Default queue depth for a broker connection's writer task.
pub const DEFAULT_RELAY_QUEUE_DEPTH: usize = 256;

/// Handle for enqueueing encoded frames toward a broker connection.
///
/// Cheaply cloneable; all clones feed the same writer task.
#[derive(Debug, Clone)]
pub struct RelayHandle {
    tx: mpsc::Sender<Bytes>,
}

impl RelayHandle {
    /// Enqueue one encoded frame for writing.
    ///
    /// Waits for queue space when the broker connection is slow.
    ///
    /// # Errors
    ///
    /// `ConnectionClosed` once the writer task is gone.
    pub async fn send(&self, frame: Bytes) -> Result<()> {
        self.tx
            .send(frame)
            .await
            .map_err(|_| RelayError::ConnectionClosed)
    }

    /// Check if the writer task is still accepting frames.
    #[inline]
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Spawn the writer task for a broker write half.
///
/// Returns the sending handle and the task's join handle. The task ends
/// when every handle is dropped (after draining queued frames) or when a
/// write fails.
pub fn spawn_relay_writer<W>(writer: W, queue_depth: usize) -> (RelayHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(queue_depth);
    let task = tokio::spawn(write_loop(rx, writer));
    (RelayHandle { tx }, task)
}

/// Main writer loop - receives encoded frames and writes them in order.
async fn write_loop<W>(mut rx: mpsc::Receiver<Bytes>, mut writer: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    // recv() yields None only once the channel is both closed and empty,
    // so pending frames are flushed before shutdown.
    while let Some(frame) = rx.recv().await {
        writer.write_all(&frame).await?;
        writer.flush().await?;
    }
    Ok(())
}
