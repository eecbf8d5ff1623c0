//! Peer connection handles
//!
//! A `Connection` is what the relay sees of one peer link: an identity,
//! a liveness state, and a way to queue an outbound frame. The transport
//! behind it (WebSocket writer task, test channel) is owned elsewhere.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::error::{Error, Result};
use crate::protocol::OutboundFrame;

// ─────────────────────────────────────────────────────────────────
// Identity
// ─────────────────────────────────────────────────────────────────

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique connection identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocate a fresh identifier
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[cfg(test)]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

// ─────────────────────────────────────────────────────────────────
// Liveness
// ─────────────────────────────────────────────────────────────────

/// Whether a connection is eligible to receive sends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Liveness {
    Open = 0,
    Closing = 1,
    Closed = 2,
}

impl Liveness {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Liveness::Open,
            1 => Liveness::Closing,
            _ => Liveness::Closed,
        }
    }
}

impl fmt::Display for Liveness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Liveness::Open => "open",
            Liveness::Closing => "closing",
            Liveness::Closed => "closed",
        };
        write!(f, "{}", s)
    }
}

// ─────────────────────────────────────────────────────────────────
// Connection Trait
// ─────────────────────────────────────────────────────────────────

/// One peer link as seen by the relay
#[async_trait]
pub trait Connection: Send + Sync {
    fn id(&self) -> ConnectionId;

    /// Remote address or URL, for logs
    fn remote(&self) -> &str;

    fn liveness(&self) -> Liveness;

    fn is_open(&self) -> bool {
        self.liveness() == Liveness::Open
    }

    /// Queue a frame for this peer
    ///
    /// Never waits on a slow peer. Returns `Error::ConnectionClosed` if the
    /// peer is no longer open, `Error::QueueFull` if it is open but not
    /// draining, and `Error::SendFailed` if the transport went away.
    async fn send(&self, frame: OutboundFrame) -> Result<()>;

    /// Mark the connection as closed; later sends fail
    fn close(&self);
}

/// Type alias for a shared connection reference
pub type SharedConnection = Arc<dyn Connection>;

// ─────────────────────────────────────────────────────────────────
// Channel-backed Connection
// ─────────────────────────────────────────────────────────────────

/// Connection whose outbound frames go into an mpsc queue
///
/// The receiving half is drained by the transport's writer task, so
/// concurrent fan-outs never touch the socket directly. The queue is
/// bounded; a frame that does not fit is refused rather than awaited.
pub struct ChannelConnection {
    id: ConnectionId,
    remote: String,
    state: AtomicU8,
    capacity: usize,
    tx: mpsc::Sender<OutboundFrame>,
}

impl ChannelConnection {
    /// Create a connection and the receiver its writer task drains
    pub fn new(remote: impl Into<String>, queue_size: usize) -> (Arc<Self>, mpsc::Receiver<OutboundFrame>) {
        let capacity = queue_size.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let conn = Arc::new(Self {
            id: ConnectionId::next(),
            remote: remote.into(),
            state: AtomicU8::new(Liveness::Open as u8),
            capacity,
            tx,
        });
        (conn, rx)
    }

    /// Begin an orderly shutdown; the peer stops receiving fan-out
    pub fn mark_closing(&self) {
        let _ = self.state.compare_exchange(
            Liveness::Open as u8,
            Liveness::Closing as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }
}

#[async_trait]
impl Connection for ChannelConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn remote(&self) -> &str {
        &self.remote
    }

    fn liveness(&self) -> Liveness {
        // A dropped writer means the transport is gone regardless of the flag
        if self.tx.is_closed() {
            return Liveness::Closed;
        }
        Liveness::from_u8(self.state.load(Ordering::SeqCst))
    }

    async fn send(&self, frame: OutboundFrame) -> Result<()> {
        if !self.is_open() {
            return Err(Error::ConnectionClosed { connection_id: self.id });
        }

        self.tx.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => Error::QueueFull {
                connection_id: self.id,
                capacity: self.capacity,
            },
            TrySendError::Closed(_) => {
                self.close();
                Error::SendFailed {
                    connection_id: self.id,
                    message: "outbound queue closed".to_string(),
                }
            }
        })
    }

    fn close(&self) {
        self.state.store(Liveness::Closed as u8, Ordering::SeqCst);
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
