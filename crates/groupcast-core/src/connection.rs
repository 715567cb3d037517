//! Per-client connection state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::errors::HubError;
use crate::ids::ConnectionId;

/// A serialized outbound frame. Shared so one broadcast allocates once.
pub type Payload = Arc<str>;

/// Lifecycle of a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Accepted, handshake not finished.
    Connecting,
    /// Handshake done; frames flow both ways.
    Open,
    /// Close requested; the writer is draining the queue.
    Closing,
    /// Terminal.
    Closed,
}

impl ConnectionState {
    /// Whether `self → next` is a legal edge of the state machine.
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Connecting, Self::Open | Self::Closing)
                | (Self::Open, Self::Closing)
                | (Self::Closing, Self::Closed)
        )
    }

    /// Live connections accept new payloads and memberships.
    pub fn is_live(self) -> bool {
        matches!(self, Self::Connecting | Self::Open)
    }
}

/// One accepted client session.
///
/// The hub's directory owns it; the transport's writer only holds the
/// receiving half of the queue plus a cloned handle for liveness tracking.
pub struct Connection {
    id: ConnectionId,
    state: Mutex<ConnectionState>,
    tx: mpsc::Sender<Payload>,
    closing: CancellationToken,
    connected_at: Instant,
    last_seen: Mutex<Instant>,
    dropped_messages: AtomicU64,
}

impl Connection {
    /// Create a connection in `Connecting` with a queue of `capacity` slots.
    ///
    /// A zero capacity is bumped to one.
    pub fn new(id: ConnectionId, capacity: usize) -> (Self, mpsc::Receiver<Payload>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let now = Instant::now();
        let connection = Self {
            id,
            state: Mutex::new(ConnectionState::Connecting),
            tx,
            closing: CancellationToken::new(),
            connected_at: now,
            last_seen: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
        };
        (connection, rx)
    }

    /// Connection id.
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Move to `next` if the edge is legal. Returns whether the state changed.
    pub fn transition(&self, next: ConnectionState) -> bool {
        let mut state = self.state.lock();
        if state.can_transition_to(next) {
            *state = next;
            true
        } else {
            false
        }
    }

    /// `Connecting → Open`.
    pub fn open(&self) -> bool {
        self.transition(ConnectionState::Open)
    }

    /// Request a close: move to `Closing` and wake everything waiting on
    /// [`closing_token`](Self::closing_token). Idempotent.
    pub fn begin_close(&self) -> bool {
        let changed = self.transition(ConnectionState::Closing);
        self.closing.cancel();
        changed
    }

    /// Force the terminal state, passing through `Closing` if needed.
    pub fn mark_closed(&self) {
        let _ = self.begin_close();
        let _ = self.transition(ConnectionState::Closed);
    }

    /// Token cancelled once a close has been requested.
    pub fn closing_token(&self) -> CancellationToken {
        self.closing.clone()
    }

    /// Enqueue a payload without waiting.
    ///
    /// The state lock is held across the `try_send`, so nothing is accepted
    /// after the connection has started closing.
    pub fn try_enqueue(&self, payload: Payload) -> Result<(), HubError> {
        let state = self.state.lock();
        if !state.is_live() {
            return Err(HubError::UnknownConnection(self.id.clone()));
        }
        match self.tx.try_send(payload) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
                Err(HubError::QueueFull(self.id.clone()))
            }
            Err(TrySendError::Closed(_)) => Err(HubError::UnknownConnection(self.id.clone())),
        }
    }

    /// Payloads waiting in the queue.
    pub fn queued(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    /// Payloads refused because the queue was full.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Record inbound activity (any frame, including pongs).
    pub fn mark_alive(&self) {
        *self.last_seen.lock() = Instant::now();
    }

    /// Time since the last inbound activity.
    pub fn idle_for(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("queued", &self.queued())
            .finish_non_exhaustive()
    }
}
