use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::models::Envelope;

/// Hands out participant ids, unique for the life of the process.
#[derive(Debug)]
pub struct UserIdAllocator {
    next: AtomicU32,
}

impl UserIdAllocator {
    pub fn new() -> Self {
        // 0 belongs to the server identity.
        Self { next: AtomicU32::new(1) }
    }

    pub fn next_id(&self) -> u32 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for UserIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of handing one envelope to a session's outbound queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Queued,
    /// Queue full; the session was cancelled instead of skipping a message.
    Stalled,
    /// Writer already gone.
    Closed,
}

/// Delivery side of a client session: its outbound queue and its
/// cancellation token. Cheap to clone, safe to use from any task.
#[derive(Clone, Debug)]
pub struct ClientHandle {
    id: u32,
    outbound: mpsc::Sender<Arc<Envelope>>,
    token: CancellationToken,
}

impl ClientHandle {
    /// Create a handle and the receiving end its writer task drains.
    pub fn channel(id: u32, capacity: usize, parent: &CancellationToken) -> (Self, mpsc::Receiver<Arc<Envelope>>) {
        let (outbound, rx) = mpsc::channel(capacity.max(1));
        let handle = Self {
            id,
            outbound,
            token: parent.child_token(),
        };
        (handle, rx)
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn close(&self) {
        self.token.cancel();
    }

    /// Non-blocking enqueue. Never fails the caller.
    pub fn deliver(&self, envelope: Arc<Envelope>) -> Delivery {
        match self.outbound.try_send(envelope) {
            Ok(()) => Delivery::Queued,
            Err(TrySendError::Full(_)) => {
                warn!("Outbound queue full for user {}, closing session", self.id);
                self.token.cancel();
                Delivery::Stalled
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Dropping message for user {}: session already closed", self.id);
                Delivery::Closed
            }
        }
    }
}
