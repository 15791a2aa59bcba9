//! Fan-out bus for provider events.
//!
//! ```text
//! EventSource::after_write
//!        |
//!        v
//! EventBus::emit  (never blocks)
//!        |
//!        v
//! broadcast::Sender<ProviderEvent>
//!      /   \
//!     v     v
//! Subscription  Subscription   (one cursor each)
//! ```
//!
//! Every subscription sees every event. Each one reads at its own pace from
//! a bounded ring; a subscriber that falls more than `capacity` events
//! behind loses the oldest ones instead of stalling the emitter or the
//! other subscribers.

use cid::Cid;
use libp2p_identity::PeerId;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::domain::TraceContext;

/// Default number of events buffered per subscriber
pub const DEFAULT_BUS_CAPACITY: usize = 256;

/// A provider announcement decoded from a datastore write
#[derive(Debug, Clone)]
pub struct ProviderEvent {
    /// Announced content
    pub cid: Cid,

    /// Announcing peer
    pub peer_id: PeerId,

    /// Trace correlation for this write
    pub trace: TraceContext,
}

#[derive(Debug, Error)]
pub enum BusError {
    #[error("No active subscribers")]
    NoSubscribers,
}

/// Errors from [`Subscription::recv`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecvError {
    #[error("Subscriber lagged, {0} events dropped")]
    Lagged(u64),

    #[error("Event bus closed")]
    Closed,
}

/// Single-emitter, multi-subscriber provider event bus
#[derive(Debug)]
pub struct EventBus {
    sender: broadcast::Sender<ProviderEvent>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event to every current subscriber.
    ///
    /// Returns the number of subscribers the event was queued for.
    pub fn emit(&self, event: ProviderEvent) -> Result<usize, BusError> {
        self.sender.send(event).map_err(|_| BusError::NoSubscribers)
    }

    /// Open an independent subscription receiving events emitted from now on
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

/// One consumer's view of the bus
#[derive(Debug)]
pub struct Subscription {
    receiver: broadcast::Receiver<ProviderEvent>,
}

impl Subscription {
    /// Wait for the next event
    pub async fn recv(&mut self) -> Result<ProviderEvent, RecvError> {
        self.receiver.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Lagged(n) => RecvError::Lagged(n),
            broadcast::error::RecvError::Closed => RecvError::Closed,
        })
    }

    /// Stop receiving; buffered events for this subscriber are released
    pub fn close(self) {
        drop(self.receiver);
    }
}
