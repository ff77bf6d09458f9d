//! Broadcast channel abstraction.
//!
//! The real pub/sub primitive is an external collaborator; the panel only
//! depends on this seam. Delivery is at-least-once and unordered across
//! publishers — nothing downstream may assume otherwise. Retry-with-backoff
//! on transient transport faults belongs to the implementation behind this
//! trait, not to the protocol layer.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::errors::TransportError;
use crate::events::{Envelope, PanelEvent};

pub mod loopback;

pub use loopback::LoopbackTransport;

/// A live subscription to one topic, pre-filtered by envelope event name.
pub struct Subscription {
    receiver: mpsc::Receiver<Envelope>,
}

impl Subscription {
    /// Build a subscription from the receiving half of a forwarder channel.
    pub fn new(receiver: mpsc::Receiver<Envelope>) -> Self {
        Self { receiver }
    }

    /// Next matching envelope, or `None` once the topic is torn down.
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.receiver.recv().await
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

/// Publish/subscribe access to named broadcast topics.
#[async_trait]
pub trait Broadcast: Send + Sync {
    /// Publish one payload to a topic under the given event name. Success
    /// means the transport accepted the message; only then may the caller
    /// apply the corresponding local mutation.
    async fn send(
        &self,
        topic: &str,
        event_name: &str,
        payload: PanelEvent,
    ) -> Result<(), TransportError>;

    /// Subscribe to a topic, delivering only envelopes whose event name
    /// matches `event_filter`.
    async fn subscribe(
        &self,
        topic: &str,
        event_filter: &str,
    ) -> Result<Subscription, TransportError>;
}
