//! In-memory broadcast transport.
//!
//! Backs tests and the demo binary with the same semantics the panel
//! expects from a real pub/sub service: every subscriber of a topic gets
//! every message, including the publisher's own. A subscriber that lags
//! behind drops old messages rather than blocking publishers; receivers
//! must tolerate both loss and duplicates.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};

use crate::errors::TransportError;
use crate::events::{Envelope, PanelEvent};
use crate::transport::{Broadcast, Subscription};

const TOPIC_CAPACITY: usize = 64;

/// Shared in-memory topic bus.
#[derive(Default)]
pub struct LoopbackTransport {
    topics: Mutex<HashMap<String, broadcast::Sender<Envelope>>>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn topic_sender(&self, topic: &str) -> broadcast::Sender<Envelope> {
        let mut topics = self.topics.lock();
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .clone()
    }
}

#[async_trait]
impl Broadcast for LoopbackTransport {
    async fn send(
        &self,
        topic: &str,
        event_name: &str,
        payload: PanelEvent,
    ) -> Result<(), TransportError> {
        let envelope = Envelope::broadcast(event_name, &payload);
        // A send with no subscribers is not a failure; broadcast semantics
        // do not require anyone to be listening.
        let _ = self.topic_sender(topic).send(envelope);
        Ok(())
    }

    async fn subscribe(
        &self,
        topic: &str,
        event_filter: &str,
    ) -> Result<Subscription, TransportError> {
        let mut source = self.topic_sender(topic).subscribe();
        let filter = event_filter.to_string();
        let (forward_tx, forward_rx) = mpsc::channel(TOPIC_CAPACITY);

        tokio::spawn(async move {
            loop {
                match source.recv().await {
                    Ok(envelope) => {
                        if envelope.event != filter {
                            continue;
                        }
                        if forward_tx.send(envelope).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        log::warn!("loopback subscriber lagged, dropped {skipped} messages");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(Subscription::new(forward_rx))
    }
}

impl std::fmt::Debug for LoopbackTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackTransport")
            .field("topics", &self.topics.lock().len())
            .finish()
    }
}
