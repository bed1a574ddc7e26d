use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::protocol::{decode_message, encode_message, WireMessage};
use crate::SyncResult;

/// Identity of one open view of a document (one tab)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ViewId(Uuid);

impl ViewId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ViewId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// "resource `key` changed" signal
///
/// Carries no payload on purpose: receivers re-fetch authoritative state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastEvent {
    pub key: String,
    pub timestamp: DateTime<Utc>,
    pub origin: Option<ViewId>,
}

impl BroadcastEvent {
    /// Whether this event is the echo of a change made by `view`
    pub fn is_echo_of(&self, view: &ViewId) -> bool {
        self.origin.as_ref() == Some(view)
    }
}

/// Subscription to one broadcast key
pub struct BroadcastSubscription {
    key: String,
    rx: broadcast::Receiver<BroadcastEvent>,
}

impl BroadcastSubscription {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Wait for the next signal
    ///
    /// Lagged gaps are skipped: a single wake-up already means "re-fetch".
    /// Returns `None` once the hub is gone.
    pub async fn recv(&mut self) -> Option<BroadcastEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(
                        "Subscriber on '{}' lagged, skipped {} signals",
                        self.key, skipped
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn try_recv(&mut self) -> Option<BroadcastEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}

/// Process-wide pub/sub keyed by resource identifier
pub struct BroadcastHub {
    channels: DashMap<String, broadcast::Sender<BroadcastEvent>>,
    capacity: usize,
    outbound_tx: broadcast::Sender<BroadcastEvent>,
}

impl BroadcastHub {
    pub fn new(capacity: usize) -> Self {
        let (outbound_tx, _) = broadcast::channel(capacity.max(1));

        Self {
            channels: DashMap::new(),
            capacity: capacity.max(1),
            outbound_tx,
        }
    }

    /// Signal a change with no known origin view
    pub fn broadcast(&self, key: &str) -> usize {
        self.publish(key, None)
    }

    /// Signal a change made by `origin`
    pub fn broadcast_from(&self, key: &str, origin: ViewId) -> usize {
        self.publish(key, Some(origin))
    }

    pub fn subscribe(&self, key: &str) -> BroadcastSubscription {
        BroadcastSubscription {
            key: key.to_string(),
            rx: self
                .channels
                .entry(key.to_string())
                .or_insert_with(|| broadcast::channel(self.capacity).0)
                .subscribe(),
        }
    }

    /// Locally originated events, for relaying to other processes
    pub fn subscribe_outbound(&self) -> broadcast::Receiver<BroadcastEvent> {
        self.outbound_tx.subscribe()
    }

    pub fn encode_event(event: &BroadcastEvent) -> SyncResult<Vec<u8>> {
        encode_message(&WireMessage::Broadcast {
            key: event.key.clone(),
            timestamp: event.timestamp,
            origin: event.origin,
        })
    }

    /// Deliver an event relayed from another process to local subscribers
    ///
    /// Relayed events are not echoed back to the outbound stream.
    pub fn deliver_encoded(&self, data: &[u8]) -> SyncResult<usize> {
        let WireMessage::Broadcast {
            key,
            timestamp,
            origin,
        } = decode_message(data)?;

        Ok(self.deliver(BroadcastEvent {
            key,
            timestamp,
            origin,
        }))
    }

    fn publish(&self, key: &str, origin: Option<ViewId>) -> usize {
        let event = BroadcastEvent {
            key: key.to_string(),
            timestamp: Utc::now(),
            origin,
        };

        let _ = self.outbound_tx.send(event.clone());
        self.deliver(event)
    }

    /// Number of keys with a live channel
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    fn deliver(&self, event: BroadcastEvent) -> usize {
        let key = event.key.clone();
        let Some(sender) = self.channels.get(&key).map(|sender| sender.clone()) else {
            debug!("No subscribers for broadcast '{}'", key);
            return 0;
        };

        match sender.send(event) {
            Ok(receiver_count) => {
                debug!("Broadcast '{}' to {} subscribers", key, receiver_count);
                receiver_count
            }
            Err(_) => {
                // every subscriber is gone; a later subscribe recreates the channel
                self.channels
                    .remove_if(&key, |_, sender| sender.receiver_count() == 0);
                debug!("Dropped idle broadcast channel '{}'", key);
                0
            }
        }
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(256)
    }
}
