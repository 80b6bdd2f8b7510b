//! Notification relay: pushes classified events to the wallet they concern.
//!
//! Delivery is best effort and at most once: a notification published while
//! no transport is subscribed for that wallet is dropped, never queued.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::event::{ChainEvent, EventName};
use crate::types::normalize_address;

/// Channel name clients listen on for indexer pushes.
pub const NOTIFICATION_CHANNEL: &str = "blockchain_event";

/// Payload pushed to a subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(rename = "type")]
    pub kind: EventName,
    pub transaction_hash: String,
    pub user_address: String,
    pub timestamp: DateTime<Utc>,
    pub block_number: u64,
}

impl Notification {
    /// Build the payload for `event`, or `None` when the event carries no
    /// subscriber address in `topics[1]`.
    pub fn for_event(event: &ChainEvent, timestamp: DateTime<Utc>) -> Option<Self> {
        let user_address = event.subscriber()?;
        Some(Self {
            kind: event.event_name,
            transaction_hash: event.transaction_hash.clone(),
            user_address,
            timestamp,
            block_number: event.block_number,
        })
    }
}

/// Publish side of the real-time channel, injected into the indexer.
pub trait NotificationRelay: Send + Sync {
    /// Push `notification` to every transport subscribed for `address`.
    ///
    /// Must not block. Returns the number of transports reached; zero is not
    /// an error.
    fn publish(&self, address: &str, notification: &Notification) -> usize;
}

/// Relay that drops everything. Used when no real-time clients exist.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullRelay;

impl NotificationRelay for NullRelay {
    fn publish(&self, _address: &str, _notification: &Notification) -> usize {
        0
    }
}

/// Room name for a wallet, e.g. `user:0xabc…`.
pub fn room_name(address: &str) -> String {
    format!("user:{}", normalize_address(address))
}

struct Transport {
    id: u64,
    sender: mpsc::UnboundedSender<Notification>,
}

/// In-process subscription registry keyed by lowercased wallet address.
///
/// Cheap to clone; clones share the same rooms.
#[derive(Clone, Default)]
pub struct SubscriptionHub {
    rooms: Arc<Mutex<HashMap<String, Vec<Transport>>>>,
    next_id: Arc<AtomicU64>,
}

impl SubscriptionHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a transport scoped to `address`. The transport is removed when
    /// the returned [`Subscription`] is dropped.
    pub fn subscribe(&self, address: &str) -> Subscription {
        let key = normalize_address(address);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::unbounded_channel();
        self.rooms
            .lock()
            .unwrap()
            .entry(key.clone())
            .or_default()
            .push(Transport { id, sender });
        tracing::debug!(room = %room_name(&key), id, "subscriber joined");
        Subscription {
            address: key,
            id,
            receiver,
            hub: self.clone(),
        }
    }

    /// Number of open transports for `address`.
    pub fn subscriber_count(&self, address: &str) -> usize {
        self.rooms
            .lock()
            .unwrap()
            .get(&normalize_address(address))
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Number of wallets with at least one open transport.
    pub fn room_count(&self) -> usize {
        self.rooms.lock().unwrap().len()
    }

    fn remove(&self, address: &str, id: u64) {
        let mut rooms = self.rooms.lock().unwrap();
        if let Some(transports) = rooms.get_mut(address) {
            transports.retain(|t| t.id != id);
            if transports.is_empty() {
                rooms.remove(address);
            }
        }
    }
}

impl NotificationRelay for SubscriptionHub {
    fn publish(&self, address: &str, notification: &Notification) -> usize {
        let key = normalize_address(address);
        let mut rooms = self.rooms.lock().unwrap();
        let Some(transports) = rooms.get_mut(&key) else {
            return 0;
        };
        // Closed transports are pruned as a side effect.
        transports.retain(|t| t.sender.send(notification.clone()).is_ok());
        let delivered = transports.len();
        if delivered == 0 {
            rooms.remove(&key);
        }
        delivered
    }
}

/// Receiving end of one transport.
pub struct Subscription {
    address: String,
    id: u64,
    receiver: mpsc::UnboundedReceiver<Notification>,
    hub: SubscriptionHub,
}

impl Subscription {
    /// Lowercased wallet address this transport listens for.
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn room(&self) -> String {
        room_name(&self.address)
    }

    /// Wait for the next notification.
    pub async fn recv(&mut self) -> Option<Notification> {
        self.receiver.recv().await
    }

    /// Take a pending notification without waiting.
    pub fn try_recv(&mut self) -> Option<Notification> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.remove(&self.address, self.id);
    }
}
