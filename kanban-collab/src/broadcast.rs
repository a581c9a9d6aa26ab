//! In-process fan-out relay.
//!
//! Uses tokio broadcast channels for O(1) send to all subscribers of a
//! channel. Each subscriber gets an independent receiver that buffers up to
//! `capacity` frames; a subscriber that falls further behind loses the
//! oldest frames.
//!
//! ```text
//!  gateway POST ──► LocalRelay::trigger ──► RoomManager["notes"]
//!                                                │
//!                              ┌─────────────────┼─────────────────┐
//!                              ▼                 ▼                 ▼
//!                         subscriber A      subscriber B      subscriber C
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, RwLock};

use kanban_core::BoardEvent;

use crate::protocol::{ChannelFrame, ProtocolError};
use crate::relay::{Relay, RelayError};

/// Statistics for monitoring broadcast health.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BroadcastStats {
    pub messages_sent: u64,
    pub active_subscribers: usize,
}

/// Fan-out group for a single channel.
///
/// All subscribers of the channel share one broadcast sender. Frames are
/// encoded once and shared behind an `Arc`.
pub struct BroadcastGroup {
    sender: broadcast::Sender<Arc<String>>,
    /// Subscribed socket ids
    subscribers: RwLock<HashSet<String>>,
    capacity: usize,
    messages_sent: AtomicU64,
}

impl BroadcastGroup {
    /// Create a new group buffering up to `capacity` frames per subscriber.
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            subscribers: RwLock::new(HashSet::new()),
            capacity,
            messages_sent: AtomicU64::new(0),
        }
    }

    /// Register a subscriber and return its receiver.
    pub async fn add_subscriber(&self, socket_id: &str) -> broadcast::Receiver<Arc<String>> {
        let mut subscribers = self.subscribers.write().await;
        subscribers.insert(socket_id.to_string());
        self.sender.subscribe()
    }

    /// Forget a subscriber. Returns whether it was registered.
    pub async fn remove_subscriber(&self, socket_id: &str) -> bool {
        self.subscribers.write().await.remove(socket_id)
    }

    /// Encode `frame` once and hand it to every receiver.
    ///
    /// Returns the number of receivers reached.
    pub fn broadcast(&self, frame: &ChannelFrame) -> Result<usize, ProtocolError> {
        let encoded = Arc::new(frame.encode()?);
        Ok(self.broadcast_raw(encoded))
    }

    /// Broadcast pre-encoded text.
    pub fn broadcast_raw(&self, encoded: Arc<String>) -> usize {
        // send() only fails when nobody is listening
        let count = self.sender.send(encoded).unwrap_or(0);
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        count
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    pub async fn has_subscriber(&self, socket_id: &str) -> bool {
        self.subscribers.read().await.contains(socket_id)
    }

    pub async fn stats(&self) -> BroadcastStats {
        BroadcastStats {
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            active_subscribers: self.subscriber_count().await,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Maps channel names to broadcast groups.
pub struct RoomManager {
    rooms: RwLock<HashMap<String, Arc<BroadcastGroup>>>,
    default_capacity: usize,
}

impl RoomManager {
    pub fn new(default_capacity: usize) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            default_capacity,
        }
    }

    /// Get or create the group for `channel`.
    pub async fn get_or_create(&self, channel: &str) -> Arc<BroadcastGroup> {
        {
            let rooms = self.rooms.read().await;
            if let Some(room) = rooms.get(channel) {
                return room.clone();
            }
        }

        let mut rooms = self.rooms.write().await;
        // Re-check: another task may have created it between the locks.
        if let Some(room) = rooms.get(channel) {
            return room.clone();
        }
        let room = Arc::new(BroadcastGroup::new(self.default_capacity));
        rooms.insert(channel.to_string(), room.clone());
        room
    }

    /// Register `socket_id` on `channel`, creating the group if needed.
    ///
    /// Runs under the rooms write lock so a concurrent [`leave`](Self::leave)
    /// cannot drop the group between lookup and registration.
    pub async fn join(&self, channel: &str, socket_id: &str) -> broadcast::Receiver<Arc<String>> {
        let mut rooms = self.rooms.write().await;
        let room = rooms
            .entry(channel.to_string())
            .or_insert_with(|| Arc::new(BroadcastGroup::new(self.default_capacity)))
            .clone();
        room.add_subscriber(socket_id).await
    }

    /// Unregister `socket_id` from `channel` and drop the group once empty.
    /// Returns whether the subscriber was registered.
    pub async fn leave(&self, channel: &str, socket_id: &str) -> bool {
        let mut rooms = self.rooms.write().await;
        let Some(room) = rooms.get(channel).cloned() else {
            return false;
        };
        let removed = room.remove_subscriber(socket_id).await;
        if room.subscriber_count().await == 0 {
            rooms.remove(channel);
        }
        removed
    }

    pub async fn get(&self, channel: &str) -> Option<Arc<BroadcastGroup>> {
        self.rooms.read().await.get(channel).cloned()
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn active_channels(&self) -> Vec<String> {
        self.rooms.read().await.keys().cloned().collect()
    }
}

/// Relay that delivers to subscribers connected to this process.
pub struct LocalRelay {
    rooms: RoomManager,
}

impl LocalRelay {
    pub fn new(capacity: usize) -> Self {
        Self {
            rooms: RoomManager::new(capacity),
        }
    }

    pub fn rooms(&self) -> &RoomManager {
        &self.rooms
    }
}

#[async_trait]
impl Relay for LocalRelay {
    async fn trigger(&self, channel: &str, event: &BoardEvent) -> Result<Option<usize>, RelayError> {
        // No room means no subscribers; nothing to create.
        let Some(room) = self.rooms.get(channel).await else {
            log::debug!("No subscribers on {channel}; {} dropped", event.name());
            return Ok(Some(0));
        };
        let frame = ChannelFrame::board_event(channel, event);
        let count = room
            .broadcast(&frame)
            .map_err(|e| RelayError::Encode(e.to_string()))?;
        Ok(Some(count))
    }

    fn name(&self) -> &'static str {
        "local"
    }
}
