//! Per-room push fan-out.
//!
//! Every room with at least one subscriber gets a tokio broadcast channel of
//! `Arc<Push>`: one send reaches all receivers without cloning the payload.
//! Receivers that fall more than `capacity` pushes behind lose the oldest
//! ones; the loss is counted and logged by whoever reads the receiver.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

use bingo_core::RoomId;

use crate::protocol::Push;

/// Statistics for monitoring broadcast health.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastStats {
    pub messages_sent: u64,
    pub messages_dropped: u64,
    pub active_subscribers: usize,
}

/// Lock-free counters, read via [`BroadcastGroup::stats`].
#[derive(Default)]
struct AtomicBroadcastStats {
    messages_sent: AtomicU64,
    messages_dropped: AtomicU64,
}

/// The broadcast channel of one room.
pub struct BroadcastGroup {
    sender: broadcast::Sender<Arc<Push>>,
    capacity: usize,
    atomic_stats: AtomicBroadcastStats,
}

impl BroadcastGroup {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            capacity,
            atomic_stats: AtomicBroadcastStats::default(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Push>> {
        self.sender.subscribe()
    }

    /// Send to every current receiver. Returns how many there were.
    pub fn broadcast(&self, push: Push) -> usize {
        let count = self.sender.send(Arc::new(push)).unwrap_or(0);
        self.atomic_stats.messages_sent.fetch_add(1, Ordering::Relaxed);
        count
    }

    /// Count pushes a lagging receiver skipped.
    pub fn record_dropped(&self, skipped: u64) {
        self.atomic_stats
            .messages_dropped
            .fetch_add(skipped, Ordering::Relaxed);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn stats(&self) -> BroadcastStats {
        BroadcastStats {
            messages_sent: self.atomic_stats.messages_sent.load(Ordering::Relaxed),
            messages_dropped: self.atomic_stats.messages_dropped.load(Ordering::Relaxed),
            active_subscribers: self.subscriber_count(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Maps room ids to broadcast groups so pushes stay within their room.
pub struct RoomManager {
    rooms: RwLock<HashMap<RoomId, Arc<BroadcastGroup>>>,
    default_capacity: usize,
}

impl RoomManager {
    pub fn new(default_capacity: usize) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            default_capacity,
        }
    }

    /// Subscribe to `room`, creating its group on first use.
    ///
    /// The receiver is taken while the map lock is held, so a concurrent
    /// [`prune_idle`](Self::prune_idle) can never drop the group between
    /// lookup and subscribe.
    pub async fn subscribe(&self, room: RoomId) -> (Arc<BroadcastGroup>, broadcast::Receiver<Arc<Push>>) {
        // Fast path: read lock
        {
            let rooms = self.rooms.read().await;
            if let Some(group) = rooms.get(&room) {
                return (group.clone(), group.subscribe());
            }
        }

        // Slow path: write lock to create
        let mut rooms = self.rooms.write().await;
        let group = rooms
            .entry(room)
            .or_insert_with(|| Arc::new(BroadcastGroup::new(self.default_capacity)))
            .clone();
        let rx = group.subscribe();
        (group, rx)
    }

    /// Fan `push` out to its room. Rooms nobody watches are skipped.
    pub async fn publish(&self, push: Push) -> usize {
        let group = self.rooms.read().await.get(&push.room_id()).cloned();
        match group {
            Some(group) => group.broadcast(push),
            None => 0,
        }
    }

    pub async fn get(&self, room: RoomId) -> Option<Arc<BroadcastGroup>> {
        self.rooms.read().await.get(&room).cloned()
    }

    /// Drop groups with no receivers left. Returns how many were removed.
    pub async fn prune_idle(&self) -> usize {
        let mut rooms = self.rooms.write().await;
        let before = rooms.len();
        rooms.retain(|_, group| group.subscriber_count() > 0);
        before - rooms.len()
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn active_rooms(&self) -> Vec<RoomId> {
        self.rooms.read().await.keys().copied().collect()
    }
}
