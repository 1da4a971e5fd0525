//! Shared in-process store with push notifications.
//!
//! ```text
//!  client A ─┐                          ┌──► Subscription (A)
//!            ├─► MemoryBackend ─publish─┤
//!  client B ─┘   rooms / tables         └──► Subscription (B)
//! ```
//!
//! This is the authoritative store behind [`StoreServer`](crate::server::StoreServer)
//! and the backend used to run several controllers in one process. Inserts
//! are published to subscribers before the insert call returns, so a
//! writer's own push and its direct response race exactly as they do over
//! the network.

use async_trait::async_trait;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, RwLock};

use bingo_core::{now_millis, CallEntry, EntryId, EntryKind, Room, RoomCode, RoomId, WordEntry};

use crate::broadcast::{BroadcastGroup, RoomManager};
use crate::protocol::{expect_row, Push, Record, Row};
use crate::remote::{
    Backend, BackendMode, PushEvent, RemoteCollection, RemoteError, RoomDirectory, Subscription,
};

/// Default per-room push buffer.
pub const DEFAULT_BROADCAST_CAPACITY: usize = 256;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub rooms: usize,
    pub rows: usize,
    pub watched_rooms: usize,
}

#[derive(Default)]
struct StoreState {
    rooms: HashMap<RoomCode, Room>,
    tables: HashMap<(RoomId, EntryKind), Vec<Row>>,
    last_created_at: u64,
}

impl StoreState {
    fn has_room(&self, id: RoomId) -> bool {
        self.rooms.values().any(|r| r.id == id)
    }

    /// Wall-clock millis, bumped when needed so values strictly increase.
    fn next_created_at(&mut self) -> u64 {
        let now = now_millis().max(self.last_created_at + 1);
        self.last_created_at = now;
        now
    }
}

struct Inner {
    state: RwLock<StoreState>,
    push: RoomManager,
    offline: AtomicBool,
}

/// Cheap-to-clone handle to one shared store.
#[derive(Clone)]
pub struct MemoryBackend {
    inner: Arc<Inner>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new(DEFAULT_BROADCAST_CAPACITY)
    }
}

impl MemoryBackend {
    pub fn new(broadcast_capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(StoreState::default()),
                push: RoomManager::new(broadcast_capacity),
                offline: AtomicBool::new(false),
            }),
        }
    }

    /// While offline every call fails with [`RemoteError::Connection`].
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
        log::info!("In-process store is now {}", if offline { "offline" } else { "online" });
    }

    pub fn is_offline(&self) -> bool {
        self.inner.offline.load(Ordering::SeqCst)
    }

    fn check_online(&self) -> Result<(), RemoteError> {
        if self.is_offline() {
            Err(RemoteError::Connection("store is offline".into()))
        } else {
            Ok(())
        }
    }

    // ─── Rooms ───────────────────────────────────────────────────────

    pub async fn find_room(&self, code: &RoomCode) -> Result<Option<Room>, RemoteError> {
        self.check_online()?;
        Ok(self.inner.state.read().await.rooms.get(code).cloned())
    }

    /// Create the room for `code`. A second create for the same code
    /// returns the existing room.
    pub async fn create_room(&self, code: &RoomCode) -> Result<Room, RemoteError> {
        self.check_online()?;
        let mut state = self.inner.state.write().await;
        let room = state
            .rooms
            .entry(code.clone())
            .or_insert_with(|| {
                log::info!("Created room '{code}'");
                Room::new(code.clone())
            })
            .clone();
        Ok(room)
    }

    // ─── Rows ────────────────────────────────────────────────────────

    /// Rows of one collection, oldest first.
    pub async fn fetch_rows(&self, kind: EntryKind, room: RoomId) -> Result<Vec<Row>, RemoteError> {
        self.check_online()?;
        let state = self.inner.state.read().await;
        Ok(state.tables.get(&(room, kind)).cloned().unwrap_or_default())
    }

    /// Store a row and publish it. Fails for rooms that were never created.
    pub async fn insert_row(
        &self,
        kind: EntryKind,
        room: RoomId,
        value: String,
    ) -> Result<Row, RemoteError> {
        self.check_online()?;
        let row = {
            let mut state = self.inner.state.write().await;
            if !state.has_room(room) {
                return Err(RemoteError::Rejected(format!("unknown room {room}")));
            }
            let created_at = state.next_created_at();
            let row = Row::build(kind, EntryId::permanent(), room, value, created_at);
            state.tables.entry((room, kind)).or_default().push(row.clone());
            row
        };

        let receivers = self.inner.push.publish(Push::Insert(row.clone())).await;
        log::trace!("{kind}: inserted {} in room {room}, pushed to {receivers}", row.id());
        Ok(row)
    }

    /// Delete every row of one collection and publish one delete per row.
    pub async fn delete_rows(&self, kind: EntryKind, room: RoomId) -> Result<Vec<EntryId>, RemoteError> {
        self.check_online()?;
        let removed: Vec<EntryId> = {
            let mut state = self.inner.state.write().await;
            state
                .tables
                .remove(&(room, kind))
                .unwrap_or_default()
                .iter()
                .map(Row::id)
                .collect()
        };

        for id in &removed {
            self.inner
                .push
                .publish(Push::Delete {
                    kind,
                    room_id: room,
                    id: *id,
                })
                .await;
        }
        log::debug!("{kind}: deleted {} rows in room {room}", removed.len());
        Ok(removed)
    }

    /// Raw push receiver for `room` (both collections).
    pub async fn watch(
        &self,
        room: RoomId,
    ) -> Result<(Arc<BroadcastGroup>, broadcast::Receiver<Arc<Push>>), RemoteError> {
        self.check_online()?;
        let pruned = self.inner.push.prune_idle().await;
        if pruned > 0 {
            log::trace!("Pruned {pruned} idle push groups");
        }
        Ok(self.inner.push.subscribe(room).await)
    }

    pub async fn stats(&self) -> MemoryStats {
        let state = self.inner.state.read().await;
        MemoryStats {
            rooms: state.rooms.len(),
            rows: state.tables.values().map(Vec::len).sum(),
            watched_rooms: self.inner.push.room_count().await,
        }
    }

    /// Typed view of one collection.
    pub fn table<T: Record>(&self) -> MemoryTable<T> {
        MemoryTable {
            backend: self.clone(),
            _entry: PhantomData,
        }
    }
}

/// Forward `T`'s pushes from a room receiver into a subscription channel
/// until either side goes away.
pub(crate) async fn forward_pushes<T: Record>(
    group: Arc<BroadcastGroup>,
    mut rx: broadcast::Receiver<Arc<Push>>,
    tx: mpsc::UnboundedSender<PushEvent<T>>,
) {
    loop {
        match rx.recv().await {
            Ok(push) => {
                let Some(event) = Push::clone(&push).into_event::<T>() else {
                    continue;
                };
                if tx.send(event).is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                log::warn!("{}: subscriber lagged, {skipped} pushes lost", T::KIND);
                group.record_dropped(skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[async_trait]
impl RoomDirectory for MemoryBackend {
    async fn find_by_code(&self, code: &RoomCode) -> Result<Option<Room>, RemoteError> {
        self.find_room(code).await
    }

    async fn create(&self, code: &RoomCode) -> Result<Room, RemoteError> {
        self.create_room(code).await
    }
}

/// [`RemoteCollection`] over one table of a [`MemoryBackend`].
pub struct MemoryTable<T> {
    backend: MemoryBackend,
    _entry: PhantomData<fn() -> T>,
}

#[async_trait]
impl<T: Record> RemoteCollection<T> for MemoryTable<T> {
    async fn fetch_all(&self, room: RoomId) -> Result<Vec<T>, RemoteError> {
        self.backend
            .fetch_rows(T::KIND, room)
            .await?
            .into_iter()
            .map(expect_row::<T>)
            .collect()
    }

    async fn insert(&self, room: RoomId, value: String) -> Result<T, RemoteError> {
        expect_row(self.backend.insert_row(T::KIND, room, value).await?)
    }

    async fn delete_all(&self, room: RoomId) -> Result<(), RemoteError> {
        self.backend.delete_rows(T::KIND, room).await.map(|_| ())
    }

    async fn subscribe(&self, room: RoomId) -> Result<Subscription<T>, RemoteError> {
        let (group, rx) = self.backend.watch(room).await?;
        let (tx, events) = mpsc::unbounded_channel();
        let task = tokio::spawn(forward_pushes::<T>(group, rx, tx));
        log::debug!("{}: subscribed to room {room}", T::KIND);
        Ok(Subscription::new(events, move || task.abort()))
    }
}

impl Backend {
    /// Clients of one shared in-process store.
    pub fn in_process(store: &MemoryBackend) -> Self {
        Backend::new(
            Arc::new(store.clone()),
            Arc::new(store.table::<WordEntry>()),
            Arc::new(store.table::<CallEntry>()),
            BackendMode::InProcess,
        )
    }
}
