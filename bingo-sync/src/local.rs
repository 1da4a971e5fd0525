//! Single-client backend emulated on a [`KeyValueStore`].
//!
//! Layout (values are JSON):
//! - `room:<code>`: the [`Room`] record
//! - `words:<room-id>`: `Vec<WordEntry>`, oldest first
//! - `calls:<room-id>`: `Vec<CallEntry>`, oldest first
//!
//! Writes succeed as soon as the store accepts them and no push feed exists.
//! Values are unique per collection: repeating a call (or a word) returns the
//! stored entry, which the collection then merges away.

use async_trait::async_trait;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard};

use bingo_core::{now_millis, CallEntry, Entry, EntryId, Room, RoomCode, RoomId, WordEntry};

use crate::protocol::Record;
use crate::remote::{Backend, BackendMode, RemoteCollection, RemoteError, RoomDirectory, Subscription};
use crate::storage::{KeyValueStore, KeyValueStoreExt, StoreError};

impl From<StoreError> for RemoteError {
    fn from(e: StoreError) -> Self {
        RemoteError::Storage(e.to_string())
    }
}

fn room_key(code: &RoomCode) -> String {
    format!("room:{code}")
}

fn collection_key<T: Record>(room: RoomId) -> String {
    format!("{}:{room}", T::KIND.collection())
}

/// Room directory over the key-value store.
pub struct LocalRooms {
    store: Arc<dyn KeyValueStore>,
}

impl LocalRooms {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl RoomDirectory for LocalRooms {
    async fn find_by_code(&self, code: &RoomCode) -> Result<Option<Room>, RemoteError> {
        Ok(self.store.get_or(&room_key(code), None)?)
    }

    async fn create(&self, code: &RoomCode) -> Result<Room, RemoteError> {
        let room = Room::new(code.clone());
        self.store.put(&room_key(code), &room)?;
        log::info!("Created local room '{code}' ({})", room.id);
        Ok(room)
    }
}

/// One collection stored as a single JSON array per room.
pub struct LocalTable<T> {
    store: Arc<dyn KeyValueStore>,
    /// Serializes read-modify-write cycles on the array.
    write_lock: Mutex<()>,
    _entry: PhantomData<fn() -> T>,
}

impl<T: Record> LocalTable<T> {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
            _entry: PhantomData,
        }
    }

    fn load(&self, room: RoomId) -> Result<Vec<T>, StoreError> {
        self.store.get_or(&collection_key::<T>(room), Vec::new())
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>, RemoteError> {
        self.write_lock
            .lock()
            .map_err(|_| RemoteError::Storage("lock poisoned".into()))
    }

    /// A value already stored in the room is returned as-is instead of
    /// being written twice.
    fn append(&self, room: RoomId, value: String) -> Result<T, RemoteError> {
        let _guard = self.lock()?;
        let mut entries = self.load(room)?;
        if let Some(existing) = entries.iter().find(|e| e.value() == value) {
            log::debug!("{}: '{value}' already stored locally", T::KIND.collection());
            return Ok(existing.clone());
        }
        let entry = T::new(EntryId::permanent(), room, value, now_millis());
        entries.push(entry.clone());
        self.store.put(&collection_key::<T>(room), &entries)?;
        Ok(entry)
    }

    fn clear(&self, room: RoomId) -> Result<(), RemoteError> {
        let _guard = self.lock()?;
        self.store.remove(&collection_key::<T>(room))?;
        Ok(())
    }
}

#[async_trait]
impl<T: Record> RemoteCollection<T> for LocalTable<T> {
    async fn fetch_all(&self, room: RoomId) -> Result<Vec<T>, RemoteError> {
        Ok(self.load(room)?)
    }

    async fn insert(&self, room: RoomId, value: String) -> Result<T, RemoteError> {
        self.append(room, value)
    }

    async fn delete_all(&self, room: RoomId) -> Result<(), RemoteError> {
        self.clear(room)
    }

    async fn subscribe(&self, _room: RoomId) -> Result<Subscription<T>, RemoteError> {
        Ok(Subscription::closed())
    }
}

impl Backend {
    /// Single-client mode persisted in `store`.
    pub fn local(store: Arc<dyn KeyValueStore>) -> Self {
        Backend::new(
            Arc::new(LocalRooms::new(store.clone())),
            Arc::new(LocalTable::<WordEntry>::new(store.clone())),
            Arc::new(LocalTable::<CallEntry>::new(store)),
            BackendMode::Local,
        )
    }
}
