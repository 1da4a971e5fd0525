//! Remote-collection interface consumed by the sync core.
//!
//! A backend provides one [`RoomDirectory`] and one [`RemoteCollection`] per
//! entry kind. [`Backend`] bundles them so the controller is built against a
//! single capability object and never branches on which store it talks to.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

use bingo_core::{CallEntry, Entry, EntryId, Room, RoomCode, RoomId, WordEntry};

/// Any failed backend call. Variants only differ in their message; callers
/// treat them all the same way.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoteError {
    #[error("Connection failed: {0}")]
    Connection(String),
    #[error("Request rejected: {0}")]
    Rejected(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("Request timed out")]
    Timeout,
    #[error("Connection closed")]
    Closed,
}

/// An insert or delete performed by any client, delivered unsolicited.
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent<T> {
    Insert(T),
    Delete(EntryId),
}

/// Releases a remote subscription when dropped.
pub struct SubscriptionGuard {
    on_release: Option<Box<dyn FnOnce() + Send>>,
}

impl SubscriptionGuard {
    pub fn new(on_release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            on_release: Some(Box::new(on_release)),
        }
    }

    fn noop() -> Self {
        Self { on_release: None }
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        if let Some(release) = self.on_release.take() {
            release();
        }
    }
}

impl fmt::Debug for SubscriptionGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionGuard")
            .field("armed", &self.on_release.is_some())
            .finish()
    }
}

/// Live push feed for one room and one collection.
///
/// Dropping the subscription releases it; `unsubscribe` does the same
/// explicitly.
#[derive(Debug)]
pub struct Subscription<T> {
    events: mpsc::UnboundedReceiver<PushEvent<T>>,
    guard: SubscriptionGuard,
}

impl<T> Subscription<T> {
    pub fn new(
        events: mpsc::UnboundedReceiver<PushEvent<T>>,
        on_release: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            events,
            guard: SubscriptionGuard::new(on_release),
        }
    }

    /// A feed that ends immediately. Used where no other writers exist.
    pub fn closed() -> Self {
        let (_tx, events) = mpsc::unbounded_channel();
        Self {
            events,
            guard: SubscriptionGuard::noop(),
        }
    }

    /// Next event, or `None` once the feed has ended.
    pub async fn next(&mut self) -> Option<PushEvent<T>> {
        self.events.recv().await
    }

    /// Next already-buffered event, without waiting.
    pub fn try_next(&mut self) -> Option<PushEvent<T>> {
        self.events.try_recv().ok()
    }

    /// Separate the event stream from the release handle, so one task can
    /// drain events while another decides when to let go.
    pub fn split(self) -> (mpsc::UnboundedReceiver<PushEvent<T>>, SubscriptionGuard) {
        (self.events, self.guard)
    }

    pub fn unsubscribe(self) {
        drop(self);
    }
}

/// Per-collection store operations.
#[async_trait]
pub trait RemoteCollection<T: Entry>: Send + Sync {
    /// All entries of `room`, oldest first.
    async fn fetch_all(&self, room: RoomId) -> Result<Vec<T>, RemoteError>;

    /// Store a new entry and return it with its permanent id and timestamp.
    async fn insert(&self, room: RoomId, value: String) -> Result<T, RemoteError>;

    async fn delete_all(&self, room: RoomId) -> Result<(), RemoteError>;

    async fn subscribe(&self, room: RoomId) -> Result<Subscription<T>, RemoteError>;
}

/// Room lookup and lazy creation.
#[async_trait]
pub trait RoomDirectory: Send + Sync {
    async fn find_by_code(&self, code: &RoomCode) -> Result<Option<Room>, RemoteError>;

    async fn create(&self, code: &RoomCode) -> Result<Room, RemoteError>;

    /// Find the room for `code`, creating it on first access.
    async fn resolve(&self, code: &RoomCode) -> Result<Room, RemoteError> {
        match self.find_by_code(code).await? {
            Some(room) => Ok(room),
            None => {
                log::info!("Room '{code}' not found, creating it");
                self.create(code).await
            }
        }
    }
}

/// Which kind of store a [`Backend`] talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendMode {
    /// Single client, no push feed.
    Local,
    /// Shared store in this process.
    InProcess,
    /// Shared store over the network.
    Remote,
}

/// The capabilities a controller is constructed with.
#[derive(Clone)]
pub struct Backend {
    pub rooms: Arc<dyn RoomDirectory>,
    pub words: Arc<dyn RemoteCollection<WordEntry>>,
    pub calls: Arc<dyn RemoteCollection<CallEntry>>,
    pub mode: BackendMode,
}

impl Backend {
    pub fn new(
        rooms: Arc<dyn RoomDirectory>,
        words: Arc<dyn RemoteCollection<WordEntry>>,
        calls: Arc<dyn RemoteCollection<CallEntry>>,
        mode: BackendMode,
    ) -> Self {
        Self {
            rooms,
            words,
            calls,
            mode,
        }
    }

    /// Whether other clients' writes can ever arrive.
    pub fn has_push(&self) -> bool {
        self.mode != BackendMode::Local
    }
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backend").field("mode", &self.mode).finish()
    }
}
