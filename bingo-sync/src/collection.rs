//! Optimistic writes reconciled against a push feed.
//!
//! Each local entry carries an explicit write status:
//!
//! ```text
//!   begin_append ──► Pending(tmp id) ──confirm──► Confirmed(permanent id)
//!                          │
//!                          └──fail──► removed
//! ```
//!
//! A [`PendingWrite`] ticket is produced for every optimistic append and
//! consumed by exactly one of [`ReconciledCollection::confirm`] or
//! [`ReconciledCollection::fail`]. The push for the same write may arrive
//! before or after the direct response; either way the collection ends with
//! a single entry keyed by the permanent id.
//!
//! The collection is bound to one room at a time. Rebinding bumps an epoch so
//! tickets issued for an earlier room are ignored when they settle.

use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

use bingo_core::{Entry, EntryId, RoomId};

use crate::remote::{PushEvent, RemoteCollection, RemoteError, Subscription};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    Pending,
    Confirmed,
}

#[derive(Debug, Clone)]
struct Tracked<T> {
    entry: T,
    status: WriteStatus,
}

impl<T> Tracked<T> {
    fn pending(entry: T) -> Self {
        Self {
            entry,
            status: WriteStatus::Pending,
        }
    }

    fn confirmed(entry: T) -> Self {
        Self {
            entry,
            status: WriteStatus::Confirmed,
        }
    }
}

#[derive(Debug)]
struct CollectionState<T> {
    room: Option<RoomId>,
    epoch: u64,
    entries: Vec<Tracked<T>>,
    /// Bumped on every visible change, never reset.
    version: u64,
}

impl<T: Entry> CollectionState<T> {
    fn position(&self, id: EntryId) -> Option<usize> {
        self.entries.iter().position(|t| t.entry.id() == id)
    }

    fn touch(&mut self) {
        self.version += 1;
    }
}

/// Ticket for one in-flight optimistic append.
#[must_use = "a pending write must be confirmed or failed"]
#[derive(Debug)]
pub struct PendingWrite {
    temp_id: EntryId,
    room: RoomId,
    epoch: u64,
}

impl PendingWrite {
    pub fn temp_id(&self) -> EntryId {
        self.temp_id
    }

    pub fn room(&self) -> RoomId {
        self.room
    }
}

/// How a confirmed write was merged into the local sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    /// Temporary entry replaced in place.
    Replaced,
    /// The push for this write was already applied; temporary entry dropped.
    Merged,
    /// Temporary entry was gone (cleared meanwhile); permanent entry appended.
    Appended,
    /// The collection was rebound since the write began.
    Stale,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AppendOutcome<T> {
    Committed { entry: T, reconciled: Reconciled },
    /// The reject predicate matched an existing entry.
    Rejected,
    /// No room is bound.
    Unbound,
    /// The remote insert failed and the optimistic entry was rolled back.
    Failed(RemoteError),
}

impl<T> AppendOutcome<T> {
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed { .. })
    }
}

enum Begin {
    Started(PendingWrite),
    Rejected,
    Unbound,
}

/// One ordered, append/delete-only collection synchronized with a remote.
pub struct ReconciledCollection<T: Entry> {
    remote: Arc<dyn RemoteCollection<T>>,
    state: Arc<RwLock<CollectionState<T>>>,
}

impl<T: Entry> Clone for ReconciledCollection<T> {
    fn clone(&self) -> Self {
        Self {
            remote: self.remote.clone(),
            state: self.state.clone(),
        }
    }
}

impl<T: Entry> fmt::Debug for ReconciledCollection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReconciledCollection")
            .field("name", &self.name())
            .finish()
    }
}

impl<T: Entry> ReconciledCollection<T> {
    pub fn new(remote: Arc<dyn RemoteCollection<T>>) -> Self {
        Self {
            remote,
            state: Arc::new(RwLock::new(CollectionState {
                room: None,
                epoch: 0,
                entries: Vec::new(),
                version: 0,
            })),
        }
    }

    pub fn name(&self) -> &'static str {
        T::KIND.collection()
    }

    // ── Room binding ────────────────────────────────────────────

    /// Fetch the initial snapshot for `room` without binding it.
    pub async fn fetch(&self, room: RoomId) -> Result<Vec<T>, RemoteError> {
        self.remote.fetch_all(room).await.map_err(|e| {
            log::warn!("{}: fetch_all failed for room {room}: {e}", self.name());
            e
        })
    }

    /// Open the push feed for `room`.
    pub async fn subscribe(&self, room: RoomId) -> Result<Subscription<T>, RemoteError> {
        self.remote.subscribe(room).await.map_err(|e| {
            log::warn!("{}: subscribe failed for room {room}: {e}", self.name());
            e
        })
    }

    /// Replace the local sequence with `entries` (oldest first) for `room`.
    pub async fn bind(&self, room: RoomId, entries: Vec<T>) {
        let mut state = self.state.write().await;
        state.room = Some(room);
        state.epoch += 1;
        state.entries = entries.into_iter().map(Tracked::confirmed).collect();
        state.touch();
        log::debug!(
            "{}: bound to room {room} with {} entries",
            self.name(),
            state.entries.len()
        );
    }

    /// Fetch and bind in one step.
    pub async fn load(&self, room: RoomId) -> Result<(), RemoteError> {
        let entries = self.fetch(room).await?;
        self.bind(room, entries).await;
        Ok(())
    }

    pub async fn unbind(&self) {
        let mut state = self.state.write().await;
        if state.room.is_none() && state.entries.is_empty() {
            return;
        }
        state.room = None;
        state.epoch += 1;
        state.entries.clear();
        state.touch();
    }

    pub async fn room(&self) -> Option<RoomId> {
        self.state.read().await.room
    }

    // ── Optimistic append ───────────────────────────────────────

    async fn begin<F>(&self, value: String, reject: F) -> Begin
    where
        F: Fn(&T) -> bool,
    {
        let mut state = self.state.write().await;
        let Some(room) = state.room else {
            return Begin::Unbound;
        };
        if state.entries.iter().any(|t| reject(&t.entry)) {
            return Begin::Rejected;
        }

        let temp_id = EntryId::temporary();
        let created_at = bingo_core::now_millis();
        state
            .entries
            .push(Tracked::pending(T::new(temp_id, room, value, created_at)));
        state.touch();

        Begin::Started(PendingWrite {
            temp_id,
            room,
            epoch: state.epoch,
        })
    }

    /// Add a temporary entry for `value`. `None` when no room is bound.
    pub async fn begin_append(&self, value: String) -> Option<PendingWrite> {
        match self.begin(value, |_| false).await {
            Begin::Started(pending) => Some(pending),
            Begin::Rejected | Begin::Unbound => None,
        }
    }

    /// Settle a pending write with the stored entry.
    pub async fn confirm(&self, pending: PendingWrite, permanent: T) -> Reconciled {
        let mut state = self.state.write().await;
        if state.epoch != pending.epoch {
            log::debug!(
                "{}: dropping confirmation of {} for superseded room {}",
                self.name(),
                pending.temp_id,
                pending.room
            );
            return Reconciled::Stale;
        }

        let temp_pos = state.position(pending.temp_id);
        let already_present = state.position(permanent.id()).is_some();

        let reconciled = match (temp_pos, already_present) {
            (Some(pos), false) => {
                state.entries[pos] = Tracked::confirmed(permanent);
                Reconciled::Replaced
            }
            (Some(pos), true) => {
                state.entries.remove(pos);
                Reconciled::Merged
            }
            (None, true) => Reconciled::Merged,
            (None, false) => {
                state.entries.push(Tracked::confirmed(permanent));
                Reconciled::Appended
            }
        };
        state.touch();

        log::trace!("{}: {} settled as {reconciled:?}", self.name(), pending.temp_id);
        reconciled
    }

    /// Roll back a pending write. Returns whether the temporary entry was
    /// still present.
    pub async fn fail(&self, pending: PendingWrite) -> bool {
        let mut state = self.state.write().await;
        if state.epoch != pending.epoch {
            return false;
        }
        match state.position(pending.temp_id) {
            Some(pos) => {
                state.entries.remove(pos);
                state.touch();
                true
            }
            None => false,
        }
    }

    pub async fn append(&self, value: String) -> AppendOutcome<T> {
        self.append_unless(value, |_| false).await
    }

    /// Optimistically append `value` unless `reject` matches an entry already
    /// in the collection. The check and the local insert are atomic.
    pub async fn append_unless<F>(&self, value: String, reject: F) -> AppendOutcome<T>
    where
        F: Fn(&T) -> bool + Send,
    {
        let pending = match self.begin(value.clone(), reject).await {
            Begin::Started(pending) => pending,
            Begin::Rejected => return AppendOutcome::Rejected,
            Begin::Unbound => return AppendOutcome::Unbound,
        };

        match self.remote.insert(pending.room, value).await {
            Ok(entry) => {
                let reconciled = self.confirm(pending, entry.clone()).await;
                AppendOutcome::Committed { entry, reconciled }
            }
            Err(e) => {
                log::warn!("{}: insert failed, rolling back: {e}", self.name());
                self.fail(pending).await;
                AppendOutcome::Failed(e)
            }
        }
    }

    // ── Push feed ───────────────────────────────────────────────

    /// Apply one push event. Returns whether the local sequence changed.
    pub async fn receive_push(&self, event: PushEvent<T>) -> bool {
        match event {
            PushEvent::Insert(entry) => self.receive_push_insert(entry).await,
            PushEvent::Delete(id) => self.receive_push_delete(id).await,
        }
    }

    pub async fn receive_push_insert(&self, entry: T) -> bool {
        let mut state = self.state.write().await;
        if state.room != Some(entry.room_id()) {
            log::trace!("{}: ignoring push for room {}", self.name(), entry.room_id());
            return false;
        }
        if state.position(entry.id()).is_some() {
            return false;
        }
        state.entries.push(Tracked::confirmed(entry));
        state.touch();
        true
    }

    pub async fn receive_push_delete(&self, id: EntryId) -> bool {
        let mut state = self.state.write().await;
        match state.position(id) {
            Some(pos) => {
                state.entries.remove(pos);
                state.touch();
                true
            }
            None => false,
        }
    }

    // ── Bulk delete ─────────────────────────────────────────────

    /// Delete every entry of the bound room. On success the local sequence
    /// is emptied right away; on failure it is left untouched. Returns the
    /// number of local entries removed.
    pub async fn clear_all(&self) -> Result<usize, RemoteError> {
        let Some(room) = self.room().await else {
            return Ok(0);
        };

        if let Err(e) = self.remote.delete_all(room).await {
            log::warn!("{}: delete_all failed for room {room}: {e}", self.name());
            return Err(e);
        }

        let mut state = self.state.write().await;
        if state.room != Some(room) {
            return Ok(0);
        }
        let removed = state.entries.len();
        state.entries.clear();
        state.touch();
        log::debug!("{}: cleared {removed} entries", self.name());
        Ok(removed)
    }

    // ── Reads ───────────────────────────────────────────────────

    pub async fn snapshot(&self) -> Vec<T> {
        let state = self.state.read().await;
        state.entries.iter().map(|t| t.entry.clone()).collect()
    }

    /// Payload strings in local order.
    pub async fn values(&self) -> Vec<String> {
        let state = self.state.read().await;
        state
            .entries
            .iter()
            .map(|t| t.entry.value().to_string())
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.entries.is_empty()
    }

    pub async fn version(&self) -> u64 {
        self.state.read().await.version
    }

    pub async fn pending_count(&self) -> usize {
        let state = self.state.read().await;
        state
            .entries
            .iter()
            .filter(|t| t.status == WriteStatus::Pending)
            .count()
    }

    pub async fn status_of(&self, id: EntryId) -> Option<WriteStatus> {
        let state = self.state.read().await;
        state.position(id).map(|pos| state.entries[pos].status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bingo_core::WordEntry;
    use std::sync::Mutex;

    /// Stores entries in a Vec; inserts fail while `fail_next` is set.
    #[derive(Default)]
    struct VecRemote {
        rows: Mutex<Vec<WordEntry>>,
        fail_next: Mutex<bool>,
    }

    #[async_trait]
    impl RemoteCollection<WordEntry> for VecRemote {
        async fn fetch_all(&self, room: RoomId) -> Result<Vec<WordEntry>, RemoteError> {
            let rows = self.rows.lock().unwrap();
            Ok(rows.iter().filter(|r| r.room_id == room).cloned().collect())
        }

        async fn insert(&self, room: RoomId, value: String) -> Result<WordEntry, RemoteError> {
            if std::mem::take(&mut *self.fail_next.lock().unwrap()) {
                return Err(RemoteError::Connection("refused".into()));
            }
            let entry = WordEntry::new(EntryId::permanent(), room, value, bingo_core::now_millis());
            self.rows.lock().unwrap().push(entry.clone());
            Ok(entry)
        }

        async fn delete_all(&self, room: RoomId) -> Result<(), RemoteError> {
            if std::mem::take(&mut *self.fail_next.lock().unwrap()) {
                return Err(RemoteError::Timeout);
            }
            self.rows.lock().unwrap().retain(|r| r.room_id != room);
            Ok(())
        }

        async fn subscribe(&self, _room: RoomId) -> Result<Subscription<WordEntry>, RemoteError> {
            Ok(Subscription::closed())
        }
    }

    async fn bound() -> (ReconciledCollection<WordEntry>, Arc<VecRemote>, RoomId) {
        let remote = Arc::new(VecRemote::default());
        let collection = ReconciledCollection::new(remote.clone());
        let room = RoomId::new();
        collection.bind(room, Vec::new()).await;
        (collection, remote, room)
    }

    fn ids(entries: &[WordEntry]) -> Vec<EntryId> {
        entries.iter().map(|e| e.id).collect()
    }

    #[tokio::test]
    async fn test_append_replaces_temporary() {
        let (words, _, _) = bound().await;
        let (entry, reconciled) = match words.append("CAT".into()).await {
            AppendOutcome::Committed { entry, reconciled } => (entry, reconciled),
            other => panic!("expected commit, got {other:?}"),
        };
        assert_eq!(reconciled, Reconciled::Replaced);
        assert!(entry.id.is_permanent());
        assert_eq!(words.snapshot().await, vec![entry]);
        assert_eq!(words.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_begin_append_is_visible_before_confirm() {
        let (words, _, room) = bound().await;
        let pending = words.begin_append("DOG".into()).await.unwrap();

        let snapshot = words.snapshot().await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id, pending.temp_id());
        assert_eq!(words.status_of(pending.temp_id()).await, Some(WriteStatus::Pending));

        let permanent = WordEntry::new(EntryId::permanent(), room, "DOG".into(), 1);
        assert_eq!(words.confirm(pending, permanent.clone()).await, Reconciled::Replaced);
        assert_eq!(words.status_of(permanent.id).await, Some(WriteStatus::Confirmed));
    }

    #[tokio::test]
    async fn test_failed_append_rolls_back() {
        let (words, remote, _) = bound().await;
        words.append("A".into()).await;
        let before = ids(&words.snapshot().await);

        *remote.fail_next.lock().unwrap() = true;
        let outcome = words.append("B".into()).await;
        assert!(matches!(outcome, AppendOutcome::Failed(RemoteError::Connection(_))));
        assert_eq!(ids(&words.snapshot().await), before);
    }

    #[tokio::test]
    async fn test_append_unless_rejects_duplicate() {
        let (words, _, _) = bound().await;
        words.append("CAT".into()).await;
        let outcome = words
            .append_unless("CAT".into(), |e: &WordEntry| e.text == "CAT")
            .await;
        assert_eq!(outcome, AppendOutcome::Rejected);
        assert_eq!(words.len().await, 1);
    }

    #[tokio::test]
    async fn test_append_unbound() {
        let words = ReconciledCollection::<WordEntry>::new(Arc::new(VecRemote::default()));
        assert_eq!(words.append("X".into()).await, AppendOutcome::Unbound);
        assert!(words.begin_append("X".into()).await.is_none());
    }

    #[tokio::test]
    async fn test_push_insert_dedupes() {
        let (words, _, room) = bound().await;
        let entry = WordEntry::new(EntryId::permanent(), room, "BIRD".into(), 5);
        assert!(words.receive_push_insert(entry.clone()).await);
        assert!(!words.receive_push_insert(entry.clone()).await);
        assert_eq!(words.snapshot().await, vec![entry]);
    }

    #[tokio::test]
    async fn test_push_for_other_room_ignored() {
        let (words, _, _) = bound().await;
        let stray = WordEntry::new(EntryId::permanent(), RoomId::new(), "X".into(), 5);
        assert!(!words.receive_push_insert(stray).await);
        assert!(words.is_empty().await);
    }

    #[tokio::test]
    async fn test_push_delete() {
        let (words, _, room) = bound().await;
        let entry = WordEntry::new(EntryId::permanent(), room, "BIRD".into(), 5);
        words.receive_push_insert(entry.clone()).await;
        assert!(words.receive_push(PushEvent::Delete(entry.id)).await);
        assert!(!words.receive_push(PushEvent::Delete(entry.id)).await);
        assert!(words.is_empty().await);
    }

    #[tokio::test]
    async fn test_confirm_after_rebind_is_stale() {
        let (words, _, room) = bound().await;
        let pending = words.begin_append("OLD".into()).await.unwrap();

        let next = RoomId::new();
        words.bind(next, Vec::new()).await;

        let permanent = WordEntry::new(EntryId::permanent(), room, "OLD".into(), 1);
        assert_eq!(words.confirm(pending, permanent).await, Reconciled::Stale);
        assert!(words.is_empty().await);
    }

    #[tokio::test]
    async fn test_confirm_after_clear_appends() {
        let (words, _, room) = bound().await;
        let pending = words.begin_append("LATE".into()).await.unwrap();
        words.clear_all().await.unwrap();
        assert!(words.is_empty().await);

        let permanent = WordEntry::new(EntryId::permanent(), room, "LATE".into(), 1);
        assert_eq!(words.confirm(pending, permanent.clone()).await, Reconciled::Appended);
        assert_eq!(words.snapshot().await, vec![permanent]);
    }

    #[tokio::test]
    async fn test_clear_all_failure_keeps_entries() {
        let (words, remote, _) = bound().await;
        words.append("A".into()).await;
        words.append("B".into()).await;

        *remote.fail_next.lock().unwrap() = true;
        assert_eq!(words.clear_all().await, Err(RemoteError::Timeout));
        assert_eq!(words.values().await, vec!["A", "B"]);

        assert_eq!(words.clear_all().await, Ok(2));
        assert!(words.is_empty().await);
    }

    #[tokio::test]
    async fn test_load_and_version() {
        let (words, remote, room) = bound().await;
        words.append("A".into()).await;

        let reloaded = ReconciledCollection::new(remote.clone());
        let v0 = reloaded.version().await;
        reloaded.load(room).await.unwrap();
        assert!(reloaded.version().await > v0);
        assert_eq!(reloaded.values().await, vec!["A"]);

        reloaded.unbind().await;
        assert!(reloaded.room().await.is_none());
        assert!(reloaded.is_empty().await);
    }
}
