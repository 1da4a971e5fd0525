//! Entries of the two append/delete-only collections: the word pool and the
//! call log.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;
use thiserror::Error;
use uuid::Uuid;

use crate::room::RoomId;

/// Reserved token occupying the center cell of every board.
pub const FREE: &str = "FREE";

static NEXT_TEMPORARY_ID: AtomicU64 = AtomicU64::new(1);

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Entry identifier.
///
/// `Temporary` ids are allocated locally for optimistic writes and are unique
/// per call within the process. `Permanent` ids are assigned by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryId {
    Temporary(u64),
    Permanent(Uuid),
}

impl EntryId {
    /// Allocate a fresh temporary id.
    pub fn temporary() -> Self {
        Self::Temporary(NEXT_TEMPORARY_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Allocate a fresh permanent id (store side).
    pub fn permanent() -> Self {
        Self::Permanent(Uuid::new_v4())
    }

    pub fn is_temporary(&self) -> bool {
        matches!(self, Self::Temporary(_))
    }

    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent(_))
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Temporary(n) => write!(f, "tmp_{n}"),
            Self::Permanent(id) => write!(f, "{id}"),
        }
    }
}

/// Which collection an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    Word,
    Call,
}

impl EntryKind {
    /// Collection name used for storage keys and log messages.
    pub fn collection(&self) -> &'static str {
        match self {
            Self::Word => "words",
            Self::Call => "calls",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.collection())
    }
}

/// Common shape of a collection entry: an id, the owning room, one string
/// payload and a creation timestamp.
pub trait Entry: Clone + fmt::Debug + PartialEq + Send + Sync + 'static {
    const KIND: EntryKind;

    fn new(id: EntryId, room_id: RoomId, value: String, created_at: u64) -> Self;
    fn id(&self) -> EntryId;
    fn room_id(&self) -> RoomId;
    fn value(&self) -> &str;
    fn created_at(&self) -> u64;
}

/// A word in a room's pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordEntry {
    pub id: EntryId,
    pub room_id: RoomId,
    pub text: String,
    pub created_at: u64,
}

impl Entry for WordEntry {
    const KIND: EntryKind = EntryKind::Word;

    fn new(id: EntryId, room_id: RoomId, value: String, created_at: u64) -> Self {
        Self {
            id,
            room_id,
            text: value,
            created_at,
        }
    }

    fn id(&self) -> EntryId {
        self.id
    }

    fn room_id(&self) -> RoomId {
        self.room_id
    }

    fn value(&self) -> &str {
        &self.text
    }

    fn created_at(&self) -> u64 {
        self.created_at
    }
}

/// A "drawn" word in a room's call log.
///
/// `word` is expected to name a pool word but is not validated against the
/// pool; calling an unpooled word simply marks nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallEntry {
    pub id: EntryId,
    pub room_id: RoomId,
    pub word: String,
    pub created_at: u64,
}

impl Entry for CallEntry {
    const KIND: EntryKind = EntryKind::Call;

    fn new(id: EntryId, room_id: RoomId, value: String, created_at: u64) -> Self {
        Self {
            id,
            room_id,
            word: value,
            created_at,
        }
    }

    fn id(&self) -> EntryId {
        self.id
    }

    fn room_id(&self) -> RoomId {
        self.room_id
    }

    fn value(&self) -> &str {
        &self.word
    }

    fn created_at(&self) -> u64 {
        self.created_at
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WordError {
    #[error("Word is empty")]
    Empty,
    #[error("\"FREE\" is reserved for the center cell")]
    Reserved,
}

/// Case-insensitive check against the reserved center token.
pub fn is_reserved(word: &str) -> bool {
    word.to_uppercase() == FREE
}

/// Trim a candidate pool word and reject empty or reserved text.
/// Case is preserved.
pub fn normalize_word(input: &str) -> Result<String, WordError> {
    let word = input.trim();
    if word.is_empty() {
        return Err(WordError::Empty);
    }
    if is_reserved(word) {
        return Err(WordError::Reserved);
    }
    Ok(word.to_string())
}
