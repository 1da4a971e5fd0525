//! Binary wire protocol between [`StoreClient`](crate::client::StoreClient)
//! and [`StoreServer`](crate::server::StoreServer).
//!
//! Every WebSocket binary message carries one bincode-encoded frame:
//!
//! ```text
//! client ──► ClientFrame { request_id, request }
//! server ──► ServerFrame::Reply { request_id, result }    (one per request)
//!        ──► ServerFrame::Push  { subscription, push }    (unsolicited)
//! ```
//!
//! Subscription ids are chosen by the client, so pushes can be routed
//! before the `Subscribe` reply has been read.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use bingo_core::{CallEntry, Entry, EntryId, EntryKind, Room, RoomCode, RoomId, WordEntry};

use crate::remote::{PushEvent, RemoteError};

/// A stored entry of either collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Row {
    Word(WordEntry),
    Call(CallEntry),
}

impl Row {
    pub fn build(
        kind: EntryKind,
        id: EntryId,
        room_id: RoomId,
        value: String,
        created_at: u64,
    ) -> Self {
        match kind {
            EntryKind::Word => Row::Word(WordEntry::new(id, room_id, value, created_at)),
            EntryKind::Call => Row::Call(CallEntry::new(id, room_id, value, created_at)),
        }
    }

    pub fn kind(&self) -> EntryKind {
        match self {
            Row::Word(_) => EntryKind::Word,
            Row::Call(_) => EntryKind::Call,
        }
    }

    pub fn id(&self) -> EntryId {
        match self {
            Row::Word(e) => e.id,
            Row::Call(e) => e.id,
        }
    }

    pub fn room_id(&self) -> RoomId {
        match self {
            Row::Word(e) => e.room_id,
            Row::Call(e) => e.room_id,
        }
    }
}

impl From<WordEntry> for Row {
    fn from(entry: WordEntry) -> Self {
        Row::Word(entry)
    }
}

impl From<CallEntry> for Row {
    fn from(entry: CallEntry) -> Self {
        Row::Call(entry)
    }
}

impl TryFrom<Row> for WordEntry {
    type Error = Row;

    fn try_from(row: Row) -> Result<Self, Row> {
        match row {
            Row::Word(entry) => Ok(entry),
            other => Err(other),
        }
    }
}

impl TryFrom<Row> for CallEntry {
    type Error = Row;

    fn try_from(row: Row) -> Result<Self, Row> {
        match row {
            Row::Call(entry) => Ok(entry),
            other => Err(other),
        }
    }
}

/// An entry type that can travel as a [`Row`] and be persisted as JSON.
pub trait Record:
    Entry + Serialize + DeserializeOwned + Into<Row> + TryFrom<Row, Error = Row>
{
}

impl<T> Record for T where
    T: Entry + Serialize + DeserializeOwned + Into<Row> + TryFrom<Row, Error = Row>
{
}

/// Narrow a row to `T`, treating a kind mismatch as a protocol violation.
pub fn expect_row<T: Record>(row: Row) -> Result<T, RemoteError> {
    T::try_from(row).map_err(|other| {
        RemoteError::Protocol(format!("expected {} row, got {}", T::KIND, other.kind()))
    })
}

/// A change to one room's collection, fanned out to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Push {
    Insert(Row),
    Delete {
        kind: EntryKind,
        room_id: RoomId,
        id: EntryId,
    },
}

impl Push {
    pub fn kind(&self) -> EntryKind {
        match self {
            Push::Insert(row) => row.kind(),
            Push::Delete { kind, .. } => *kind,
        }
    }

    pub fn room_id(&self) -> RoomId {
        match self {
            Push::Insert(row) => row.room_id(),
            Push::Delete { room_id, .. } => *room_id,
        }
    }

    /// Typed event for `T`'s collection; `None` for the other collection.
    pub fn into_event<T: Record>(self) -> Option<PushEvent<T>> {
        if self.kind() != T::KIND {
            return None;
        }
        match self {
            Push::Insert(row) => T::try_from(row).ok().map(PushEvent::Insert),
            Push::Delete { id, .. } => Some(PushEvent::Delete(id)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Request {
    FindRoom {
        code: RoomCode,
    },
    CreateRoom {
        code: RoomCode,
    },
    FetchAll {
        kind: EntryKind,
        room_id: RoomId,
    },
    Insert {
        kind: EntryKind,
        room_id: RoomId,
        value: String,
    },
    DeleteAll {
        kind: EntryKind,
        room_id: RoomId,
    },
    Subscribe {
        subscription: u64,
        kind: EntryKind,
        room_id: RoomId,
    },
    Unsubscribe {
        subscription: u64,
    },
    Ping,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Response {
    Room(Option<Room>),
    Rows(Vec<Row>),
    Inserted(Row),
    Deleted(usize),
    Subscribed,
    Unsubscribed,
    Pong,
}

impl Response {
    pub fn variant_name(&self) -> &'static str {
        match self {
            Response::Room(_) => "Room",
            Response::Rows(_) => "Rows",
            Response::Inserted(_) => "Inserted",
            Response::Deleted(_) => "Deleted",
            Response::Subscribed => "Subscribed",
            Response::Unsubscribed => "Unsubscribed",
            Response::Pong => "Pong",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientFrame {
    pub request_id: u64,
    pub request: Request,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerFrame {
    Reply {
        request_id: u64,
        result: Result<Response, RemoteError>,
    },
    Push {
        subscription: u64,
        push: Push,
    },
}

/// Protocol errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

impl From<ProtocolError> for RemoteError {
    fn from(e: ProtocolError) -> Self {
        RemoteError::Protocol(e.to_string())
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, ProtocolError> {
    bincode::serde::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| ProtocolError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtocolError> {
    let (value, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map_err(|e| ProtocolError::Deserialization(e.to_string()))?;
    Ok(value)
}

impl ClientFrame {
    pub fn new(request_id: u64, request: Request) -> Self {
        Self {
            request_id,
            request,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        encode(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        decode(bytes)
    }
}

impl ServerFrame {
    pub fn reply(request_id: u64, result: Result<Response, RemoteError>) -> Self {
        ServerFrame::Reply { request_id, result }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        encode(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        decode(bytes)
    }
}
