//! # bingo-sync: room synchronization for shared bingo games
//!
//! Keeps one client's view of a room (word pool and called words)
//! consistent with a shared store, with optimistic writes and push updates.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │ RoomSyncController   │  select room, add / call / clear / reset
//! └──────────┬───────────┘
//!            │ one per collection
//!            ▼
//! ┌──────────────────────┐  optimistic append, confirm / rollback,
//! │ ReconciledCollection │  push dedupe, room epoch
//! └──────────┬───────────┘
//!            │ Backend (RoomDirectory + RemoteCollection × 2)
//!     ┌──────┼──────────────────┐
//!     ▼      ▼                  ▼
//!  local   in-process        remote ──── WebSocket ──── StoreServer
//!  (kv)    (MemoryBackend)   (StoreClient)              (MemoryBackend)
//! ```
//!
//! ## Modules
//!
//! - [`remote`]: Backend capability traits and subscriptions
//! - [`collection`]: Optimistic reconciled collection
//! - [`controller`]: Room lifecycle and game commands
//! - [`memory`]: Shared in-memory store with per-room push fan-out
//! - [`broadcast`]: Room-based fan-out with lag accounting
//! - [`local`]: Single-client backend over a key-value store
//! - [`protocol`]: Binary wire protocol (bincode frames)
//! - [`server`] / [`client`]: WebSocket transport
//! - [`settings`]: Persisted seed and room code
//! - [`storage`]: Key-value persistence (RocksDB or memory)

pub mod broadcast;
pub mod client;
pub mod collection;
pub mod controller;
pub mod local;
pub mod memory;
pub mod protocol;
pub mod remote;
pub mod server;
pub mod settings;
pub mod storage;

// Re-exports for convenience
pub use broadcast::{BroadcastGroup, BroadcastStats, RoomManager};
pub use client::{ClientConfig, RemoteTable, StoreClient};
pub use collection::{AppendOutcome, PendingWrite, Reconciled, ReconciledCollection, WriteStatus};
pub use controller::{GameState, Outcome, Phase, RoomSyncController, SkipReason};
pub use local::{LocalRooms, LocalTable};
pub use memory::{MemoryBackend, MemoryStats, MemoryTable, DEFAULT_BROADCAST_CAPACITY};
pub use protocol::{ClientFrame, ProtocolError, Push, Record, Request, Response, Row, ServerFrame};
pub use remote::{
    Backend, BackendMode, PushEvent, RemoteCollection, RemoteError, RoomDirectory, Subscription,
    SubscriptionGuard,
};
pub use server::{ServerConfig, ServerStats, StoreServer};
pub use settings::{random_seed, SessionSettings, SettingsStore};
pub use storage::{KeyValueStore, KeyValueStoreExt, MemoryStore, RocksStore, StoreConfig, StoreError};
