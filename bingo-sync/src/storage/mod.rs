//! Key-value persistence for session settings and the local backend.
//!
//! ```text
//! ┌────────────────────┐  typed get_or / put (JSON)
//! │ KeyValueStoreExt   │ ─────────────────────────────┐
//! └────────────────────┘                              ▼
//!                                        ┌────────────────────────┐
//!                                        │ KeyValueStore (strings)│
//!                                        └───────────┬────────────┘
//!                                   ┌────────────────┴───────────────┐
//!                                   ▼                                ▼
//!                           MemoryStore (HashMap)        RocksStore (RocksDB)
//!                                                        CF "settings" / "records"
//! ```

pub mod kv;
pub mod rocks;

pub use kv::{KeyValueStore, KeyValueStoreExt, MemoryStore, StoreError};
pub use rocks::{RocksStore, StoreConfig};
