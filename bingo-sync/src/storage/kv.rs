//! String key-value surface plus JSON-typed helpers.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;

/// Storage errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

/// Flat string store. Implementations must be safe to share across tasks.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// JSON helpers available on every [`KeyValueStore`].
pub trait KeyValueStoreExt: KeyValueStore {
    /// Decode the value at `key`, or return `default` when it is missing or
    /// unreadable.
    fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> Result<T, StoreError> {
        let Some(raw) = self.get(key)? else {
            return Ok(default);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(value),
            Err(e) => {
                log::warn!("Ignoring unreadable value at '{key}': {e}");
                Ok(default)
            }
        }
    }

    fn put<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let raw =
            serde_json::to_string(value).map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.set(key, &raw)
    }
}

impl<S: KeyValueStore + ?Sized> KeyValueStoreExt for S {}

/// In-memory store, for tests and for sessions that need no persistence.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.read().map(|v| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<E>(_: E) -> StoreError {
    StoreError::Database("lock poisoned".into())
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.values.read().map_err(poisoned)?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.values
            .write()
            .map_err(poisoned)?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.values.write().map_err(poisoned)?.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_set_remove() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").unwrap(), None);
        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
        store.remove("k").unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_typed_helpers() {
        let store = MemoryStore::new();
        assert_eq!(store.get_or("nums", vec![0u32]).unwrap(), vec![0]);

        store.put("nums", &vec![1u32, 2, 3]).unwrap();
        assert_eq!(store.get_or::<Vec<u32>>("nums", Vec::new()).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_unreadable_value_falls_back() {
        let store = MemoryStore::new();
        store.set("broken", "{not json").unwrap();
        assert_eq!(store.get_or("broken", 7u8).unwrap(), 7);
    }

    #[test]
    fn test_dyn_store_has_helpers() {
        let store: Box<dyn KeyValueStore> = Box::new(MemoryStore::new());
        store.put("name", "alice").unwrap();
        assert_eq!(store.get_or("name", String::new()).unwrap(), "alice");
    }
}
