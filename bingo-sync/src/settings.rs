//! Session settings: the player seed and the last selected room code.
//!
//! Loaded once when a controller is built and written back on every change.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use bingo_core::RoomCode;

use crate::storage::{KeyValueStore, KeyValueStoreExt, StoreError};

pub const SEED_KEY: &str = "bingo.seed";
pub const ROOM_KEY: &str = "bingo.room";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSettings {
    pub seed: String,
    pub room_code: Option<RoomCode>,
}

/// `Player-` followed by 8 random hex digits.
pub fn random_seed() -> String {
    format!("Player-{:08x}", rand::thread_rng().gen::<u32>())
}

impl SessionSettings {
    pub fn new(seed: impl Into<String>) -> Self {
        Self {
            seed: seed.into(),
            room_code: None,
        }
    }
}

/// Reads and writes [`SessionSettings`] in a key-value store.
#[derive(Clone)]
pub struct SettingsStore {
    store: Arc<dyn KeyValueStore>,
}

impl SettingsStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Load settings; a missing seed is generated and saved right away.
    pub fn load(&self) -> Result<SessionSettings, StoreError> {
        let seed: Option<String> = self.store.get_or(SEED_KEY, None)?;
        let room_code: Option<RoomCode> = self.store.get_or(ROOM_KEY, None)?;

        let seed = match seed.filter(|s| !s.is_empty()) {
            Some(seed) => seed,
            None => {
                let seed = random_seed();
                log::info!("No saved seed, generated {seed}");
                self.store.put(SEED_KEY, &seed)?;
                seed
            }
        };

        Ok(SessionSettings { seed, room_code })
    }

    pub fn save_seed(&self, seed: &str) -> Result<(), StoreError> {
        self.store.put(SEED_KEY, seed)
    }

    pub fn save_room(&self, code: Option<&RoomCode>) -> Result<(), StoreError> {
        match code {
            Some(code) => self.store.put(ROOM_KEY, code),
            None => self.store.remove(ROOM_KEY),
        }
    }

    pub fn save(&self, settings: &SessionSettings) -> Result<(), StoreError> {
        self.save_seed(&settings.seed)?;
        self.save_room(settings.room_code.as_ref())
    }
}
