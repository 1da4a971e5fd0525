//! RocksDB-backed key-value store.
//!
//! Column families:
//! - `settings`: session settings (keys under the `bingo.` prefix)
//! - `records`: local-mode rooms and collections (everything else)

use rocksdb::{
    BlockBasedOptions, Cache, ColumnFamilyDescriptor, DBCompressionType, DBWithThreadMode,
    Options, SingleThreaded, WriteOptions,
};
use std::path::{Path, PathBuf};

use super::kv::{KeyValueStore, StoreError};

const CF_SETTINGS: &str = "settings";
const CF_RECORDS: &str = "records";

const COLUMN_FAMILIES: &[&str] = &[CF_SETTINGS, CF_RECORDS];

/// Keys with this prefix are routed to the settings column family.
pub const SETTINGS_PREFIX: &str = "bingo.";

impl From<rocksdb::Error> for StoreError {
    fn from(e: rocksdb::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Database directory path
    pub path: PathBuf,
    /// Block cache size in bytes
    pub block_cache_size: usize,
    /// fsync on every write
    pub sync_writes: bool,
    pub max_open_files: i32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("bingo_data"),
            block_cache_size: 8 * 1024 * 1024,
            sync_writes: true,
            max_open_files: 128,
        }
    }
}

impl StoreConfig {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Small cache, no fsync.
    pub fn for_testing(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            block_cache_size: 1024 * 1024,
            sync_writes: false,
            max_open_files: 32,
        }
    }
}

/// Durable [`KeyValueStore`]. Values are small JSON documents, so every
/// family is tuned for point lookups.
pub struct RocksStore {
    db: DBWithThreadMode<SingleThreaded>,
    config: StoreConfig,
}

impl RocksStore {
    /// Open (or create) the store at the configured path.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_open_files(config.max_open_files);
        db_opts.set_keep_log_file_num(2);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Self::cf_options(&config)))
            .collect();

        let db = DBWithThreadMode::<SingleThreaded>::open_cf_descriptors(
            &db_opts,
            &config.path,
            cf_descriptors,
        )?;

        log::info!("Opened key-value store at {}", config.path.display());
        Ok(Self { db, config })
    }

    fn cf_options(config: &StoreConfig) -> Options {
        let mut opts = Options::default();

        let mut block_opts = BlockBasedOptions::default();
        let cache = Cache::new_lru_cache(config.block_cache_size);
        block_opts.set_block_cache(&cache);
        block_opts.set_bloom_filter(10.0, false);
        opts.set_block_based_table_factory(&block_opts);

        opts.set_compression_type(DBCompressionType::None);
        opts.optimize_for_point_lookup(config.block_cache_size as u64);
        opts
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily, StoreError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("Column family '{name}' not found")))
    }

    fn cf_for(&self, key: &str) -> Result<&rocksdb::ColumnFamily, StoreError> {
        if key.starts_with(SETTINGS_PREFIX) {
            self.cf(CF_SETTINGS)
        } else {
            self.cf(CF_RECORDS)
        }
    }

    fn write_opts(&self) -> WriteOptions {
        let mut opts = WriteOptions::default();
        opts.set_sync(self.config.sync_writes);
        opts
    }

    /// Flush memtables to disk.
    pub fn flush(&self) -> Result<(), StoreError> {
        for name in COLUMN_FAMILIES {
            self.db.flush_cf(self.cf(name)?)?;
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }
}

impl KeyValueStore for RocksStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let cf = self.cf_for(key)?;
        match self.db.get_cf(cf, key.as_bytes())? {
            Some(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|e| StoreError::Deserialization(e.to_string())),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let cf = self.cf_for(key)?;
        self.db
            .put_cf_opt(cf, key.as_bytes(), value.as_bytes(), &self.write_opts())?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let cf = self.cf_for(key)?;
        self.db.delete_cf_opt(cf, key.as_bytes(), &self.write_opts())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::KeyValueStoreExt;
    use tempfile::tempdir;

    #[test]
    fn test_store_open_close() {
        let dir = tempdir().unwrap();
        let store = RocksStore::open(StoreConfig::for_testing(dir.path())).unwrap();
        assert!(store.path().exists());
    }

    #[test]
    fn test_get_set_remove() {
        let dir = tempdir().unwrap();
        let store = RocksStore::open(StoreConfig::for_testing(dir.path())).unwrap();

        assert_eq!(store.get("room:abc").unwrap(), None);
        store.set("room:abc", "{}").unwrap();
        store.set("bingo.seed", "\"Player-1\"").unwrap();
        assert_eq!(store.get("room:abc").unwrap().as_deref(), Some("{}"));
        assert_eq!(store.get_or("bingo.seed", String::new()).unwrap(), "Player-1");

        store.remove("room:abc").unwrap();
        assert_eq!(store.get("room:abc").unwrap(), None);
    }

    #[test]
    fn test_values_survive_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = RocksStore::open(StoreConfig::for_testing(dir.path())).unwrap();
            store.put("words:1", &vec!["CAT", "DOG"]).unwrap();
            store.flush().unwrap();
        }
        let store = RocksStore::open(StoreConfig::for_testing(dir.path())).unwrap();
        let words: Vec<String> = store.get_or("words:1", Vec::new()).unwrap();
        assert_eq!(words, vec!["CAT", "DOG"]);
    }
}
