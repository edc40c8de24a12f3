//! Last-known-good snapshots of remote collections.
//!
//! Entries live under `cache_<collection>` in the key-value store and are
//! overwritten wholesale. `lastSync` holds the newest write time in epoch
//! milliseconds and never moves backwards.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::operation::Collection;
use crate::error::RallyError;
use crate::storage::KeyValueStore;

/// Key prefix for cache entries.
pub const CACHE_PREFIX: &str = "cache_";
/// Key of the last-sync marker.
pub const LAST_SYNC_KEY: &str = "lastSync";

/// A cached snapshot of one collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Collection the snapshot belongs to
    pub collection: Collection,
    /// The snapshot itself
    pub data: Value,
    /// When it was stored
    pub synced_at: DateTime<Utc>,
}

/// Per-collection snapshot store.
#[derive(Clone)]
pub struct CacheStore {
    store: Arc<dyn KeyValueStore>,
}

impl CacheStore {
    /// Create a cache over a key-value store.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    fn key(collection: &Collection) -> String {
        format!("{CACHE_PREFIX}{collection}")
    }

    /// Replace the snapshot of `collection` and bump the last-sync marker.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be persisted.
    pub fn put(&self, collection: &Collection, data: Value) -> Result<CacheEntry, RallyError> {
        let synced_at = match self.last_sync_time() {
            Some(previous) => previous.max(Utc::now()),
            None => Utc::now(),
        };

        let entry = CacheEntry {
            collection: collection.clone(),
            data,
            synced_at,
        };

        let json = serde_json::to_string(&entry)?;
        self.store.set_item(&Self::key(collection), &json)?;
        self.store
            .set_item(LAST_SYNC_KEY, &synced_at.timestamp_millis().to_string())?;

        tracing::debug!("Cached {collection}");
        Ok(entry)
    }

    /// Read the snapshot of `collection`, `None` if nothing is cached.
    ///
    /// Unreadable or corrupt entries are logged and reported as absent.
    #[must_use]
    pub fn get(&self, collection: &Collection) -> Option<CacheEntry> {
        let raw = match self.store.get_item(&Self::key(collection)) {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::error!("Error reading cache for {collection}: {e}");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::error!("Discarding corrupt cache entry for {collection}: {e}");
                None
            }
        }
    }

    /// Collections that currently have a snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the keys cannot be listed.
    pub fn collections(&self) -> Result<Vec<String>, RallyError> {
        Ok(self
            .store
            .get_all_keys()?
            .into_iter()
            .filter_map(|k| k.strip_prefix(CACHE_PREFIX).map(str::to_string))
            .collect())
    }

    /// Remove every snapshot and the last-sync marker.
    ///
    /// # Errors
    ///
    /// Returns an error if the keys cannot be removed.
    pub fn clear(&self) -> Result<usize, RallyError> {
        let keys: Vec<String> = self
            .store
            .get_all_keys()?
            .into_iter()
            .filter(|k| k.starts_with(CACHE_PREFIX))
            .collect();

        self.store.multi_remove(&keys)?;
        self.store.remove_item(LAST_SYNC_KEY)?;

        tracing::info!("Cleared {} cached collection(s)", keys.len());
        Ok(keys.len())
    }

    /// Most recent successful cache write, `None` if nothing has synced.
    #[must_use]
    pub fn last_sync_time(&self) -> Option<DateTime<Utc>> {
        let raw = match self.store.get_item(LAST_SYNC_KEY) {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::error!("Error getting last sync time: {e}");
                return None;
            }
        };

        raw.trim()
            .parse::<i64>()
            .ok()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
    }
}
