//! Durable key-value storage.
//!
//! The sync queue and the cache store only ever talk to storage through
//! [`KeyValueStore`], a string-to-string map with bulk removal.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use super::Database;
use crate::error::RallyError;

/// String key-value storage shared by the queue and the cache.
pub trait KeyValueStore: Send + Sync {
    /// Read a value, `None` if the key is absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be read.
    fn get_item(&self, key: &str) -> Result<Option<String>, RallyError>;

    /// Write a value, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be written.
    fn set_item(&self, key: &str, value: &str) -> Result<(), RallyError>;

    /// Remove a key. Removing an absent key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be written.
    fn remove_item(&self, key: &str) -> Result<(), RallyError>;

    /// List every stored key in ascending order.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be read.
    fn get_all_keys(&self) -> Result<Vec<String>, RallyError>;

    /// Remove several keys at once.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be written.
    fn multi_remove(&self, keys: &[String]) -> Result<(), RallyError> {
        for key in keys {
            self.remove_item(key)?;
        }
        Ok(())
    }
}

/// [`KeyValueStore`] persisted in the `kv_store` table.
pub struct SqliteStore {
    db: Mutex<Database>,
}

impl SqliteStore {
    /// Wrap an open database.
    #[must_use]
    pub const fn new(db: Database) -> Self {
        Self { db: Mutex::new(db) }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Database>, RallyError> {
        self.db
            .lock()
            .map_err(|_| RallyError::Database("Database lock poisoned".to_string()))
    }
}

impl KeyValueStore for SqliteStore {
    fn get_item(&self, key: &str) -> Result<Option<String>, RallyError> {
        let db = self.lock()?;

        db.connection()
            .query_row("SELECT value FROM kv_store WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()
            .map_err(|e| RallyError::Database(format!("Failed to read key {key}: {e}")))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), RallyError> {
        let db = self.lock()?;

        db.connection()
            .execute(
                r"INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
                  ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, value, Utc::now().to_rfc3339()],
            )
            .map_err(|e| RallyError::Database(format!("Failed to write key {key}: {e}")))?;

        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), RallyError> {
        let db = self.lock()?;

        db.connection()
            .execute("DELETE FROM kv_store WHERE key = ?1", [key])
            .map_err(|e| RallyError::Database(format!("Failed to remove key {key}: {e}")))?;

        Ok(())
    }

    fn get_all_keys(&self) -> Result<Vec<String>, RallyError> {
        let db = self.lock()?;
        let conn = db.connection();

        let mut stmt = conn
            .prepare("SELECT key FROM kv_store ORDER BY key ASC")
            .map_err(|e| RallyError::Database(format!("Failed to prepare query: {e}")))?;

        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| RallyError::Database(format!("Failed to list keys: {e}")))?;

        let mut keys = Vec::new();
        for row in rows {
            keys.push(row.map_err(|e| RallyError::Database(e.to_string()))?);
        }

        Ok(keys)
    }

    fn multi_remove(&self, keys: &[String]) -> Result<(), RallyError> {
        let mut db = self.lock()?;

        let tx = db
            .connection_mut()
            .transaction()
            .map_err(|e| RallyError::Database(format!("Failed to begin transaction: {e}")))?;

        for key in keys {
            tx.execute("DELETE FROM kv_store WHERE key = ?1", [key])
                .map_err(|e| RallyError::Database(format!("Failed to remove key {key}: {e}")))?;
        }

        tx.commit()
            .map_err(|e| RallyError::Database(format!("Failed to commit removal: {e}")))
    }
}

/// Volatile [`KeyValueStore`], used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<String, String>>, RallyError> {
        self.items
            .lock()
            .map_err(|_| RallyError::Database("Memory store lock poisoned".to_string()))
    }
}

impl KeyValueStore for MemoryStore {
    fn get_item(&self, key: &str) -> Result<Option<String>, RallyError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), RallyError> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), RallyError> {
        self.lock()?.remove(key);
        Ok(())
    }

    fn get_all_keys(&self) -> Result<Vec<String>, RallyError> {
        Ok(self.lock()?.keys().cloned().collect())
    }
}
