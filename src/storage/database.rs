//! `SQLite` database connection and operations.
//!
//! The database is stored at `~/.rallysync/rallysync.db` and holds the
//! `kv_store` table backing the sync queue, the cache and the last-sync marker.

use rusqlite::Connection;

use crate::error::RallyError;

use super::migrations;

/// Database connection wrapper.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open the database at a specific path.
    ///
    /// Creates the database file and runs migrations if necessary.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrations fail.
    pub fn open_at(path: &std::path::Path) -> Result<Self, RallyError> {
        let conn = Connection::open(path).map_err(|e| {
            RallyError::Database(format!("Failed to open database {}: {e}", path.display()))
        })?;

        conn.execute_batch("PRAGMA journal_mode = WAL;")
            .map_err(|e| RallyError::Database(format!("Failed to enable WAL: {e}")))?;

        let db = Self { conn };
        db.migrate()?;

        Ok(db)
    }

    /// Open an in-memory database (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrations fail.
    pub fn open_in_memory() -> Result<Self, RallyError> {
        let conn = Connection::open_in_memory().map_err(|e| {
            RallyError::Database(format!("Failed to open in-memory database: {e}"))
        })?;

        let db = Self { conn };
        db.migrate()?;

        Ok(db)
    }

    /// Run database migrations.
    fn migrate(&self) -> Result<(), RallyError> {
        migrations::run(&self.conn)
    }

    /// Get the current schema version.
    ///
    /// # Errors
    ///
    /// Returns an error if the version cannot be read.
    pub fn schema_version(&self) -> Result<i32, RallyError> {
        migrations::get_version(&self.conn)
    }

    /// Get a reference to the underlying connection.
    #[must_use]
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Get a mutable reference to the connection, needed to open transactions.
    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.schema_version().unwrap() > 0);
    }

    #[test]
    fn test_open_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let db = Database::open_at(&db_path).unwrap();
        assert!(db.schema_version().unwrap() > 0);
        assert!(db_path.exists());
    }

    #[test]
    fn test_reopen_database() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        {
            let db = Database::open_at(&db_path).unwrap();
            assert!(db.schema_version().unwrap() > 0);
        }

        // Reopen - should not run migrations again
        {
            let db = Database::open_at(&db_path).unwrap();
            assert!(db.schema_version().unwrap() > 0);
        }
    }
}
