//! SQLite-backed key-value store.
//!
//! Holds every persisted record (lifetime stats, mission history, the sync
//! cursor) as JSON text under a string key in a single `kv` table.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection};

use super::data_dir;
use super::kv::KvStore;
use super::migrations;
use crate::error::StorageError;

const DB_FILE: &str = "stepquest.db";

/// SQLite database for journal storage.
pub struct Database {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl Database {
    /// Open the database at `<data_dir>/stepquest.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, StorageError> {
        let dir = data_dir().map_err(|e| StorageError::Unavailable(e.to_string()))?;
        Self::open_at(dir.join(DB_FILE))
    }

    /// Open (or create) the database file at `path`.
    pub fn open_at(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path).map_err(|source| StorageError::OpenFailed {
            path: path.clone(),
            source,
        })?;
        migrations::migrate(&conn)?;
        tracing::debug!(path = %path.display(), "opened database");
        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path),
        })
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        migrations::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    /// File backing this database, `None` when in memory.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// All keys currently stored, sorted.
    pub fn keys(&self) -> Result<Vec<String>, StorageError> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT key FROM kv ORDER BY key")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut keys = Vec::new();
        for key in rows {
            keys.push(key?);
        }
        Ok(keys)
    }
}

impl KvStore for Database {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT value FROM kv WHERE key = ?1")?;
        let result = stmt.query_row(params![key], |row| row.get::<_, String>(0));
        match result {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.conn().execute(
            "INSERT OR REPLACE INTO kv (key, value, updated_at)
             VALUES (?1, ?2, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))",
            params![key, value],
        )?;
        Ok(())
    }

    fn set_many(&self, entries: &[(&str, String)]) -> Result<(), StorageError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO kv (key, value, updated_at)
                 VALUES (?1, ?2, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))",
            )?;
            for (key, value) in entries {
                stmt.execute(params![key, value])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn remove(&self, keys: &[&str]) -> Result<(), StorageError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        for key in keys {
            tx.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        }
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn kv_store() {
        let db = Database::open_memory().unwrap();
        assert!(db.get("test").unwrap().is_none());
        db.set("test", "hello").unwrap();
        assert_eq!(db.get("test").unwrap().unwrap(), "hello");
        db.set("test", "again").unwrap();
        assert_eq!(db.get("test").unwrap().unwrap(), "again");
    }

    #[test]
    fn set_many_writes_all_entries() {
        let db = Database::open_memory().unwrap();
        db.set_many(&[("a", "1".to_string()), ("b", "2".to_string())])
            .unwrap();
        assert_eq!(db.keys().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn remove_deletes_only_named_keys() {
        let db = Database::open_memory().unwrap();
        db.set("a", "1").unwrap();
        db.set("b", "2").unwrap();
        db.remove(&["a", "missing"]).unwrap();
        assert_eq!(db.keys().unwrap(), vec!["b"]);
    }

    #[test]
    fn values_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stepquest.db");
        {
            let db = Database::open_at(&path).unwrap();
            db.set("stepquest/last_synced_steps", "42").unwrap();
        }
        let db = Database::open_at(&path).unwrap();
        assert_eq!(db.path(), Some(path.as_path()));
        assert_eq!(
            db.get("stepquest/last_synced_steps").unwrap().as_deref(),
            Some("42")
        );
    }

    #[test]
    fn open_at_bad_path_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("nested").join("x.db");
        assert!(matches!(
            Database::open_at(&path),
            Err(StorageError::OpenFailed { .. })
        ));
    }
}
