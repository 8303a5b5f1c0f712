// SPDX-FileCopyrightText: 2026 Ringcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite-backed durable storage.
//!
//! One connection behind a mutex. View-state writes are tiny and must land
//! before the mutating call returns, so access is synchronous.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};

use ringcast_core::{DurableStorage, RingcastError};

use crate::migrations::run_migrations;

pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStorage").finish_non_exhaustive()
    }
}

fn storage_err(e: rusqlite::Error) -> RingcastError {
    RingcastError::Storage {
        source: Box::new(e),
    }
}

impl SqliteStorage {
    /// Open (creating if needed) the database at `path` and run migrations.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RingcastError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| RingcastError::Storage {
                source: Box::new(e),
            })?;
        }
        let conn = Connection::open(path).map_err(storage_err)?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(storage_err)?;
        tracing::info!(path = %path.display(), "view-state storage opened");
        Self::init(conn)
    }

    /// An in-memory database with the same schema.
    pub fn open_in_memory() -> Result<Self, RingcastError> {
        Self::init(Connection::open_in_memory().map_err(storage_err)?)
    }

    fn init(mut conn: Connection) -> Result<Self, RingcastError> {
        conn.pragma_update(None, "busy_timeout", 5000)
            .map_err(storage_err)?;
        run_migrations(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, RingcastError> {
        self.conn
            .lock()
            .map_err(|_| RingcastError::Internal("sqlite storage lock poisoned".into()))
    }
}

impl DurableStorage for SqliteStorage {
    fn get(&self, key: &str) -> Result<Option<String>, RingcastError> {
        self.lock()?
            .query_row(
                "SELECT value FROM view_state WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(storage_err)
    }

    fn put(&self, key: &str, value: &str) -> Result<(), RingcastError> {
        self.lock()?
            .execute(
                "INSERT INTO view_state (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET
                     value = excluded.value,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                params![key, value],
            )
            .map_err(storage_err)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), RingcastError> {
        self.lock()?
            .execute("DELETE FROM view_state WHERE key = ?1", params![key])
            .map_err(storage_err)?;
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, RingcastError> {
        // substr() instead of LIKE so '_' and '%' in ids match literally.
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT key FROM view_state
                 WHERE substr(key, 1, length(?1)) = ?1
                 ORDER BY key",
            )
            .map_err(storage_err)?;
        let keys = stmt
            .query_map(params![prefix], |row| row.get::<_, String>(0))
            .map_err(storage_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(storage_err)?;
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("view-state.db");
        {
            let storage = SqliteStorage::open(&path).unwrap();
            storage.put("viewed_a_b", r#"{"lastViewedAt":null}"#).unwrap();
        }
        let storage = SqliteStorage::open(&path).unwrap();
        assert_eq!(
            storage.get("viewed_a_b").unwrap().as_deref(),
            Some(r#"{"lastViewedAt":null}"#)
        );
    }

    #[test]
    fn put_overwrites_last_write_wins() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        storage.put("k", "first").unwrap();
        storage.put("k", "second").unwrap();
        assert_eq!(storage.get("k").unwrap().as_deref(), Some("second"));
        storage.remove("k").unwrap();
        assert_eq!(storage.get("k").unwrap(), None);
    }

    #[test]
    fn prefix_scan_treats_underscore_literally() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        for key in ["viewed_a_1", "viewedXa_1", "viewed_b_2", "zzz"] {
            storage.put(key, "{}").unwrap();
        }
        assert_eq!(
            storage.keys_with_prefix("viewed_").unwrap(),
            vec!["viewed_a_1", "viewed_b_2"]
        );
    }

    #[test]
    fn migrations_are_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("v.db");
        SqliteStorage::open(&path).unwrap();
        SqliteStorage::open(&path).unwrap();
    }
}
