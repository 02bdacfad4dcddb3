// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Local durable key-value storage
//!
//! A small string-keyed slot store backed by SQLite. Holds the guest-session
//! flag, the cached sign-in credential, and the guest detection history.

use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::{Result, ScanError};

/// Local store (thread-safe wrapper)
#[derive(Clone)]
pub struct LocalStore {
    conn: Arc<Mutex<Connection>>,
}

impl LocalStore {
    /// Open or create the store
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.initialize()?;
        Ok(store)
    }

    /// Open an in-memory store (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.initialize()?;
        Ok(store)
    }

    fn lock_conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| ScanError::Storage("Store lock poisoned".to_string()))
    }

    fn initialize(&self) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
        "#,
        )?;
        Ok(())
    }

    /// Read a slot. Absent keys return `None`.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.lock_conn()?;
        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Write a slot, replacing any previous value.
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    /// Remove a slot. Removing an absent key is not an error.
    pub fn remove(&self, key: &str) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_key_reads_none() {
        let store = LocalStore::in_memory().unwrap();
        assert_eq!(store.get("missing").unwrap(), None);
    }

    #[test]
    fn set_then_get_round_trips() {
        let store = LocalStore::in_memory().unwrap();
        store.set("guestSession", "true").unwrap();
        assert_eq!(store.get("guestSession").unwrap().as_deref(), Some("true"));

        store.set("guestSession", "false").unwrap();
        assert_eq!(store.get("guestSession").unwrap().as_deref(), Some("false"));
    }

    #[test]
    fn remove_clears_slot() {
        let store = LocalStore::in_memory().unwrap();
        store.set("authUser", "{}").unwrap();
        store.remove("authUser").unwrap();
        assert_eq!(store.get("authUser").unwrap(), None);

        // Removing again is a no-op
        store.remove("authUser").unwrap();
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("oralscan.db");

        {
            let store = LocalStore::open(&path).unwrap();
            store.set("guestSession", "true").unwrap();
        }

        let store = LocalStore::open(&path).unwrap();
        assert_eq!(store.get("guestSession").unwrap().as_deref(), Some("true"));
    }
}
