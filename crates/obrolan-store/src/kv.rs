//! Synchronous string key-value cache.
//!
//! [`Database`] encrypts every value before it touches disk; [`MemoryKv`]
//! keeps plain strings in a map and is meant for tests.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use obrolan_shared::crypto;

use crate::database::Database;
use crate::error::{Result, StoreError};

/// The local cache boundary: `set`, `get_string`, `remove`.
pub trait KeyValueStore: Send + Sync {
    fn set(&self, key: &str, value: &str) -> Result<()>;

    fn get_string(&self, key: &str) -> Result<Option<String>>;

    fn remove(&self, key: &str) -> Result<()>;
}

impl KeyValueStore for Database {
    fn set(&self, key: &str, value: &str) -> Result<()> {
        let sealed = crypto::encrypt(self.key(), value.as_bytes())?;
        self.conn()?.execute(
            "INSERT INTO kv_entries (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, sealed, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn get_string(&self, key: &str) -> Result<Option<String>> {
        let sealed: Option<Vec<u8>> = self
            .conn()?
            .query_row(
                "SELECT value FROM kv_entries WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;

        let Some(sealed) = sealed else {
            return Ok(None);
        };
        let plain = crypto::decrypt(self.key(), &sealed)?;
        String::from_utf8(plain)
            .map(Some)
            .map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.conn()?
            .execute("DELETE FROM kv_entries WHERE key = ?1", params![key])?;
        Ok(())
    }
}

/// In-memory [`KeyValueStore`].
#[derive(Debug, Default)]
pub struct MemoryKv {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKv {
    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::LockPoisoned)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get_string(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::LockPoisoned)?;
        entries.remove(key);
        Ok(())
    }
}
