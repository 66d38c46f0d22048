//! Persisted key-value storage
//!
//! Backs the raw document cache, recent verses, bookmarks and preferences.
//! Capacity is not guaranteed: callers treat failed writes as best-effort.

use crate::error::VerseError;
use rusqlite::{Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, VerseError>;
    fn set(&self, key: &str, value: &str) -> Result<(), VerseError>;
    fn remove(&self, key: &str) -> Result<(), VerseError>;
    fn keys(&self) -> Result<Vec<String>, VerseError>;
}

/// SQLite-backed store in the settings database
pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    /// Open (and create if missing) the store at `path`
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, VerseError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| VerseError::Storage(e.to_string()))?;
            }
        }
        let store = Self { path };
        store.connection()?.execute(
            "CREATE TABLE IF NOT EXISTS kv_store (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
            [],
        )?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // Each call opens a fresh connection; rusqlite connections are not Sync.
    fn connection(&self) -> Result<Connection, VerseError> {
        Ok(Connection::open(&self.path)?)
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>, VerseError> {
        let conn = self.connection()?;
        let value = conn
            .query_row("SELECT value FROM kv_store WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), VerseError> {
        let conn = self.connection()?;
        conn.execute(
            "INSERT OR REPLACE INTO kv_store (key, value) VALUES (?1, ?2)",
            rusqlite::params![key, value],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), VerseError> {
        let conn = self.connection()?;
        conn.execute("DELETE FROM kv_store WHERE key = ?1", [key])?;
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, VerseError> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare("SELECT key FROM kv_store ORDER BY key")?;
        let keys = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(keys)
    }
}

/// In-memory store with an optional quota on the total stored bytes
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
    quota_bytes: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            quota_bytes: Some(quota_bytes),
        }
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, VerseError> {
        Ok(self.entries().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), VerseError> {
        let mut entries = self.entries();
        if let Some(quota) = self.quota_bytes {
            let used: usize = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            if used + key.len() + value.len() > quota {
                return Err(VerseError::Storage(format!(
                    "quota of {} bytes exceeded writing '{}'",
                    quota, key
                )));
            }
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), VerseError> {
        self.entries().remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, VerseError> {
        let mut keys: Vec<String> = self.entries().keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}
