//! Process-wide key-value and append-only log storage.
//!
//! Backed by SQLite. In-memory when no path is configured. Hot reload
//! can tear the handle down mid-flight, so every access wraps a
//! close-and-reopen retry for the "database is closed" condition.

use crate::error::{Error, Result};
use once_cell::sync::OnceCell;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Storage construction options.
#[derive(Debug, Clone, Default)]
pub struct StorageOptions {
    /// Database file path; in-memory when `None`
    pub path: Option<PathBuf>,
}

/// Key-value store plus append-only logs over one SQLite handle.
pub struct Storage {
    options: StorageOptions,
    conn: Mutex<Connection>,
}

impl Storage {
    /// Open (or create) storage with the given options.
    pub fn open(options: StorageOptions) -> Result<Self> {
        let conn = Self::connect(&options)?;
        Ok(Self {
            options,
            conn: Mutex::new(conn),
        })
    }

    fn connect(options: &StorageOptions) -> Result<Connection> {
        let conn = match &options.path {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let conn = Connection::open(path)
                    .map_err(|e| Error::storage(format!("open {}: {e}", path.display())))?;
                conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
                    .map_err(|e| Error::storage(format!("set pragmas: {e}")))?;
                conn
            }
            None => Connection::open_in_memory()
                .map_err(|e| Error::storage(format!("open in-memory: {e}")))?,
        };
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                log_key TEXT NOT NULL,
                value TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_log_key ON log(log_key);
            "#,
        )
        .map_err(|e| Error::storage(format!("init schema: {e}")))?;
        Ok(conn)
    }

    /// Run an operation, reopening the connection once when it reports
    /// the closed-database condition seen during hot reload.
    fn with_conn<T>(&self, op: impl Fn(&Connection) -> rusqlite::Result<T>) -> Result<T> {
        let mut guard = self
            .conn
            .lock()
            .map_err(|_| Error::storage("storage lock poisoned"))?;
        match op(&guard) {
            Ok(value) => Ok(value),
            Err(e) if e.to_string().contains("closed") => {
                warn!("storage connection closed, reopening");
                *guard = Self::connect(&self.options)?;
                op(&guard).map_err(|e| Error::storage(e.to_string()))
            }
            Err(e) => Err(Error::storage(e.to_string())),
        }
    }

    /// Read a value by key.
    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        let raw: Option<String> = self.with_conn(|conn| {
            conn.query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()
        })?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Write a value, replacing any previous one.
    pub fn put(&self, key: &str, value: &Value) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO kv (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, raw],
            )
        })?;
        Ok(())
    }

    /// Delete a key. A missing key is not an error.
    pub fn delete(&self, key: &str) -> Result<()> {
        self.with_conn(|conn| conn.execute("DELETE FROM kv WHERE key = ?1", params![key]))?;
        Ok(())
    }

    /// Append one entry to a named log.
    pub fn append(&self, log_key: &str, value: &Value) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO log (log_key, value) VALUES (?1, ?2)",
                params![log_key, raw],
            )
        })?;
        debug!(log = %log_key, "appended log entry");
        Ok(())
    }

    /// Read every entry of a named log in append order.
    pub fn read_log(&self, log_key: &str) -> Result<Vec<Value>> {
        let rows: Vec<String> = self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT value FROM log WHERE log_key = ?1 ORDER BY id ASC")?;
            let rows = stmt.query_map(params![log_key], |row| row.get::<_, String>(0))?;
            rows.collect()
        })?;
        rows.into_iter()
            .map(|raw| serde_json::from_str(&raw).map_err(Error::from))
            .collect()
    }
}

static DEFAULT_STORAGE: OnceCell<Arc<Storage>> = OnceCell::new();

/// Lazily initialized process-wide storage handle. The path comes from
/// `SERVFLOW_STORAGE_PATH`; empty or unset means in-memory.
pub fn default_storage() -> Result<Arc<Storage>> {
    if let Some(existing) = DEFAULT_STORAGE.get() {
        return Ok(Arc::clone(existing));
    }
    let path = std::env::var("SERVFLOW_STORAGE_PATH")
        .ok()
        .filter(|p| !p.is_empty())
        .map(PathBuf::from);
    let storage = Arc::new(Storage::open(StorageOptions { path })?);
    Ok(Arc::clone(DEFAULT_STORAGE.get_or_init(|| storage)))
}
