//! SQLite document integration.
//!
//! Stores JSON documents per collection and serves equality-filtered
//! fetches. Implements both the [`Fetcher`] and [`StoreBackend`]
//! capabilities.

use async_trait::async_trait;
use rusqlite::{params, Connection};
use serde::Deserialize;
use serde_json::Value;
use servflow_core::{
    Error, FetchOptions, Fetcher, Integration, Result, StoreBackend, StoreOptions,
};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

#[derive(Debug, Deserialize)]
struct SqliteConfig {
    #[serde(default)]
    path: Option<PathBuf>,
}

/// JSON document store over one SQLite handle.
pub struct SqliteIntegration {
    conn: Mutex<Connection>,
}

impl SqliteIntegration {
    /// Open a file-backed document store.
    pub fn open(path: &PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .map_err(|e| Error::integration(format!("sqlite: open {}: {e}", path.display())))?;
        Self::with_connection(conn)
    }

    /// Open an in-memory document store.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::integration(format!("sqlite: open in-memory: {e}")))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS documents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                collection TEXT NOT NULL,
                doc TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection);",
        )
        .map_err(|e| Error::integration(format!("sqlite: init schema: {e}")))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl Integration for SqliteIntegration {
    fn integration_type(&self) -> &str {
        "sqlite"
    }

    fn as_fetcher(&self) -> Option<&dyn Fetcher> {
        Some(self)
    }

    fn as_store(&self) -> Option<&dyn StoreBackend> {
        Some(self)
    }
}

fn matches_filters(doc: &Value, opts: &FetchOptions) -> bool {
    opts.filters.iter().all(|(field, expected)| doc.get(field) == Some(expected))
}

#[async_trait]
impl Fetcher for SqliteIntegration {
    async fn fetch(&self, opts: FetchOptions) -> Result<Vec<Value>> {
        let raw_docs: Vec<String> = {
            let conn = self
                .conn
                .lock()
                .map_err(|_| Error::integration("sqlite: lock poisoned"))?;
            let mut stmt = conn
                .prepare("SELECT doc FROM documents WHERE collection = ?1 ORDER BY id ASC")
                .map_err(|e| Error::integration(format!("sqlite: prepare: {e}")))?;
            let rows = stmt
                .query_map(params![opts.collection], |row| row.get::<_, String>(0))
                .map_err(|e| Error::integration(format!("sqlite: query: {e}")))?;
            rows.collect::<rusqlite::Result<_>>()
                .map_err(|e| Error::integration(format!("sqlite: read rows: {e}")))?
        };

        let mut documents = Vec::new();
        for raw in raw_docs {
            let doc: Value = serde_json::from_str(&raw)?;
            if matches_filters(&doc, &opts) {
                documents.push(doc);
                if opts.limit.is_some_and(|limit| documents.len() >= limit) {
                    break;
                }
            }
        }
        Ok(documents)
    }
}

#[async_trait]
impl StoreBackend for SqliteIntegration {
    async fn store(&self, data: Value, opts: StoreOptions) -> Result<()> {
        let raw = serde_json::to_string(&data)?;
        let conn = self
            .conn
            .lock()
            .map_err(|_| Error::integration("sqlite: lock poisoned"))?;
        conn.execute(
            "INSERT INTO documents (collection, doc) VALUES (?1, ?2)",
            params![opts.collection, raw],
        )
        .map_err(|e| Error::integration(format!("sqlite: insert: {e}")))?;
        Ok(())
    }
}

/// Construct a SQLite integration from its declared config.
pub fn construct(config: &Value) -> Result<Arc<dyn Integration>> {
    let parsed: SqliteConfig = serde_json::from_value(config.clone())
        .map_err(|e| Error::config(format!("sqlite integration: invalid config: {e}")))?;
    let integration = match &parsed.path {
        Some(path) => SqliteIntegration::open(path)?,
        None => SqliteIntegration::in_memory()?,
    };
    Ok(Arc::new(integration))
}
