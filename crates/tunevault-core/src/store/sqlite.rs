//! SQLite-backed key-value store.

use super::traits::KeyValueStore;
use crate::error::{Result, VaultError};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Key-value store in a single SQLite file.
///
/// Thread-safe via an internal mutex on the connection, which also makes the
/// store single-writer.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the store at the given database path.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| VaultError::Io {
                message: format!("Failed to create ledger directory: {}", e),
                path: Some(parent.to_path_buf()),
                source: Some(e),
            })?;
        }

        let conn = Connection::open(db_path).map_err(|e| VaultError::Database {
            message: format!("Failed to open ledger database: {}", e),
            source: Some(e),
        })?;

        // WAL lets readers proceed while a write is in flight
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| VaultError::Database {
                message: format!("Failed to set pragmas: {}", e),
                source: Some(e),
            })?;

        Self::with_connection(conn)
    }

    /// In-memory store, for tests and dry runs against a scratch ledger.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| VaultError::Database {
            message: format!("Failed to open in-memory database: {}", e),
            source: Some(e),
        })?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv_entries (
                namespace TEXT NOT NULL,
                key TEXT NOT NULL,
                value BLOB NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (namespace, key)
            );
            "#,
        )
        .map_err(|e| VaultError::Database {
            message: format!("Failed to initialize ledger schema: {}", e),
            source: Some(e),
        })?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| VaultError::Database {
            message: format!("Failed to lock database: {}", e),
            source: None,
        })
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT value FROM kv_entries WHERE namespace = ?1 AND key = ?2",
            params![namespace, key],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| VaultError::Database {
            message: format!("Failed to read {}/{}: {}", namespace, key, e),
            source: Some(e),
        })
    }

    fn put(&self, namespace: &str, key: &str, value: &[u8]) -> Result<()> {
        let conn = self.lock()?;
        let now = chrono::Utc::now().to_rfc3339();
        conn.execute(
            r#"
            INSERT INTO kv_entries (namespace, key, value, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(namespace, key) DO UPDATE SET
                value = ?3,
                updated_at = ?4
            "#,
            params![namespace, key, value, now],
        )
        .map_err(|e| VaultError::Database {
            message: format!("Failed to write {}/{}: {}", namespace, key, e),
            source: Some(e),
        })?;
        debug!("Stored {}/{} ({} bytes)", namespace, key, value.len());
        Ok(())
    }

    fn delete(&self, namespace: &str, key: &str) -> Result<bool> {
        let conn = self.lock()?;
        let deleted = conn
            .execute(
                "DELETE FROM kv_entries WHERE namespace = ?1 AND key = ?2",
                params![namespace, key],
            )
            .map_err(|e| VaultError::Database {
                message: format!("Failed to delete {}/{}: {}", namespace, key, e),
                source: Some(e),
            })?;
        Ok(deleted > 0)
    }

    fn scan(&self, namespace: &str) -> Result<Vec<(String, Vec<u8>)>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT key, value FROM kv_entries WHERE namespace = ?1 ORDER BY key")
            .map_err(|e| VaultError::Database {
                message: format!("Failed to prepare scan of {}: {}", namespace, e),
                source: Some(e),
            })?;

        let rows = stmt
            .query_map(params![namespace], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(|e| VaultError::Database {
                message: format!("Failed to scan {}: {}", namespace, e),
                source: Some(e),
            })?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }
}
