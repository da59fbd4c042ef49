//! Download ledger: the persisted record of what is already on disk.
//!
//! Three namespaces share one store:
//! - `tracks`: [`DownloadRecord`] keyed by song ID
//! - `migrations`: [`MigrationRecord`] keyed by zero-padded migration ID
//! - `watched`: [`WatchedPlaylist`] keyed by playlist ID
//!
//! Values are JSON so the file stays inspectable with the sqlite shell.

use super::sqlite::SqliteStore;
use super::traits::KeyValueStore;
use crate::catalog::{MediaFormat, Quality};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

const TRACKS_NAMESPACE: &str = "tracks";
const MIGRATIONS_NAMESPACE: &str = "migrations";
const WATCHED_NAMESPACE: &str = "watched";

/// Last known state of one downloaded song.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRecord {
    pub song_id: String,
    /// Format actually delivered, not the one requested.
    pub quality: MediaFormat,
    pub path: PathBuf,
    /// SHA-256 of the file; empty when hashing failed.
    #[serde(default)]
    pub hash: String,
    pub downloaded_at: DateTime<Utc>,
}

impl DownloadRecord {
    pub fn new(
        song_id: impl Into<String>,
        quality: MediaFormat,
        path: impl Into<PathBuf>,
        hash: impl Into<String>,
    ) -> Self {
        Self {
            song_id: song_id.into(),
            quality,
            path: path.into(),
            hash: hash.into(),
            downloaded_at: Utc::now(),
        }
    }
}

/// Marker that a migration has been applied to this ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub id: u32,
    pub name: String,
    pub description: String,
    pub applied_at: DateTime<Utc>,
}

impl MigrationRecord {
    fn key(id: u32) -> String {
        format!("{:04}", id)
    }
}

/// A playlist polled by the watcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchedPlaylist {
    pub id: String,
    pub quality: Quality,
    #[serde(default)]
    pub bpm: bool,
    #[serde(default)]
    pub genre: bool,
    /// Per-item transfer timeout, in seconds.
    pub timeout_secs: u64,
}

impl WatchedPlaylist {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Typed access to the ledger namespaces.
///
/// Opened once per process and shared behind an `Arc`.
pub struct DownloadLedger {
    store: Arc<dyn KeyValueStore>,
}

impl DownloadLedger {
    /// Open the SQLite ledger file. Failure here is fatal for the caller.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(Arc::new(SqliteStore::open(db_path)?)))
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(Arc::new(SqliteStore::open_in_memory()?)))
    }

    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    fn get_json<T: DeserializeOwned>(&self, namespace: &str, key: &str) -> Result<Option<T>> {
        match self.store.get(namespace, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_json<T: Serialize>(&self, namespace: &str, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.store.put(namespace, key, &bytes)
    }

    /// Decode every entry of a namespace, skipping corrupt ones.
    fn scan_json<T: DeserializeOwned>(&self, namespace: &str) -> Result<Vec<T>> {
        let mut values = Vec::new();
        for (key, bytes) in self.store.scan(namespace)? {
            match serde_json::from_slice(&bytes) {
                Ok(value) => values.push(value),
                Err(e) => warn!("Skipping unreadable {} entry {}: {}", namespace, key, e),
            }
        }
        Ok(values)
    }

    // Download records

    pub fn get(&self, song_id: &str) -> Result<Option<DownloadRecord>> {
        self.get_json(TRACKS_NAMESPACE, song_id)
    }

    pub fn put(&self, record: &DownloadRecord) -> Result<()> {
        self.put_json(TRACKS_NAMESPACE, &record.song_id, record)
    }

    /// All download records, ordered by song ID.
    pub fn records(&self) -> Result<Vec<DownloadRecord>> {
        self.scan_json(TRACKS_NAMESPACE)
    }

    // Migrations

    /// Applied migrations, ordered by ID.
    pub fn applied_migrations(&self) -> Result<Vec<MigrationRecord>> {
        self.scan_json(MIGRATIONS_NAMESPACE)
    }

    pub fn record_migration(&self, record: &MigrationRecord) -> Result<()> {
        self.put_json(MIGRATIONS_NAMESPACE, &MigrationRecord::key(record.id), record)
    }

    // Watched playlists

    pub fn save_watched(&self, playlist: &WatchedPlaylist) -> Result<()> {
        self.put_json(WATCHED_NAMESPACE, &playlist.id, playlist)
    }

    pub fn list_watched(&self) -> Result<Vec<WatchedPlaylist>> {
        self.scan_json(WATCHED_NAMESPACE)
    }

    /// Stop watching a playlist. Returns whether it was watched.
    pub fn remove_watched(&self, playlist_id: &str) -> Result<bool> {
        self.store.delete(WATCHED_NAMESPACE, playlist_id)
    }

    pub fn is_watched(&self, playlist_id: &str) -> Result<bool> {
        Ok(self.store.get(WATCHED_NAMESPACE, playlist_id)?.is_some())
    }
}
