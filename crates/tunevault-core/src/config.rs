//! Centralized configuration for tunevault.
//!
//! Protocol and engine constants live in unit structs; user settings are read
//! from a JSON file in the application directory.

use crate::error::{Result, VaultError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Constants of the striped Blowfish scheme used by the catalog.
pub struct CipherConfig;

impl CipherConfig {
    /// Length of the shared secret and of every derived item key.
    pub const SECRET_KEY_LEN: usize = 16;
    /// Blowfish block size in bytes.
    pub const BLOCK_SIZE: usize = 8;
    /// Public CBC initialization vector of the protocol.
    pub const STRIPE_IV: [u8; 8] = [0, 1, 2, 3, 4, 5, 6, 7];
}

/// Streaming transfer configuration.
pub struct TransferConfig;

impl TransferConfig {
    /// Size of one window of the media stream.
    pub const WINDOW_SIZE: usize = 2048;
    /// Every `STRIPE_PERIOD`-th full window is encrypted, starting at window 0.
    pub const STRIPE_PERIOD: usize = 3;
    pub const DEFAULT_ITEM_TIMEOUT: Duration = Duration::from_secs(120);
    pub const DEFAULT_ARTIST_LIMIT: usize = 100;
}

/// External metadata lookup configuration.
pub struct LookupConfig;

impl LookupConfig {
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);
    pub const USER_AGENT: &'static str = "tunevault/0.3";
    pub const TEMPO_ROOT_URL: &'static str = "https://songbpm.com";
    pub const GENRE_ROOT_URL: &'static str = "https://www.last.fm/music";
    /// Accepted difference between catalog and lookup durations.
    pub const DURATION_TOLERANCE_SECS: i64 = 2;
    /// Maximum number of genre tags joined into the genre field.
    pub const MAX_GENRE_TAGS: usize = 2;
}

/// Directory and file names.
pub struct PathsConfig;

impl PathsConfig {
    pub const APP_DIR_NAME: &'static str = ".tunevault";
    pub const LEDGER_FILE_NAME: &'static str = "tracks.db";
    pub const SETTINGS_FILE_NAME: &'static str = "config.json";
    pub const DEFAULT_MUSIC_DIR_NAME: &'static str = "TuneVault";
    pub const SINGLES_DIR_NAME: &'static str = "Singles";
    pub const PLAYLISTS_DIR_NAME: &'static str = "Playlists";
    pub const UNKNOWN_ALBUM: &'static str = "Unknown Album";
    pub const PLAYLIST_FILE_EXTENSION: &'static str = "m3u";
}

/// Watched playlist polling.
pub struct WatchConfig;

impl WatchConfig {
    pub const POLL_INTERVAL: Duration = Duration::from_secs(15 * 60);
}

/// User settings loaded from `config.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    /// Session credential for the catalog.
    pub arl_cookie: String,
    /// Shared secret combined with each item ID to derive its key.
    pub secret_key: String,
    /// Root of the downloaded library.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

impl AppSettings {
    /// Default application directory (`~/.tunevault`).
    pub fn default_app_dir() -> Result<PathBuf> {
        dirs::home_dir()
            .map(|home| home.join(PathsConfig::APP_DIR_NAME))
            .ok_or_else(|| VaultError::Config {
                message: "Could not determine home directory".to_string(),
            })
    }

    /// Load and validate settings from `{app_dir}/config.json`.
    pub fn load(app_dir: &Path) -> Result<Self> {
        let path = app_dir.join(PathsConfig::SETTINGS_FILE_NAME);
        let contents = std::fs::read_to_string(&path).map_err(|e| VaultError::Config {
            message: format!("Failed to read settings {}: {}", path.display(), e),
        })?;
        let settings: AppSettings =
            serde_json::from_str(&contents).map_err(|e| VaultError::Config {
                message: format!("Failed to parse settings {}: {}", path.display(), e),
            })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check fields that would otherwise fail deep inside a run.
    pub fn validate(&self) -> Result<()> {
        if self.arl_cookie.trim().is_empty() {
            return Err(VaultError::Config {
                message: "arl_cookie is not set".to_string(),
            });
        }
        self.secret_key_bytes()?;
        Ok(())
    }

    /// The shared secret as a fixed-size key.
    pub fn secret_key_bytes(&self) -> Result<[u8; CipherConfig::SECRET_KEY_LEN]> {
        self.secret_key
            .as_bytes()
            .try_into()
            .map_err(|_| VaultError::Config {
                message: format!(
                    "secret_key must be exactly {} bytes, got {}",
                    CipherConfig::SECRET_KEY_LEN,
                    self.secret_key.len()
                ),
            })
    }

    /// Library root, falling back to `~/Music/TuneVault`.
    pub fn output_root(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.output_dir {
            return Ok(dir.clone());
        }
        dirs::home_dir()
            .map(|home| home.join("Music").join(PathsConfig::DEFAULT_MUSIC_DIR_NAME))
            .ok_or_else(|| VaultError::Config {
                message: "Could not determine home directory".to_string(),
            })
    }
}
