//! Per-run download options.

use crate::catalog::Quality;
use crate::config::TransferConfig;
use crate::error::{Result, VaultError};
use crate::store::WatchedPlaylist;
use std::time::Duration;

/// Options of one download run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOptions {
    pub quality: Quality,
    /// Per-item transfer timeout.
    pub timeout: Duration,
    /// Look up tempo and key.
    pub bpm: bool,
    /// Look up genre.
    pub genre: bool,
    /// Fail items whose delivered format differs from `quality`.
    pub strict: bool,
    /// Maximum number of artist top tracks.
    pub limit: usize,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            quality: Quality::Best,
            timeout: TransferConfig::DEFAULT_ITEM_TIMEOUT,
            bpm: false,
            genre: false,
            strict: false,
            limit: TransferConfig::DEFAULT_ARTIST_LIMIT,
        }
    }
}

impl DownloadOptions {
    pub fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return Err(VaultError::Config {
                message: "timeout must be greater than zero".to_string(),
            });
        }
        if self.limit == 0 {
            return Err(VaultError::Config {
                message: "limit must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

impl From<&WatchedPlaylist> for DownloadOptions {
    fn from(playlist: &WatchedPlaylist) -> Self {
        Self {
            quality: playlist.quality,
            timeout: playlist.timeout(),
            bpm: playlist.bpm,
            genre: playlist.genre,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let opts = DownloadOptions::default();
        assert_eq!(opts.quality, Quality::Best);
        assert_eq!(opts.timeout, Duration::from_secs(120));
        assert_eq!(opts.limit, 100);
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_zero_values_rejected() {
        let opts = DownloadOptions {
            timeout: Duration::ZERO,
            ..Default::default()
        };
        assert!(matches!(opts.validate(), Err(VaultError::Config { .. })));

        let opts = DownloadOptions {
            limit: 0,
            ..Default::default()
        };
        assert!(opts.validate().is_err());
    }

    #[test]
    fn test_from_watched_playlist() {
        let playlist = WatchedPlaylist {
            id: "1".into(),
            quality: Quality::Mp3_320,
            bpm: true,
            genre: true,
            timeout_secs: 30,
        };
        let opts = DownloadOptions::from(&playlist);
        assert_eq!(opts.quality, Quality::Mp3_320);
        assert_eq!(opts.timeout, Duration::from_secs(30));
        assert!(opts.bpm && opts.genre && !opts.strict);
    }
}
