//! Periodic download of watched playlists.

use crate::cancel::CancellationToken;
use crate::catalog::ResourceKind;
use crate::config::WatchConfig;
use crate::downloader::{DownloadOptions, Downloader, RunSummary};
use crate::error::{Result, VaultError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Polls every watched playlist and downloads new songs.
pub struct PlaylistWatcher {
    downloader: Arc<Downloader>,
    interval: Duration,
}

impl PlaylistWatcher {
    pub fn new(downloader: Arc<Downloader>) -> Self {
        Self {
            downloader,
            interval: WatchConfig::POLL_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Download each watched playlist once, with its stored options.
    ///
    /// A failing playlist is logged and does not stop the others; only
    /// cancellation ends the pass early.
    pub async fn poll_once(&self, cancel: &CancellationToken) -> Result<Vec<RunSummary>> {
        let playlists = self.downloader.ledger().list_watched()?;
        let mut summaries = Vec::new();

        for playlist in playlists {
            cancel.check()?;
            let opts = DownloadOptions::from(&playlist);
            let ids = [playlist.id.clone()];

            match self
                .downloader
                .run(&opts, ResourceKind::Playlist, &ids, cancel)
                .await
            {
                Ok(runs) => summaries.extend(runs),
                Err(VaultError::Cancelled) => return Err(VaultError::Cancelled),
                Err(e) => error!("Playlist {}: {}", playlist.id, e),
            }
        }

        Ok(summaries)
    }

    /// Poll until cancelled.
    pub async fn run(&self, cancel: &CancellationToken) {
        info!(
            "Starting watcher (every {} minutes)",
            self.interval.as_secs() / 60
        );

        loop {
            match self.poll_once(cancel).await {
                Ok(_) => {}
                Err(e) if e.is_cancelled() => break,
                Err(e) => error!("Failed to list watched playlists: {}", e),
            }

            if cancel
                .run_until_cancelled(tokio::time::sleep(self.interval))
                .await
                .is_none()
            {
                break;
            }
        }

        info!("Watcher stopped");
    }
}
