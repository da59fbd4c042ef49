//! Metadata enrichment from external lookup services.
//!
//! Tempo/key and genre lookups run as their own tasks while the media
//! transfer is in flight. Each task reports exactly one `Result` through a
//! oneshot channel; the downloader joins them once the file is on disk.
//!
//! Lookup failures never fail a download. Cancellation is silent, anything
//! else becomes a warning on the item.

mod genre;
mod tempo;

pub use genre::{format_genre, parse_genre_tags, LastFmGenreProvider};
pub use tempo::{find_song_link, parse_tempo_key, SongBpmProvider};

use crate::cancel::CancellationToken;
use crate::catalog::Song;
use crate::config::LookupConfig;
use crate::error::{Result, VaultError};
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Tempo and musical key of a track.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TempoKey {
    pub bpm: String,
    pub key: String,
}

/// What a lookup needs to know about a track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupQuery {
    pub artist: String,
    pub title: String,
    /// Title including the version, for services that list versions apart.
    pub full_title: String,
    pub duration_secs: u32,
}

impl From<&Song> for LookupQuery {
    fn from(song: &Song) -> Self {
        Self {
            artist: song.artist.clone(),
            title: song.title.clone(),
            full_title: song.display_title(),
            duration_secs: song.duration_secs,
        }
    }
}

/// A single external metadata source.
#[async_trait]
pub trait LookupProvider: Send + Sync {
    type Output: Send + 'static;

    /// Short label used in warnings, e.g. "BPM and key".
    fn name(&self) -> &'static str;

    async fn lookup(&self, query: &LookupQuery) -> Result<Self::Output>;
}

/// A lookup running on its own task.
///
/// Dropping it aborts the task.
pub struct PendingLookup<T> {
    name: &'static str,
    rx: oneshot::Receiver<Result<T>>,
    handle: JoinHandle<()>,
}

impl<T> Drop for PendingLookup<T> {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl<T: Send + 'static> PendingLookup<T> {
    /// Wait for the single result of the lookup.
    ///
    /// Failures other than cancellation are pushed onto `warnings`.
    pub async fn join(mut self, warnings: &mut Vec<String>) -> Option<T> {
        let outcome = match (&mut self.rx).await {
            Ok(outcome) => outcome,
            Err(_) => Err(VaultError::Other("lookup task ended without a result".into())),
        };

        match outcome {
            Ok(value) => Some(value),
            Err(e) if e.is_cancelled() => {
                debug!("{} lookup cancelled", self.name);
                None
            }
            Err(e) => {
                let message = format!("failed to fetch {}: {}", self.name, e);
                warn!("{}", message);
                warnings.push(message);
                None
            }
        }
    }
}

/// Start `provider` on a new task, bounded by `timeout` and `cancel`.
pub fn spawn_lookup<T: Send + 'static>(
    provider: Arc<dyn LookupProvider<Output = T>>,
    query: LookupQuery,
    timeout: Duration,
    cancel: CancellationToken,
) -> PendingLookup<T> {
    let (tx, rx) = oneshot::channel();
    let name = provider.name();

    let handle = tokio::spawn(async move {
        let outcome = tokio::select! {
            _ = cancel.cancelled() => Err(VaultError::Cancelled),
            result = tokio::time::timeout(timeout, provider.lookup(&query)) => {
                result.unwrap_or(Err(VaultError::Timeout(timeout)))
            }
        };
        // The receiver is gone only if the download was abandoned.
        let _ = tx.send(outcome);
    });

    PendingLookup { name, rx, handle }
}

/// Lookups started for one item.
pub struct EnrichmentHandle {
    tempo: Option<PendingLookup<TempoKey>>,
    genre: Option<PendingLookup<String>>,
}

/// Joined lookup results for one item.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Enrichment {
    pub tempo: Option<TempoKey>,
    pub genre: Option<String>,
    pub warnings: Vec<String>,
}

impl EnrichmentHandle {
    pub async fn join(self) -> Enrichment {
        let mut enrichment = Enrichment::default();
        if let Some(tempo) = self.tempo {
            enrichment.tempo = tempo.join(&mut enrichment.warnings).await;
        }
        if let Some(genre) = self.genre {
            enrichment.genre = genre.join(&mut enrichment.warnings).await;
        }
        enrichment
    }
}

/// Owns the lookup providers and starts them per item.
pub struct Enricher {
    tempo: Arc<dyn LookupProvider<Output = TempoKey>>,
    genre: Arc<dyn LookupProvider<Output = String>>,
    timeout: Duration,
}

impl Enricher {
    /// Enricher over the public web services.
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(LookupConfig::REQUEST_TIMEOUT)
            .user_agent(LookupConfig::USER_AGENT)
            .build()
            .map_err(|e| VaultError::Network {
                message: format!("Failed to create lookup HTTP client: {}", e),
                source: Some(e),
            })?;

        Ok(Self::with_providers(
            Arc::new(SongBpmProvider::new(client.clone())),
            Arc::new(LastFmGenreProvider::new(client)),
        ))
    }

    pub fn with_providers(
        tempo: Arc<dyn LookupProvider<Output = TempoKey>>,
        genre: Arc<dyn LookupProvider<Output = String>>,
    ) -> Self {
        Self {
            tempo,
            genre,
            timeout: LookupConfig::REQUEST_TIMEOUT,
        }
    }

    /// Bound every lookup by `timeout` in addition to the HTTP timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Start the enabled lookups for `song`.
    pub fn start(
        &self,
        song: &Song,
        bpm: bool,
        genre: bool,
        cancel: &CancellationToken,
    ) -> EnrichmentHandle {
        let query = LookupQuery::from(song);
        EnrichmentHandle {
            tempo: bpm.then(|| {
                spawn_lookup(
                    Arc::clone(&self.tempo),
                    query.clone(),
                    self.timeout,
                    cancel.clone(),
                )
            }),
            genre: genre.then(|| {
                spawn_lookup(
                    Arc::clone(&self.genre),
                    query.clone(),
                    self.timeout,
                    cancel.clone(),
                )
            }),
        }
    }
}

/// Fetch a page and return its body, mapping non-200 to an error.
pub(crate) async fn fetch_html(request: reqwest::RequestBuilder) -> Result<String> {
    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(VaultError::UnexpectedStatus(status.as_u16()));
    }
    Ok(response.text().await?)
}
