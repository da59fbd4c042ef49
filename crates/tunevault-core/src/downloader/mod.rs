//! Download orchestration.
//!
//! A run authenticates once, fetches the requested resource and walks its
//! songs one at a time. Each song moves through
//! `media resolution -> strict check -> skip check -> transfer (+ lookups)
//! -> finalize`. Item failures are recorded and the run moves on; fatal
//! errors and cancellation end the run.

mod options;
mod playlist_file;
mod skip;
mod transfer;

pub use options::DownloadOptions;
pub use playlist_file::{relative_path, render_m3u, write_m3u, PlaylistEntry};
pub use skip::SkipDecider;
pub use transfer::stream_to_file;

use crate::cancel::CancellationToken;
use crate::catalog::{
    CatalogClient, MediaDescriptor, MediaFormat, Resource, ResourceKind, Session, Song,
};
use crate::cipher;
use crate::config::CipherConfig;
use crate::enrichment::Enricher;
use crate::error::{Result, VaultError};
use crate::hashing::hash_file_async;
use crate::store::{DownloadLedger, DownloadRecord};
use crate::tags::{LoftyTags, TagWriter, TrackTags};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Terminal state of one item.
#[derive(Debug)]
pub enum ItemOutcome {
    Downloaded {
        path: PathBuf,
        format: MediaFormat,
        warnings: Vec<String>,
    },
    /// Already on disk; nothing was transferred.
    Skipped { path: PathBuf },
    Failed { error: VaultError },
}

impl ItemOutcome {
    /// Where the item lives on disk, if anywhere.
    pub fn path(&self) -> Option<&Path> {
        match self {
            ItemOutcome::Downloaded { path, .. } | ItemOutcome::Skipped { path } => Some(path),
            ItemOutcome::Failed { .. } => None,
        }
    }
}

/// Outcome of one song of a run.
#[derive(Debug)]
pub struct ItemReport {
    pub song_id: String,
    pub artist: String,
    pub title: String,
    pub outcome: ItemOutcome,
}

/// Result of downloading one resource.
#[derive(Debug)]
pub struct RunSummary {
    pub resource_id: String,
    pub kind: ResourceKind,
    pub title: String,
    pub output_dir: PathBuf,
    pub items: Vec<ItemReport>,
    pub playlist_file: Option<PathBuf>,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn downloaded(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Downloaded { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Failed { .. }))
    }

    fn count(&self, pred: impl Fn(&ItemOutcome) -> bool) -> usize {
        self.items.iter().filter(|item| pred(&item.outcome)).count()
    }
}

/// Builder for [`Downloader`].
///
/// # Example
///
/// ```rust,ignore
/// let downloader = DownloaderBuilder::new(catalog, ledger, "/music", settings.secret_key)
///     .credential(settings.arl_cookie)
///     .build()?;
/// ```
pub struct DownloaderBuilder {
    catalog: Arc<dyn CatalogClient>,
    ledger: Arc<DownloadLedger>,
    output_root: PathBuf,
    secret_key: Vec<u8>,
    credential: String,
    tag_writer: Option<Arc<dyn TagWriter>>,
    enricher: Option<Enricher>,
}

impl DownloaderBuilder {
    pub fn new(
        catalog: Arc<dyn CatalogClient>,
        ledger: Arc<DownloadLedger>,
        output_root: impl Into<PathBuf>,
        secret_key: impl AsRef<[u8]>,
    ) -> Self {
        Self {
            catalog,
            ledger,
            output_root: output_root.into(),
            secret_key: secret_key.as_ref().to_vec(),
            credential: String::new(),
            tag_writer: None,
            enricher: None,
        }
    }

    /// Session credential passed to [`CatalogClient::authenticate`].
    pub fn credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = credential.into();
        self
    }

    /// Default: [`LoftyTags`].
    pub fn tag_writer(mut self, tag_writer: Arc<dyn TagWriter>) -> Self {
        self.tag_writer = Some(tag_writer);
        self
    }

    /// Default: [`Enricher::new`] over the public lookup services.
    pub fn enricher(mut self, enricher: Enricher) -> Self {
        self.enricher = Some(enricher);
        self
    }

    pub fn build(self) -> Result<Downloader> {
        let secret_key: [u8; CipherConfig::SECRET_KEY_LEN] =
            self.secret_key
                .as_slice()
                .try_into()
                .map_err(|_| VaultError::Config {
                    message: format!(
                        "secret key must be {} bytes, got {}",
                        CipherConfig::SECRET_KEY_LEN,
                        self.secret_key.len()
                    ),
                })?;

        let enricher = match self.enricher {
            Some(enricher) => enricher,
            None => Enricher::new()?,
        };

        Ok(Downloader {
            catalog: self.catalog,
            ledger: self.ledger,
            output_root: self.output_root,
            secret_key,
            credential: self.credential,
            tag_writer: self
                .tag_writer
                .unwrap_or_else(|| Arc::new(LoftyTags::new())),
            enricher,
        })
    }
}

/// Drives downloads of catalog resources into the library tree.
pub struct Downloader {
    catalog: Arc<dyn CatalogClient>,
    ledger: Arc<DownloadLedger>,
    output_root: PathBuf,
    secret_key: [u8; CipherConfig::SECRET_KEY_LEN],
    credential: String,
    tag_writer: Arc<dyn TagWriter>,
    enricher: Enricher,
}

/// Per-run state shared by every item.
struct RunContext<'a> {
    session: Session,
    opts: &'a DownloadOptions,
    skip: SkipDecider,
    cancel: &'a CancellationToken,
}

impl Downloader {
    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    pub fn ledger(&self) -> &Arc<DownloadLedger> {
        &self.ledger
    }

    /// Download every resource in `ids`, in order.
    ///
    /// The first error stops the run. Item failures are not errors; they are
    /// reported in the returned summaries.
    pub async fn run(
        &self,
        opts: &DownloadOptions,
        kind: ResourceKind,
        ids: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<RunSummary>> {
        opts.validate()?;
        let session = self.authenticate(cancel).await?;

        if !session.premium && opts.quality.requires_premium() {
            return Err(VaultError::PremiumRequired {
                quality: opts.quality.to_string(),
            });
        }

        let ctx = RunContext {
            session,
            opts,
            skip: SkipDecider::new(Arc::clone(&self.ledger), &self.output_root),
            cancel,
        };

        let mut summaries = Vec::with_capacity(ids.len());
        for id in ids {
            cancel.check()?;
            summaries.push(self.run_resource(&ctx, kind, id).await?);
        }
        Ok(summaries)
    }

    async fn authenticate(&self, cancel: &CancellationToken) -> Result<Session> {
        let result = cancel
            .run_until_cancelled(self.catalog.authenticate(&self.credential))
            .await
            .ok_or(VaultError::Cancelled)?;

        match result {
            Ok(session) => {
                debug!("Authenticated (premium: {})", session.premium);
                Ok(session)
            }
            Err(e @ (VaultError::Cancelled | VaultError::Authentication { .. })) => Err(e),
            Err(e) => Err(VaultError::Authentication {
                message: e.to_string(),
            }),
        }
    }

    async fn fetch_resource(
        &self,
        ctx: &RunContext<'_>,
        kind: ResourceKind,
        id: &str,
    ) -> Result<Resource> {
        let result = ctx
            .cancel
            .run_until_cancelled(self.catalog.fetch_resource(&ctx.session, kind, id))
            .await
            .ok_or(VaultError::Cancelled)?;

        let mut resource = result.map_err(|e| match e {
            VaultError::Cancelled => VaultError::Cancelled,
            other => VaultError::ResourceUnavailable {
                id: id.to_string(),
                message: other.to_string(),
            },
        })?;

        if resource.songs().is_empty() {
            return Err(VaultError::EmptyResource {
                kind: kind.to_string(),
                id: id.to_string(),
            });
        }

        if kind == ResourceKind::Artist && resource.songs().len() > ctx.opts.limit {
            let mut songs = resource.songs().to_vec();
            songs.truncate(ctx.opts.limit);
            resource.set_songs(songs);
        }

        Ok(resource)
    }

    async fn run_resource(
        &self,
        ctx: &RunContext<'_>,
        kind: ResourceKind,
        id: &str,
    ) -> Result<RunSummary> {
        let resource = self.fetch_resource(ctx, kind, id).await?;

        let output_dir = resource.output_dir(&self.output_root);
        tokio::fs::create_dir_all(&output_dir).await.map_err(|e| VaultError::Io {
            message: format!("Failed to create output directory: {}", e),
            path: Some(output_dir.clone()),
            source: Some(e),
        })?;

        let started = Instant::now();
        let total = resource.songs().len();
        info!(
            "Downloading {} '{}' ({} songs)",
            kind,
            resource.title(),
            total
        );

        let mut items = Vec::with_capacity(total);
        for (index, song) in resource.songs().iter().enumerate() {
            ctx.cancel.check()?;

            let progress = format!("[{}/{}]", index + 1, total);
            let outcome = match self.download_song(ctx, &resource, song).await {
                Ok(outcome) => outcome,
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => ItemOutcome::Failed { error: e },
            };
            log_outcome(&progress, song, &outcome);

            items.push(ItemReport {
                song_id: song.id.clone(),
                artist: song.artist.clone(),
                title: song.display_title(),
                outcome,
            });
        }

        let mut summary = RunSummary {
            resource_id: id.to_string(),
            kind,
            title: resource.title().to_string(),
            output_dir,
            items,
            playlist_file: None,
            elapsed: started.elapsed(),
        };

        info!(
            "{} '{}' ({}): {} downloaded, {} skipped, {} failed in {:.1?}",
            kind,
            summary.title,
            id,
            summary.downloaded(),
            summary.skipped(),
            summary.failed(),
            summary.elapsed
        );

        if kind == ResourceKind::Playlist && summary.downloaded() > 0 {
            summary.playlist_file = self.write_playlist(&resource, &summary).await;
        }

        Ok(summary)
    }

    async fn write_playlist(&self, resource: &Resource, summary: &RunSummary) -> Option<PathBuf> {
        let entries: Vec<PlaylistEntry> = resource
            .songs()
            .iter()
            .zip(&summary.items)
            .filter_map(|(song, item)| {
                item.outcome.path().map(|path| PlaylistEntry {
                    duration_secs: song.duration_secs,
                    artist: song.artist.clone(),
                    title: song.display_title(),
                    path: path.to_path_buf(),
                })
            })
            .collect();

        match write_m3u(&summary.output_dir, resource.title(), &entries).await {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("Failed to create M3U playlist: {}", e);
                None
            }
        }
    }

    /// Take one song from media resolution to a ledger record.
    ///
    /// `Err` means the item failed, or the run was cancelled.
    async fn download_song(
        &self,
        ctx: &RunContext<'_>,
        resource: &Resource,
        song: &Song,
    ) -> Result<ItemOutcome> {
        let quality = ctx.opts.quality;

        let media = ctx
            .cancel
            .run_until_cancelled(self.catalog.fetch_media(&ctx.session, song, quality))
            .await
            .ok_or(VaultError::Cancelled)?
            .map_err(|e| match e {
                kept @ (VaultError::Cancelled | VaultError::MediaResolution { .. }) => kept,
                other => VaultError::MediaResolution {
                    message: other.to_string(),
                },
            })?;
        debug!("Song {} resolved to {}", song.id, media.format);

        if ctx.opts.strict && !quality.accepts(media.format) {
            return Err(VaultError::QualityUnavailable {
                requested: quality.to_string(),
            });
        }

        if let Some(path) = ctx.skip.should_skip(&song.id, media.format, ctx.cancel).await? {
            return Ok(ItemOutcome::Skipped { path });
        }

        let mut warnings = Vec::new();
        if !quality.accepts(media.format) {
            warnings.push(format!(
                "requested quality '{}' not available, using '{}' instead",
                quality, media.format
            ));
        }

        let mut tags = TrackTags::for_song(resource, song);
        let output_path = tags.organized_path(&self.output_root, media.format.extension());
        if let Some(parent) = output_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| VaultError::io_with_path(e, parent))?;
        }

        let lookups = self
            .enricher
            .start(song, ctx.opts.bpm, ctx.opts.genre, ctx.cancel);

        if let Err(e) = self.transfer(ctx, song, &media, &output_path).await {
            remove_partial(&output_path).await;
            return Err(e);
        }

        let enrichment = lookups.join().await;
        warnings.extend(enrichment.warnings);

        if let Some(tempo) = enrichment.tempo {
            tags.bpm = Some(tempo.bpm);
            tags.key = Some(tempo.key);
        }
        tags.genre = enrichment.genre;
        tags.cover = self.fetch_cover(song, ctx.cancel, &mut warnings).await;

        self.finalize(song, media.format, &output_path, tags, &mut warnings)
            .await;

        Ok(ItemOutcome::Downloaded {
            path: output_path,
            format: media.format,
            warnings,
        })
    }

    /// Open the media stream and decrypt it to `dest` under the item timeout.
    async fn transfer(
        &self,
        ctx: &RunContext<'_>,
        song: &Song,
        media: &MediaDescriptor,
        dest: &Path,
    ) -> Result<u64> {
        let key = cipher::derive_key(&self.secret_key, &song.id)?;
        let timeout = ctx.opts.timeout;

        let transfer = async {
            let mut stream = self.catalog.open_media_stream(media).await?;
            stream_to_file(&mut stream, dest, &key, ctx.cancel).await
        };

        ctx.cancel
            .run_until_cancelled(tokio::time::timeout(timeout, transfer))
            .await
            .ok_or(VaultError::Cancelled)?
            .map_err(|_| VaultError::Timeout(timeout))?
    }

    async fn fetch_cover(
        &self,
        song: &Song,
        cancel: &CancellationToken,
        warnings: &mut Vec<String>,
    ) -> Option<Vec<u8>> {
        match cancel
            .run_until_cancelled(self.catalog.fetch_cover_art(song))
            .await
        {
            Some(Ok(cover)) => Some(cover),
            Some(Err(e)) if !e.is_cancelled() => {
                warnings.push(format!("failed to fetch cover image: {}", e));
                None
            }
            _ => None,
        }
    }

    /// Tag, hash and record a finished file. Every failure here is a warning.
    async fn finalize(
        &self,
        song: &Song,
        format: MediaFormat,
        path: &Path,
        tags: TrackTags,
        warnings: &mut Vec<String>,
    ) {
        let writer = Arc::clone(&self.tag_writer);
        let tag_path = path.to_path_buf();
        let tagged = tokio::task::spawn_blocking(move || writer.write_tags(&tag_path, &tags))
            .await
            .map_err(|e| VaultError::Other(format!("Tag task failed: {}", e)))
            .and_then(|result| result);
        if let Err(e) = tagged {
            warnings.push(format!("failed to add tags: {}", e));
        }

        let hash = match hash_file_async(path).await {
            Ok(hash) => hash,
            Err(e) => {
                warnings.push(format!("failed to get file hash: {}", e));
                String::new()
            }
        };

        let record = DownloadRecord::new(&song.id, format, path, hash);
        if let Err(e) = self.ledger.put(&record) {
            warnings.push(format!("failed to save download info: {}", e));
        }
    }
}

async fn remove_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed partial file {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove partial file {}: {}", path.display(), e),
    }
}

fn log_outcome(progress: &str, song: &Song, outcome: &ItemOutcome) {
    match outcome {
        ItemOutcome::Downloaded { warnings, .. } => {
            info!("{} Downloaded: {} - {}", progress, song.artist, song.title);
            for warning in warnings {
                warn!("{} {} - {}: {}", progress, song.artist, song.title, warning);
            }
        }
        ItemOutcome::Skipped { path } => {
            info!(
                "{} Skipped: {} - {} (already at {})",
                progress,
                song.artist,
                song.title,
                path.display()
            );
        }
        ItemOutcome::Failed { error: e } => {
            error!(
                "{} Failed: {} - {}: {}",
                progress, song.artist, song.title, e
            );
        }
    }
}
