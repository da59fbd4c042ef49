//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncRead, ReadBuf};
use tunevault::cipher;
use tunevault::config::TransferConfig;
use tunevault::enrichment::{Enricher, LookupProvider, LookupQuery, TempoKey};
use tunevault::{
    CatalogClient, DownloadLedger, Downloader, DownloaderBuilder, MediaDescriptor, MediaFormat,
    MediaStream, Quality, Resource, ResourceKind, Result, Session, Song, TagWriter, TrackTags,
    VaultError,
};

pub const SECRET: &str = "g4el58wc0zvf9na1";

/// Deterministic plaintext payload for a song.
pub fn payload(seed: u8) -> Vec<u8> {
    (0..TransferConfig::WINDOW_SIZE * 4 + 123)
        .map(|i| (i as u8).wrapping_mul(7).wrapping_add(seed))
        .collect()
}

/// Encrypt every third full window, as the catalog serves media.
pub fn stripe_encrypt(plain: &[u8], song_id: &str) -> Vec<u8> {
    let key = cipher::derive_key(SECRET.as_bytes(), song_id).unwrap();
    let mut out = plain.to_vec();
    for (index, window) in out.chunks_mut(TransferConfig::WINDOW_SIZE).enumerate() {
        if index % TransferConfig::STRIPE_PERIOD == 0 && window.len() == TransferConfig::WINDOW_SIZE
        {
            cipher::encrypt(window, &key).unwrap();
        }
    }
    out
}

pub fn song(id: &str, title: &str, track: u32) -> Song {
    Song {
        id: id.into(),
        title: title.into(),
        artist: "Daft Punk".into(),
        album: "Homework".into(),
        track_number: Some(track),
        duration_secs: 200 + track,
        ..Default::default()
    }
}

/// Serves bytes, then never completes another read.
struct StallAfter {
    data: Vec<u8>,
    pos: usize,
}

impl AsyncRead for StallAfter {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.pos >= self.data.len() {
            return Poll::Pending;
        }
        let end = (self.pos + buf.remaining()).min(self.data.len());
        buf.put_slice(&self.data[self.pos..end]);
        self.pos = end;
        Poll::Ready(Ok(()))
    }
}

/// In-process catalog with striped-encrypted media.
#[derive(Default)]
pub struct FakeCatalog {
    pub premium: bool,
    resources: Mutex<HashMap<(ResourceKind, String), Resource>>,
    payloads: Mutex<HashMap<String, Vec<u8>>>,
    delivered: Mutex<HashMap<String, MediaFormat>>,
    stalled: Mutex<HashSet<String>>,
    pub stream_opens: AtomicUsize,
}

impl FakeCatalog {
    pub fn new() -> Self {
        Self {
            premium: true,
            ..Default::default()
        }
    }

    pub fn free() -> Self {
        Self::default()
    }

    pub fn add_resource(&self, kind: ResourceKind, id: &str, name: &str, songs: Vec<Song>) {
        self.add_resource_by(kind, id, name, "Daft Punk", songs);
    }

    pub fn add_resource_by(
        &self,
        kind: ResourceKind,
        id: &str,
        name: &str,
        artist: &str,
        songs: Vec<Song>,
    ) {
        for (i, song) in songs.iter().enumerate() {
            self.payloads
                .lock()
                .unwrap()
                .entry(song.id.clone())
                .or_insert_with(|| payload(i as u8 + 1));
        }
        let resource = Resource {
            kind,
            id: id.into(),
            name: name.into(),
            artist: artist.into(),
            songs,
        };
        self.resources
            .lock()
            .unwrap()
            .insert((kind, id.to_string()), resource);
    }

    pub fn payload_of(&self, song_id: &str) -> Vec<u8> {
        self.payloads.lock().unwrap()[song_id].clone()
    }

    /// Deliver `format` for this song regardless of the request.
    pub fn deliver(&self, song_id: &str, format: MediaFormat) {
        self.delivered
            .lock()
            .unwrap()
            .insert(song_id.into(), format);
    }

    /// Stall this song's stream after its first window.
    pub fn stall(&self, song_id: &str) {
        self.stalled.lock().unwrap().insert(song_id.into());
    }

    pub fn opens(&self) -> usize {
        self.stream_opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CatalogClient for FakeCatalog {
    async fn authenticate(&self, credential: &str) -> Result<Session> {
        if credential == "bad" {
            return Err(VaultError::Authentication {
                message: "invalid arl".into(),
            });
        }
        Ok(Session {
            premium: self.premium,
            license_token: "token".into(),
        })
    }

    async fn fetch_resource(
        &self,
        _session: &Session,
        kind: ResourceKind,
        id: &str,
    ) -> Result<Resource> {
        self.resources
            .lock()
            .unwrap()
            .get(&(kind, id.to_string()))
            .cloned()
            .ok_or_else(|| VaultError::NotFound(format!("{} {}", kind, id)))
    }

    async fn fetch_media(
        &self,
        _session: &Session,
        song: &Song,
        quality: Quality,
    ) -> Result<MediaDescriptor> {
        let format = self
            .delivered
            .lock()
            .unwrap()
            .get(&song.id)
            .copied()
            .unwrap_or(quality.format_priority()[0]);
        Ok(MediaDescriptor {
            format,
            source_url: format!("fake://{}", song.id),
        })
    }

    async fn open_media_stream(&self, media: &MediaDescriptor) -> Result<MediaStream> {
        self.stream_opens.fetch_add(1, Ordering::SeqCst);
        let id = media.source_url.trim_start_matches("fake://");
        let plain = self
            .payloads
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| VaultError::NotFound(id.to_string()))?;
        let encrypted = stripe_encrypt(&plain, id);

        if self.stalled.lock().unwrap().contains(id) {
            let first = encrypted[..TransferConfig::WINDOW_SIZE + 100].to_vec();
            return Ok(Box::new(StallAfter { data: first, pos: 0 }));
        }
        Ok(Box::new(io::Cursor::new(encrypted)))
    }

    async fn fetch_cover_art(&self, _song: &Song) -> Result<Vec<u8>> {
        Ok(b"cover".to_vec())
    }
}

/// Tag writer that records what it was asked to write.
#[derive(Default)]
pub struct RecordingTags {
    pub written: Mutex<Vec<(PathBuf, TrackTags)>>,
}

impl TagWriter for RecordingTags {
    fn write_tags(&self, path: &Path, tags: &TrackTags) -> Result<()> {
        self.written
            .lock()
            .unwrap()
            .push((path.to_path_buf(), tags.clone()));
        Ok(())
    }
}

pub struct FixedTempo;

#[async_trait]
impl LookupProvider for FixedTempo {
    type Output = TempoKey;

    fn name(&self) -> &'static str {
        "BPM and key"
    }

    async fn lookup(&self, _query: &LookupQuery) -> Result<TempoKey> {
        Ok(TempoKey {
            bpm: "124".into(),
            key: "F#m".into(),
        })
    }
}

pub struct MissingGenre;

#[async_trait]
impl LookupProvider for MissingGenre {
    type Output = String;

    fn name(&self) -> &'static str {
        "genre"
    }

    async fn lookup(&self, _query: &LookupQuery) -> Result<String> {
        Err(VaultError::NoDataFound)
    }
}

/// A library root, its ledger and a downloader over a fake catalog.
pub struct Harness {
    pub temp: TempDir,
    pub root: PathBuf,
    pub catalog: Arc<FakeCatalog>,
    pub ledger: Arc<DownloadLedger>,
    pub tags: Arc<RecordingTags>,
    pub downloader: Arc<Downloader>,
}

impl Harness {
    pub fn new(catalog: FakeCatalog) -> Self {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("library");
        let catalog = Arc::new(catalog);
        let ledger = Arc::new(DownloadLedger::open(temp.path().join("tracks.db")).unwrap());
        let tags = Arc::new(RecordingTags::default());

        let enricher = Enricher::with_providers(Arc::new(FixedTempo), Arc::new(MissingGenre))
            .with_timeout(Duration::from_secs(5));
        let downloader = DownloaderBuilder::new(
            Arc::clone(&catalog) as Arc<dyn CatalogClient>,
            Arc::clone(&ledger),
            &root,
            SECRET,
        )
        .credential("arl")
        .tag_writer(Arc::clone(&tags) as Arc<dyn TagWriter>)
        .enricher(enricher)
        .build()
        .unwrap();

        Self {
            temp,
            root,
            catalog,
            ledger,
            tags,
            downloader: Arc::new(downloader),
        }
    }
}
