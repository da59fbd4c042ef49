//! Catalog model and the protocol client seam.
//!
//! The HTTP protocol of the streaming catalog is not implemented here. The
//! downloader talks to it through [`CatalogClient`], and the rest of the crate
//! only sees the plain data types below.

use crate::config::PathsConfig;
use crate::error::{Result, VaultError};
use crate::naming::sanitize_component;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio::io::AsyncRead;

/// Encoded format actually delivered for an item.
///
/// This is the quality label persisted in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaFormat {
    #[serde(rename = "mp3_128")]
    Mp3_128,
    #[serde(rename = "mp3_320")]
    Mp3_320,
    #[serde(rename = "flac")]
    Flac,
}

impl MediaFormat {
    pub fn label(&self) -> &'static str {
        match self {
            MediaFormat::Mp3_128 => "mp3_128",
            MediaFormat::Mp3_320 => "mp3_320",
            MediaFormat::Flac => "flac",
        }
    }

    /// File extension, without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            MediaFormat::Mp3_128 | MediaFormat::Mp3_320 => "mp3",
            MediaFormat::Flac => "flac",
        }
    }
}

impl fmt::Display for MediaFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Quality requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    #[serde(rename = "mp3_128")]
    Mp3_128,
    #[serde(rename = "mp3_320")]
    Mp3_320,
    Flac,
    #[default]
    Best,
}

impl Quality {
    pub fn label(&self) -> &'static str {
        match self {
            Quality::Mp3_128 => "mp3_128",
            Quality::Mp3_320 => "mp3_320",
            Quality::Flac => "flac",
            Quality::Best => "best",
        }
    }

    /// Whether a free session is refused this quality outright.
    pub fn requires_premium(&self) -> bool {
        matches!(self, Quality::Mp3_320 | Quality::Flac)
    }

    /// Formats the server may deliver, most preferred first.
    pub fn format_priority(&self) -> &'static [MediaFormat] {
        match self {
            Quality::Mp3_128 => &[MediaFormat::Mp3_128],
            Quality::Mp3_320 => &[MediaFormat::Mp3_320],
            Quality::Flac => &[MediaFormat::Flac],
            Quality::Best => &[
                MediaFormat::Flac,
                MediaFormat::Mp3_320,
                MediaFormat::Mp3_128,
            ],
        }
    }

    /// The exact format this quality names, `None` for `best`.
    pub fn exact_format(&self) -> Option<MediaFormat> {
        match self {
            Quality::Mp3_128 => Some(MediaFormat::Mp3_128),
            Quality::Mp3_320 => Some(MediaFormat::Mp3_320),
            Quality::Flac => Some(MediaFormat::Flac),
            Quality::Best => None,
        }
    }

    /// Whether a delivered format honors this request exactly.
    pub fn accepts(&self, format: MediaFormat) -> bool {
        self.exact_format().map_or(true, |exact| exact == format)
    }
}

impl FromStr for Quality {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mp3_128" => Ok(Quality::Mp3_128),
            "mp3_320" => Ok(Quality::Mp3_320),
            "flac" => Ok(Quality::Flac),
            "best" => Ok(Quality::Best),
            _ => Err(VaultError::InvalidQuality(s.to_string())),
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A single playable track.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Song {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub version: String,
    pub artist: String,
    #[serde(default)]
    pub album: String,
    #[serde(default)]
    pub track_number: Option<u32>,
    #[serde(default)]
    pub duration_secs: u32,
    #[serde(default)]
    pub cover_id: String,
    #[serde(default)]
    pub isrc: String,
}

impl Song {
    /// Title with the version appended, e.g. `Song (Live)`.
    pub fn display_title(&self) -> String {
        let version = self.version.trim();
        if version.is_empty() {
            self.title.clone()
        } else if version.starts_with('(') {
            format!("{} {}", self.title, version)
        } else {
            format!("{} ({})", self.title, version)
        }
    }
}

/// Kind of catalog resource a run targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Album,
    Playlist,
    Artist,
    Track,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Album => "album",
            ResourceKind::Playlist => "playlist",
            ResourceKind::Artist => "artist",
            ResourceKind::Track => "track",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "album" => Ok(ResourceKind::Album),
            "playlist" => Ok(ResourceKind::Playlist),
            "artist" => Ok(ResourceKind::Artist),
            "track" => Ok(ResourceKind::Track),
            other => Err(VaultError::Other(format!(
                "unsupported resource type: {}",
                other
            ))),
        }
    }
}

/// An album, playlist, artist top list or single track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub kind: ResourceKind,
    pub id: String,
    /// Album or playlist title, artist name, or track title.
    pub name: String,
    /// Album artist; empty for the other kinds.
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub songs: Vec<Song>,
}

impl Resource {
    pub fn songs(&self) -> &[Song] {
        &self.songs
    }

    pub fn set_songs(&mut self, songs: Vec<Song>) {
        self.songs = songs;
    }

    pub fn title(&self) -> &str {
        &self.name
    }

    /// Directory the resource itself lives in.
    ///
    /// Songs are always written to their organized path; this directory holds
    /// album downloads and playlist files.
    pub fn output_dir(&self, root: &Path) -> PathBuf {
        match self.kind {
            ResourceKind::Album => root
                .join(sanitize_component(&self.artist))
                .join(sanitize_component(&self.name)),
            ResourceKind::Playlist => root
                .join(PathsConfig::PLAYLISTS_DIR_NAME)
                .join(sanitize_component(&self.name)),
            ResourceKind::Artist => root.join(sanitize_component(&self.name)),
            ResourceKind::Track => root.join(PathsConfig::SINGLES_DIR_NAME),
        }
    }
}

/// Authenticated catalog session.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub premium: bool,
    pub license_token: String,
}

/// Playable media resolved for one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaDescriptor {
    pub format: MediaFormat,
    pub source_url: String,
}

/// Encrypted media byte stream.
pub type MediaStream = Box<dyn AsyncRead + Send + Unpin>;

/// Protocol client of the streaming catalog.
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Exchange the session credential for a session.
    async fn authenticate(&self, credential: &str) -> Result<Session>;

    /// Fetch a resource with its songs.
    async fn fetch_resource(
        &self,
        session: &Session,
        kind: ResourceKind,
        id: &str,
    ) -> Result<Resource>;

    /// Resolve playable media, falling back through `quality.format_priority()`.
    async fn fetch_media(
        &self,
        session: &Session,
        song: &Song,
        quality: Quality,
    ) -> Result<MediaDescriptor>;

    /// Open the encrypted byte stream for resolved media.
    async fn open_media_stream(&self, media: &MediaDescriptor) -> Result<MediaStream>;

    /// Fetch the front cover image.
    async fn fetch_cover_art(&self, song: &Song) -> Result<Vec<u8>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn song() -> Song {
        Song {
            id: "1".into(),
            title: "Around the World".into(),
            artist: "Daft Punk".into(),
            album: "Homework".into(),
            track_number: Some(7),
            duration_secs: 429,
            ..Default::default()
        }
    }

    #[test]
    fn test_quality_parse_case_insensitive() {
        assert_eq!("FLAC".parse::<Quality>().unwrap(), Quality::Flac);
        assert_eq!("Mp3_320".parse::<Quality>().unwrap(), Quality::Mp3_320);
        assert_eq!(" best ".parse::<Quality>().unwrap(), Quality::Best);
        assert!(matches!(
            "lossless".parse::<Quality>(),
            Err(VaultError::InvalidQuality(_))
        ));
    }

    #[test]
    fn test_quality_rules() {
        assert!(Quality::Flac.requires_premium());
        assert!(!Quality::Best.requires_premium());
        assert!(!Quality::Mp3_128.requires_premium());
        assert_eq!(Quality::Best.format_priority()[0], MediaFormat::Flac);
        assert!(Quality::Best.accepts(MediaFormat::Mp3_128));
        assert!(!Quality::Flac.accepts(MediaFormat::Mp3_320));
    }

    #[test]
    fn test_media_format_serde_label() {
        let json = serde_json::to_string(&MediaFormat::Mp3_320).unwrap();
        assert_eq!(json, "\"mp3_320\"");
        let back: MediaFormat = serde_json::from_str("\"flac\"").unwrap();
        assert_eq!(back, MediaFormat::Flac);
    }

    #[test]
    fn test_display_title_with_version() {
        let mut s = song();
        assert_eq!(s.display_title(), "Around the World");
        s.version = "(Radio Edit)".into();
        assert_eq!(s.display_title(), "Around the World (Radio Edit)");
        s.version = "Live".into();
        assert_eq!(s.display_title(), "Around the World (Live)");
    }

    #[test]
    fn test_resource_output_dirs() {
        let root = Path::new("/music");
        let mut resource = Resource {
            kind: ResourceKind::Playlist,
            id: "9".into(),
            name: "Road: Trip".into(),
            artist: String::new(),
            songs: vec![song()],
        };
        assert_eq!(
            resource.output_dir(root),
            PathBuf::from("/music/Playlists/Road_ Trip")
        );

        resource.kind = ResourceKind::Track;
        assert_eq!(resource.output_dir(root), PathBuf::from("/music/Singles"));

        resource.kind = ResourceKind::Album;
        resource.artist = "Daft Punk".into();
        resource.name = "Homework".into();
        assert_eq!(
            resource.output_dir(root),
            PathBuf::from("/music/Daft Punk/Homework")
        );

        resource.set_songs(Vec::new());
        assert!(resource.songs().is_empty());
    }
}
