//! Audio file tags.
//!
//! The downloader writes tags through [`TagWriter`]; migrations read them back
//! through [`TagReader`] to rebuild canonical paths. [`LoftyTags`] implements
//! both for MP3 (ID3v2) and FLAC (Vorbis comments).

use crate::catalog::{Resource, ResourceKind, Song};
use crate::error::{Result, VaultError};
use crate::naming::canonical_track_path;
use lofty::config::WriteOptions;
use lofty::file::{AudioFile, TaggedFileExt};
use lofty::picture::{Picture, PictureType};
use lofty::prelude::Accessor;
use lofty::read_from_path;
use lofty::tag::{ItemKey, Tag, TagType};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Everything written into a downloaded file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackTags {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub album_artist: String,
    pub track_number: Option<u32>,
    pub isrc: String,
    pub bpm: Option<String>,
    pub key: Option<String>,
    pub genre: Option<String>,
    pub cover: Option<Vec<u8>>,
}

impl TrackTags {
    /// Base tags of a song within the resource being downloaded.
    pub fn for_song(resource: &Resource, song: &Song) -> Self {
        let album = if song.album.is_empty() && resource.kind == ResourceKind::Album {
            resource.name.clone()
        } else {
            song.album.clone()
        };
        let album_artist = if resource.kind == ResourceKind::Album && !resource.artist.is_empty()
        {
            resource.artist.clone()
        } else {
            song.artist.clone()
        };

        Self {
            title: song.display_title(),
            artist: song.artist.clone(),
            album,
            album_artist,
            track_number: song.track_number,
            isrc: song.isrc.clone(),
            ..Default::default()
        }
    }

    /// Where a file carrying these tags belongs in the library tree.
    ///
    /// Artist and album resolve the same way migrations resolve them when
    /// reading the tags back, so a fresh download is already in place.
    pub fn organized_path(&self, root: &Path, extension: &str) -> PathBuf {
        let artist = match self.album_artist.trim() {
            "" => self.artist.as_str(),
            album_artist => album_artist,
        };
        canonical_track_path(
            root,
            artist,
            &self.album,
            self.track_number,
            self.title.trim(),
            extension,
        )
    }
}

/// Tags read back from a file on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileTags {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album_artist: Option<String>,
    pub album: Option<String>,
    pub track_number: Option<u32>,
}

impl FileTags {
    /// Album artist, falling back to the track artist.
    pub fn effective_artist(&self) -> Option<&str> {
        self.album_artist
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .or_else(|| {
                self.artist
                    .as_deref()
                    .map(str::trim)
                    .filter(|a| !a.is_empty())
            })
    }
}

impl From<&TrackTags> for FileTags {
    /// The fields [`LoftyTags`] reads back from a file written with `tags`.
    fn from(tags: &TrackTags) -> Self {
        Self {
            title: non_empty(&tags.title),
            artist: non_empty(&tags.artist),
            album_artist: non_empty(&tags.album_artist),
            album: non_empty(&tags.album),
            track_number: tags.track_number.filter(|n| *n > 0),
        }
    }
}

/// Writes tags into a finished download.
pub trait TagWriter: Send + Sync {
    fn write_tags(&self, path: &Path, tags: &TrackTags) -> Result<()>;
}

/// Reads tags from an existing file.
pub trait TagReader: Send + Sync {
    fn read_tags(&self, path: &Path) -> Result<FileTags>;
}

/// Tag type written for a file, chosen by extension.
pub fn tag_type_for_path(path: &Path) -> Option<TagType> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "mp3" => Some(TagType::Id3v2),
        "flac" => Some(TagType::VorbisComments),
        _ => None,
    }
}

/// [`TagWriter`] and [`TagReader`] backed by lofty.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoftyTags;

impl LoftyTags {
    pub fn new() -> Self {
        Self
    }
}

fn tag_error(path: &Path, message: impl std::fmt::Display) -> VaultError {
    VaultError::Tags {
        path: path.to_path_buf(),
        message: message.to_string(),
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl TagWriter for LoftyTags {
    fn write_tags(&self, path: &Path, tags: &TrackTags) -> Result<()> {
        let tag_type = tag_type_for_path(path)
            .ok_or_else(|| tag_error(path, "unsupported file extension"))?;

        let mut tagged_file =
            read_from_path(path).map_err(|e| tag_error(path, format!("read failed: {}", e)))?;
        if tagged_file.tag(tag_type).is_none() {
            tagged_file.insert_tag(Tag::new(tag_type));
        }
        let tag = tagged_file
            .tag_mut(tag_type)
            .ok_or_else(|| tag_error(path, format!("no writable {:?} tag", tag_type)))?;

        tag.set_title(tags.title.clone());
        tag.set_artist(tags.artist.clone());
        if let Some(album) = non_empty(&tags.album) {
            tag.set_album(album);
        }
        if let Some(album_artist) = non_empty(&tags.album_artist) {
            tag.insert_text(ItemKey::AlbumArtist, album_artist);
        }
        if let Some(track) = tags.track_number.filter(|n| *n > 0) {
            tag.set_track(track);
        }
        if let Some(isrc) = non_empty(&tags.isrc) {
            tag.insert_text(ItemKey::Isrc, isrc);
        }
        if let Some(bpm) = tags.bpm.as_deref().and_then(non_empty) {
            tag.insert_text(ItemKey::Bpm, bpm);
        }
        if let Some(key) = tags.key.as_deref().and_then(non_empty) {
            tag.insert_text(ItemKey::InitialKey, key);
        }
        if let Some(genre) = tags.genre.as_deref().and_then(non_empty) {
            tag.set_genre(genre);
        }

        if let Some(cover) = tags.cover.as_deref().filter(|c| !c.is_empty()) {
            let mut reader = cover;
            let mut picture = Picture::from_reader(&mut reader)
                .map_err(|e| tag_error(path, format!("invalid cover image: {}", e)))?;
            picture.set_pic_type(PictureType::CoverFront);
            tag.remove_picture_type(PictureType::CoverFront);
            tag.push_picture(picture);
        }

        tagged_file
            .save_to_path(path, WriteOptions::default())
            .map_err(|e| tag_error(path, format!("write failed: {}", e)))?;

        debug!("Wrote {:?} tags to {}", tag_type, path.display());
        Ok(())
    }
}

impl TagReader for LoftyTags {
    fn read_tags(&self, path: &Path) -> Result<FileTags> {
        let tagged_file =
            read_from_path(path).map_err(|e| tag_error(path, format!("read failed: {}", e)))?;
        let Some(tag) = tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) else {
            return Ok(FileTags::default());
        };

        Ok(FileTags {
            title: tag.title().and_then(|v| non_empty(&v)),
            artist: tag.artist().and_then(|v| non_empty(&v)),
            album_artist: tag.get_string(ItemKey::AlbumArtist).and_then(non_empty),
            album: tag.album().and_then(|v| non_empty(&v)),
            track_number: tag.track(),
        })
    }
}
