//! Filesystem-safe path components and track file names.
//!
//! Library layout is `Artist/Album/NN. Title.ext`. Every component goes
//! through [`sanitize_component`] so catalog metadata can never escape the
//! output root or produce names Windows refuses.

use crate::config::PathsConfig;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Maximum length in bytes of a single path component.
const MAX_COMPONENT_LENGTH: usize = 200;

/// Characters reserved on NTFS that must be replaced.
const NTFS_RESERVED_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Reserved names on Windows NTFS.
const NTFS_RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

const REPLACEMENT: char = '_';

/// `NN. Artist - Title`, with the track number optional.
static ARTIST_TITLE_STEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:(\d+)\. )?(.+?) - (.+)$").unwrap());

/// `NN. Title`.
static NUMBERED_STEM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d+)\. (.+)$").unwrap());

/// Make a single path component safe for every common filesystem.
///
/// # Examples
///
/// ```
/// use tunevault::naming::sanitize_component;
///
/// assert_eq!(sanitize_component("AC/DC"), "AC_DC");
/// assert_eq!(sanitize_component("What?"), "What_");
/// assert_eq!(sanitize_component(".."), "_");
/// ```
pub fn sanitize_component(name: &str) -> String {
    let mut result: String = name
        .chars()
        .map(|c| {
            if NTFS_RESERVED_CHARS.contains(&c) || c.is_control() {
                REPLACEMENT
            } else {
                c
            }
        })
        .collect();

    // Windows drops trailing dots and spaces, and "." / ".." are not names.
    result = result.trim().trim_end_matches('.').to_string();

    if result.len() > MAX_COMPONENT_LENGTH {
        let mut end = MAX_COMPONENT_LENGTH;
        while !result.is_char_boundary(end) {
            end -= 1;
        }
        result.truncate(end);
        result = result.trim_end().to_string();
    }

    let upper = result.to_uppercase();
    if NTFS_RESERVED_NAMES.contains(&upper.as_str()) {
        result.push(REPLACEMENT);
    }

    if result.is_empty() {
        result.push(REPLACEMENT);
    }

    result
}

/// File name of a track inside its album directory.
///
/// ```
/// use tunevault::naming::track_file_name;
///
/// assert_eq!(track_file_name(Some(3), "Intro", "flac"), "03. Intro.flac");
/// assert_eq!(track_file_name(None, "Intro", "mp3"), "Intro.mp3");
/// ```
pub fn track_file_name(track_number: Option<u32>, title: &str, extension: &str) -> String {
    let name = match track_number {
        Some(n) if n > 0 => format!("{:02}. {}.{}", n, title, extension),
        _ => format!("{}.{}", title, extension),
    };
    sanitize_component(&name)
}

/// `root/Artist/Album/NN. Title.ext`, the one layout both downloads and
/// migrations place files in.
///
/// A blank album becomes [`PathsConfig::UNKNOWN_ALBUM`].
pub fn canonical_track_path(
    root: &Path,
    artist: &str,
    album: &str,
    track_number: Option<u32>,
    title: &str,
    extension: &str,
) -> PathBuf {
    let album = match album.trim() {
        "" => PathsConfig::UNKNOWN_ALBUM,
        album => album,
    };
    root.join(sanitize_component(artist.trim()))
        .join(sanitize_component(album))
        .join(track_file_name(track_number, title, extension))
}

/// Fields recovered from a `[NN. ]Artist - Title` file stem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTrackName {
    pub track_number: Option<u32>,
    pub artist: String,
    pub title: String,
}

/// Parse a file stem of the form `[NN. ]Artist - Title`.
pub fn parse_artist_title_stem(stem: &str) -> Option<ParsedTrackName> {
    let caps = ARTIST_TITLE_STEM.captures(stem)?;
    let artist = caps.get(2)?.as_str().trim();
    let title = caps.get(3)?.as_str().trim();
    if artist.is_empty() || title.is_empty() {
        return None;
    }

    Some(ParsedTrackName {
        track_number: caps.get(1).and_then(|m| m.as_str().parse().ok()),
        artist: artist.to_string(),
        title: title.to_string(),
    })
}

/// Split `NN. Rest` into the track number and the remainder.
pub fn split_track_number(stem: &str) -> Option<(u32, &str)> {
    let caps = NUMBERED_STEM.captures(stem)?;
    let number = caps.get(1)?.as_str().parse().ok()?;
    Some((number, caps.get(2)?.as_str()))
}
