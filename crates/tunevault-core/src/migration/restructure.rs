//! Migration 1: move every downloaded file into the `Artist/Album/NN. Title`
//! tree.

use super::relocate::Relocator;
use super::{FileMove, Migration, MigrationContext};
use crate::config::PathsConfig;
use crate::error::Result;
use crate::naming::{canonical_track_path, parse_artist_title_stem};
use crate::tags::TagReader;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Depth of a track file under the output root in the canonical tree.
const CANONICAL_DEPTH: usize = 3;

pub struct RestructureDirectories;

/// Fields that decide a canonical path.
#[derive(Debug, Clone, PartialEq, Eq)]
struct TrackPlacement {
    artist: String,
    album: String,
    title: String,
    track_number: Option<u32>,
}

impl TrackPlacement {
    fn path(&self, root: &Path, extension: &str) -> PathBuf {
        canonical_track_path(
            root,
            &self.artist,
            &self.album,
            self.track_number,
            &self.title,
            extension,
        )
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn depth_under(path: &Path, root: &Path) -> Option<usize> {
    path.strip_prefix(root).ok().map(|rel| rel.components().count())
}

/// Placement from the tags of the file at `path`, read from `source`.
fn from_tags(tags: &dyn TagReader, source: &Path, path: &Path) -> Option<TrackPlacement> {
    let file_tags = match tags.read_tags(source) {
        Ok(file_tags) => file_tags,
        Err(e) => {
            debug!("No usable tags in {}: {}", path.display(), e);
            return None;
        }
    };
    let artist = file_tags.effective_artist()?.to_string();

    Some(TrackPlacement {
        artist,
        album: file_tags.album.unwrap_or_default(),
        title: file_tags
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| file_stem(path)),
        track_number: file_tags.track_number,
    })
}

/// Placement parsed from a `[NN. ]Artist - Title` file name, with the parent
/// directory as album.
///
/// Files already sitting at `Artist/Album/file` depth are left alone, since a
/// canonical name whose title contains " - " would otherwise be re-parsed.
fn from_file_name(path: &Path, root: &Path) -> Option<TrackPlacement> {
    if depth_under(path, root) == Some(CANONICAL_DEPTH) {
        return None;
    }

    let parsed = parse_artist_title_stem(&file_stem(path))?;
    let album = path
        .parent()
        .filter(|parent| *parent != root)
        .and_then(|parent| parent.file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| PathsConfig::UNKNOWN_ALBUM.to_string());

    Some(TrackPlacement {
        artist: parsed.artist,
        album,
        title: parsed.title,
        track_number: parsed.track_number,
    })
}

/// Canonical path of the file at `path`: tags first, then the file name.
///
/// Tags are read from `source`, which is `path` unless a dry run has only
/// planned to move the file there.
fn canonical_path(
    tags: &dyn TagReader,
    source: &Path,
    path: &Path,
    root: &Path,
) -> Option<PathBuf> {
    let extension = path.extension()?.to_string_lossy().to_ascii_lowercase();
    let placement = from_tags(tags, source, path).or_else(|| from_file_name(path, root))?;
    Some(placement.path(root, &extension))
}

impl Migration for RestructureDirectories {
    fn id(&self) -> u32 {
        1
    }

    fn name(&self) -> &'static str {
        "restructure_directories"
    }

    fn description(&self) -> &'static str {
        "Migrate from flat/artist-album structure to Artist/Album/Track tree structure"
    }

    fn restructures_tree(&self) -> bool {
        true
    }

    fn apply(&self, ctx: &MigrationContext<'_>) -> Result<Vec<FileMove>> {
        info!(
            "Restructuring library under {}",
            ctx.output_root.display()
        );

        let records = ctx.ledger.records()?;
        let mut relocator = Relocator::new(ctx);

        for record in records {
            let Some(current) = relocator.locate(&record)? else {
                continue;
            };

            let source = relocator.readable(&current);
            let Some(target) = canonical_path(ctx.tags, &source, &current, ctx.output_root) else {
                warn!(
                    "Cannot determine artist for {}, leaving it in place",
                    current.display()
                );
                continue;
            };

            relocator.move_to(&record, &current, target)?;
        }

        Ok(relocator.into_moves())
    }
}
