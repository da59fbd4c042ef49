//! Migration 2: drop the artist from `NN. Artist - Title` file names inside
//! that artist's directory.

use super::relocate::Relocator;
use super::{FileMove, Migration, MigrationContext};
use crate::error::Result;
use crate::naming::{parse_artist_title_stem, track_file_name};
use std::path::{Path, PathBuf};

pub struct RemoveRedundantArtist;

/// New path for `path`, or `None` when the name carries no redundant artist.
fn without_redundant_artist(path: &Path) -> Option<PathBuf> {
    let dir = path.parent()?;
    let artist_dir = dir.parent()?.file_name()?.to_string_lossy();
    let stem = path.file_stem()?.to_string_lossy();
    let extension = path.extension()?.to_string_lossy();

    let parsed = parse_artist_title_stem(&stem)?;
    let track_number = parsed.track_number?;
    if parsed.artist.to_lowercase() != artist_dir.to_lowercase() {
        return None;
    }

    Some(dir.join(track_file_name(
        Some(track_number),
        &parsed.title,
        &extension,
    )))
}

impl Migration for RemoveRedundantArtist {
    fn id(&self) -> u32 {
        2
    }

    fn name(&self) -> &'static str {
        "remove_redundant_artist"
    }

    fn description(&self) -> &'static str {
        "Remove redundant artist names from track filenames since artist is already in directory structure"
    }

    fn apply(&self, ctx: &MigrationContext<'_>) -> Result<Vec<FileMove>> {
        let records = ctx.ledger.records()?;
        let mut relocator = Relocator::new(ctx);

        for record in records {
            let Some(current) = relocator.locate(&record)? else {
                continue;
            };
            if let Some(target) = without_redundant_artist(&current) {
                relocator.move_to(&record, &current, target)?;
            }
        }

        Ok(relocator.into_moves())
    }
}
