//! File moves shared by the migrations.
//!
//! Every move starts from where the file is now: its ledger record, adjusted
//! by the moves made earlier in the same run. A migration that stopped halfway
//! picks up where it left off.
//!
//! Real and dry runs both record their moves in a [`MovePlan`] and consult it
//! before the filesystem, so a dry run takes the same decisions a real run
//! takes after its own renames.

use super::{FileMove, MigrationContext};
use crate::cancel::CancellationToken;
use crate::error::{Result, VaultError};
use crate::hashing::{hash_file, HashIndex};
use crate::store::DownloadRecord;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Tree state produced by the moves of one migration run.
#[derive(Debug, Default)]
pub(crate) struct MovePlan {
    /// Paths that received a file during this run, with its digest (empty
    /// when unknown).
    claimed: BTreeMap<PathBuf, String>,
    /// Paths a file was moved away from.
    vacated: HashSet<PathBuf>,
    /// Where each song relocated during this run lives now.
    located: HashMap<String, PathBuf>,
    /// Dry runs only: the file on disk standing behind a claimed path.
    origin: HashMap<PathBuf, PathBuf>,
    index: Option<HashIndex>,
}

impl MovePlan {
    fn is_file(&self, path: &Path) -> bool {
        self.claimed.contains_key(path) || (!self.vacated.contains(path) && path.is_file())
    }

    fn exists(&self, path: &Path) -> bool {
        self.claimed.contains_key(path) || (!self.vacated.contains(path) && path.exists())
    }

    /// Path to read `path`'s content from.
    fn readable(&self, path: &Path) -> PathBuf {
        self.origin
            .get(path)
            .cloned()
            .unwrap_or_else(|| path.to_path_buf())
    }

    fn digest_of(&self, path: &Path) -> Result<String> {
        match self.claimed.get(path) {
            Some(digest) if !digest.is_empty() => Ok(digest.clone()),
            _ => hash_file(self.readable(path)),
        }
    }

    fn current_path(&self, record: &DownloadRecord) -> PathBuf {
        self.located
            .get(&record.song_id)
            .cloned()
            .unwrap_or_else(|| record.path.clone())
    }

    fn find_by_digest(&mut self, root: &Path, digest: &str) -> Result<Option<PathBuf>> {
        if let Some((path, _)) = self.claimed.iter().find(|(_, d)| d.as_str() == digest) {
            return Ok(Some(path.clone()));
        }
        if self.index.is_none() {
            let build = HashIndex::build(root, &CancellationToken::new());
            self.index = Some(build.into_result()?);
        }
        Ok(self
            .index
            .as_ref()
            .and_then(|index| index.find(digest))
            .filter(|path| !self.vacated.contains(*path))
            .map(Path::to_path_buf))
    }

    fn record_location(&mut self, song_id: &str, path: &Path) {
        self.located.insert(song_id.to_string(), path.to_path_buf());
    }

    fn record_move(&mut self, song_id: &str, from: &Path, to: &Path, digest: String, dry_run: bool) {
        let origin = self
            .origin
            .remove(from)
            .unwrap_or_else(|| from.to_path_buf());
        if dry_run {
            self.origin.insert(to.to_path_buf(), origin);
        }
        self.claimed.remove(from);
        self.vacated.insert(from.to_path_buf());
        self.vacated.remove(to);
        self.claimed.insert(to.to_path_buf(), digest);
        self.record_location(song_id, to);
    }
}

/// Applies moves for one migration and collects them.
pub(crate) struct Relocator<'a> {
    ctx: &'a MigrationContext<'a>,
    moves: Vec<FileMove>,
}

impl<'a> Relocator<'a> {
    pub fn new(ctx: &'a MigrationContext<'a>) -> Self {
        Self {
            ctx,
            moves: Vec::new(),
        }
    }

    pub fn into_moves(self) -> Vec<FileMove> {
        self.moves
    }

    fn prefix(&self) -> &'static str {
        if self.ctx.dry_run {
            "[DRY RUN] "
        } else {
            ""
        }
    }

    /// Where the content of `path` can be read. Differs from `path` only in
    /// a dry run, for files planned to move.
    pub fn readable(&self, path: &Path) -> PathBuf {
        self.ctx.plan.borrow().readable(path)
    }

    /// Current location of a record's file.
    ///
    /// A file missing from its recorded path is looked up by digest; when
    /// found, the ledger is repaired (outside dry runs).
    pub fn locate(&mut self, record: &DownloadRecord) -> Result<Option<PathBuf>> {
        let mut plan = self.ctx.plan.borrow_mut();
        let current = plan.current_path(record);
        if plan.is_file(&current) {
            return Ok(Some(current));
        }
        if record.hash.is_empty() {
            warn!("File not found at {}, skipping", current.display());
            return Ok(None);
        }

        let Some(found) = plan.find_by_digest(self.ctx.output_root, &record.hash)? else {
            warn!("File not found at {}, skipping", current.display());
            return Ok(None);
        };
        plan.record_location(&record.song_id, &found);
        drop(plan);

        info!(
            "{}Song {} found by digest at {}",
            self.prefix(),
            record.song_id,
            found.display()
        );
        if !self.ctx.dry_run {
            self.update_path(record, &found)?;
        }
        Ok(Some(found))
    }

    fn update_path(&self, record: &DownloadRecord, path: &Path) -> Result<()> {
        let updated = DownloadRecord {
            path: path.to_path_buf(),
            ..record.clone()
        };
        self.ctx.ledger.put(&updated)?;
        debug!("Ledger record updated for song {}", record.song_id);
        Ok(())
    }

    /// Move `current` to `target` and point the ledger at it.
    ///
    /// An existing target with the same content is adopted without moving;
    /// one with different content is left alone.
    pub fn move_to(&mut self, record: &DownloadRecord, current: &Path, target: PathBuf) -> Result<()> {
        if current == target {
            return Ok(());
        }

        let mut plan = self.ctx.plan.borrow_mut();
        if plan.exists(&target) {
            let ours = if record.hash.is_empty() {
                plan.digest_of(current)?
            } else {
                record.hash.clone()
            };
            if plan.digest_of(&target).ok().as_deref() == Some(ours.as_str()) {
                plan.record_location(&record.song_id, &target);
                drop(plan);
                info!(
                    "{}Song {} already present at {}",
                    self.prefix(),
                    record.song_id,
                    target.display()
                );
                if !self.ctx.dry_run {
                    self.update_path(record, &target)?;
                }
            } else {
                warn!(
                    "Target {} exists with different content, leaving {} in place",
                    target.display(),
                    current.display()
                );
            }
            return Ok(());
        }
        drop(plan);

        info!("{}Moving file:", self.prefix());
        info!("    FROM: {}", current.display());
        info!("    TO:   {}", target.display());

        if !self.ctx.dry_run {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).map_err(|e| VaultError::io_with_path(e, parent))?;
            }
            std::fs::rename(current, &target).map_err(|e| VaultError::Io {
                message: format!("Failed to move to {}: {}", target.display(), e),
                path: Some(current.to_path_buf()),
                source: Some(e),
            })?;
        }

        self.ctx.plan.borrow_mut().record_move(
            &record.song_id,
            current,
            &target,
            record.hash.clone(),
            self.ctx.dry_run,
        );

        if !self.ctx.dry_run {
            self.update_path(record, &target)?;
        }

        self.moves.push(FileMove {
            song_id: record.song_id.clone(),
            from: current.to_path_buf(),
            to: target,
        });
        Ok(())
    }
}
