//! Versioned migrations of the library tree and the ledger.
//!
//! Migrations are registered with a fixed, increasing ID and applied in ID
//! order. A [`MigrationRecord`] is written only after a migration returns
//! successfully, so each ID runs to completion at most once per ledger.
//!
//! A dry run makes every decision a real run would (including reading file
//! tags) but never renames files or writes to the ledger.

mod redundant_artist;
mod relocate;
mod restructure;

pub use redundant_artist::RemoveRedundantArtist;
pub use restructure::RestructureDirectories;

use relocate::MovePlan;

use crate::error::{Result, VaultError};
use crate::store::{DownloadLedger, MigrationRecord};
use crate::tags::{LoftyTags, TagReader};
use chrono::{DateTime, Utc};
use std::cell::RefCell;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// One file relocation, planned or performed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileMove {
    pub song_id: String,
    pub from: PathBuf,
    pub to: PathBuf,
}

/// Everything a migration body may touch.
///
/// One context spans every migration of a run, so later migrations see the
/// moves earlier ones made or, in a dry run, planned.
pub struct MigrationContext<'a> {
    pub ledger: &'a DownloadLedger,
    pub output_root: &'a Path,
    pub dry_run: bool,
    pub tags: &'a dyn TagReader,
    plan: RefCell<MovePlan>,
}

impl<'a> MigrationContext<'a> {
    pub fn new(
        ledger: &'a DownloadLedger,
        output_root: &'a Path,
        dry_run: bool,
        tags: &'a dyn TagReader,
    ) -> Self {
        Self {
            ledger,
            output_root,
            dry_run,
            tags,
            plan: RefCell::new(MovePlan::default()),
        }
    }
}

/// A single versioned transformation.
pub trait Migration: Send + Sync {
    fn id(&self) -> u32;

    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Whether emptied directories are pruned after a real run.
    fn restructures_tree(&self) -> bool {
        false
    }

    /// Apply the migration, returning the moves made (or planned, in a dry
    /// run).
    ///
    /// Must be safe to call again after a partial failure.
    fn apply(&self, ctx: &MigrationContext<'_>) -> Result<Vec<FileMove>>;
}

/// Moves made by one migration of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMigration {
    pub id: u32,
    pub name: String,
    pub moves: Vec<FileMove>,
}

/// Result of [`MigrationRegistry::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub dry_run: bool,
    pub applied: Vec<AppliedMigration>,
}

impl MigrationReport {
    pub fn total_moves(&self) -> usize {
        self.applied.iter().map(|m| m.moves.len()).sum()
    }
}

/// Applied state of a registered migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    pub id: u32,
    pub name: &'static str,
    pub description: &'static str,
    pub applied_at: Option<DateTime<Utc>>,
}

/// Ordered set of known migrations.
pub struct MigrationRegistry {
    migrations: Vec<Box<dyn Migration>>,
    tags: Arc<dyn TagReader>,
}

impl Default for MigrationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MigrationRegistry {
    /// Empty registry reading tags with [`LoftyTags`].
    pub fn new() -> Self {
        Self {
            migrations: Vec::new(),
            tags: Arc::new(LoftyTags::new()),
        }
    }

    /// Registry with every built-in migration.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.migrations = vec![
            Box::new(RestructureDirectories),
            Box::new(RemoveRedundantArtist),
        ];
        registry
    }

    pub fn with_tag_reader(mut self, tags: Arc<dyn TagReader>) -> Self {
        self.tags = tags;
        self
    }

    /// Add a migration; IDs must be unique.
    pub fn register(&mut self, migration: Box<dyn Migration>) -> Result<()> {
        if self.migrations.iter().any(|m| m.id() == migration.id()) {
            return Err(VaultError::Config {
                message: format!("migration {} is already registered", migration.id()),
            });
        }
        self.migrations.push(migration);
        self.migrations.sort_by_key(|m| m.id());
        Ok(())
    }

    pub fn migrations(&self) -> impl Iterator<Item = &dyn Migration> {
        self.migrations.iter().map(|m| m.as_ref())
    }

    fn applied_ids(ledger: &DownloadLedger) -> Result<HashSet<u32>> {
        Ok(ledger
            .applied_migrations()?
            .into_iter()
            .map(|record| record.id)
            .collect())
    }

    /// Registered migrations not yet applied to `ledger`, in ID order.
    pub fn pending(&self, ledger: &DownloadLedger) -> Result<Vec<&dyn Migration>> {
        let applied = Self::applied_ids(ledger)?;
        Ok(self
            .migrations()
            .filter(|m| !applied.contains(&m.id()))
            .collect())
    }

    pub fn status(&self, ledger: &DownloadLedger) -> Result<Vec<MigrationStatus>> {
        let applied = ledger.applied_migrations()?;
        Ok(self
            .migrations()
            .map(|m| MigrationStatus {
                id: m.id(),
                name: m.name(),
                description: m.description(),
                applied_at: applied
                    .iter()
                    .find(|record| record.id == m.id())
                    .map(|record| record.applied_at),
            })
            .collect())
    }

    /// Apply every pending migration in ID order.
    ///
    /// Stops at the first failing migration; earlier ones stay recorded.
    pub fn run(
        &self,
        ledger: &DownloadLedger,
        output_root: &Path,
        dry_run: bool,
    ) -> Result<MigrationReport> {
        let prefix = if dry_run { "[DRY RUN] " } else { "" };
        let mut report = MigrationReport {
            dry_run,
            applied: Vec::new(),
        };

        let pending = self.pending(ledger)?;
        if pending.is_empty() {
            info!("No pending migrations");
            return Ok(report);
        }

        let ctx = MigrationContext::new(ledger, output_root, dry_run, self.tags.as_ref());

        for migration in pending {
            let (id, name) = (migration.id(), migration.name());
            info!("{}Running migration {}: {}", prefix, id, name);
            debug!("Description: {}", migration.description());

            let fail = |e: VaultError| VaultError::Migration {
                id,
                name: name.to_string(),
                message: e.to_string(),
            };

            let moves = migration.apply(&ctx).map_err(fail)?;

            if !dry_run {
                if migration.restructures_tree() {
                    let removed = remove_empty_dirs(output_root);
                    debug!("Removed {} empty directories", removed);
                }
                ledger
                    .record_migration(&MigrationRecord {
                        id,
                        name: name.to_string(),
                        description: migration.description().to_string(),
                        applied_at: Utc::now(),
                    })
                    .map_err(fail)?;
            }

            info!(
                "{}Migration {} ({}) completed: {} files moved",
                prefix,
                id,
                name,
                moves.len()
            );
            report.applied.push(AppliedMigration {
                id,
                name: name.to_string(),
                moves,
            });
        }

        Ok(report)
    }
}

/// Remove empty directories under `root`, deepest first. `root` itself is kept.
pub fn remove_empty_dirs(root: &Path) -> usize {
    let mut removed = 0;
    for entry in WalkDir::new(root).min_depth(1).contents_first(true) {
        let Ok(entry) = entry else { continue };
        if !entry.file_type().is_dir() {
            continue;
        }

        let is_empty = std::fs::read_dir(entry.path())
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if !is_empty {
            continue;
        }

        match std::fs::remove_dir(entry.path()) {
            Ok(()) => {
                debug!("Removed empty directory {}", entry.path().display());
                removed += 1;
            }
            Err(e) => warn!(
                "Failed to remove empty directory {}: {}",
                entry.path().display(),
                e
            ),
        }
    }
    removed
}
