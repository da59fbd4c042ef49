//! TuneVault - download and library engine for a streaming catalog.
//!
//! This crate streams striped-encrypted media to disk, decrypting it on the
//! fly, tags the result, and records every download in a persistent ledger so
//! repeated runs skip what is already on disk (even after files were moved).
//! Migrations reshape an existing library tree while keeping the ledger in
//! step.
//!
//! The catalog protocol itself is supplied by the caller through
//! [`CatalogClient`].
//!
//! # Example
//!
//! ```rust,ignore
//! use tunevault::{CancellationToken, DownloadLedger, DownloadOptions, DownloaderBuilder, ResourceKind};
//!
//! let ledger = Arc::new(DownloadLedger::open(app_dir.join("tracks.db"))?);
//! let downloader = DownloaderBuilder::new(catalog, ledger, settings.output_root()?, &settings.secret_key)
//!     .credential(&settings.arl_cookie)
//!     .build()?;
//!
//! let summaries = downloader
//!     .run(&DownloadOptions::default(), ResourceKind::Album, &ids, &CancellationToken::new())
//!     .await?;
//! ```

pub mod cancel;
pub mod catalog;
pub mod cipher;
pub mod config;
pub mod downloader;
pub mod enrichment;
pub mod error;
pub mod hashing;
pub mod migration;
pub mod naming;
pub mod store;
pub mod tags;
pub mod watcher;

// Re-export commonly used types
pub use cancel::{CancellationToken, CancelledError};
pub use catalog::{
    CatalogClient, MediaDescriptor, MediaFormat, MediaStream, Quality, Resource, ResourceKind,
    Session, Song,
};
pub use config::AppSettings;
pub use downloader::{
    DownloadOptions, Downloader, DownloaderBuilder, ItemOutcome, ItemReport, RunSummary,
    SkipDecider,
};
pub use enrichment::{Enricher, Enrichment, LookupProvider, LookupQuery, TempoKey};
pub use error::{Result, VaultError};
pub use hashing::{hash_file, HashIndex};
pub use migration::{
    FileMove, Migration, MigrationContext, MigrationRegistry, MigrationReport, MigrationStatus,
};
pub use store::{DownloadLedger, DownloadRecord, KeyValueStore, MigrationRecord, WatchedPlaylist};
pub use tags::{FileTags, LoftyTags, TagReader, TagWriter, TrackTags};
pub use watcher::PlaylistWatcher;
