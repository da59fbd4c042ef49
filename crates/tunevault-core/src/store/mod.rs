//! Durable state of the vault.
//!
//! A single SQLite file holds every namespace; [`DownloadLedger`] is the typed
//! view the rest of the crate goes through.

mod ledger;
mod sqlite;
mod traits;

pub use ledger::{DownloadLedger, DownloadRecord, MigrationRecord, WatchedPlaylist};
pub use sqlite::SqliteStore;
pub use traits::KeyValueStore;
