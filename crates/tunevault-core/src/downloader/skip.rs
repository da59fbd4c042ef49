//! Decides whether an item is already satisfied on disk.

use crate::cancel::CancellationToken;
use crate::catalog::MediaFormat;
use crate::error::Result;
use crate::hashing::HashIndex;
use crate::store::{DownloadLedger, DownloadRecord};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Skip policy of one run.
///
/// The hash index of the output root is built on first need and reused for
/// the rest of the run. A build that fails is not retried; digest lookups
/// are off for the rest of the run.
pub struct SkipDecider {
    ledger: Arc<DownloadLedger>,
    output_root: PathBuf,
    index: OnceCell<Option<Arc<HashIndex>>>,
}

impl SkipDecider {
    pub fn new(ledger: Arc<DownloadLedger>, output_root: impl Into<PathBuf>) -> Self {
        Self {
            ledger,
            output_root: output_root.into(),
            index: OnceCell::new(),
        }
    }

    /// Whether the hash index has been built (or failed to build) during this
    /// run.
    pub fn index_built(&self) -> bool {
        self.index.initialized()
    }

    /// The run's hash index, or `None` when building it failed.
    ///
    /// Cancellation leaves the cell empty so a later run can build it.
    async fn index(&self, cancel: &CancellationToken) -> Result<Option<Arc<HashIndex>>> {
        let index = self
            .index
            .get_or_try_init(|| async {
                match HashIndex::build_async(self.output_root.clone(), cancel.clone())
                    .await
                    .into_result()
                {
                    Ok(index) => Ok(Some(Arc::new(index))),
                    Err(e) if e.is_cancelled() => Err(e),
                    Err(e) => {
                        warn!("Failed to build hash index, digest lookups disabled: {}", e);
                        Ok(None)
                    }
                }
            })
            .await?;
        Ok(index.clone())
    }

    /// Return the path holding `song_id` in `format` when it need not be
    /// downloaded again.
    ///
    /// Only cancellation is reported as an error; lookup failures mean "not
    /// downloaded".
    pub async fn should_skip(
        &self,
        song_id: &str,
        format: MediaFormat,
        cancel: &CancellationToken,
    ) -> Result<Option<PathBuf>> {
        let record = match self.ledger.get(song_id) {
            Ok(Some(record)) => record,
            Ok(None) => return Ok(None),
            Err(e) => {
                warn!("Failed to read ledger entry for {}: {}", song_id, e);
                return Ok(None);
            }
        };

        if record.quality != format {
            debug!(
                "Song {} recorded as {}, requested {}",
                song_id, record.quality, format
            );
            return Ok(None);
        }

        if record.path.is_file() {
            return Ok(Some(record.path));
        }

        if record.hash.is_empty() {
            return Ok(None);
        }

        let Some(index) = self.index(cancel).await? else {
            return Ok(None);
        };

        let Some(found) = index.find(&record.hash) else {
            return Ok(None);
        };
        let found = found.to_path_buf();
        self.relocate(record, &found);
        Ok(Some(found))
    }

    fn relocate(&self, record: DownloadRecord, found: &Path) {
        info!(
            "Song {} moved from {} to {}",
            record.song_id,
            record.path.display(),
            found.display()
        );
        let moved = DownloadRecord {
            path: found.to_path_buf(),
            ..record
        };
        if let Err(e) = self.ledger.put(&moved) {
            warn!("Failed to update ledger path for {}: {}", moved.song_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::hash_file;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Arc<DownloadLedger>, SkipDecider) {
        let temp = TempDir::new().unwrap();
        let ledger = Arc::new(DownloadLedger::open_in_memory().unwrap());
        let decider = SkipDecider::new(Arc::clone(&ledger), temp.path());
        (temp, ledger, decider)
    }

    fn write_file(path: &Path, contents: &[u8]) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    #[tokio::test]
    async fn test_no_record_is_not_skipped() {
        let (_temp, _ledger, decider) = setup();
        let skip = decider
            .should_skip("1", MediaFormat::Flac, &CancellationToken::new())
            .await
            .unwrap();
        assert!(skip.is_none());
    }

    #[tokio::test]
    async fn test_existing_file_skips_without_index() {
        let (temp, ledger, decider) = setup();
        let path = temp.path().join("Artist/Album/01. Song.flac");
        write_file(&path, b"audio");
        ledger
            .put(&DownloadRecord::new("1", MediaFormat::Flac, &path, "deadbeef"))
            .unwrap();

        let skip = decider
            .should_skip("1", MediaFormat::Flac, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(skip, Some(path));
        assert!(!decider.index_built());
    }

    #[tokio::test]
    async fn test_different_quality_is_not_skipped() {
        let (temp, ledger, decider) = setup();
        let path = temp.path().join("song.mp3");
        write_file(&path, b"audio");
        ledger
            .put(&DownloadRecord::new("1", MediaFormat::Mp3_128, &path, ""))
            .unwrap();

        let skip = decider
            .should_skip("1", MediaFormat::Mp3_320, &CancellationToken::new())
            .await
            .unwrap();
        assert!(skip.is_none());
    }

    #[tokio::test]
    async fn test_moved_file_found_by_digest() {
        let (temp, ledger, decider) = setup();
        let moved = temp.path().join("Elsewhere/renamed.flac");
        write_file(&moved, b"the same audio bytes");
        write_file(&temp.path().join("other.flac"), b"unrelated");
        let digest = hash_file(&moved).unwrap();

        let stale = temp.path().join("Artist/Album/01. Song.flac");
        ledger
            .put(&DownloadRecord::new("1", MediaFormat::Flac, &stale, &digest))
            .unwrap();

        let skip = decider
            .should_skip("1", MediaFormat::Flac, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(skip, Some(moved.clone()));
        assert!(decider.index_built());

        let record = ledger.get("1").unwrap().unwrap();
        assert_eq!(record.path, moved);
        assert_eq!(record.hash, digest);
        assert_eq!(record.quality, MediaFormat::Flac);
    }

    #[tokio::test]
    async fn test_missing_file_without_digest_is_not_skipped() {
        let (temp, ledger, decider) = setup();
        ledger
            .put(&DownloadRecord::new(
                "1",
                MediaFormat::Flac,
                temp.path().join("gone.flac"),
                "",
            ))
            .unwrap();

        let skip = decider
            .should_skip("1", MediaFormat::Flac, &CancellationToken::new())
            .await
            .unwrap();
        assert!(skip.is_none());
        assert!(!decider.index_built());
    }

    #[tokio::test]
    async fn test_missing_file_with_unknown_digest_is_not_skipped() {
        let (temp, ledger, decider) = setup();
        write_file(&temp.path().join("a.flac"), b"a");
        ledger
            .put(&DownloadRecord::new(
                "1",
                MediaFormat::Flac,
                temp.path().join("gone.flac"),
                "0000",
            ))
            .unwrap();

        let skip = decider
            .should_skip("1", MediaFormat::Flac, &CancellationToken::new())
            .await
            .unwrap();
        assert!(skip.is_none());
        assert_eq!(
            ledger.get("1").unwrap().unwrap().path,
            temp.path().join("gone.flac")
        );
    }

    #[tokio::test]
    async fn test_cancelled_index_build_propagates() {
        let (temp, ledger, decider) = setup();
        write_file(&temp.path().join("a.flac"), b"a");
        ledger
            .put(&DownloadRecord::new(
                "1",
                MediaFormat::Flac,
                temp.path().join("gone.flac"),
                "0000",
            ))
            .unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = decider
            .should_skip("1", MediaFormat::Flac, &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(!decider.index_built());
    }

    #[tokio::test]
    async fn test_failed_index_build_is_not_retried() {
        let (temp, ledger, decider) = setup();
        let moved = temp.path().join("Elsewhere/renamed.flac");
        write_file(&moved, b"the same audio bytes");
        ledger
            .put(&DownloadRecord::new(
                "1",
                MediaFormat::Flac,
                temp.path().join("gone.flac"),
                hash_file(&moved).unwrap(),
            ))
            .unwrap();

        // Outcome of a build that failed earlier in the run.
        decider.index.set(None).unwrap();

        for _ in 0..2 {
            let skip = decider
                .should_skip("1", MediaFormat::Flac, &CancellationToken::new())
                .await
                .unwrap();
            assert!(skip.is_none());
        }
        assert!(matches!(decider.index.get(), Some(None)));
        assert_eq!(
            ledger.get("1").unwrap().unwrap().path,
            temp.path().join("gone.flac")
        );
    }
}
