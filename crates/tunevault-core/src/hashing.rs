//! Content digests and the digest-to-path index of the library tree.
//!
//! Digests are lowercase hex SHA-256 of the file bytes. They identify a
//! downloaded file independently of where the user moved or renamed it.

use crate::cancel::CancellationToken;
use crate::error::{Result, VaultError};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Chunk size for reading files (1MB).
const CHUNK_SIZE: usize = 1024 * 1024;

/// Compute the SHA-256 digest of a file as a hex string.
pub fn hash_file(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let mut file = std::fs::File::open(path).map_err(|e| VaultError::io_with_path(e, path))?;

    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];
    loop {
        let bytes_read = file
            .read(&mut buffer)
            .map_err(|e| VaultError::io_with_path(e, path))?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Compute a file digest on the blocking pool.
pub async fn hash_file_async(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref().to_path_buf();
    tokio::task::spawn_blocking(move || hash_file(&path))
        .await
        .map_err(|e| VaultError::Other(format!("Hash computation task failed: {}", e)))?
}

/// Map of content digest to the path holding that content.
#[derive(Debug, Default, Clone)]
pub struct HashIndex {
    files: HashMap<String, PathBuf>,
}

/// Outcome of an index walk.
///
/// A cancelled walk still hands back everything hashed so far.
#[derive(Debug)]
pub struct IndexBuild {
    pub index: HashIndex,
    pub interrupted: Option<VaultError>,
}

impl IndexBuild {
    /// Discard the partial index if the walk was interrupted.
    pub fn into_result(self) -> Result<HashIndex> {
        match self.interrupted {
            Some(err) => Err(err),
            None => Ok(self.index),
        }
    }
}

impl HashIndex {
    /// Walk `root` and hash every regular file.
    ///
    /// Unreadable entries are skipped. Cancellation is checked before each
    /// file.
    pub fn build(root: &Path, cancel: &CancellationToken) -> IndexBuild {
        let mut index = HashIndex::default();

        for entry in WalkDir::new(root).follow_links(false) {
            if cancel.is_cancelled() {
                debug!(
                    "Hash index walk cancelled after {} files",
                    index.files.len()
                );
                return IndexBuild {
                    index,
                    interrupted: Some(VaultError::Cancelled),
                };
            }

            let entry = match entry {
                Ok(entry) => entry,
                Err(_) => continue,
            };
            if !entry.file_type().is_file() {
                continue;
            }

            match hash_file(entry.path()) {
                Ok(digest) => {
                    index.files.insert(digest, entry.path().to_path_buf());
                }
                Err(e) => debug!("Skipping unreadable file {}: {}", entry.path().display(), e),
            }
        }

        info!(
            "Built hash index of {} files under {}",
            index.files.len(),
            root.display()
        );
        IndexBuild {
            index,
            interrupted: None,
        }
    }

    /// Run [`HashIndex::build`] on the blocking pool.
    pub async fn build_async(root: PathBuf, cancel: CancellationToken) -> IndexBuild {
        match tokio::task::spawn_blocking(move || Self::build(&root, &cancel)).await {
            Ok(build) => build,
            Err(e) => IndexBuild {
                index: HashIndex::default(),
                interrupted: Some(VaultError::Other(format!(
                    "Hash index task failed: {}",
                    e
                ))),
            },
        }
    }

    /// Look up the path holding content with this digest.
    pub fn find(&self, digest: &str) -> Option<&Path> {
        self.files.get(digest).map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    #[test]
    fn test_hash_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a.mp3");
        std::fs::write(&path, b"hello").unwrap();

        assert_eq!(hash_file(&path).unwrap(), HELLO_SHA256);
    }

    #[test]
    fn test_hash_missing_file() {
        let err = hash_file("/nonexistent/file.flac").unwrap_err();
        assert!(matches!(err, VaultError::Io { path: Some(_), .. }));
    }

    #[tokio::test]
    async fn test_hash_file_async_matches_sync() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("b.flac");
        std::fs::write(&path, vec![7u8; 3 * CHUNK_SIZE + 11]).unwrap();

        assert_eq!(
            hash_file_async(&path).await.unwrap(),
            hash_file(&path).unwrap()
        );
    }

    #[test]
    fn test_build_index_finds_nested_files() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("Artist").join("Album");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("01. Song.mp3"), b"hello").unwrap();
        std::fs::write(temp.path().join("other.mp3"), b"other").unwrap();

        let build = HashIndex::build(temp.path(), &CancellationToken::new());
        assert!(build.interrupted.is_none());

        let index = build.index;
        assert_eq!(index.len(), 2);
        assert_eq!(
            index.find(HELLO_SHA256),
            Some(nested.join("01. Song.mp3").as_path())
        );
        assert!(index.find("deadbeef").is_none());
    }

    #[test]
    fn test_build_index_cancelled() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("a.mp3"), b"a").unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();

        let build = HashIndex::build(temp.path(), &cancel);
        assert!(matches!(build.interrupted, Some(VaultError::Cancelled)));
        assert!(build.index.is_empty());
        assert!(build.into_result().is_err());
    }

    #[test]
    fn test_build_index_missing_root_is_empty() {
        let build = HashIndex::build(Path::new("/nonexistent/root"), &CancellationToken::new());
        assert!(build.interrupted.is_none());
        assert!(build.index.is_empty());
    }
}
