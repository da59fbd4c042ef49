//! Extended M3U playlist files.

use crate::config::PathsConfig;
use crate::error::{Result, VaultError};
use crate::naming::sanitize_component;
use std::fmt::Write as _;
use std::path::{Component, Path, PathBuf};
use tracing::info;

/// One line pair of a playlist file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistEntry {
    pub duration_secs: u32,
    pub artist: String,
    pub title: String,
    pub path: PathBuf,
}

/// Express `target` relative to `base`, walking up with `..` as needed.
///
/// Falls back to the absolute target when the two share no prefix.
pub fn relative_path(target: &Path, base: &Path) -> PathBuf {
    let target_parts: Vec<Component> = target.components().collect();
    let base_parts: Vec<Component> = base.components().collect();

    let common = target_parts
        .iter()
        .zip(&base_parts)
        .take_while(|(a, b)| a == b)
        .count();
    if common == 0 {
        return target.to_path_buf();
    }

    let mut relative = PathBuf::new();
    for _ in common..base_parts.len() {
        relative.push("..");
    }
    for part in &target_parts[common..] {
        relative.push(part.as_os_str());
    }
    relative
}

/// Render playlist contents with paths relative to `playlist_dir`.
pub fn render_m3u(entries: &[PlaylistEntry], playlist_dir: &Path) -> String {
    let mut out = String::from("#EXTM3U\n");
    for entry in entries {
        let path = relative_path(&entry.path, playlist_dir);
        let _ = writeln!(
            out,
            "#EXTINF:{},{} - {}",
            entry.duration_secs, entry.artist, entry.title
        );
        let _ = writeln!(out, "{}", path.to_string_lossy().replace('\\', "/"));
    }
    out
}

/// Write `<playlist_dir>/<name>.m3u` and return its path.
pub async fn write_m3u(
    playlist_dir: &Path,
    name: &str,
    entries: &[PlaylistEntry],
) -> Result<PathBuf> {
    tokio::fs::create_dir_all(playlist_dir)
        .await
        .map_err(|e| VaultError::io_with_path(e, playlist_dir))?;

    let file_name = format!(
        "{}.{}",
        sanitize_component(name),
        PathsConfig::PLAYLIST_FILE_EXTENSION
    );
    let path = playlist_dir.join(file_name);
    tokio::fs::write(&path, render_m3u(entries, playlist_dir))
        .await
        .map_err(|e| VaultError::io_with_path(e, &path))?;

    info!(
        "Wrote playlist {} with {} entries",
        path.display(),
        entries.len()
    );
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_relative_path() {
        assert_eq!(
            relative_path(
                Path::new("/music/Daft Punk/Homework/01. Daftendirekt.flac"),
                Path::new("/music/Playlists/Road Trip"),
            ),
            PathBuf::from("../../Daft Punk/Homework/01. Daftendirekt.flac")
        );
        assert_eq!(
            relative_path(Path::new("/music/a/b.mp3"), Path::new("/music/a")),
            PathBuf::from("b.mp3")
        );
        assert_eq!(
            relative_path(Path::new("x/y.mp3"), Path::new("/music")),
            PathBuf::from("x/y.mp3")
        );
    }

    #[tokio::test]
    async fn test_write_m3u() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        let playlist_dir = root.join("Playlists").join("Mix");
        let entries = vec![
            PlaylistEntry {
                duration_secs: 429,
                artist: "Daft Punk".into(),
                title: "Around the World".into(),
                path: root.join("Daft Punk/Homework/07. Around the World.flac"),
            },
            PlaylistEntry {
                duration_secs: 250,
                artist: "Justice".into(),
                title: "D.A.N.C.E.".into(),
                path: root.join("Justice/Cross/03. D.A.N.C.E..mp3"),
            },
        ];

        let path = write_m3u(&playlist_dir, "Mix: Vol/1", &entries)
            .await
            .unwrap();
        assert_eq!(path, playlist_dir.join("Mix_ Vol_1.m3u"));

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            contents,
            "#EXTM3U\n\
             #EXTINF:429,Daft Punk - Around the World\n\
             ../../Daft Punk/Homework/07. Around the World.flac\n\
             #EXTINF:250,Justice - D.A.N.C.E.\n\
             ../../Justice/Cross/03. D.A.N.C.E..mp3\n"
        );
    }
}
