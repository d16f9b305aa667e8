//! Media library listing

use std::path::{Path, PathBuf};

use serde::Serialize;
use walkdir::WalkDir;

use crate::error::{QuiclipError, QuiclipResult};
use crate::utils::path::PathScope;

/// Extensions offered for selection
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "mkv", "m4v", "avi", "ts", "wmv"];

/// One selectable file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaEntry {
    /// Path relative to the media root
    pub path: PathBuf,
    pub size: u64,
}

/// Whether `path` has one of the selectable video extensions
pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext.as_str()))
}

/// List video files directly inside `relative_dir` of the media root, sorted by name
pub fn list_video_files(scope: &PathScope, relative_dir: &Path) -> QuiclipResult<Vec<MediaEntry>> {
    let dir = scope.resolve_media_dir(relative_dir)?;

    let mut entries = Vec::new();
    for entry in WalkDir::new(&dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| {
            QuiclipError::Io(e.into_io_error().unwrap_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::Other, "directory walk failed")
            }))
        })?;
        if !entry.file_type().is_file() || !is_video_file(entry.path()) {
            continue;
        }

        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        let path = entry
            .path()
            .strip_prefix(scope.media_root())
            .unwrap_or(entry.path())
            .to_path_buf();
        entries.push(MediaEntry { path, size });
    }

    entries.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(entries)
}
