//! Path scoping for sources and outputs

use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::error::{QuiclipError, QuiclipResult};

/// Resolve `.` and `..` without touching the filesystem
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Media root and output directory every job is confined to
#[derive(Debug, Clone)]
pub struct PathScope {
    media_root: PathBuf,
    output_dir: PathBuf,
}

impl PathScope {
    /// Build a scope; the media root must exist, the output directory is created if missing
    pub fn new(media_root: &Path, output_dir: &Path) -> QuiclipResult<Self> {
        let media_root = media_root.canonicalize().map_err(|e| {
            QuiclipError::config(format!(
                "media root {} is not accessible: {}",
                media_root.display(),
                e
            ))
        })?;

        std::fs::create_dir_all(output_dir)?;
        let output_dir = output_dir.canonicalize()?;

        debug!(media_root = %media_root.display(), output_dir = %output_dir.display(), "Path scope ready");
        Ok(Self {
            media_root,
            output_dir,
        })
    }

    pub fn media_root(&self) -> &Path {
        &self.media_root
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Resolve a source path (relative paths are taken from the media root).
    ///
    /// Symlinks are followed for files that exist, so a link pointing out of
    /// the root is rejected as well.
    pub fn resolve_source(&self, path: &Path) -> QuiclipResult<PathBuf> {
        let candidate = normalize_lexically(&self.media_root.join(path));
        let resolved = match candidate.canonicalize() {
            Ok(real) => real,
            Err(_) => candidate,
        };

        if !resolved.starts_with(&self.media_root) {
            return Err(QuiclipError::PathScope {
                path: path.to_path_buf(),
                root: self.media_root.clone(),
            });
        }
        Ok(resolved)
    }

    /// Resolve an output path (relative paths are taken from the output directory)
    pub fn resolve_output(&self, path: &Path) -> QuiclipResult<PathBuf> {
        let candidate = normalize_lexically(&self.output_dir.join(path));
        let escapes = !candidate.starts_with(&self.output_dir)
            || candidate == self.output_dir
            || candidate.file_name().is_none();
        if escapes {
            return Err(QuiclipError::PathScope {
                path: path.to_path_buf(),
                root: self.output_dir.clone(),
            });
        }

        if let Some(parent) = candidate.parent() {
            std::fs::create_dir_all(parent)?;
            if !parent.canonicalize()?.starts_with(&self.output_dir) {
                return Err(QuiclipError::PathScope {
                    path: path.to_path_buf(),
                    root: self.output_dir.clone(),
                });
            }
        }
        Ok(candidate)
    }

    /// Resolve a directory under the media root for browsing
    pub fn resolve_media_dir(&self, relative: &Path) -> QuiclipResult<PathBuf> {
        let dir = self.resolve_source(relative)?;
        if !dir.is_dir() {
            return Err(QuiclipError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} is not a directory", relative.display()),
            )));
        }
        Ok(dir)
    }
}
