// Ports - Interface definitions (contracts)
//
// The pipeline never talks to ffmpeg/ffprobe directly; it goes through these
// narrow capabilities so tests can substitute fakes.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::domain::model::MediaFingerprint;
use crate::error::QuiclipResult;

/// Port for media file probing
#[async_trait]
pub trait Prober: Send + Sync {
    /// Probe container and codec parameters. The returned fingerprint carries no keyframes.
    async fn probe(&self, path: &Path) -> QuiclipResult<MediaFingerprint>;

    /// Keyframe timestamps (seconds) of the primary video stream within `[from, to]`.
    ///
    /// Window and results are on the container's own timeline, which begins at
    /// the fingerprint's `start_time` rather than at zero.
    ///
    /// Implementations may return keyframes slightly outside the window; callers filter.
    async fn keyframes_between(&self, path: &Path, from: f64, to: f64) -> QuiclipResult<Vec<f64>>;
}

/// One stream-copy trim
#[derive(Debug, Clone, PartialEq)]
pub struct TrimJob {
    pub source: PathBuf,
    pub cut_start: f64,
    pub cut_end: f64,
    pub output: PathBuf,
}

impl TrimJob {
    /// Length of the trimmed range in seconds
    pub fn duration(&self) -> f64 {
        self.cut_end - self.cut_start
    }
}

/// Port for stream-copy trimming
///
/// Implementations must stop any subprocess they started when the returned
/// future is dropped.
#[async_trait]
pub trait Trimmer: Send + Sync {
    async fn trim(&self, job: &TrimJob) -> QuiclipResult<()>;
}

/// Port for stream-copy concatenation
///
/// Implementations must stop any subprocess they started when the returned
/// future is dropped.
#[async_trait]
pub trait Concatenator: Send + Sync {
    /// Concatenate the files named in a concat-demuxer list into `output`
    async fn concat(&self, list_file: &Path, output: &Path) -> QuiclipResult<()>;
}
