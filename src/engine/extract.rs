//! Per-segment stream-copy extraction

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info};

use crate::domain::model::PlannedSegment;
use crate::engine::{remove_if_exists, run_guarded};
use crate::error::QuiclipResult;
use crate::ports::{TrimJob, Trimmer};

/// Extension used when the source has none
const DEFAULT_EXTENSION: &str = "mp4";

/// Temp file name for the segment at `index`, keeping the source's container
pub fn part_path(dir: &Path, index: usize, source: &Path) -> PathBuf {
    let ext = source
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or(DEFAULT_EXTENSION)
        .to_lowercase();
    dir.join(format!("part_{:03}.{}", index, ext))
}

/// Runs one trim per planned segment
pub struct ClipExtractor {
    trimmer: Arc<dyn Trimmer>,
    timeout: Duration,
}

impl ClipExtractor {
    pub fn new(trimmer: Arc<dyn Trimmer>, timeout: Duration) -> Self {
        Self { trimmer, timeout }
    }

    /// Copy `[cut_start, cut_end)` of the segment's source into `dest_dir`.
    ///
    /// Returns the written file, which the caller owns. On any failure the
    /// partial output is removed before the error is returned.
    pub async fn extract(
        &self,
        index: usize,
        segment: &PlannedSegment,
        dest_dir: &Path,
        cancel: &watch::Receiver<bool>,
    ) -> QuiclipResult<PathBuf> {
        let output = part_path(dest_dir, index, &segment.source);
        remove_if_exists(&output).await;

        let job = TrimJob {
            source: segment.source.clone(),
            cut_start: segment.cut_start,
            cut_end: segment.cut_end,
            output: output.clone(),
        };
        debug!(segment = index, output = %output.display(), "Extracting segment");

        let operation = format!("extraction of segment {}", index);
        match run_guarded(&operation, self.timeout, cancel, self.trimmer.trim(&job)).await {
            Ok(()) => {
                info!(
                    segment = index,
                    source = %segment.source.display(),
                    duration = job.duration(),
                    "Segment extracted"
                );
                Ok(output)
            }
            Err(e) => {
                remove_if_exists(&output).await;
                Err(e)
            }
        }
    }
}
