//! Media probing with a shared fingerprint cache and windowed keyframe lookup

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::domain::model::MediaFingerprint;
use crate::error::QuiclipResult;
use crate::ports::Prober;

pub mod cache;
pub mod validator;

pub use cache::{FileIdentity, FingerprintCache, KeyframeIndex, TIME_EPSILON};
pub use validator::{ConcatValidator, FieldMismatch, FingerprintField, Mismatch, ValidationReport};

/// Default widths (seconds) of the keyframe search windows ending at a cut point
pub const DEFAULT_KEYFRAME_WINDOWS: [f64; 3] = [10.0, 60.0, 600.0];

/// Scan slightly past the cut so a keyframe sitting exactly on it is included
const SCAN_PAD: f64 = 0.001;

/// Caching front-end over a [`Prober`] port
pub struct MediaProber {
    prober: Arc<dyn Prober>,
    cache: Arc<FingerprintCache>,
    windows: Vec<f64>,
}

impl MediaProber {
    pub fn new(prober: Arc<dyn Prober>, cache: Arc<FingerprintCache>) -> Self {
        Self {
            prober,
            cache,
            windows: DEFAULT_KEYFRAME_WINDOWS.to_vec(),
        }
    }

    /// Override the keyframe search window ladder
    pub fn with_windows(mut self, windows: Vec<f64>) -> Self {
        self.windows = windows;
        self
    }

    /// Probe without touching the cache (used for the pipeline's own temp files)
    pub async fn probe_uncached(&self, path: &Path) -> QuiclipResult<MediaFingerprint> {
        self.prober.probe(path).await
    }

    /// Cached fingerprint of a source file, without keyframes
    pub async fn fingerprint(&self, path: &Path) -> QuiclipResult<Arc<MediaFingerprint>> {
        let (_, fingerprint) = self.entry(path).await?;
        Ok(fingerprint)
    }

    /// Fingerprint whose keyframes are sufficient to snap every cut point in `cuts`
    pub async fn fingerprint_near(
        &self,
        path: &Path,
        cuts: &[f64],
    ) -> QuiclipResult<MediaFingerprint> {
        let (identity, base) = self.entry(path).await?;
        let mut index = self
            .cache
            .lookup(path, &identity)
            .map(|entry| entry.keyframes)
            .unwrap_or_default();

        for &cut in cuts {
            // Cuts past the end are rejected by the planner, nothing to look up
            if cut >= base.duration || index.resolves(cut) {
                continue;
            }

            let ladder = self
                .windows
                .iter()
                .copied()
                .chain(std::iter::once(f64::INFINITY));
            for width in ladder {
                let from = (cut - width).max(0.0);
                let found = self.keyframes_from_start(path, &base, from, cut + SCAN_PAD).await?;
                index.record(from, cut, &found);
                self.cache
                    .record_keyframes(path, &identity, from, cut, &found);

                if index.resolves(cut) || from <= 0.0 {
                    break;
                }
                debug!(path = %path.display(), cut, width, "No keyframe in window, widening");
            }
        }

        Ok(base.with_keyframes(index.timestamps().to_vec()))
    }

    /// Scan `[from, to]` given relative to the first frame. The port works on the
    /// container's own timeline, which starts at `start_time`.
    async fn keyframes_from_start(
        &self,
        path: &Path,
        fingerprint: &MediaFingerprint,
        from: f64,
        to: f64,
    ) -> QuiclipResult<Vec<f64>> {
        let origin = fingerprint.start_time;
        let found = self
            .prober
            .keyframes_between(path, from + origin, to + origin)
            .await?;
        Ok(found.into_iter().map(|k| (k - origin).max(0.0)).collect())
    }

    async fn entry(&self, path: &Path) -> QuiclipResult<(FileIdentity, Arc<MediaFingerprint>)> {
        let identity = FileIdentity::of(path)?;
        if let Some(entry) = self.cache.lookup(path, &identity) {
            debug!(path = %path.display(), "Fingerprint cache hit");
            return Ok((identity, entry.fingerprint));
        }

        info!(path = %path.display(), "Probing media file");
        let fingerprint = Arc::new(self.prober.probe(path).await?);
        self.cache.upsert(
            path.to_path_buf(),
            cache::CacheEntry {
                identity,
                fingerprint: Arc::clone(&fingerprint),
                keyframes: KeyframeIndex::default(),
            },
        );
        Ok((identity, fingerprint))
    }
}
