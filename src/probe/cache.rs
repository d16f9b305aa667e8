//! Process-wide fingerprint cache keyed by file identity

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use std::time::SystemTime;

use tracing::debug;

use crate::domain::model::MediaFingerprint;
use crate::error::{QuiclipError, QuiclipResult};

/// Timestamps closer than this are the same instant
pub const TIME_EPSILON: f64 = 1e-6;

static GLOBAL_CACHE: OnceLock<Arc<FingerprintCache>> = OnceLock::new();

/// Size and modification time of a file, used to detect stale cache entries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileIdentity {
    pub size: u64,
    pub modified: Option<SystemTime>,
}

impl FileIdentity {
    /// Read the identity of a file on disk
    pub fn of(path: &Path) -> QuiclipResult<Self> {
        let metadata = std::fs::metadata(path)
            .map_err(|e| QuiclipError::probe(path, format!("cannot read file: {}", e)))?;
        if !metadata.is_file() {
            return Err(QuiclipError::probe(path, "not a regular file"));
        }
        Ok(Self {
            size: metadata.len(),
            modified: metadata.modified().ok(),
        })
    }
}

/// Keyframes discovered so far, with the time spans that were scanned to find them
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyframeIndex {
    spans: Vec<(f64, f64)>,
    timestamps: Vec<f64>,
}

impl KeyframeIndex {
    /// Record the result of scanning `[from, to]`
    pub fn record(&mut self, from: f64, to: f64, keyframes: &[f64]) {
        self.spans.push((from, to));
        self.record_timestamps(keyframes);
    }

    fn record_timestamps(&mut self, keyframes: &[f64]) {
        self.timestamps
            .extend(keyframes.iter().copied().filter(|k| k.is_finite()));
        self.timestamps.sort_by(|a, b| a.total_cmp(b));
        self.timestamps.dedup_by(|a, b| (*a - *b).abs() <= TIME_EPSILON);
    }

    /// Whether the greatest keyframe at or before `t` is known.
    ///
    /// True when some scanned span reaching `t` either starts at zero or
    /// contains a keyframe at or before `t`.
    pub fn resolves(&self, t: f64) -> bool {
        if t <= TIME_EPSILON {
            return true;
        }
        self.spans.iter().any(|&(from, to)| {
            from <= t + TIME_EPSILON
                && to + TIME_EPSILON >= t
                && (from <= TIME_EPSILON
                    || self
                        .timestamps
                        .iter()
                        .any(|&k| k >= from - TIME_EPSILON && k <= t + TIME_EPSILON))
        })
    }

    /// Sorted keyframe timestamps
    pub fn timestamps(&self) -> &[f64] {
        &self.timestamps
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }
}

/// One cached file
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub identity: FileIdentity,
    pub fingerprint: Arc<MediaFingerprint>,
    pub keyframes: KeyframeIndex,
}

/// Read-mostly map from path to fingerprint.
///
/// Writes are idempotent upserts, so concurrent jobs racing on the same file
/// only cause redundant probing.
#[derive(Debug, Default)]
pub struct FingerprintCache {
    entries: RwLock<HashMap<PathBuf, CacheEntry>>,
}

impl FingerprintCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide cache, created on first use
    pub fn global() -> Arc<FingerprintCache> {
        Arc::clone(GLOBAL_CACHE.get_or_init(|| Arc::new(FingerprintCache::new())))
    }

    /// Fetch an entry if it still matches the file on disk; stale entries are dropped
    pub fn lookup(&self, path: &Path, identity: &FileIdentity) -> Option<CacheEntry> {
        let stale = {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            match entries.get(path) {
                Some(entry) if entry.identity == *identity => return Some(entry.clone()),
                Some(_) => true,
                None => false,
            }
        };

        if stale {
            debug!(path = %path.display(), "Dropping stale fingerprint");
            self.invalidate(path);
        }
        None
    }

    /// Insert or replace the entry for `path`
    pub fn upsert(&self, path: PathBuf, entry: CacheEntry) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        // Keep keyframes another job already found for the same file version
        if let Some(existing) = entries
            .get_mut(&path)
            .filter(|existing| existing.identity == entry.identity)
        {
            existing.fingerprint = entry.fingerprint;
            existing.keyframes.spans.extend(entry.keyframes.spans);
            existing
                .keyframes
                .record_timestamps(&entry.keyframes.timestamps);
            return;
        }
        entries.insert(path, entry);
    }

    /// Merge a keyframe scan into the entry for `path`, if it still matches `identity`
    pub fn record_keyframes(
        &self,
        path: &Path,
        identity: &FileIdentity,
        from: f64,
        to: f64,
        keyframes: &[f64],
    ) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = entries.get_mut(path) {
            if entry.identity == *identity {
                entry.keyframes.record(from, to, keyframes);
            }
        }
    }

    pub fn invalidate(&self, path: &Path) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(path);
    }

    /// Drop every entry (called at shutdown)
    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
