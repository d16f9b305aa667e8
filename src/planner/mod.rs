//! Segment planning: resolve requested ranges into keyframe-aligned copy cuts

use tracing::{debug, warn};

use crate::domain::model::{ClipRequest, MediaFingerprint, PlannedSegment, SnapWarning};
use crate::error::{QuiclipError, QuiclipResult};
use crate::probe::TIME_EPSILON;

/// Snap a requested start onto the keyframe grid.
///
/// Returns the greatest keyframe at or before `requested` (0 when there is
/// none) and whether that equals the requested time. `keyframes` must be sorted.
pub fn snap_start(requested: f64, keyframes: &[f64]) -> (f64, bool) {
    if requested.abs() <= TIME_EPSILON {
        return (requested, true);
    }

    let upto = keyframes.partition_point(|&k| k <= requested + TIME_EPSILON);
    match upto.checked_sub(1).map(|i| keyframes[i]) {
        Some(k) if (requested - k).abs() <= TIME_EPSILON => (requested, true),
        Some(k) => (k, false),
        None => (0.0, false),
    }
}

/// Turns clip requests into planned segments
#[derive(Debug, Clone, Default)]
pub struct SegmentPlanner {
    tolerance: Option<f64>,
}

impl SegmentPlanner {
    /// Create a planner; `tolerance` is the snap distance (seconds) above which segments carry a warning
    pub fn new(tolerance: Option<f64>) -> Self {
        Self { tolerance }
    }

    /// Plan one request against the fingerprint of its source
    pub fn plan(
        &self,
        request: &ClipRequest,
        fingerprint: &MediaFingerprint,
    ) -> QuiclipResult<PlannedSegment> {
        let requested_start = request.start();
        let requested_end = request.end();
        let cut_end = requested_end.min(fingerprint.duration);

        if requested_start >= cut_end {
            return Err(QuiclipError::EmptyRange {
                start: requested_start,
                end: cut_end,
            });
        }

        let (cut_start, exact) = snap_start(requested_start, &fingerprint.keyframes);
        let snap_delta = requested_start - cut_start;

        let warning = self
            .tolerance
            .filter(|tolerance| snap_delta > tolerance + TIME_EPSILON)
            .map(|tolerance| SnapWarning {
                position: request.position(),
                requested_start,
                cut_start,
                delta: snap_delta,
                tolerance,
            });
        if let Some(warning) = &warning {
            warn!(source = %request.source().display(), "{}", warning);
        }

        debug!(
            segment = request.position(),
            requested_start,
            cut_start,
            cut_end,
            exact,
            "Planned segment"
        );

        Ok(PlannedSegment {
            position: request.position(),
            source: request.source().to_path_buf(),
            requested_start,
            requested_end,
            cut_start,
            cut_end,
            exact,
            snap_delta,
            warning,
        })
    }
}
