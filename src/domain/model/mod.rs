// Domain models - Core types and data structures

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{QuiclipError, QuiclipResult};

/// Time specification with precision - represents time in seconds with fractional precision
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct TimeSpec {
    pub seconds: f64,
}

impl TimeSpec {
    /// Create a new TimeSpec from seconds
    pub fn from_seconds(seconds: f64) -> Self {
        Self { seconds }
    }

    /// Get the value in seconds
    pub fn as_seconds(&self) -> f64 {
        self.seconds
    }

    /// Parse time string in various formats: `SS[.ms]`, `MM:SS[.ms]`, `HH:MM:SS[.ms]`
    pub fn parse(time_str: &str) -> QuiclipResult<Self> {
        let trimmed = time_str.trim();
        let invalid = |message: &str| QuiclipError::InvalidRange {
            message: format!("'{}': {}", trimmed, message),
        };

        // Plain seconds
        if let Ok(seconds) = trimmed.parse::<f64>() {
            if !seconds.is_finite() {
                return Err(invalid("time must be finite"));
            }
            if seconds < 0.0 {
                return Err(invalid("time cannot be negative"));
            }
            return Ok(Self::from_seconds(seconds));
        }

        let parts: Vec<&str> = trimmed.split(':').collect();
        let (hours, minutes, seconds_part) = match parts.as_slice() {
            [m, s] => (0u32, *m, *s),
            [h, m, s] => (
                h.parse::<u32>().map_err(|_| invalid("invalid hours"))?,
                *m,
                *s,
            ),
            _ => {
                return Err(invalid(
                    "expected seconds (123.45), MM:SS.ms (2:30.5) or HH:MM:SS.ms (1:02:30.5)",
                ))
            }
        };

        let minutes = minutes
            .parse::<u32>()
            .map_err(|_| invalid("invalid minutes"))?;
        let seconds = seconds_part
            .parse::<f64>()
            .map_err(|_| invalid("invalid seconds"))?;

        if parts.len() == 3 && minutes >= 60 {
            return Err(invalid("minutes must be less than 60"));
        }
        if !(0.0..60.0).contains(&seconds) {
            return Err(invalid("seconds must be in [0, 60)"));
        }

        Ok(Self::from_seconds(
            hours as f64 * 3600.0 + minutes as f64 * 60.0 + seconds,
        ))
    }

    /// Format as HH:MM:SS.mmm
    pub fn format_hms(&self) -> String {
        let total_millis = (self.seconds.max(0.0) * 1000.0).round() as u64;
        let hours = total_millis / 3_600_000;
        let minutes = (total_millis % 3_600_000) / 60_000;
        let seconds = (total_millis % 60_000) / 1000;
        let milliseconds = total_millis % 1000;

        format!(
            "{:02}:{:02}:{:02}.{:03}",
            hours, minutes, seconds, milliseconds
        )
    }
}

impl fmt::Display for TimeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_hms())
    }
}

/// Timebase for timestamp calculations - represents rational number for timestamp conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Timebase {
    pub num: i32,
    pub den: i32,
}

impl Timebase {
    /// Create a new timebase
    pub fn new(num: i32, den: i32) -> QuiclipResult<Self> {
        if den == 0 {
            return Err(QuiclipError::config("timebase denominator cannot be zero"));
        }
        Ok(Self { num, den })
    }

    /// Parse `num/den` as printed by ffprobe
    pub fn parse(value: &str) -> QuiclipResult<Self> {
        let (num, den) = value
            .trim()
            .split_once('/')
            .ok_or_else(|| QuiclipError::config(format!("invalid timebase '{}'", value)))?;
        let num = num
            .parse::<i32>()
            .map_err(|_| QuiclipError::config(format!("invalid timebase '{}'", value)))?;
        let den = den
            .parse::<i32>()
            .map_err(|_| QuiclipError::config(format!("invalid timebase '{}'", value)))?;
        Self::new(num, den)
    }
}

impl fmt::Display for Timebase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// Frame dimensions in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Codec/container parameters of one media file plus the keyframes known near its cut points.
///
/// A fingerprint is a snapshot: the prober hands out a new value whenever it learns
/// more keyframes, an existing value is never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaFingerprint {
    /// Container format name (e.g. `mov,mp4,m4a,3gp,3g2,mj2`)
    pub container: String,
    /// Codec of the primary video stream
    pub video_codec: String,
    /// Codec of the primary audio stream, if any
    pub audio_codec: Option<String>,
    pub resolution: Resolution,
    /// Average frame rate
    pub frame_rate: f64,
    pub pixel_format: String,
    /// Timestamp base of the primary video stream
    pub time_base: Timebase,
    /// Timestamp of the first frame. Probe scans work on this timeline;
    /// durations, requests and keyframes here count from it.
    #[serde(default)]
    pub start_time: f64,
    /// Duration in seconds
    pub duration: f64,
    /// Sorted keyframe timestamps in seconds
    #[serde(default)]
    pub keyframes: Vec<f64>,
}

impl MediaFingerprint {
    /// Return a copy carrying the given keyframes, sorted and deduplicated
    pub fn with_keyframes(&self, mut keyframes: Vec<f64>) -> Self {
        keyframes.retain(|k| k.is_finite());
        keyframes.sort_by(|a, b| a.total_cmp(b));
        keyframes.dedup();
        Self {
            keyframes,
            ..self.clone()
        }
    }
}

/// One user-selected range on a source file
#[derive(Debug, Clone, PartialEq)]
pub struct ClipRequest {
    source: PathBuf,
    start: f64,
    end: f64,
    position: usize,
}

impl ClipRequest {
    /// Create a new clip request.
    ///
    /// Zero-length ranges are accepted here and rejected by the planner, which
    /// is also where `end` gets clamped to the file duration.
    pub fn new(
        source: impl Into<PathBuf>,
        start: f64,
        end: f64,
        position: usize,
    ) -> QuiclipResult<Self> {
        if !start.is_finite() || !end.is_finite() {
            return Err(QuiclipError::InvalidRange {
                message: "times must be finite".to_string(),
            });
        }
        if start < 0.0 {
            return Err(QuiclipError::InvalidRange {
                message: format!("start ({}) cannot be negative", start),
            });
        }

        Ok(Self {
            source: source.into(),
            start,
            end,
            position,
        })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn end(&self) -> f64 {
        self.end
    }

    /// Order of this range in the final output
    pub fn position(&self) -> usize {
        self.position
    }

    /// Same range on another path (used once a path has been resolved)
    pub fn with_source(&self, source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            ..self.clone()
        }
    }
}

/// Raised when the start snap moved further than the configured tolerance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapWarning {
    pub position: usize,
    pub requested_start: f64,
    pub cut_start: f64,
    pub delta: f64,
    pub tolerance: f64,
}

impl fmt::Display for SnapWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "segment {} starts {:.3}s early (requested {}, cut at {}, tolerance {:.3}s)",
            self.position,
            self.delta,
            TimeSpec::from_seconds(self.requested_start),
            TimeSpec::from_seconds(self.cut_start),
            self.tolerance
        )
    }
}

/// A ClipRequest resolved against its fingerprint into a cuttable range
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedSegment {
    pub position: usize,
    pub source: PathBuf,
    pub requested_start: f64,
    pub requested_end: f64,
    /// Keyframe-aligned start actually used for the copy
    pub cut_start: f64,
    /// Requested end, clamped to the file duration
    pub cut_end: f64,
    /// True only if `cut_start` equals the requested start
    pub exact: bool,
    /// `requested_start - cut_start`, always >= 0
    pub snap_delta: f64,
    pub warning: Option<SnapWarning>,
}

impl PlannedSegment {
    /// Length of the copied range in seconds
    pub fn duration(&self) -> f64 {
        self.cut_end - self.cut_start
    }
}

/// Kind of job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobMode {
    /// Trim ranges and concatenate them
    Clip,
    /// Concatenate whole files
    Merge,
}

impl fmt::Display for JobMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobMode::Clip => write!(f, "clip"),
            JobMode::Merge => write!(f, "merge"),
        }
    }
}

/// What a job should concatenate
#[derive(Debug, Clone, PartialEq)]
pub enum JobSpec {
    /// Ranges ordered by their position index
    Clip(Vec<ClipRequest>),
    /// Whole files in the given order
    Merge(Vec<PathBuf>),
}

impl JobSpec {
    pub fn mode(&self) -> JobMode {
        match self {
            JobSpec::Clip(_) => JobMode::Clip,
            JobSpec::Merge(_) => JobMode::Merge,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            JobSpec::Clip(requests) => requests.is_empty(),
            JobSpec::Merge(files) => files.is_empty(),
        }
    }

    /// Source files referenced by the job, in submission order
    pub fn sources(&self) -> Vec<&Path> {
        match self {
            JobSpec::Clip(requests) => requests.iter().map(|r| r.source()).collect(),
            JobSpec::Merge(files) => files.iter().map(PathBuf::as_path).collect(),
        }
    }
}
