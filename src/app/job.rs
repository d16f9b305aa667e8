//! Job identity, lifecycle states and status snapshots

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::model::{JobMode, PlannedSegment, SnapWarning};
use crate::error::{ErrorKind, QuiclipError};

/// Unique job identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque reference to a submitted job
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobHandle {
    id: JobId,
}

impl JobHandle {
    pub(crate) fn new(id: JobId) -> Self {
        Self { id }
    }

    pub fn id(&self) -> JobId {
        self.id
    }
}

/// Job lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Planning,
    Extracting,
    Validating,
    Assembling,
    Done,
    Failed,
    Cancelled,
}

impl JobState {
    /// Terminal states are final; a retry is a new job
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Done | JobState::Failed | JobState::Cancelled)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Pending => "pending",
            JobState::Planning => "planning",
            JobState::Extracting => "extracting",
            JobState::Validating => "validating",
            JobState::Assembling => "assembling",
            JobState::Done => "done",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Why a job ended in `failed` (or `cancelled`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub kind: ErrorKind,
    pub message: String,
    /// Ordinal of the segment (in output order) the error came from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segment_index: Option<usize>,
    /// File the error came from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl JobFailure {
    pub fn from_error(error: &QuiclipError) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
            segment_index: None,
            path: None,
        }
    }

    pub fn with_segment(mut self, index: usize) -> Self {
        self.segment_index = Some(index);
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(index) = self.segment_index {
            write!(f, " (segment {})", index)?;
        }
        if let Some(path) = &self.path {
            write!(f, " [{}]", path.display())?;
        }
        Ok(())
    }
}

/// How one segment was cut
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentReport {
    pub position: usize,
    pub source: PathBuf,
    pub requested_start: f64,
    pub requested_end: f64,
    pub cut_start: f64,
    pub cut_end: f64,
    pub exact: bool,
    pub snap_delta: f64,
}

impl From<&PlannedSegment> for SegmentReport {
    fn from(segment: &PlannedSegment) -> Self {
        Self {
            position: segment.position,
            source: segment.source.clone(),
            requested_start: segment.requested_start,
            requested_end: segment.requested_end,
            cut_start: segment.cut_start,
            cut_end: segment.cut_end,
            exact: segment.exact,
            snap_delta: segment.snap_delta,
        }
    }
}

/// Snapshot of a job handed to collaborators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    pub id: JobId,
    pub mode: JobMode,
    pub state: JobState,
    /// Fraction complete in `[0, 1]`
    pub progress: f64,
    pub output: PathBuf,
    #[serde(default)]
    pub segments: Vec<SegmentReport>,
    #[serde(default)]
    pub warnings: Vec<SnapWarning>,
    pub failure: Option<JobFailure>,
    pub submitted_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobStatus {
    pub(crate) fn pending(id: JobId, mode: JobMode, output: PathBuf) -> Self {
        Self {
            id,
            mode,
            state: JobState::Pending,
            progress: 0.0,
            output,
            segments: Vec::new(),
            warnings: Vec::new(),
            failure: None,
            submitted_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Move to a non-terminal state. Progress never goes backwards.
    pub(crate) fn advance(&mut self, state: JobState, progress: f64) {
        if self.state.is_terminal() {
            return;
        }
        self.state = state;
        self.progress = self.progress.max(progress.clamp(0.0, 1.0));
    }

    /// Enter a terminal state
    pub(crate) fn finish(&mut self, state: JobState, failure: Option<JobFailure>) {
        if self.state.is_terminal() {
            return;
        }
        self.state = state;
        if state == JobState::Done {
            self.progress = 1.0;
        }
        self.failure = failure;
        self.finished_at = Some(Utc::now());
    }

    pub fn error(&self) -> Option<&JobFailure> {
        self.failure.as_ref()
    }
}
