//! QuiClip Library
//!
//! Lossless clip and merge of server-side video files: ranges are cut with
//! stream copy at keyframe boundaries and joined with the concat demuxer, so
//! no frame is ever re-encoded.

pub mod adapters;
pub mod app;
pub mod cli;
pub mod config_initialization;
pub mod domain;
pub mod engine;
pub mod error;
pub mod planner;
pub mod ports;
pub mod probe;
pub mod utils;

// Re-export commonly used types
pub use app::{
    AppConfig, AppContainer, DefaultAppContainer, JobFailure, JobHandle, JobId, JobState,
    JobStatus, Pipeline, PipelinePorts,
};
pub use domain::model::{ClipRequest, JobMode, JobSpec, MediaFingerprint, PlannedSegment, SnapWarning};
pub use error::{ErrorKind, QuiclipError, QuiclipResult};

/// Release process-wide resources held between jobs
pub fn cleanup() {
    probe::FingerprintCache::global().clear();
}
