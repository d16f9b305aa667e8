// Application layer - configuration, job lifecycle and the pipeline orchestrator

pub mod config;
pub mod container;
pub mod job;
pub mod pipeline;

pub use config::AppConfig;
pub use container::{AppContainer, DefaultAppContainer};
pub use job::{JobFailure, JobHandle, JobId, JobState, JobStatus, SegmentReport};
pub use pipeline::{Pipeline, PipelinePorts};
