//! Application configuration

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{QuiclipError, QuiclipResult};
use crate::probe::DEFAULT_KEYFRAME_WINDOWS;
use crate::utils::logging::LoggingConfig;

/// Upper bound for the extraction worker count
pub const MAX_WORKERS: usize = 32;

/// Settings shared by every job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory sources must live under
    pub media_root: PathBuf,
    /// Directory outputs are written to (created if missing)
    pub output_dir: PathBuf,
    /// Parent of per-job temp directories
    pub temp_dir: PathBuf,
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    /// Concurrent extractions per job
    pub workers: usize,
    pub probe_timeout_secs: u64,
    pub extract_timeout_secs: u64,
    pub assemble_timeout_secs: u64,
    /// Snap distance (seconds) above which a segment carries a warning
    pub snap_tolerance: Option<f64>,
    /// Keyframe search window ladder in seconds
    pub keyframe_windows: Vec<f64>,
    /// Replace an existing output file
    pub overwrite: bool,
    /// Finished jobs kept for status queries; older ones are forgotten
    pub retained_jobs: usize,
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            media_root: PathBuf::from("."),
            output_dir: PathBuf::from("output"),
            temp_dir: std::env::temp_dir(),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            workers: num_cpus::get().clamp(1, 4),
            probe_timeout_secs: 30,
            extract_timeout_secs: 600,
            assemble_timeout_secs: 1800,
            snap_tolerance: None,
            keyframe_windows: DEFAULT_KEYFRAME_WINDOWS.to_vec(),
            overwrite: false,
            retained_jobs: 256,
            logging: LoggingConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn extract_timeout(&self) -> Duration {
        Duration::from_secs(self.extract_timeout_secs)
    }

    pub fn assemble_timeout(&self) -> Duration {
        Duration::from_secs(self.assemble_timeout_secs)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> QuiclipResult<()> {
        if self.workers == 0 || self.workers > MAX_WORKERS {
            return Err(QuiclipError::config(format!(
                "workers must be between 1 and {}, got {}",
                MAX_WORKERS, self.workers
            )));
        }

        for (name, value) in [
            ("probe_timeout_secs", self.probe_timeout_secs),
            ("extract_timeout_secs", self.extract_timeout_secs),
            ("assemble_timeout_secs", self.assemble_timeout_secs),
        ] {
            if value == 0 {
                return Err(QuiclipError::config(format!("{} must be positive", name)));
            }
        }

        if let Some(tolerance) = self.snap_tolerance {
            if !tolerance.is_finite() || tolerance < 0.0 {
                return Err(QuiclipError::config(format!(
                    "snap_tolerance must be a non-negative number, got {}",
                    tolerance
                )));
            }
        }

        if self.keyframe_windows.is_empty() {
            return Err(QuiclipError::config("keyframe_windows cannot be empty"));
        }
        if self
            .keyframe_windows
            .iter()
            .any(|w| !w.is_finite() || *w <= 0.0)
        {
            return Err(QuiclipError::config(
                "keyframe_windows must contain positive values",
            ));
        }

        if self.retained_jobs == 0 {
            return Err(QuiclipError::config("retained_jobs must be at least 1"));
        }

        Ok(())
    }
}
