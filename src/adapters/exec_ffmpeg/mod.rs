//! FFmpeg execution adapter
//!
//! Stream-copy trimming and concat-demuxer concatenation through the `ffmpeg` binary.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::adapters::process::run_tool;
use crate::error::{stderr_tail, QuiclipError, QuiclipResult};
use crate::ports::{Concatenator, TrimJob, Trimmer};

/// Containers that benefit from moving the index to the front
const FASTSTART_EXTENSIONS: &[&str] = &["mp4", "m4v", "mov"];

/// FFmpeg-based execution adapter
#[derive(Debug, Clone)]
pub struct FfmpegAdapter {
    program: PathBuf,
}

impl FfmpegAdapter {
    /// Create new FFmpeg adapter
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn common_args() -> Vec<OsString> {
        ["-hide_banner", "-nostdin", "-y", "-v", "error"]
            .iter()
            .map(OsString::from)
            .collect()
    }

    /// Arguments for a stream-copy trim.
    ///
    /// `-ss` goes before `-i` so the demuxer seeks to the keyframe at or before
    /// the cut, and `-t` counts from there.
    pub fn trim_args(job: &TrimJob) -> Vec<OsString> {
        let mut args = Self::common_args();
        args.push("-ss".into());
        args.push(format!("{:.6}", job.cut_start).into());
        args.push("-i".into());
        args.push(job.source.clone().into_os_string());
        args.push("-t".into());
        args.push(format!("{:.6}", job.duration()).into());
        for arg in [
            "-map",
            "0:v:0",
            "-map",
            "0:a:0?",
            "-c",
            "copy",
            "-avoid_negative_ts",
            "make_zero",
        ] {
            args.push(arg.into());
        }
        args.push(job.output.clone().into_os_string());
        args
    }

    /// Arguments for a concat-demuxer stream copy
    pub fn concat_args(list_file: &Path, output: &Path) -> Vec<OsString> {
        let mut args = Self::common_args();
        for arg in ["-f", "concat", "-safe", "0", "-i"] {
            args.push(arg.into());
        }
        args.push(list_file.as_os_str().to_owned());
        for arg in ["-map", "0", "-c", "copy"] {
            args.push(arg.into());
        }

        let wants_faststart = output
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .is_some_and(|ext| FASTSTART_EXTENSIONS.contains(&ext.as_str()));
        if wants_faststart {
            args.push("-movflags".into());
            args.push("+faststart".into());
        }

        args.push(output.as_os_str().to_owned());
        args
    }
}

#[async_trait]
impl Trimmer for FfmpegAdapter {
    async fn trim(&self, job: &TrimJob) -> QuiclipResult<()> {
        debug!(
            source = %job.source.display(),
            cut_start = job.cut_start,
            cut_end = job.cut_end,
            "Trimming with stream copy"
        );

        let output = run_tool(&self.program, &Self::trim_args(job)).await?;
        if output.status.success() {
            Ok(())
        } else {
            let tail = stderr_tail(&output.stderr);
            warn!(source = %job.source.display(), "ffmpeg trim failed: {}", tail);
            Err(QuiclipError::Extraction {
                exit_code: output.status.code(),
                stderr_tail: tail,
            })
        }
    }
}

#[async_trait]
impl Concatenator for FfmpegAdapter {
    async fn concat(&self, list_file: &Path, output: &Path) -> QuiclipResult<()> {
        debug!(list = %list_file.display(), output = %output.display(), "Concatenating with stream copy");

        let result = run_tool(&self.program, &Self::concat_args(list_file, output)).await?;
        if result.status.success() {
            Ok(())
        } else {
            let tail = stderr_tail(&result.stderr);
            warn!(output = %output.display(), "ffmpeg concat failed: {}", tail);
            Err(QuiclipError::Assembly {
                exit_code: result.status.code(),
                stderr_tail: tail,
            })
        }
    }
}
