//! FFprobe adapter for media file probing
//!
//! This module provides FFprobe-based fingerprinting and windowed keyframe lookup.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::adapters::process::run_tool;
use crate::domain::model::{MediaFingerprint, Resolution, Timebase};
use crate::error::{stderr_tail, QuiclipError, QuiclipResult};
use crate::ports::Prober;

/// FFprobe JSON output format
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    format_name: Option<String>,
    start_time: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    pix_fmt: Option<String>,
    time_base: Option<String>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    start_time: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobePackets {
    #[serde(default)]
    packets: Vec<FfprobePacket>,
}

#[derive(Debug, Deserialize)]
struct FfprobePacket {
    pts_time: Option<String>,
    flags: Option<String>,
}

/// FFprobe-based probe adapter
#[derive(Debug, Clone)]
pub struct FfprobeAdapter {
    program: PathBuf,
    timeout: Duration,
}

impl FfprobeAdapter {
    /// Create new FFprobe adapter
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    async fn run(&self, path: &Path, args: Vec<OsString>) -> QuiclipResult<Vec<u8>> {
        let output = tokio::time::timeout(self.timeout, run_tool(&self.program, &args))
            .await
            .map_err(|_| QuiclipError::Timeout {
                operation: format!("ffprobe on {}", path.display()),
                seconds: self.timeout.as_secs(),
            })??;

        if !output.status.success() {
            return Err(QuiclipError::probe(path, stderr_tail(&output.stderr)));
        }
        Ok(output.stdout)
    }
}

#[async_trait]
impl Prober for FfprobeAdapter {
    async fn probe(&self, path: &Path) -> QuiclipResult<MediaFingerprint> {
        if !path.is_file() {
            return Err(QuiclipError::probe(path, "file does not exist"));
        }

        let mut args: Vec<OsString> = [
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ]
        .iter()
        .map(OsString::from)
        .collect();
        args.push(path.as_os_str().to_owned());

        let stdout = self.run(path, args).await?;
        let fingerprint = parse_fingerprint(path, &stdout)?;
        debug!(
            path = %path.display(),
            codec = %fingerprint.video_codec,
            duration = fingerprint.duration,
            "Probed media file"
        );
        Ok(fingerprint)
    }

    async fn keyframes_between(&self, path: &Path, from: f64, to: f64) -> QuiclipResult<Vec<f64>> {
        let mut args: Vec<OsString> = [
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-read_intervals",
        ]
        .iter()
        .map(OsString::from)
        .collect();
        args.push(format!("{:.6}%{:.6}", from.max(0.0), to).into());
        for arg in ["-show_entries", "packet=pts_time,flags", "-print_format", "json"] {
            args.push(arg.into());
        }
        args.push(path.as_os_str().to_owned());

        let stdout = self.run(path, args).await?;
        let keyframes = parse_keyframe_packets(path, &stdout)?;
        debug!(
            path = %path.display(),
            from,
            to,
            found = keyframes.len(),
            "Scanned keyframe window"
        );
        Ok(keyframes)
    }
}

/// Build a fingerprint from `-show_format -show_streams` JSON
fn parse_fingerprint(path: &Path, json: &[u8]) -> QuiclipResult<MediaFingerprint> {
    let probe: FfprobeOutput = serde_json::from_slice(json)
        .map_err(|e| QuiclipError::probe(path, format!("unreadable ffprobe output: {}", e)))?;

    let video = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| QuiclipError::probe(path, "no decodable video stream"))?;
    let audio = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"));

    let video_codec = video
        .codec_name
        .clone()
        .ok_or_else(|| QuiclipError::probe(path, "video stream has no codec"))?;
    let time_base = video
        .time_base
        .as_deref()
        .map(Timebase::parse)
        .transpose()
        .map_err(|e| QuiclipError::probe(path, e.to_string()))?
        .ok_or_else(|| QuiclipError::probe(path, "video stream has no time base"))?;

    let format = probe.format.as_ref();
    let duration = format
        .and_then(|f| f.duration.as_deref())
        .or(video.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
        .ok_or_else(|| QuiclipError::probe(path, "could not determine duration"))?;

    // ffmpeg's input seeking counts from the container start, so that is the origin
    let start_time = format
        .and_then(|f| f.start_time.as_deref())
        .or(video.start_time.as_deref())
        .and_then(|t| t.parse::<f64>().ok())
        .filter(|t| t.is_finite())
        .unwrap_or(0.0);

    let frame_rate = video
        .avg_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .or_else(|| video.r_frame_rate.as_deref().and_then(parse_frame_rate))
        .unwrap_or(0.0);

    Ok(MediaFingerprint {
        container: format
            .and_then(|f| f.format_name.clone())
            .unwrap_or_default(),
        video_codec,
        audio_codec: audio.and_then(|a| a.codec_name.clone()),
        resolution: Resolution {
            width: video.width.unwrap_or(0),
            height: video.height.unwrap_or(0),
        },
        frame_rate,
        pixel_format: video.pix_fmt.clone().unwrap_or_default(),
        time_base,
        start_time,
        duration,
        keyframes: Vec::new(),
    })
}

/// Extract keyframe timestamps from `-show_entries packet=pts_time,flags` JSON
fn parse_keyframe_packets(path: &Path, json: &[u8]) -> QuiclipResult<Vec<f64>> {
    let parsed: FfprobePackets = serde_json::from_slice(json)
        .map_err(|e| QuiclipError::probe(path, format!("unreadable ffprobe output: {}", e)))?;

    let mut keyframes: Vec<f64> = parsed
        .packets
        .iter()
        .filter(|p| p.flags.as_deref().is_some_and(|f| f.starts_with('K')))
        .filter_map(|p| p.pts_time.as_deref()?.parse::<f64>().ok())
        .filter(|t| t.is_finite())
        .collect();
    keyframes.sort_by(|a, b| a.total_cmp(b));
    keyframes.dedup();
    Ok(keyframes)
}

/// Parse frame rate string (e.g., "30/1" or "29.97")
fn parse_frame_rate(s: &str) -> Option<f64> {
    if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den > 0.0 {
            return Some(num / den);
        }
        return None;
    }
    s.parse().ok()
}
