//! Shared fixtures: fake media files and fake ports for driving the pipeline
//! without ffmpeg.
//!
//! A fake media file is JSON holding a fingerprint and a keyframe interval.
//! The fake trimmer writes parts in the same format, so the pipeline's own
//! validation probes them like real files.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;

use quiclip::app::{AppConfig, Pipeline, PipelinePorts};
use quiclip::domain::model::{MediaFingerprint, Resolution, Timebase};
use quiclip::error::{QuiclipError, QuiclipResult};
use quiclip::ports::{Concatenator, Prober, TrimJob, Trimmer};
use quiclip::probe::FingerprintCache;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FakeMedia {
    pub fingerprint: MediaFingerprint,
    pub keyframe_interval: f64,
}

impl FakeMedia {
    /// H.264/AAC 720p with a keyframe every `keyframe_interval` seconds
    pub fn h264(duration: f64, keyframe_interval: f64) -> Self {
        Self {
            fingerprint: MediaFingerprint {
                container: "mov,mp4,m4a,3gp,3g2,mj2".to_string(),
                video_codec: "h264".to_string(),
                audio_codec: Some("aac".to_string()),
                resolution: Resolution {
                    width: 1280,
                    height: 720,
                },
                frame_rate: 30.0,
                pixel_format: "yuv420p".to_string(),
                time_base: Timebase { num: 1, den: 15360 },
                start_time: 0.0,
                duration,
                keyframes: vec![],
            },
            keyframe_interval,
        }
    }

    pub fn with_video_codec(mut self, codec: &str) -> Self {
        self.fingerprint.video_codec = codec.to_string();
        self
    }

    pub fn with_start_time(mut self, start_time: f64) -> Self {
        self.fingerprint.start_time = start_time;
        self
    }

    pub fn read(path: &Path) -> QuiclipResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| QuiclipError::probe(path, e.to_string()))?;
        serde_json::from_str(&content).map_err(|e| QuiclipError::probe(path, e.to_string()))
    }

    pub fn write(&self, path: &Path) -> QuiclipResult<()> {
        std::fs::write(path, serde_json::to_string(self)?)?;
        Ok(())
    }

    pub fn duration(&self) -> f64 {
        self.fingerprint.duration
    }
}

/// Reads fake media files and computes keyframes from their interval
#[derive(Debug, Default)]
pub struct FakeProber {
    pub probes: AtomicUsize,
}

#[async_trait]
impl Prober for FakeProber {
    async fn probe(&self, path: &Path) -> QuiclipResult<MediaFingerprint> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        Ok(FakeMedia::read(path)?.fingerprint)
    }

    async fn keyframes_between(&self, path: &Path, from: f64, to: f64) -> QuiclipResult<Vec<f64>> {
        let media = FakeMedia::read(path)?;
        let mut keyframes = Vec::new();
        // Keyframes sit on the container timeline, offset by the start time
        let origin = media.fingerprint.start_time;
        let mut t = origin;
        while t < origin + media.duration() && t <= to {
            if t >= from {
                keyframes.push(t);
            }
            t += media.keyframe_interval;
        }
        Ok(keyframes)
    }
}

/// Writes a fake part covering `[cut_start, cut_end)` of its source
#[derive(Debug, Default)]
pub struct FakeTrimmer {
    /// Sources whose file name matches fail after a partial write
    pub fail_on: Option<String>,
    pub delay: Duration,
    pub started: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl FakeTrimmer {
    pub fn failing_on(name: &str) -> Self {
        Self {
            fail_on: Some(name.to_string()),
            ..Self::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    async fn write_part(&self, job: &TrimJob) -> QuiclipResult<()> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let mut part = FakeMedia::read(&job.source)?;
        part.fingerprint.duration = job.duration();
        part.write(&job.output)?;

        let failing = self.fail_on.as_deref().is_some_and(|name| {
            job.source.file_name().is_some_and(|f| f.to_string_lossy() == name)
        });
        if failing {
            return Err(QuiclipError::Extraction {
                exit_code: Some(1),
                stderr_tail: "Invalid data found when processing input".to_string(),
            });
        }
        Ok(())
    }
}

/// Decrements the in-flight counter even when the trim future is dropped
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Trimmer for FakeTrimmer {
    async fn trim(&self, job: &TrimJob) -> QuiclipResult<()> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        self.write_part(job).await
    }
}

/// Joins fake media files named in a concat list, summing their durations
#[derive(Debug, Default)]
pub struct FakeConcat {
    pub fail: bool,
}

pub fn read_concat_list(list_file: &Path) -> QuiclipResult<Vec<PathBuf>> {
    let content = std::fs::read_to_string(list_file)?;
    Ok(content
        .lines()
        .filter_map(|line| line.strip_prefix("file '")?.strip_suffix('\''))
        .map(|quoted| PathBuf::from(quoted.replace(r"'\''", "'")))
        .collect())
}

#[async_trait]
impl Concatenator for FakeConcat {
    async fn concat(&self, list_file: &Path, output: &Path) -> QuiclipResult<()> {
        let inputs = read_concat_list(list_file)?;
        let mut joined: Option<FakeMedia> = None;
        for input in &inputs {
            let media = FakeMedia::read(input)?;
            match joined.as_mut() {
                Some(total) => total.fingerprint.duration += media.duration(),
                None => joined = Some(media),
            }
        }

        let joined = joined.ok_or_else(|| QuiclipError::Assembly {
            exit_code: Some(1),
            stderr_tail: "empty concat list".to_string(),
        })?;
        joined.write(output)?;

        if self.fail {
            return Err(QuiclipError::Assembly {
                exit_code: Some(1),
                stderr_tail: "Non-monotonous DTS in output stream".to_string(),
            });
        }
        Ok(())
    }
}

/// A pipeline over fake ports rooted in a temp directory
pub struct Harness {
    pub base: TempDir,
    pub pipeline: Pipeline,
    pub prober: Arc<FakeProber>,
    pub trimmer: Arc<FakeTrimmer>,
}

impl Harness {
    pub fn new(trimmer: FakeTrimmer) -> Self {
        Self::with(trimmer, FakeConcat::default(), |_| {})
    }

    pub fn with(
        trimmer: FakeTrimmer,
        concat: FakeConcat,
        configure: impl FnOnce(&mut AppConfig),
    ) -> Self {
        let base = tempfile::tempdir().expect("create temp dir");
        std::fs::create_dir_all(base.path().join("media")).expect("create media root");

        let mut config = AppConfig {
            media_root: base.path().join("media"),
            output_dir: base.path().join("out"),
            temp_dir: base.path().join("tmp"),
            workers: 2,
            ..AppConfig::default()
        };
        configure(&mut config);

        let prober = Arc::new(FakeProber::default());
        let trimmer = Arc::new(trimmer);
        let pipeline = Pipeline::new(
            &config,
            PipelinePorts {
                prober: prober.clone(),
                trimmer: trimmer.clone(),
                concatenator: Arc::new(concat),
                cache: Arc::new(FingerprintCache::new()),
            },
        )
        .expect("build pipeline");

        Self {
            base,
            pipeline,
            prober,
            trimmer,
        }
    }

    pub fn add_media(&self, name: &str, media: &FakeMedia) -> PathBuf {
        let path = self.base.path().join("media").join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create media subdirectory");
        }
        media.write(&path).expect("write fake media");
        path
    }

    pub fn output_dir(&self) -> &Path {
        self.pipeline.scope().output_dir()
    }

    /// Everything left behind in the temp directory
    pub fn temp_leftovers(&self) -> Vec<PathBuf> {
        walkdir::WalkDir::new(self.base.path().join("tmp"))
            .min_depth(1)
            .into_iter()
            .filter_map(Result::ok)
            .map(|e| e.path().to_path_buf())
            .collect()
    }

    /// Files in the output directory
    pub fn outputs(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(self.output_dir())
            .expect("read output dir")
            .filter_map(Result::ok)
            .map(|e| e.path())
            .collect();
        files.sort();
        files
    }
}
