use std::sync::Arc;

use tracing::info;

use crate::adapters::process::locate_tool;
use crate::adapters::{FfmpegAdapter, FfprobeAdapter};
use crate::app::config::AppConfig;
use crate::app::pipeline::{Pipeline, PipelinePorts};
use crate::error::QuiclipResult;
use crate::probe::FingerprintCache;

pub trait AppContainer: Send + Sync {
    fn pipeline(&self) -> Pipeline;
}

/// Wires the ffmpeg/ffprobe adapters and the process-wide cache into a pipeline
pub struct DefaultAppContainer {
    pipeline: Pipeline,
}

impl DefaultAppContainer {
    /// Fails with `DependencyMissing` if either tool cannot be found
    pub fn new(config: &AppConfig) -> QuiclipResult<Self> {
        let ffprobe = locate_tool(&config.ffprobe_path)?;
        let ffmpeg = locate_tool(&config.ffmpeg_path)?;
        info!(ffprobe = %ffprobe.display(), ffmpeg = %ffmpeg.display(), "External tools located");

        let exec = Arc::new(FfmpegAdapter::new(ffmpeg));
        let ports = PipelinePorts {
            prober: Arc::new(FfprobeAdapter::new(ffprobe, config.probe_timeout())),
            trimmer: Arc::clone(&exec) as _,
            concatenator: exec,
            cache: FingerprintCache::global(),
        };

        Ok(Self {
            pipeline: Pipeline::new(config, ports)?,
        })
    }
}

impl AppContainer for DefaultAppContainer {
    fn pipeline(&self) -> Pipeline {
        self.pipeline.clone()
    }
}
