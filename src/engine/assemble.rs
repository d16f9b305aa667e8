//! Final concatenation, published onto the output path in one step

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info};

use crate::engine::{remove_if_exists, run_guarded};
use crate::error::{QuiclipError, QuiclipResult};
use crate::ports::Concatenator;

/// Name of the concat list inside the job's temp directory
pub const CONCAT_LIST_NAME: &str = "concat.txt";

/// Render an ffmpeg concat-demuxer list.
///
/// Single quotes inside paths are written as `'\''`.
pub fn render_concat_list(files: &[PathBuf]) -> String {
    files
        .iter()
        .map(|file| {
            let escaped = file.to_string_lossy().replace('\'', r"'\''");
            format!("file '{}'\n", escaped)
        })
        .collect()
}

/// Hidden sibling of `output` that receives the concatenation before the rename
pub fn partial_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let tag = uuid::Uuid::new_v4().simple().to_string();
    let name = match output.extension() {
        Some(ext) => format!(".{}.part-{}.{}", stem, &tag[..8], ext.to_string_lossy()),
        None => format!(".{}.part-{}", stem, &tag[..8]),
    };
    output.with_file_name(name)
}

/// Builds the concat list and runs the final stream copy
pub struct ConcatAssembler {
    concatenator: Arc<dyn Concatenator>,
    timeout: Duration,
    overwrite: bool,
}

impl ConcatAssembler {
    pub fn new(concatenator: Arc<dyn Concatenator>, timeout: Duration) -> Self {
        Self {
            concatenator,
            timeout,
            overwrite: false,
        }
    }

    /// Allow the publish step to replace an existing output
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Concatenate `files` in order into `output`.
    ///
    /// Either a complete file exists at `output` afterwards or nothing was written there.
    pub async fn assemble(
        &self,
        files: &[PathBuf],
        output: &Path,
        work_dir: &Path,
        cancel: &watch::Receiver<bool>,
    ) -> QuiclipResult<()> {
        if files.is_empty() {
            return Err(QuiclipError::config("nothing to assemble"));
        }

        let cwd = std::env::current_dir()?;
        let absolute: Vec<PathBuf> = files
            .iter()
            .map(|f| if f.is_absolute() { f.clone() } else { cwd.join(f) })
            .collect();

        let list_file = work_dir.join(CONCAT_LIST_NAME);
        tokio::fs::write(&list_file, render_concat_list(&absolute)).await?;

        let partial = partial_path(output);
        debug!(
            list = %list_file.display(),
            partial = %partial.display(),
            inputs = files.len(),
            "Assembling output"
        );

        let result = run_guarded(
            "assembly",
            self.timeout,
            cancel,
            self.concatenator.concat(&list_file, &partial),
        )
        .await;

        let result = match result {
            Ok(()) => self.publish(&partial, output).await,
            Err(e) => Err(e),
        };

        if result.is_err() {
            remove_if_exists(&partial).await;
        } else {
            info!(output = %output.display(), inputs = files.len(), "Output assembled");
        }
        result
    }

    /// Move the finished partial onto `output`
    async fn publish(&self, partial: &Path, output: &Path) -> QuiclipResult<()> {
        if self.overwrite {
            return Ok(tokio::fs::rename(partial, output).await?);
        }

        // A link never replaces an existing file, unlike rename
        match tokio::fs::hard_link(partial, output).await {
            Ok(()) => {
                remove_if_exists(partial).await;
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(QuiclipError::OutputExists {
                    path: output.to_path_buf(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }
}
