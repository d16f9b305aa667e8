//! Subprocess plumbing shared by the ffmpeg and ffprobe adapters

use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::Path;
use std::process::{Output, Stdio};

use tokio::process::Command;
use tracing::debug;

use crate::error::{QuiclipError, QuiclipResult};

/// Run an external tool to completion, capturing stdout and stderr.
///
/// The child is killed if the returned future is dropped, which is how
/// timeouts and job cancellation stop in-flight work.
pub async fn run_tool(program: &Path, args: &[OsString]) -> QuiclipResult<Output> {
    debug!(
        "Running {} {}",
        program.display(),
        args.iter()
            .map(|a| a.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    );

    Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| match e.kind() {
            ErrorKind::NotFound => QuiclipError::DependencyMissing {
                tool: program.display().to_string(),
            },
            _ => QuiclipError::Io(e),
        })
}

/// Resolve a tool name or path, failing with `DependencyMissing` when it cannot be found.
pub fn locate_tool(program: &Path) -> QuiclipResult<std::path::PathBuf> {
    which::which(program).map_err(|_| QuiclipError::DependencyMissing {
        tool: program.display().to_string(),
    })
}
