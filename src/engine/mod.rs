//! Stream-copy execution: per-segment extraction and final assembly

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use tokio::sync::watch;
use tracing::warn;

use crate::error::{QuiclipError, QuiclipResult};

pub mod assemble;
pub mod extract;

pub use assemble::ConcatAssembler;
pub use extract::ClipExtractor;

/// Resolves once the cancel flag is raised. Never resolves if the sender is gone.
pub async fn cancelled(mut cancel: watch::Receiver<bool>) {
    if cancel.wait_for(|flag| *flag).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Drive `work` to completion unless the cancel flag is raised first
pub async fn cancellable<T, F>(cancel: &watch::Receiver<bool>, work: F) -> QuiclipResult<T>
where
    F: Future<Output = QuiclipResult<T>>,
{
    if *cancel.borrow() {
        return Err(QuiclipError::Cancelled);
    }

    tokio::select! {
        result = work => result,
        _ = cancelled(cancel.clone()) => Err(QuiclipError::Cancelled),
    }
}

/// Drive `work` under a wall-clock limit, abandoning it on cancellation.
///
/// Dropping `work` is what stops its subprocess, so both the timeout and the
/// cancel branch rely on the ports killing children on drop.
pub async fn run_guarded<T, F>(
    operation: &str,
    limit: Duration,
    cancel: &watch::Receiver<bool>,
    work: F,
) -> QuiclipResult<T>
where
    F: Future<Output = QuiclipResult<T>>,
{
    cancellable(cancel, async {
        tokio::time::timeout(limit, work)
            .await
            .map_err(|_| QuiclipError::Timeout {
                operation: operation.to_string(),
                seconds: limit.as_secs(),
            })?
    })
    .await
}

/// Remove a file if present, logging anything other than "not found"
pub(crate) async fn remove_if_exists(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), "Failed to remove partial file: {}", e),
    }
}
