//! Pipeline orchestration: one tokio task per job, driven through
//! planning, extraction, validation and assembly.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};

use chrono::Local;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::app::config::AppConfig;
use crate::app::job::{JobFailure, JobHandle, JobId, JobState, JobStatus, SegmentReport};
use crate::domain::model::{ClipRequest, JobMode, JobSpec, MediaFingerprint, PlannedSegment};
use crate::engine::{cancellable, ClipExtractor, ConcatAssembler};
use crate::error::{ErrorKind, QuiclipError, QuiclipResult};
use crate::planner::SegmentPlanner;
use crate::ports::{Concatenator, Prober, Trimmer};
use crate::probe::{ConcatValidator, FingerprintCache, MediaProber};
use crate::utils::browse::{self, MediaEntry};
use crate::utils::path::PathScope;

/// Container used when neither the caller nor the sources suggest one
const DEFAULT_OUTPUT_EXTENSION: &str = "mp4";

const PROGRESS_PLANNING: f64 = 0.05;
const PROGRESS_EXTRACTING: f64 = 0.1;
const PROGRESS_EXTRACTED: f64 = 0.8;
const PROGRESS_VALIDATING: f64 = 0.85;
const PROGRESS_ASSEMBLING: f64 = 0.9;

/// External capabilities the pipeline is built on
pub struct PipelinePorts {
    pub prober: Arc<dyn Prober>,
    pub trimmer: Arc<dyn Trimmer>,
    pub concatenator: Arc<dyn Concatenator>,
    pub cache: Arc<FingerprintCache>,
}

struct JobRecord {
    status: Arc<watch::Sender<JobStatus>>,
    cancel: watch::Sender<bool>,
}

/// Job bookkeeping, guarded by a single lock
#[derive(Default)]
struct Registry {
    jobs: HashMap<JobId, JobRecord>,
    /// Outputs claimed by jobs that have not finished
    outputs: HashSet<PathBuf>,
    /// Finished jobs, oldest first
    finished: VecDeque<JobId>,
}

struct Inner {
    prober: MediaProber,
    planner: SegmentPlanner,
    extractor: ClipExtractor,
    assembler: ConcatAssembler,
    scope: PathScope,
    workers: usize,
    temp_dir: PathBuf,
    overwrite: bool,
    retained_jobs: usize,
    registry: RwLock<Registry>,
}

/// Everything one running job needs
struct JobRun {
    id: JobId,
    spec: JobSpec,
    output: PathBuf,
    status: Arc<watch::Sender<JobStatus>>,
    cancel: watch::Receiver<bool>,
}

impl JobRun {
    fn advance(&self, state: JobState, progress: f64) {
        self.status.send_modify(|status| status.advance(state, progress));
    }
}

/// Entry point for collaborators: submit jobs, poll, cancel and wait
#[derive(Clone)]
pub struct Pipeline {
    inner: Arc<Inner>,
}

impl Pipeline {
    /// Build a pipeline from validated configuration and its ports
    pub fn new(config: &AppConfig, ports: PipelinePorts) -> QuiclipResult<Self> {
        config.validate()?;
        let scope = PathScope::new(&config.media_root, &config.output_dir)?;
        std::fs::create_dir_all(&config.temp_dir)?;

        let inner = Inner {
            prober: MediaProber::new(ports.prober, ports.cache)
                .with_windows(config.keyframe_windows.clone()),
            planner: SegmentPlanner::new(config.snap_tolerance),
            extractor: ClipExtractor::new(ports.trimmer, config.extract_timeout()),
            assembler: ConcatAssembler::new(ports.concatenator, config.assemble_timeout())
                .with_overwrite(config.overwrite),
            scope,
            workers: config.workers,
            temp_dir: config.temp_dir.clone(),
            overwrite: config.overwrite,
            retained_jobs: config.retained_jobs,
            registry: RwLock::new(Registry::default()),
        };
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    pub fn scope(&self) -> &PathScope {
        &self.inner.scope
    }

    /// Validate a job description and start it in the background.
    ///
    /// Scope violations, an existing output and empty jobs are rejected here,
    /// before any work starts. Without `output` a timestamped name is chosen.
    /// An output claimed by another unfinished job is rejected even with
    /// `overwrite` set.
    pub fn submit_job(&self, spec: JobSpec, output: Option<&Path>) -> QuiclipResult<JobHandle> {
        if spec.is_empty() {
            return Err(QuiclipError::config(format!("{} job has no inputs", spec.mode())));
        }

        let spec = self.resolve_spec(spec)?;
        let requested = output
            .map(|path| self.inner.scope.resolve_output(path))
            .transpose()?;

        let mut registry = self.inner.lock_registry();
        let output = match requested {
            Some(path) => path,
            None => {
                let extension = spec
                    .sources()
                    .first()
                    .and_then(|p| p.extension())
                    .map(|e| e.to_string_lossy().to_lowercase())
                    .unwrap_or_else(|| DEFAULT_OUTPUT_EXTENSION.to_string());
                self.output_name(&registry, spec.mode(), &extension)
            }
        };

        if spec.sources().iter().any(|source| *source == output) {
            return Err(QuiclipError::config(format!(
                "output {} would overwrite one of the inputs",
                output.display()
            )));
        }
        if registry.outputs.contains(&output) || (output.exists() && !self.inner.overwrite) {
            return Err(QuiclipError::OutputExists { path: output });
        }

        let id = JobId::new();
        let (status_tx, _) = watch::channel(JobStatus::pending(id, spec.mode(), output.clone()));
        let status = Arc::new(status_tx);
        let (cancel_tx, cancel_rx) = watch::channel(false);

        registry.outputs.insert(output.clone());
        registry.jobs.insert(
            id,
            JobRecord {
                status: Arc::clone(&status),
                cancel: cancel_tx,
            },
        );
        drop(registry);

        info!(job_id = %id, mode = %spec.mode(), output = %output.display(), "Job submitted");
        let run = JobRun {
            id,
            spec,
            output,
            status,
            cancel: cancel_rx,
        };
        let inner = Arc::clone(&self.inner);
        tokio::spawn(
            async move { inner.run(run).await }.instrument(info_span!("job", job_id = %id)),
        );

        Ok(JobHandle::new(id))
    }

    /// Current snapshot of a job
    pub fn status(&self, handle: &JobHandle) -> QuiclipResult<JobStatus> {
        self.with_record(handle, |record| record.status.borrow().clone())
    }

    /// Ask a job to stop. Cancelling a finished job has no effect.
    pub fn cancel(&self, handle: &JobHandle) -> QuiclipResult<()> {
        self.with_record(handle, |record| {
            record.cancel.send_replace(true);
        })?;
        info!(job_id = %handle.id(), "Cancellation requested");
        Ok(())
    }

    /// Wait until the job reaches a terminal state
    pub async fn wait(&self, handle: &JobHandle) -> QuiclipResult<JobStatus> {
        let mut updates = self.with_record(handle, |record| record.status.subscribe())?;
        if updates
            .wait_for(|status| status.state.is_terminal())
            .await
            .is_err()
        {
            debug!(job_id = %handle.id(), "Status channel closed before the job finished");
        }
        let finished = updates.borrow().clone();
        Ok(finished)
    }

    /// Selectable video files directly inside `relative_dir` of the media root
    pub fn list_video_files(&self, relative_dir: &Path) -> QuiclipResult<Vec<MediaEntry>> {
        browse::list_video_files(&self.inner.scope, relative_dir)
    }

    /// Timestamped output path for a job of the given mode, skipping names
    /// that exist or are claimed by unfinished jobs
    pub fn default_output_path(&self, mode: JobMode) -> PathBuf {
        let registry = self
            .inner
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        self.output_name(&registry, mode, DEFAULT_OUTPUT_EXTENSION)
    }

    /// Fingerprint a source file, with keyframes around the given times
    pub async fn probe(&self, path: &Path, around: &[f64]) -> QuiclipResult<MediaFingerprint> {
        let source = self.inner.scope.resolve_source(path)?;
        self.inner.prober.fingerprint_near(&source, around).await
    }

    fn output_name(&self, registry: &Registry, mode: JobMode, extension: &str) -> PathBuf {
        let stamp = Local::now().format("%Y%m%d-%H%M%S");
        let dir = self.inner.scope.output_dir();
        let mut candidate = dir.join(format!("quiclip-{}-{}.{}", mode, stamp, extension));
        let mut counter = 1;
        while candidate.exists() || registry.outputs.contains(&candidate) {
            candidate = dir.join(format!("quiclip-{}-{}-{}.{}", mode, stamp, counter, extension));
            counter += 1;
        }
        candidate
    }

    fn resolve_spec(&self, spec: JobSpec) -> QuiclipResult<JobSpec> {
        let scope = &self.inner.scope;
        match spec {
            JobSpec::Clip(requests) => requests
                .iter()
                .map(|r| Ok(r.with_source(scope.resolve_source(r.source())?)))
                .collect::<QuiclipResult<Vec<ClipRequest>>>()
                .map(JobSpec::Clip),
            JobSpec::Merge(files) => files
                .iter()
                .map(|f| scope.resolve_source(f))
                .collect::<QuiclipResult<Vec<PathBuf>>>()
                .map(JobSpec::Merge),
        }
    }

    fn with_record<T>(
        &self,
        handle: &JobHandle,
        f: impl FnOnce(&JobRecord) -> T,
    ) -> QuiclipResult<T> {
        let registry = self
            .inner
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        registry
            .jobs
            .get(&handle.id())
            .map(f)
            .ok_or_else(|| QuiclipError::JobNotFound {
                id: handle.id().to_string(),
            })
    }
}

impl Inner {
    async fn run(self: Arc<Self>, run: JobRun) {
        let result = match self.work_dir(run.id) {
            Ok(work_dir) => {
                let result = self.execute(&run, work_dir.path()).await;
                let location = work_dir.path().to_path_buf();
                if let Err(e) = work_dir.close() {
                    warn!(path = %location.display(), "Failed to remove job temp directory: {}", e);
                } else {
                    debug!(path = %location.display(), "Removed job temp directory");
                }
                result
            }
            Err(e) => Err(JobFailure::from_error(&e).with_path(&self.temp_dir)),
        };

        // Free the output before anyone waiting on the job hears it finished
        self.retire(&run);
        match result {
            Ok(()) => {
                info!(output = %run.output.display(), "Job done");
                run.status.send_modify(|s| s.finish(JobState::Done, None));
            }
            Err(failure) if failure.kind == ErrorKind::Cancelled => {
                info!("Job cancelled");
                run.status
                    .send_modify(|s| s.finish(JobState::Cancelled, Some(failure)));
            }
            Err(failure) => {
                warn!("Job failed: {}", failure);
                run.status
                    .send_modify(|s| s.finish(JobState::Failed, Some(failure)));
            }
        }
    }

    fn lock_registry(&self) -> RwLockWriteGuard<'_, Registry> {
        self.registry.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Release the job's output and forget the oldest finished jobs past the limit
    fn retire(&self, run: &JobRun) {
        let mut registry = self.lock_registry();
        registry.outputs.remove(&run.output);
        registry.finished.push_back(run.id);
        while registry.finished.len() > self.retained_jobs {
            let Some(oldest) = registry.finished.pop_front() else {
                break;
            };
            registry.jobs.remove(&oldest);
            debug!(job_id = %oldest, "Forgot finished job");
        }
    }

    fn work_dir(&self, id: JobId) -> QuiclipResult<tempfile::TempDir> {
        let dir = tempfile::Builder::new()
            .prefix(&format!("quiclip-{}-", id))
            .tempdir_in(&self.temp_dir)?;
        debug!(path = %dir.path().display(), "Created job temp directory");
        Ok(dir)
    }

    async fn execute(self: &Arc<Self>, run: &JobRun, work_dir: &Path) -> Result<(), JobFailure> {
        let inputs = match &run.spec {
            JobSpec::Clip(requests) => {
                let segments = self.plan(run, requests).await?;
                let parts = self.extract_all(run, segments, work_dir).await?;
                self.validate_parts(run, &parts).await?;
                parts
            }
            JobSpec::Merge(files) => {
                self.validate_sources(run, files).await?;
                files.clone()
            }
        };

        run.advance(JobState::Assembling, PROGRESS_ASSEMBLING);
        self.assembler
            .assemble(&inputs, &run.output, work_dir, &run.cancel)
            .await
            .map_err(|e| JobFailure::from_error(&e).with_path(&run.output))
    }

    /// Fingerprint each distinct source once, then plan every request in position order
    async fn plan(
        &self,
        run: &JobRun,
        requests: &[ClipRequest],
    ) -> Result<Vec<PlannedSegment>, JobFailure> {
        run.advance(JobState::Planning, PROGRESS_PLANNING);

        let mut ordered: Vec<&ClipRequest> = requests.iter().collect();
        ordered.sort_by_key(|r| r.position());

        let mut fingerprints: HashMap<&Path, MediaFingerprint> = HashMap::new();
        for request in &ordered {
            let source = request.source();
            if fingerprints.contains_key(source) {
                continue;
            }
            let cuts: Vec<f64> = ordered
                .iter()
                .filter(|r| r.source() == source)
                .map(|r| r.start())
                .collect();
            let fingerprint =
                cancellable(&run.cancel, self.prober.fingerprint_near(source, &cuts))
                    .await
                    .map_err(|e| JobFailure::from_error(&e).with_path(source))?;
            fingerprints.insert(source, fingerprint);
        }

        let mut segments = Vec::with_capacity(ordered.len());
        for (index, request) in ordered.iter().enumerate() {
            let failure = |e: QuiclipError| {
                JobFailure::from_error(&e)
                    .with_segment(index)
                    .with_path(request.source())
            };
            let fingerprint = fingerprints
                .get(request.source())
                .ok_or_else(|| failure(QuiclipError::probe(request.source(), "not probed")))?;
            segments.push(self.planner.plan(request, fingerprint).map_err(failure)?);
        }

        run.status.send_modify(|status| {
            status.segments = segments.iter().map(SegmentReport::from).collect();
            status.warnings = segments.iter().filter_map(|s| s.warning.clone()).collect();
        });
        Ok(segments)
    }

    /// Extract every segment, at most `workers` at a time; the first failure aborts the rest
    async fn extract_all(
        self: &Arc<Self>,
        run: &JobRun,
        segments: Vec<PlannedSegment>,
        work_dir: &Path,
    ) -> Result<Vec<PathBuf>, JobFailure> {
        run.advance(JobState::Extracting, PROGRESS_EXTRACTING);

        let total = segments.len();
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut tasks = JoinSet::new();
        for (index, segment) in segments.into_iter().enumerate() {
            let inner = Arc::clone(self);
            let semaphore = Arc::clone(&semaphore);
            let cancel = run.cancel.clone();
            let dir = work_dir.to_path_buf();
            tasks.spawn(
                async move {
                    let result = match semaphore.acquire_owned().await {
                        Ok(_permit) => inner.extractor.extract(index, &segment, &dir, &cancel).await,
                        Err(_) => Err(QuiclipError::Cancelled),
                    };
                    (index, segment.source, result)
                }
                .in_current_span(),
            );
        }

        let mut parts: Vec<Option<PathBuf>> = vec![None; total];
        let mut finished = 0usize;
        while let Some(joined) = tasks.join_next().await {
            let failure = match joined {
                Ok((index, _, Ok(part))) => {
                    parts[index] = Some(part);
                    finished += 1;
                    let share = finished as f64 / total as f64;
                    run.advance(
                        JobState::Extracting,
                        PROGRESS_EXTRACTING + (PROGRESS_EXTRACTED - PROGRESS_EXTRACTING) * share,
                    );
                    continue;
                }
                Ok((index, source, Err(e))) => JobFailure::from_error(&e)
                    .with_segment(index)
                    .with_path(source),
                Err(e) => JobFailure::from_error(&QuiclipError::Extraction {
                    exit_code: None,
                    stderr_tail: format!("extraction task ended abnormally: {}", e),
                }),
            };

            debug!(remaining = tasks.len(), "Aborting outstanding extractions");
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
            return Err(failure);
        }

        parts
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| {
                JobFailure::from_error(&QuiclipError::Extraction {
                    exit_code: None,
                    stderr_tail: "segment output missing".to_string(),
                })
            })
    }

    /// Probe the extracted parts and check they can be joined
    async fn validate_parts(&self, run: &JobRun, parts: &[PathBuf]) -> Result<(), JobFailure> {
        run.advance(JobState::Validating, PROGRESS_VALIDATING);

        let mut fingerprints = Vec::with_capacity(parts.len());
        for (index, part) in parts.iter().enumerate() {
            let fingerprint = cancellable(&run.cancel, self.prober.probe_uncached(part))
                .await
                .map_err(|e| JobFailure::from_error(&e).with_segment(index).with_path(part))?;
            fingerprints.push(fingerprint);
        }
        Self::check_compatible(&fingerprints, parts)
    }

    /// Merge jobs validate the whole source files
    async fn validate_sources(&self, run: &JobRun, files: &[PathBuf]) -> Result<(), JobFailure> {
        run.advance(JobState::Validating, PROGRESS_EXTRACTING);

        let mut fingerprints = Vec::with_capacity(files.len());
        for (index, file) in files.iter().enumerate() {
            let fingerprint = cancellable(&run.cancel, self.prober.fingerprint(file))
                .await
                .map_err(|e| JobFailure::from_error(&e).with_segment(index).with_path(file))?;
            fingerprints.push(fingerprint);
        }
        run.advance(JobState::Validating, PROGRESS_VALIDATING);
        Self::check_compatible(&fingerprints, files)
    }

    fn check_compatible<F>(fingerprints: &[F], paths: &[PathBuf]) -> Result<(), JobFailure>
    where
        F: std::borrow::Borrow<MediaFingerprint>,
    {
        let report = ConcatValidator::validate(fingerprints);
        let Some(mismatch) = report.mismatch.clone() else {
            return Ok(());
        };

        warn!(
            first = mismatch.first,
            second = mismatch.second,
            "Inputs are not concatenation-compatible"
        );
        let failure = report
            .into_result()
            .map_err(|e| JobFailure::from_error(&e).with_segment(mismatch.second));
        match paths.get(mismatch.second) {
            Some(path) => failure.map_err(|f| f.with_path(path)),
            None => failure,
        }
    }
}
