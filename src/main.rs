//! QuiClip CLI
//!
//! Cuts ranges out of server-side video files and joins them into a single
//! output with stream copy only.
//!
//! # Usage
//!
//! ```bash
//! quiclip clip -s talks/a.mp4@0-10 -s talks/b.mp4@25.3-30 -o highlights.mp4
//! quiclip merge part1.mp4 part2.mp4
//! quiclip run job.yaml
//! quiclip probe talks/a.mp4 --at 25.3
//! quiclip list talks
//! ```

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{info, warn};

use quiclip::adapters::TomlConfigAdapter;
use quiclip::app::{AppConfig, AppContainer, DefaultAppContainer, JobState, JobStatus, Pipeline};
use quiclip::cli::{Cli, Commands, JobManifest, ListArgs, ProbeArgs};
use quiclip::config_initialization::initialize_configuration_hierarchy;
use quiclip::domain::model::{JobSpec, MediaFingerprint, TimeSpec};
use quiclip::error::QuiclipResult;
use quiclip::planner::snap_start;
use quiclip::utils::browse;
use quiclip::utils::format_file_size;
use quiclip::utils::logging::{init_logging, log_system_info};
use quiclip::utils::path::PathScope;

/// Main entry point for the QuiClip CLI
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = initialize_configuration_hierarchy(&cli)?;

    init_logging(&config.logging)?;
    log_system_info();

    let result = execute(&cli, &config).await;
    quiclip::cleanup();
    result
}

async fn execute(cli: &Cli, config: &AppConfig) -> Result<()> {
    if !cli.command.needs_media_tools() {
        return execute_local_command(cli, config);
    }

    let container = DefaultAppContainer::new(config).context("media tools unavailable")?;
    let pipeline = container.pipeline();

    match &cli.command {
        Commands::Clip(args) => {
            info!(segments = args.segments.len(), "Executing clip command");
            let requests = args
                .segments
                .iter()
                .cloned()
                .enumerate()
                .map(|(position, segment)| segment.into_request(position))
                .collect::<QuiclipResult<Vec<_>>>()?;
            run_job(&pipeline, JobSpec::Clip(requests), args.output.as_deref(), cli.json).await
        }
        Commands::Merge(args) => {
            info!(files = args.files.len(), "Executing merge command");
            let spec = JobSpec::Merge(args.files.clone());
            run_job(&pipeline, spec, args.output.as_deref(), cli.json).await
        }
        Commands::Run(args) => {
            info!(manifest = %args.manifest.display(), "Executing job manifest");
            let (spec, output) = JobManifest::load(&args.manifest)
                .and_then(JobManifest::into_job)
                .with_context(|| format!("reading manifest {}", args.manifest.display()))?;
            run_job(&pipeline, spec, output.as_deref(), cli.json).await
        }
        Commands::Probe(args) => execute_probe_command(&pipeline, args, cli.json).await,
        Commands::List(_) | Commands::Config => execute_local_command(cli, config),
    }
}

/// Commands served from config and the filesystem alone
fn execute_local_command(cli: &Cli, config: &AppConfig) -> Result<()> {
    match &cli.command {
        Commands::List(args) => execute_list_command(args, config, cli.json),
        Commands::Config => {
            print!("{}", TomlConfigAdapter::render(config)?);
            Ok(())
        }
        _ => bail!("command needs ffmpeg and ffprobe"),
    }
}

/// Submit a job and wait for it; Ctrl-C cancels it
async fn run_job(
    pipeline: &Pipeline,
    spec: JobSpec,
    output: Option<&Path>,
    json: bool,
) -> Result<()> {
    let handle = pipeline.submit_job(spec, output)?;

    let status = tokio::select! {
        status = pipeline.wait(&handle) => status?,
        signal = tokio::signal::ctrl_c() => {
            signal.context("listening for Ctrl-C")?;
            warn!("Interrupted, cancelling job {}", handle.id());
            pipeline.cancel(&handle)?;
            pipeline.wait(&handle).await?
        }
    };

    print_status(&status, json)?;
    match (status.state, status.error()) {
        (JobState::Done, _) => Ok(()),
        (state, Some(failure)) => bail!("job {} {}: {}", status.id, state, failure),
        (state, None) => bail!("job {} {}", status.id, state),
    }
}

fn print_status(status: &JobStatus, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(status)?);
        return Ok(());
    }

    println!("{} job {}: {}", status.mode, status.id, status.state);
    for segment in &status.segments {
        let cut = if segment.exact {
            "exact".to_string()
        } else {
            format!("snapped to {}", TimeSpec::from_seconds(segment.cut_start))
        };
        println!(
            "  #{} {} {} - {} ({})",
            segment.position,
            segment.source.display(),
            TimeSpec::from_seconds(segment.requested_start),
            TimeSpec::from_seconds(segment.cut_end),
            cut
        );
    }
    for warning in &status.warnings {
        println!("  warning: {}", warning);
    }
    if status.state == JobState::Done {
        println!("output: {}", status.output.display());
    }
    Ok(())
}

async fn execute_probe_command(pipeline: &Pipeline, args: &ProbeArgs, json: bool) -> Result<()> {
    let around: Vec<f64> = args.at.iter().map(TimeSpec::as_seconds).collect();
    let fingerprint = pipeline.probe(&args.file, &around).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&fingerprint)?);
    } else {
        print_fingerprint(&args.file, &fingerprint, &around);
    }
    Ok(())
}

fn print_fingerprint(path: &Path, fingerprint: &MediaFingerprint, around: &[f64]) {
    println!("{}", path.display());
    println!("  container:    {}", fingerprint.container);
    println!("  duration:     {}", TimeSpec::from_seconds(fingerprint.duration));
    println!("  video:        {} {} {}", fingerprint.video_codec, fingerprint.resolution, fingerprint.pixel_format);
    println!("  frame rate:   {:.3}", fingerprint.frame_rate);
    println!("  time base:    {}", fingerprint.time_base);
    println!(
        "  audio:        {}",
        fingerprint.audio_codec.as_deref().unwrap_or("none")
    );
    for &t in around {
        let (cut, exact) = snap_start(t, &fingerprint.keyframes);
        let note = if exact { "exact" } else { "snapped" };
        println!(
            "  cut at {} -> {} ({})",
            TimeSpec::from_seconds(t),
            TimeSpec::from_seconds(cut),
            note
        );
    }
}

fn execute_list_command(args: &ListArgs, config: &AppConfig, json: bool) -> Result<()> {
    let scope = PathScope::new(&config.media_root, &config.output_dir)?;
    let dir = args.dir.clone().unwrap_or_else(PathBuf::new);
    let entries = browse::list_video_files(&scope, &dir)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        for entry in &entries {
            println!("{:>10}  {}", format_file_size(entry.size), entry.path.display());
        }
    }
    Ok(())
}
