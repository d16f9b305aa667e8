//! CLI module for QuiClip
//!
//! This module handles command-line argument parsing.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::app::config::MAX_WORKERS;
use crate::utils::logging::{LogFormat, LogLevel};

pub mod args;
pub mod manifest;

pub use args::{ClipArgs, ListArgs, MergeArgs, ProbeArgs, RunArgs, SegmentArg};
pub use manifest::JobManifest;

fn parse_workers(s: &str) -> Result<usize, String> {
    clap_num::number_range(s, 1, MAX_WORKERS)
}

fn parse_log_level(s: &str) -> Result<LogLevel, String> {
    s.parse().map_err(|e: crate::error::QuiclipError| e.to_string())
}

fn parse_log_format(s: &str) -> Result<LogFormat, String> {
    s.parse().map_err(|e: crate::error::QuiclipError| e.to_string())
}

/// QuiClip
///
/// Trim ranges out of server-side video files and join them into one output
/// without re-encoding.
#[derive(Parser, Debug)]
#[command(name = "quiclip")]
#[command(about = "QuiClip - lossless clip and merge of server-side videos")]
#[command(version)]
#[command(long_about = None)]
pub struct Cli {
    /// Configuration file (default: quiclip.toml or config/quiclip.toml if present)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory source files must live under
    #[arg(long, global = true, value_name = "DIR")]
    pub media_root: Option<PathBuf>,

    /// Directory outputs are written to
    #[arg(long, global = true, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Concurrent extractions per job (1-32)
    #[arg(long, global = true, value_parser = parse_workers)]
    pub workers: Option<usize>,

    /// Replace an existing output file
    #[arg(long, global = true)]
    pub overwrite: bool,

    /// Logging level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_parser = parse_log_level)]
    pub log_level: Option<LogLevel>,

    /// Log format (pretty, compact, json)
    #[arg(long, global = true, value_parser = parse_log_format)]
    pub log_format: Option<LogFormat>,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Cut ranges out of source files and join them in order
    Clip(ClipArgs),
    /// Join whole files in order
    Merge(MergeArgs),
    /// Run a job described by a YAML or JSON manifest
    Run(RunArgs),
    /// Show a file's codec fingerprint and nearby keyframes
    Probe(ProbeArgs),
    /// List selectable video files under the media root
    List(ListArgs),
    /// Print the effective configuration as TOML
    Config,
}

impl Commands {
    /// Whether the command runs ffmpeg or ffprobe
    pub fn needs_media_tools(&self) -> bool {
        !matches!(self, Commands::List(_) | Commands::Config)
    }
}
