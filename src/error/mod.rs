//! Error handling module for QuiClip

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum number of stderr lines kept in an error
const STDERR_TAIL_LINES: usize = 12;

/// Maximum number of characters kept in an error
const STDERR_TAIL_CHARS: usize = 2000;

/// Main error type for QuiClip operations
#[derive(Error, Debug)]
pub enum QuiclipError {
    /// Source file missing, unreadable, or without a decodable video stream
    #[error("Failed to probe {path}: {message}")]
    Probe { path: PathBuf, message: String },

    /// Requested range has zero or negative length
    #[error("Empty range: start ({start:.3}s) must be less than end ({end:.3}s)")]
    EmptyRange { start: f64, end: f64 },

    /// Requested range is malformed (negative or non-finite times)
    #[error("Invalid time range: {message}")]
    InvalidRange { message: String },

    /// Stream-copy trim exited with a non-zero status
    #[error("Extraction failed (exit code {exit_code:?}): {stderr_tail}")]
    Extraction {
        exit_code: Option<i32>,
        stderr_tail: String,
    },

    /// External process exceeded its wall-clock limit
    #[error("{operation} timed out after {seconds}s")]
    Timeout { operation: String, seconds: u64 },

    /// Job was cancelled by its initiator
    #[error("Operation cancelled")]
    Cancelled,

    /// Segments disagree on codec parameters
    #[error("Segments {first} and {second} are not concatenation-compatible: {fields}")]
    IncompatibleSegments {
        first: usize,
        second: usize,
        fields: String,
    },

    /// Stream-copy concatenation exited with a non-zero status
    #[error("Assembly failed (exit code {exit_code:?}): {stderr_tail}")]
    Assembly {
        exit_code: Option<i32>,
        stderr_tail: String,
    },

    /// Path escapes the permitted root
    #[error("Path {path} is outside of permitted directory {root}")]
    PathScope { path: PathBuf, root: PathBuf },

    /// Required external tool is not installed
    #[error("Required tool '{tool}' was not found on PATH")]
    DependencyMissing { tool: String },

    /// Output file already exists and overwriting is disabled
    #[error("Output file already exists: {path}")]
    OutputExists { path: PathBuf },

    /// Invalid configuration or job description
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Unknown job handle
    #[error("Job not found: {id}")]
    JobNotFound { id: String },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parse error
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for QuiClip operations
pub type QuiclipResult<T> = std::result::Result<T, QuiclipError>;

/// Stable error classification handed to collaborators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Probe,
    EmptyRange,
    InvalidRange,
    Extraction,
    Timeout,
    Cancelled,
    IncompatibleSegments,
    Assembly,
    PathScope,
    DependencyMissing,
    OutputExists,
    Config,
    JobNotFound,
    Io,
}

impl QuiclipError {
    /// Create a probe error
    pub fn probe(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Probe {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Probe { .. } => ErrorKind::Probe,
            Self::EmptyRange { .. } => ErrorKind::EmptyRange,
            Self::InvalidRange { .. } => ErrorKind::InvalidRange,
            Self::Extraction { .. } => ErrorKind::Extraction,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::IncompatibleSegments { .. } => ErrorKind::IncompatibleSegments,
            Self::Assembly { .. } => ErrorKind::Assembly,
            Self::PathScope { .. } => ErrorKind::PathScope,
            Self::DependencyMissing { .. } => ErrorKind::DependencyMissing,
            Self::OutputExists { .. } => ErrorKind::OutputExists,
            Self::Config { .. } => ErrorKind::Config,
            Self::JobNotFound { .. } => ErrorKind::JobNotFound,
            Self::Io(_) | Self::Json(_) => ErrorKind::Io,
        }
    }
}

/// Reduce raw subprocess stderr to a short, printable tail.
pub fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);

    let joined = lines[start..]
        .iter()
        .map(|line| {
            line.chars()
                .filter(|c| !c.is_control() || *c == '\t')
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("\n");

    let count = joined.chars().count();
    if count > STDERR_TAIL_CHARS {
        joined.chars().skip(count - STDERR_TAIL_CHARS).collect()
    } else {
        joined
    }
}
