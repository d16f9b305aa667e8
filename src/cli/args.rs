//! Command-line argument definitions

use std::path::PathBuf;
use std::str::FromStr;

use clap::Args;

use crate::domain::model::{ClipRequest, TimeSpec};
use crate::error::{QuiclipError, QuiclipResult};

/// One `file@start-end` range given on the command line
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentArg {
    pub file: PathBuf,
    pub start: TimeSpec,
    pub end: TimeSpec,
}

impl SegmentArg {
    /// Turn into a request at `position`
    pub fn into_request(self, position: usize) -> QuiclipResult<ClipRequest> {
        ClipRequest::new(
            self.file,
            self.start.as_seconds(),
            self.end.as_seconds(),
            position,
        )
    }
}

impl FromStr for SegmentArg {
    type Err = QuiclipError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |message: &str| QuiclipError::InvalidRange {
            message: format!("'{}': {}", s, message),
        };

        let (file, range) = s
            .rsplit_once('@')
            .ok_or_else(|| invalid("expected FILE@START-END"))?;
        if file.is_empty() {
            return Err(invalid("missing file"));
        }
        let (start, end) = range
            .split_once('-')
            .ok_or_else(|| invalid("expected START-END after '@'"))?;

        Ok(Self {
            file: PathBuf::from(file),
            start: TimeSpec::parse(start)?,
            end: TimeSpec::parse(end)?,
        })
    }
}

fn parse_segment(s: &str) -> Result<SegmentArg, String> {
    s.parse().map_err(|e: QuiclipError| e.to_string())
}

fn parse_time(s: &str) -> Result<TimeSpec, String> {
    TimeSpec::parse(s).map_err(|e| e.to_string())
}

/// Arguments for the clip command
#[derive(Args, Debug)]
pub struct ClipArgs {
    /// Range to keep, as FILE@START-END (times: SS[.ms], MM:SS[.ms] or HH:MM:SS[.ms]); repeat in output order
    #[arg(short, long = "segment", value_name = "FILE@START-END", required = true, value_parser = parse_segment)]
    pub segments: Vec<SegmentArg>,

    /// Output file, relative to the output directory (default: quiclip-clip-<timestamp>)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Arguments for the merge command
#[derive(Args, Debug)]
pub struct MergeArgs {
    /// Files to concatenate, in order, relative to the media root
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Output file, relative to the output directory (default: quiclip-merge-<timestamp>)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Arguments for the run command
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Job manifest (.yaml, .yml or .json)
    pub manifest: PathBuf,
}

/// Arguments for the probe command
#[derive(Args, Debug)]
pub struct ProbeArgs {
    /// File to inspect, relative to the media root
    pub file: PathBuf,

    /// Also look up the keyframe at or before this time (repeatable)
    #[arg(long = "at", value_name = "TIME", value_parser = parse_time)]
    pub at: Vec<TimeSpec>,
}

/// Arguments for the list command
#[derive(Args, Debug)]
pub struct ListArgs {
    /// Directory relative to the media root (default: the root itself)
    pub dir: Option<PathBuf>,
}
